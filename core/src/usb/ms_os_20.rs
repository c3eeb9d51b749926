// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Decoder of Microsoft OS 2.0 descriptor sets.
//!
//! A set is a flat list of sub-descriptors, each starting with a 16-bit length and a 16-bit
//! type. The set header, configuration subsets and function subsets declare how many bytes
//! they span; the decoder nests the following sub-descriptors under them accordingly.

use log::{debug, warn};
use crate::usb::byte_reader::ByteReader;
use crate::usb::consistency::check_ms_os_20_tree;
use crate::usb::descriptor_tree::{DecodeResult, DescriptorKind, DescriptorNode};
use crate::usb::descriptors::{MsOs20DescriptorType, RegistryPropertyDataType};
use crate::usb::errors::DecodeError;
use crate::usb::fields::*;

const SUB_DESCRIPTOR_HEADER_LENGTH: usize = 4;

#[derive(Default)]
struct SubsetStack {
    roots: Vec<DescriptorNode>,
    open: Vec<(DescriptorNode, usize)>,
}

impl SubsetStack {
    fn close_one(&mut self) {
        if let Some((node, _)) = self.open.pop() {
            match self.open.last_mut() {
                Some((parent, _)) => parent.children.push(node),
                None => self.roots.push(node),
            }
        }
    }

    fn close_ended(&mut self, offset: usize) {
        while let Some((_, end)) = self.open.last() {
            if *end > offset {
                break;
            }
            self.close_one();
        }
    }

    fn close_until(&mut self, keep: impl Fn(DescriptorKind) -> bool) {
        while let Some((node, _)) = self.open.last() {
            if keep(node.kind) {
                break;
            }
            self.close_one();
        }
    }

    fn push(&mut self, node: DescriptorNode, offset: usize) {
        self.close_ended(offset);
        match node.kind {
            DescriptorKind::MsOs20SetHeader => {
                self.close_until(|_| false);
                self.open_container(node, "Total Length");
            }
            DescriptorKind::MsOs20ConfigurationSubset => {
                self.close_until(|kind| kind == DescriptorKind::MsOs20SetHeader);
                self.open_container(node, "Total Length");
            }
            DescriptorKind::MsOs20FunctionSubset => {
                self.close_until(|kind| matches!(
                    kind,
                    DescriptorKind::MsOs20SetHeader | DescriptorKind::MsOs20ConfigurationSubset
                ));
                self.open_container(node, "Subset Length");
            }
            _ => match self.open.last_mut() {
                Some((parent, _)) => parent.children.push(node),
                None => self.roots.push(node),
            },
        }
    }

    fn open_container(&mut self, node: DescriptorNode, length_label: &str) {
        let span = node
            .field_value(length_label)
            .map_or(node.source_length, |length| length as usize);
        let end = node.source_offset + span;
        self.open.push((node, end));
    }

    fn finish(mut self) -> Vec<DescriptorNode> {
        self.close_until(|_| false);
        self.roots
    }
}

/// Decodes a Microsoft OS 2.0 descriptor set returned by the `MS_OS_20_DESCRIPTOR_INDEX`
/// vendor request.
///
/// A sub-descriptor whose fields do not add up to its declared length is reported with
/// `LengthMismatch`; decoding always resumes at the declared end of the sub-descriptor.
pub fn decode_ms_os_20_set(buf: &[u8]) -> DecodeResult {
    let mut result = DecodeResult::new(buf);
    let reader = ByteReader::new(buf);
    let mut stack = SubsetStack::default();

    let mut offset = 0;
    while offset + 3 < buf.len() {
        let length = buf[offset] as usize | (buf[offset + 1] as usize) << 8;
        if length < SUB_DESCRIPTOR_HEADER_LENGTH {
            result.errors.push(DecodeError::MalformedDescriptor { offset, length });
            break;
        }
        let descriptor_type = MsOs20DescriptorType::from(u16::from_le_bytes([buf[offset + 2], buf[offset + 3]]));
        let descriptor_reader = reader.limited_to(offset + length);
        let (node, end) = decode_sub_descriptor(&descriptor_reader, descriptor_type, offset, length, &mut result.errors);
        debug!("Decoded {} at offset {} ({} bytes)", node.kind, offset, length);

        let consumed = end - offset;
        if consumed != length {
            result.errors.push(DecodeError::LengthMismatch {
                name: node.kind.name(),
                offset,
                declared: length,
                consumed,
            });
        }
        stack.push(node, offset);
        offset += length;
    }

    result.tree = stack.finish();
    check_ms_os_20_tree(&result.tree, &mut result.errors);
    for error in &result.errors {
        warn!("{}", error);
    }
    result
}

fn kind_of(descriptor_type: MsOs20DescriptorType) -> (DescriptorKind, &'static [FieldSpec]) {
    match descriptor_type {
        MsOs20DescriptorType::SetHeader =>
            (DescriptorKind::MsOs20SetHeader, MS_OS_20_SET_HEADER_FIELDS),
        MsOs20DescriptorType::ConfigurationSubsetHeader =>
            (DescriptorKind::MsOs20ConfigurationSubset, MS_OS_20_CONFIGURATION_SUBSET_FIELDS),
        MsOs20DescriptorType::FunctionSubsetHeader =>
            (DescriptorKind::MsOs20FunctionSubset, MS_OS_20_FUNCTION_SUBSET_FIELDS),
        MsOs20DescriptorType::FeatureCompatibleId =>
            (DescriptorKind::MsOs20FeatureCompatibleId, MS_OS_20_COMPATIBLE_ID_FIELDS),
        MsOs20DescriptorType::FeatureRegistryProperty =>
            (DescriptorKind::MsOs20FeatureRegistryProperty, MS_OS_20_REGISTRY_PROPERTY_FIELDS),
        MsOs20DescriptorType::FeatureMinResumeTime =>
            (DescriptorKind::MsOs20FeatureMinResumeTime, MS_OS_20_MIN_RESUME_TIME_FIELDS),
        MsOs20DescriptorType::FeatureModelId =>
            (DescriptorKind::MsOs20FeatureModelId, MS_OS_20_MODEL_ID_FIELDS),
        MsOs20DescriptorType::FeatureCcgpDevice =>
            (DescriptorKind::MsOs20FeatureCcgpDevice, &[]),
        MsOs20DescriptorType::FeatureVendorRevision =>
            (DescriptorKind::MsOs20FeatureVendorRevision, MS_OS_20_VENDOR_REVISION_FIELDS),
        MsOs20DescriptorType::Other(_) =>
            (DescriptorKind::Unknown, &[]),
    }
}

/// Returns the node and the offset following its last decoded field.
fn decode_sub_descriptor(
    reader: &ByteReader,
    descriptor_type: MsOs20DescriptorType,
    offset: usize,
    length: usize,
    errors: &mut Vec<DecodeError>,
) -> (DescriptorNode, usize) {
    let (kind, specs) = kind_of(descriptor_type);
    let mut node = DescriptorNode::new(kind, offset, length);

    let end = match decode_fields(reader, offset, MS_OS_20_HEADER_FIELDS, &mut node, errors) {
        Ok(next) => decode_fields(reader, next, specs, &mut node, errors),
        Err(end) => Err(end),
    };
    let end = match (kind, end) {
        (DescriptorKind::MsOs20FeatureRegistryProperty, Ok(next)) =>
            decode_registry_property_payload(reader, next, &mut node, errors),
        (DescriptorKind::Unknown, _) => return (node, offset + length),
        (_, Ok(next) | Err(next)) => next,
    };
    (node, end)
}

/// Decodes property name and property data following the fixed part of a registry property.
fn decode_registry_property_payload(
    reader: &ByteReader,
    offset: usize,
    node: &mut DescriptorNode,
    errors: &mut Vec<DecodeError>,
) -> usize {
    let data_type = RegistryPropertyDataType::from(node.field_value("Property Data Type").unwrap_or(0) as u16);
    let name_length = node.field_value("Property Name Length").unwrap_or(0) as usize;

    let name = [
        FieldSpec::new("Property Name", name_length, FieldFormat::Utf16Text),
        FieldSpec::new("Property Data Length", 2, FieldFormat::Decimal),
    ];
    let next = match decode_fields(reader, offset, &name, node, errors) {
        Ok(next) => next,
        Err(next) => return next,
    };
    let data_length = node.field_value("Property Data Length").unwrap_or(0) as usize;

    let format = match data_type {
        RegistryPropertyDataType::Sz
        | RegistryPropertyDataType::ExpandSz
        | RegistryPropertyDataType::Link => FieldFormat::Utf16Text,
        RegistryPropertyDataType::MultiSz =>
            return decode_multi_sz(reader, next, data_length, node, errors),
        RegistryPropertyDataType::DwordLittleEndian if data_length == 4 => FieldFormat::Decimal,
        RegistryPropertyDataType::DwordBigEndian if data_length == 4 => FieldFormat::DecimalBigEndian,
        _ => FieldFormat::Bytes,
    };
    let data = [FieldSpec::new("Property Data", data_length, format)];
    match decode_fields(reader, next, &data, node, errors) {
        Ok(end) | Err(end) => end,
    }
}

/// REG_MULTI_SZ data is a sequence of NUL terminated UTF-16LE strings closed by an empty one.
/// Every string becomes its own "Property Data" item.
fn decode_multi_sz(
    reader: &ByteReader,
    offset: usize,
    data_length: usize,
    node: &mut DescriptorNode,
    errors: &mut Vec<DecodeError>,
) -> usize {
    let bytes = match reader.read_bytes(offset, data_length) {
        Ok(bytes) => bytes,
        Err(_) => {
            // Let the generic path record the out of bounds read.
            let data = [FieldSpec::new("Property Data", data_length, FieldFormat::Utf16Text)];
            return match decode_fields(reader, offset, &data, node, errors) {
                Ok(end) | Err(end) => end,
            };
        }
    };

    let mut item_start = 0;
    let mut specs = Vec::new();
    for (unit_index, unit) in bytes.chunks_exact(2).enumerate() {
        if unit != [0, 0] {
            continue;
        }
        let item_end = (unit_index + 1) * 2;
        let label = if item_end - item_start == 2 { "List Terminator" } else { "Property Data" };
        let format = if label == "List Terminator" { FieldFormat::Bytes } else { FieldFormat::Utf16Text };
        specs.push(FieldSpec::new(label, item_end - item_start, format));
        item_start = item_end;
    }
    if item_start < data_length {
        specs.push(FieldSpec::new("Property Data", data_length - item_start, FieldFormat::Utf16Text));
    }

    match decode_fields(reader, offset, &specs, node, errors) {
        Ok(end) | Err(end) => end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn utf16z(text: &str) -> Vec<u8> {
        text.encode_utf16().chain(std::iter::once(0)).flat_map(|u| u.to_le_bytes()).collect()
    }

    fn set_header(total_length: u16) -> Vec<u8> {
        let mut data = vec![0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x06];
        data.extend_from_slice(&total_length.to_le_bytes());
        data
    }

    fn configuration_subset(total_length: u16) -> Vec<u8> {
        let mut data = vec![0x08, 0x00, 0x01, 0x00, 0x00, 0x00];
        data.extend_from_slice(&total_length.to_le_bytes());
        data
    }

    fn function_subset(first_interface: u8, subset_length: u16) -> Vec<u8> {
        let mut data = vec![0x08, 0x00, 0x02, 0x00, first_interface, 0x00];
        data.extend_from_slice(&subset_length.to_le_bytes());
        data
    }

    fn compatible_id(declared_length: u16) -> Vec<u8> {
        let mut data = declared_length.to_le_bytes().to_vec();
        data.extend_from_slice(&[0x03, 0x00]);
        data.extend_from_slice(b"WINUSB\0\0");
        data.extend_from_slice(&[0; 8]);
        data.resize(declared_length as usize, 0);
        data
    }

    fn registry_property(data_type: u16, name: &str, value: &[u8]) -> Vec<u8> {
        let name = utf16z(name);
        let length = 4 + 2 + 2 + name.len() + 2 + value.len();
        let mut data = (length as u16).to_le_bytes().to_vec();
        data.extend_from_slice(&[0x04, 0x00]);
        data.extend_from_slice(&data_type.to_le_bytes());
        data.extend_from_slice(&(name.len() as u16).to_le_bytes());
        data.extend_from_slice(&name);
        data.extend_from_slice(&(value.len() as u16).to_le_bytes());
        data.extend_from_slice(value);
        data
    }

    fn assemble(parts: &[Vec<u8>]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn test_winusb_function_set() {
        let mut guids = utf16z("{CDB3B5AD-293B-4663-AA36-1AAE46463776}");
        guids.extend_from_slice(&[0, 0]);
        let property = registry_property(7, "DeviceInterfaceGUIDs", &guids);
        assert_eq!(property.len(), 132);
        let subset_length = (8 + 20 + property.len()) as u16;
        let data = assemble(&[
            set_header(10 + subset_length),
            function_subset(3, subset_length),
            compatible_id(20),
            property,
        ]);
        let result = decode_ms_os_20_set(&data);
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        assert_eq!(result.tree.len(), 1);
        let header = &result.tree[0];
        assert_eq!(header.kind, DescriptorKind::MsOs20SetHeader);
        assert_eq!(header.field("Windows Version").unwrap().formatted_value, "Windows 8.1");
        assert_eq!(header.children.len(), 1);

        let function = &header.children[0];
        assert_eq!(function.kind, DescriptorKind::MsOs20FunctionSubset);
        assert_eq!(function.field_value("First Interface Number"), Some(3));
        let kinds: Vec<_> = function.children.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![
            DescriptorKind::MsOs20FeatureCompatibleId,
            DescriptorKind::MsOs20FeatureRegistryProperty,
        ]);

        let compatible = &function.children[0];
        assert_eq!(compatible.field("Compatible ID").unwrap().formatted_value, "WINUSB");
        assert_eq!(compatible.field("Sub-Compatible ID").unwrap().formatted_value, "");

        let property = &function.children[1];
        assert_eq!(property.field("Property Data Type").unwrap().formatted_value, "7 (REG_MULTI_SZ)");
        assert_eq!(property.field("Property Name").unwrap().formatted_value, "DeviceInterfaceGUIDs");
        assert_eq!(property.field("Property Data").unwrap().formatted_value,
                   "{CDB3B5AD-293B-4663-AA36-1AAE46463776}");
        assert!(property.field("List Terminator").is_some());
        assert_eq!(property.decoded_size(), 132);
    }

    #[test]
    fn test_descriptor_past_set_end_goes_to_root() {
        let result = decode_ms_os_20_set(&assemble(&[set_header(10), compatible_id(20)]));
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.tree.len(), 2);
        assert_eq!(result.tree[0].kind, DescriptorKind::MsOs20SetHeader);
        assert!(result.tree[0].children.is_empty());
        assert_eq!(result.tree[1].kind, DescriptorKind::MsOs20FeatureCompatibleId);
        assert_eq!(result.tree[1].source_offset, 10);
    }

    #[test]
    fn test_multi_sz_items() {
        let mut value = utf16z("first");
        value.extend(utf16z("second"));
        value.extend_from_slice(&[0, 0]);
        let data = registry_property(7, "Names", &value);
        let result = decode_ms_os_20_set(&data);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let items: Vec<_> = result.tree[0]
            .fields
            .iter()
            .filter(|f| f.label == "Property Data")
            .map(|f| f.formatted_value.as_str())
            .collect();
        assert_eq!(items, vec!["first", "second"]);
    }

    #[test]
    fn test_dword_properties() {
        let little = registry_property(4, "Value", &0x0102_0304u32.to_le_bytes());
        let big = registry_property(5, "Value", &0x0102_0304u32.to_be_bytes());
        let result = decode_ms_os_20_set(&assemble(&[little, big]));
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.tree.len(), 2);
        for node in &result.tree {
            assert_eq!(node.field_value("Property Data"), Some(0x0102_0304));
        }
    }

    #[test]
    fn test_binary_property_is_opaque() {
        let result = decode_ms_os_20_set(&registry_property(3, "Blob", &[0xDE, 0xAD]));
        assert_eq!(result.tree[0].field("Property Data").unwrap().formatted_value, "DE AD");
    }

    #[test]
    fn test_length_mismatch_resynchronizes_to_declared_length() {
        let _ = env_logger::builder().is_test(true).try_init();
        // 20 bytes of fields followed by 2 bytes of padding counted in wLength.
        let data = assemble(&[compatible_id(22), vec![0x04, 0x00, 0x07, 0x00]]);
        let result = decode_ms_os_20_set(&data);
        assert_eq!(result.errors, vec![DecodeError::LengthMismatch {
            name: "Microsoft OS 2.0 Compatible ID Descriptor",
            offset: 0,
            declared: 22,
            consumed: 20,
        }]);
        assert_eq!(result.tree.len(), 2);
        assert_eq!(result.tree[1].kind, DescriptorKind::MsOs20FeatureCcgpDevice);
        assert_eq!(result.tree[1].source_offset, 22);
    }

    #[test]
    fn test_short_declared_length_does_not_read_into_next_descriptor() {
        let mut short = compatible_id(20);
        short[0] = 18;
        short.truncate(18);
        let data = assemble(&[short, vec![0x06, 0x00, 0x08, 0x00, 0x01, 0x00]]);
        let result = decode_ms_os_20_set(&data);

        assert_eq!(result.errors.len(), 2);
        assert!(matches!(result.errors[0], DecodeError::OutOfBounds { offset: 12, size: 8, available: 18, .. }));
        assert!(matches!(result.errors[1], DecodeError::LengthMismatch { declared: 18, consumed: 12, .. }));
        assert_eq!(result.tree[1].kind, DescriptorKind::MsOs20FeatureVendorRevision);
        assert_eq!(result.tree[1].source_offset, 18);
        assert_eq!(result.tree[1].field_value("Vendor Revision"), Some(1));
    }

    #[test]
    fn test_configuration_subsets_and_declared_lengths() {
        let model_id = {
            let mut data = vec![0x14, 0x00, 0x06, 0x00];
            data.extend_from_slice(&Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef).to_bytes_le());
            data
        };
        let resume = vec![0x06, 0x00, 0x05, 0x00, 0x0A, 0x14];
        let data = assemble(&[
            set_header(10 + 20 + 8 + 6 + 8 + 8 + 20),
            model_id,
            configuration_subset(8 + 6 + 8 + 8 + 20),
            resume,
            function_subset(0, 8),
            function_subset(1, 8 + 20),
            compatible_id(20),
        ]);
        let result = decode_ms_os_20_set(&data);
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        let header = &result.tree[0];
        assert_eq!(header.children.len(), 2);
        assert_eq!(header.children[0].kind, DescriptorKind::MsOs20FeatureModelId);
        assert_eq!(header.children[0].field("Model ID").unwrap().formatted_value,
                   "01234567-89AB-CDEF-0123-456789ABCDEF");
        let configuration = &header.children[1];
        let kinds: Vec<_> = configuration.children.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![
            DescriptorKind::MsOs20FeatureMinResumeTime,
            DescriptorKind::MsOs20FunctionSubset,
            DescriptorKind::MsOs20FunctionSubset,
        ]);
        assert!(configuration.children[1].children.is_empty());
        assert_eq!(configuration.children[2].children.len(), 1);
    }

    #[test]
    fn test_wrong_set_total_length_is_reported() {
        let data = assemble(&[set_header(40), compatible_id(20)]);
        let result = decode_ms_os_20_set(&data);
        assert_eq!(result.errors, vec![DecodeError::LengthMismatch {
            name: "Microsoft OS 2.0 Descriptor Set Header",
            offset: 0,
            declared: 40,
            consumed: 30,
        }]);
    }

    #[test]
    fn test_unknown_sub_descriptor_and_zero_length() {
        let data = [0x06, 0x00, 0x42, 0x00, 0xAA, 0xBB, 0x00, 0x00, 0x03, 0x00];
        let result = decode_ms_os_20_set(&data);
        assert_eq!(result.tree.len(), 1);
        assert_eq!(result.tree[0].kind, DescriptorKind::Unknown);
        assert_eq!(result.tree[0].source_length, 6);
        assert_eq!(result.errors, vec![DecodeError::MalformedDescriptor { offset: 6, length: 0 }]);
    }
}
