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

use log::{debug, warn};
use crate::usb::byte_reader::ByteReader;
use crate::usb::consistency::check_standard_tree;
use crate::usb::descriptor_tree::{DecodeContext, DecodeResult, DescriptorKind, DescriptorNode, FieldValue, PlatformCapability};
use crate::usb::descriptors::*;
use crate::usb::errors::DecodeError;
use crate::usb::fields::*;

/// Keeps track of the descriptors which currently own following descriptors.
#[derive(Default)]
struct TreeBuilder {
    roots: Vec<DescriptorNode>,
    configuration: Option<DescriptorNode>,
    interface: Option<DescriptorNode>,
    bos: Option<DescriptorNode>,
}

impl TreeBuilder {
    fn close_interface(&mut self) {
        if let Some(interface) = self.interface.take() {
            match self.configuration.as_mut() {
                Some(configuration) => configuration.children.push(interface),
                None => self.roots.push(interface),
            }
        }
    }

    fn close_all(&mut self) {
        self.close_interface();
        if let Some(configuration) = self.configuration.take() {
            self.roots.push(configuration);
        }
        if let Some(bos) = self.bos.take() {
            self.roots.push(bos);
        }
    }

    fn innermost(&mut self) -> Option<&mut DescriptorNode> {
        if self.interface.is_some() {
            return self.interface.as_mut();
        }
        if self.configuration.is_some() {
            return self.configuration.as_mut();
        }
        self.bos.as_mut()
    }

    fn push(&mut self, node: DescriptorNode) {
        match node.kind {
            DescriptorKind::Configuration => {
                self.close_all();
                self.configuration = Some(node);
            }
            DescriptorKind::Bos => {
                self.close_all();
                self.bos = Some(node);
            }
            DescriptorKind::Interface => {
                self.close_interface();
                if let Some(bos) = self.bos.take() {
                    self.roots.push(bos);
                }
                self.interface = Some(node);
            }
            DescriptorKind::Endpoint => {
                match self.interface.as_mut().or(self.configuration.as_mut()) {
                    Some(parent) => parent.children.push(node),
                    None => {
                        self.close_all();
                        self.roots.push(node);
                    }
                }
            }
            // An association groups the interfaces that follow it, so it belongs to the configuration.
            DescriptorKind::InterfaceAssociation => {
                self.close_interface();
                match self.configuration.as_mut() {
                    Some(configuration) => configuration.children.push(node),
                    None => {
                        self.close_all();
                        self.roots.push(node);
                    }
                }
            }
            DescriptorKind::DeviceCapability(_) => {
                match self.bos.as_mut() {
                    Some(bos) => bos.children.push(node),
                    None => {
                        self.close_all();
                        self.roots.push(node);
                    }
                }
            }
            DescriptorKind::Unknown => {
                match self.innermost() {
                    Some(parent) => parent.children.push(node),
                    None => self.roots.push(node),
                }
            }
            _ => {
                self.close_all();
                self.roots.push(node);
            }
        }
    }

    fn finish(mut self) -> Vec<DescriptorNode> {
        self.close_all();
        self.roots
    }
}

/// Decodes a buffer holding one or more back-to-back standard USB descriptors.
///
/// Decoding is best effort: problems are collected in [`DecodeResult::errors`] and the walk only
/// stops early on a zero-length descriptor.
pub fn decode_standard_descriptors(buf: &[u8], context: &DecodeContext) -> DecodeResult {
    let mut result = DecodeResult::new(buf);
    let reader = ByteReader::new(buf);
    let mut builder = TreeBuilder::default();

    let mut offset = 0;
    while offset + 1 < buf.len() {
        let length = buf[offset] as usize;
        if length == 0 {
            result.errors.push(DecodeError::MalformedDescriptor { offset, length });
            break;
        }
        let descriptor_reader = reader.limited_to(offset + length);
        let node = decode_descriptor(&descriptor_reader, offset, length, context, &mut result.errors);
        debug!("Decoded {} at offset {} ({} bytes)", node.kind, offset, length);
        builder.push(node);
        offset += length;
    }

    result.tree = builder.finish();
    check_standard_tree(&result.tree, &mut result.errors);
    for error in &result.errors {
        warn!("{}", error);
    }
    result
}

fn decode_descriptor(
    reader: &ByteReader,
    offset: usize,
    length: usize,
    context: &DecodeContext,
    errors: &mut Vec<DecodeError>,
) -> DescriptorNode {
    let descriptor_type = DescriptorType::from(reader.read_u8(offset + 1).unwrap_or(0));
    match descriptor_type {
        DescriptorType::Device =>
            decode_fixed(reader, DescriptorKind::Device, DEVICE_DESCRIPTOR_FIELDS, offset, length, errors),
        DescriptorType::Configuration =>
            decode_fixed(reader, DescriptorKind::Configuration, CONFIGURATION_DESCRIPTOR_FIELDS, offset, length, errors),
        DescriptorType::Interface =>
            decode_fixed(reader, DescriptorKind::Interface, INTERFACE_DESCRIPTOR_FIELDS, offset, length, errors),
        DescriptorType::Endpoint =>
            decode_fixed(reader, DescriptorKind::Endpoint, ENDPOINT_DESCRIPTOR_FIELDS, offset, length, errors),
        DescriptorType::InterfaceAssociation => decode_fixed(
            reader,
            DescriptorKind::InterfaceAssociation,
            INTERFACE_ASSOCIATION_DESCRIPTOR_FIELDS,
            offset,
            length,
            errors,
        ),
        DescriptorType::Bos =>
            decode_fixed(reader, DescriptorKind::Bos, BOS_DESCRIPTOR_FIELDS, offset, length, errors),
        DescriptorType::String => {
            let language_code = context.language_code.unwrap_or(DEFAULT_LANGUAGE_CODE);
            decode_string(reader, language_code, offset, length, errors)
        }
        DescriptorType::DeviceCapability => decode_device_capability(reader, offset, length, errors),
        DescriptorType::Other(_) =>
            decode_fixed(reader, DescriptorKind::Unknown, DESCRIPTOR_HEADER_FIELDS, offset, length, errors),
    }
}

fn decode_fixed(
    reader: &ByteReader,
    kind: DescriptorKind,
    specs: &[FieldSpec],
    offset: usize,
    length: usize,
    errors: &mut Vec<DecodeError>,
) -> DescriptorNode {
    let mut node = DescriptorNode::new(kind, offset, length);
    let _ = decode_fields(reader, offset, specs, &mut node, errors);
    node
}

fn decode_string(
    reader: &ByteReader,
    language_code: u16,
    offset: usize,
    length: usize,
    errors: &mut Vec<DecodeError>,
) -> DescriptorNode {
    let mut node = DescriptorNode::new(DescriptorKind::StringLang(language_code), offset, length);
    let Ok(text_offset) = decode_fields(reader, offset, DESCRIPTOR_HEADER_FIELDS, &mut node, errors) else {
        return node;
    };
    if length > 2 {
        let text = [FieldSpec::new("String", length - 2, FieldFormat::Utf16Text)];
        let _ = decode_fields(reader, text_offset, &text, &mut node, errors);
    }
    node
}

fn platform_capability_kind(reader: &ByteReader, offset: usize, length: usize) -> Option<PlatformCapability> {
    let capability_type = DeviceCapabilityType::from(reader.read_u8(offset + 2).ok()?);
    if capability_type != DeviceCapabilityType::Platform || length < PLATFORM_CAPABILITY_HEADER_LENGTH {
        return None;
    }
    let uuid = reader.read_uuid(offset + PLATFORM_UUID_OFFSET).ok()?;
    Some(if uuid == WEBUSB_PLATFORM_UUID {
        PlatformCapability::WebUsbPlatform
    } else if uuid == MS_OS_20_PLATFORM_UUID {
        PlatformCapability::MsOs20Platform
    } else {
        PlatformCapability::Unknown
    })
}

fn decode_device_capability(
    reader: &ByteReader,
    offset: usize,
    length: usize,
    errors: &mut Vec<DecodeError>,
) -> DescriptorNode {
    let platform = platform_capability_kind(reader, offset, length);
    let kind = DescriptorKind::DeviceCapability(platform.unwrap_or(PlatformCapability::Unknown));
    let mut node = DescriptorNode::new(kind, offset, length);

    let Ok(next) = decode_fields(reader, offset, DEVICE_CAPABILITY_HEADER_FIELDS, &mut node, errors) else {
        return node;
    };
    let Some(platform) = platform else {
        return node;
    };
    let Ok(next) = decode_fields(reader, next, PLATFORM_CAPABILITY_FIELDS, &mut node, errors) else {
        return node;
    };

    match platform {
        PlatformCapability::WebUsbPlatform => {
            let _ = decode_fields(reader, next, WEBUSB_PLATFORM_CAPABILITY_FIELDS, &mut node, errors);
        }
        PlatformCapability::MsOs20Platform => {
            // One descriptor set information block per supported Windows version.
            let mut next = next;
            loop {
                match decode_fields(reader, next, MS_OS_20_SET_INFORMATION_FIELDS, &mut node, errors) {
                    Ok(after) => next = after,
                    Err(_) => break,
                }
                if next + MS_OS_20_SET_INFORMATION_LENGTH > offset + length {
                    break;
                }
            }
        }
        PlatformCapability::Unknown => {}
    }
    node
}

/// Decodes string descriptor zero, the array of supported language codes.
pub fn decode_language_codes(buf: &[u8]) -> DecodeResult {
    let mut result = DecodeResult::new(buf);
    let Some(&length) = buf.first() else {
        return result;
    };
    let length = length as usize;
    if length == 0 {
        result.errors.push(DecodeError::MalformedDescriptor { offset: 0, length });
        return result;
    }

    let reader = ByteReader::new(buf).limited_to(length);
    let mut node = DescriptorNode::new(DescriptorKind::StringLanguages, 0, length);
    if let Ok(mut next) = decode_fields(&reader, 0, DESCRIPTOR_HEADER_FIELDS, &mut node, &mut result.errors) {
        let language = [FieldSpec::new("Language Code", 2, FieldFormat::LanguageCode)];
        while next < length {
            match decode_fields(&reader, next, &language, &mut node, &mut result.errors) {
                Ok(after) => next = after,
                Err(_) => break,
            }
        }
    }
    result.tree.push(node);
    result
}

/// Language codes listed by a decoded string descriptor zero.
pub fn language_codes(result: &DecodeResult) -> Vec<u16> {
    result
        .nodes()
        .filter(|node| node.kind == DescriptorKind::StringLanguages)
        .flat_map(|node| node.fields.iter())
        .filter(|field| field.label == "Language Code")
        .filter_map(|field| match field.raw_value {
            FieldValue::U16(code) => Some(code),
            _ => None,
        })
        .collect()
}
