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

//! Field grammar of every descriptor kind and the formatters rendering field values.

use usb_ids::FromId;
use crate::usb::byte_reader::{ByteReader, OutOfBounds};
use crate::usb::descriptor_tree::{DescriptorField, DescriptorNode, FieldValue, NodeCapability};
use crate::usb::descriptors::{RegistryPropertyDataType, WINDOWS_8_1_VERSION};
use crate::usb::errors::DecodeError;

/// Hook run after a field has been decoded. Receives the reader, the field offset and the node
/// under construction; it may only attach capabilities.
pub type FieldHook = fn(&ByteReader, usize, &mut DescriptorNode);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    Decimal,
    /// Big-endian 32-bit integer, only used by registry property data.
    DecimalBigEndian,
    Hex,
    /// `major.minor.sub` from a BCD-like version word.
    UsbVersion,
    /// Eight binary digits.
    Bitmap,
    ClassCode,
    VendorId,
    LanguageCode,
    Uuid,
    WindowsVersion,
    RegistryDataType,
    Ascii,
    Utf16Text,
    Utf8Text,
    Bytes,
}

#[derive(Clone, Copy)]
pub struct FieldSpec {
    pub label: &'static str,
    pub size: usize,
    pub format: FieldFormat,
    pub hook: Option<FieldHook>,
}

impl FieldSpec {
    pub const fn new(label: &'static str, size: usize, format: FieldFormat) -> Self {
        Self { label, size, format, hook: None }
    }

    pub const fn with_hook(self, hook: FieldHook) -> Self {
        Self { hook: Some(hook), ..self }
    }
}

pub const DEVICE_DESCRIPTOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Length", 1, FieldFormat::Decimal),
    FieldSpec::new("Descriptor Type", 1, FieldFormat::Hex),
    FieldSpec::new("USB Version", 2, FieldFormat::UsbVersion),
    FieldSpec::new("Class Code", 1, FieldFormat::ClassCode),
    FieldSpec::new("Subclass Code", 1, FieldFormat::Hex),
    FieldSpec::new("Protocol Code", 1, FieldFormat::Hex),
    FieldSpec::new("Control Pipe Maximum Packet Size", 1, FieldFormat::Decimal),
    FieldSpec::new("Vendor ID", 2, FieldFormat::VendorId),
    FieldSpec::new("Product ID", 2, FieldFormat::Hex),
    FieldSpec::new("Device Version", 2, FieldFormat::UsbVersion),
    FieldSpec::new("Manufacturer String Index", 1, FieldFormat::Decimal).with_hook(string_index_hook),
    FieldSpec::new("Product String Index", 1, FieldFormat::Decimal).with_hook(string_index_hook),
    FieldSpec::new("Serial Number Index", 1, FieldFormat::Decimal).with_hook(string_index_hook),
    FieldSpec::new("Number of Configurations", 1, FieldFormat::Decimal),
];

pub const CONFIGURATION_DESCRIPTOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Length", 1, FieldFormat::Decimal),
    FieldSpec::new("Descriptor Type", 1, FieldFormat::Hex),
    FieldSpec::new("Total Length", 2, FieldFormat::Decimal),
    FieldSpec::new("Number of Interfaces", 1, FieldFormat::Decimal),
    FieldSpec::new("Configuration Value", 1, FieldFormat::Decimal),
    FieldSpec::new("Configuration String Index", 1, FieldFormat::Decimal).with_hook(string_index_hook),
    FieldSpec::new("Attribute Bitmap", 1, FieldFormat::Bitmap),
    FieldSpec::new("Max Power (2mA increments)", 1, FieldFormat::Decimal),
];

pub const INTERFACE_DESCRIPTOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Length", 1, FieldFormat::Decimal),
    FieldSpec::new("Descriptor Type", 1, FieldFormat::Hex),
    FieldSpec::new("Interface Number", 1, FieldFormat::Decimal),
    FieldSpec::new("Alternate Setting", 1, FieldFormat::Decimal),
    FieldSpec::new("Number of Endpoints", 1, FieldFormat::Decimal),
    FieldSpec::new("Interface Class Code", 1, FieldFormat::ClassCode),
    FieldSpec::new("Interface Subclass Code", 1, FieldFormat::Hex),
    FieldSpec::new("Interface Protocol Code", 1, FieldFormat::Hex),
    FieldSpec::new("Interface String Index", 1, FieldFormat::Decimal).with_hook(string_index_hook),
];

pub const INTERFACE_ASSOCIATION_DESCRIPTOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Length", 1, FieldFormat::Decimal),
    FieldSpec::new("Descriptor Type", 1, FieldFormat::Hex),
    FieldSpec::new("First Interface", 1, FieldFormat::Decimal),
    FieldSpec::new("Interface Count", 1, FieldFormat::Decimal),
    FieldSpec::new("Function Class Code", 1, FieldFormat::ClassCode),
    FieldSpec::new("Function Subclass Code", 1, FieldFormat::Hex),
    FieldSpec::new("Function Protocol Code", 1, FieldFormat::Hex),
    FieldSpec::new("Function String Index", 1, FieldFormat::Decimal).with_hook(string_index_hook),
];

pub const ENDPOINT_DESCRIPTOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Length", 1, FieldFormat::Decimal),
    FieldSpec::new("Descriptor Type", 1, FieldFormat::Hex),
    FieldSpec::new("Endpoint Address", 1, FieldFormat::Hex),
    FieldSpec::new("Attribute Bitmap", 1, FieldFormat::Bitmap),
    FieldSpec::new("Max Packet Size", 2, FieldFormat::Decimal),
    FieldSpec::new("Interval", 1, FieldFormat::Decimal),
];

pub const BOS_DESCRIPTOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Length", 1, FieldFormat::Decimal),
    FieldSpec::new("Descriptor Type", 1, FieldFormat::Hex),
    FieldSpec::new("Total Length", 2, FieldFormat::Decimal),
    FieldSpec::new("Number of Device Capability Descriptors", 1, FieldFormat::Decimal),
];

pub const DESCRIPTOR_HEADER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Length", 1, FieldFormat::Decimal),
    FieldSpec::new("Descriptor Type", 1, FieldFormat::Hex),
];

pub const DEVICE_CAPABILITY_HEADER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Length", 1, FieldFormat::Decimal),
    FieldSpec::new("Descriptor Type", 1, FieldFormat::Hex),
    FieldSpec::new("Device Capability Type", 1, FieldFormat::Hex),
];

pub const PLATFORM_CAPABILITY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Reserved", 1, FieldFormat::Hex),
    FieldSpec::new("Platform Capability UUID", 16, FieldFormat::Uuid),
];

pub const WEBUSB_PLATFORM_CAPABILITY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Protocol Version Supported", 2, FieldFormat::UsbVersion),
    FieldSpec::new("Vendor Code", 1, FieldFormat::Hex),
    FieldSpec::new("Landing Page Index", 1, FieldFormat::Decimal).with_hook(landing_page_hook),
];

pub const MS_OS_20_SET_INFORMATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Windows Version", 4, FieldFormat::WindowsVersion),
    FieldSpec::new("Descriptor Set Total Length", 2, FieldFormat::Decimal),
    FieldSpec::new("Vendor Code", 1, FieldFormat::Hex).with_hook(ms_os_20_descriptor_set_hook),
    FieldSpec::new("Alternate Enumeration Code", 1, FieldFormat::Hex).with_hook(alt_enum_hook),
];

pub const MS_OS_20_HEADER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Length", 2, FieldFormat::Decimal),
    FieldSpec::new("Descriptor Type", 2, FieldFormat::Hex),
];

pub const MS_OS_20_SET_HEADER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Windows Version", 4, FieldFormat::WindowsVersion),
    FieldSpec::new("Total Length", 2, FieldFormat::Decimal),
];

pub const MS_OS_20_CONFIGURATION_SUBSET_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Configuration Value", 1, FieldFormat::Decimal),
    FieldSpec::new("Reserved", 1, FieldFormat::Hex),
    FieldSpec::new("Total Length", 2, FieldFormat::Decimal),
];

pub const MS_OS_20_FUNCTION_SUBSET_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("First Interface Number", 1, FieldFormat::Decimal),
    FieldSpec::new("Reserved", 1, FieldFormat::Hex),
    FieldSpec::new("Subset Length", 2, FieldFormat::Decimal),
];

pub const MS_OS_20_COMPATIBLE_ID_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Compatible ID", 8, FieldFormat::Ascii),
    FieldSpec::new("Sub-Compatible ID", 8, FieldFormat::Ascii),
];

pub const MS_OS_20_REGISTRY_PROPERTY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Property Data Type", 2, FieldFormat::RegistryDataType),
    FieldSpec::new("Property Name Length", 2, FieldFormat::Decimal),
];

pub const MS_OS_20_MIN_RESUME_TIME_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Resume Recovery Time (ms)", 1, FieldFormat::Decimal),
    FieldSpec::new("Resume Signaling Time (ms)", 1, FieldFormat::Decimal),
];

pub const MS_OS_20_MODEL_ID_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Model ID", 16, FieldFormat::Uuid),
];

pub const MS_OS_20_VENDOR_REVISION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Vendor Revision", 2, FieldFormat::Decimal),
];

fn string_index_hook(reader: &ByteReader, offset: usize, node: &mut DescriptorNode) {
    if let Ok(index) = reader.read_u8(offset) {
        if index != 0 {
            node.capabilities.push(NodeCapability::GetStringDescriptor { index });
        }
    }
}

fn landing_page_hook(reader: &ByteReader, offset: usize, node: &mut DescriptorNode) {
    // Vendor code directly precedes the landing page index.
    let (Some(vendor_offset), Ok(url_index)) = (offset.checked_sub(1), reader.read_u8(offset)) else {
        return;
    };
    if url_index == 0 {
        return;
    }
    if let Ok(vendor_code) = reader.read_u8(vendor_offset) {
        node.capabilities.push(NodeCapability::GetWebUsbLandingPage { vendor_code, url_index });
    }
}

fn ms_os_20_descriptor_set_hook(reader: &ByteReader, offset: usize, node: &mut DescriptorNode) {
    // wMSOSDescriptorSetTotalLength directly precedes bMS_VendorCode.
    let Some(length_offset) = offset.checked_sub(2) else {
        return;
    };
    if let (Ok(total_length), Ok(vendor_code)) = (reader.read_u16_le(length_offset), reader.read_u8(offset)) {
        if total_length != 0 {
            node.capabilities.push(NodeCapability::GetMsOs20DescriptorSet { vendor_code, total_length });
        }
    }
}

fn alt_enum_hook(reader: &ByteReader, offset: usize, node: &mut DescriptorNode) {
    let (Some(vendor_offset), Ok(alt_enum_code)) = (offset.checked_sub(1), reader.read_u8(offset)) else {
        return;
    };
    if alt_enum_code == 0 {
        return;
    }
    if let Ok(vendor_code) = reader.read_u8(vendor_offset) {
        node.capabilities.push(NodeCapability::SendMsOs20AltEnumCommand { vendor_code, alt_enum_code });
    }
}

/// Decodes a single field at `offset`.
pub fn decode_field(reader: &ByteReader, offset: usize, spec: &FieldSpec) -> Result<DescriptorField, OutOfBounds> {
    let raw_bytes = reader.read_bytes(offset, spec.size)?;
    let raw_value = raw_value(reader, offset, spec)?;
    let formatted_value = format_value(spec.format, raw_bytes, &raw_value);
    Ok(DescriptorField {
        label: spec.label,
        byte_offset: offset,
        byte_size: spec.size,
        raw_bytes: raw_bytes.to_vec(),
        formatted_value,
        raw_value,
    })
}

/// Decodes `specs` back to back starting at `offset` and appends them to `node`.
///
/// Stops at the first field which does not fit the reader and records an `OutOfBounds` error.
/// Returns the offset following the last decoded field.
pub fn decode_fields(
    reader: &ByteReader,
    offset: usize,
    specs: &[FieldSpec],
    node: &mut DescriptorNode,
    errors: &mut Vec<DecodeError>,
) -> Result<usize, usize> {
    let mut offset = offset;
    for spec in specs {
        match decode_field(reader, offset, spec) {
            Ok(field) => {
                node.fields.push(field);
                if let Some(hook) = spec.hook {
                    hook(reader, offset, node);
                }
                offset += spec.size;
            }
            Err(out_of_bounds) => {
                errors.push(DecodeError::OutOfBounds {
                    name: node.kind.name(),
                    offset: out_of_bounds.offset,
                    size: out_of_bounds.size,
                    available: out_of_bounds.available,
                });
                return Err(offset);
            }
        }
    }
    Ok(offset)
}

fn raw_value(reader: &ByteReader, offset: usize, spec: &FieldSpec) -> Result<FieldValue, OutOfBounds> {
    let value = match spec.format {
        FieldFormat::Uuid => FieldValue::Uuid(reader.read_uuid(offset)?),
        FieldFormat::Ascii => FieldValue::Text(reader.read_ascii(offset, spec.size)?),
        FieldFormat::Utf16Text => FieldValue::Text(reader.read_utf16le(offset, spec.size)?),
        FieldFormat::Utf8Text => FieldValue::Text(reader.read_utf8(offset, spec.size)?),
        FieldFormat::Bytes => FieldValue::Bytes(reader.read_bytes(offset, spec.size)?.to_vec()),
        FieldFormat::DecimalBigEndian => {
            let bytes = reader.read_bytes(offset, spec.size)?;
            FieldValue::U32(bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
        }
        _ => match spec.size {
            1 => FieldValue::U8(reader.read_u8(offset)?),
            2 => FieldValue::U16(reader.read_u16_le(offset)?),
            4 => FieldValue::U32(reader.read_u32_le(offset)?),
            _ => FieldValue::Bytes(reader.read_bytes(offset, spec.size)?.to_vec()),
        },
    };
    Ok(value)
}

/// Renders a decoded value for display.
pub fn format_value(format: FieldFormat, raw_bytes: &[u8], value: &FieldValue) -> String {
    match (format, value) {
        (FieldFormat::Decimal | FieldFormat::DecimalBigEndian, v) => match v.as_u32() {
            Some(number) => number.to_string(),
            None => format_hex_bytes(raw_bytes),
        },
        (FieldFormat::Hex, v) => match v.as_u32() {
            Some(number) => format!("0x{:0width$X}", number, width = raw_bytes.len() * 2),
            None => format_hex_bytes(raw_bytes),
        },
        (FieldFormat::UsbVersion, _) if raw_bytes.len() == 2 => format_usb_version(raw_bytes[0], raw_bytes[1]),
        (FieldFormat::Bitmap, FieldValue::U8(bits)) => format!("{:08b}", bits),
        (FieldFormat::ClassCode, FieldValue::U8(class)) => with_name(
            format!("0x{:02X}", class),
            usb_ids::Class::from_id(*class).map(|c| c.name().to_string()),
        ),
        (FieldFormat::VendorId, FieldValue::U16(vendor)) => with_name(
            format!("0x{:04X}", vendor),
            usb_ids::Vendor::from_id(*vendor).map(|v| v.name().to_string()),
        ),
        (FieldFormat::LanguageCode, FieldValue::U16(language)) =>
            with_name(format!("0x{:04X}", language), language_name(*language)),
        (FieldFormat::Uuid, FieldValue::Uuid(uuid)) => uuid.hyphenated().to_string().to_uppercase(),
        (FieldFormat::WindowsVersion, FieldValue::U32(version)) => format_windows_version(*version),
        (FieldFormat::RegistryDataType, FieldValue::U16(data_type)) =>
            format!("{} ({})", data_type, RegistryPropertyDataType::from(*data_type).name()),
        (_, FieldValue::Text(text)) => text.clone(),
        _ => format_hex_bytes(raw_bytes),
    }
}

/// `major = high byte`, `minor = high nibble of low byte`, `sub = low nibble of low byte`.
pub fn format_usb_version(low: u8, high: u8) -> String {
    format!("{}.{}.{}", high, low >> 4, low & 0x0F)
}

pub fn format_windows_version(version: u32) -> String {
    if version == WINDOWS_8_1_VERSION {
        "Windows 8.1".to_string()
    } else {
        format!("0x{:08X}", version)
    }
}

/// Space separated upper-case hex bytes.
pub fn format_hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

fn with_name(value: String, name: Option<String>) -> String {
    match name {
        Some(name) => format!("{} ({})", value, name),
        None => value,
    }
}

fn language_name(code: u16) -> Option<String> {
    let language_id = code & 0x3ff;
    let dialect_id = (code >> 10) as u8;
    let language = usb_ids::Language::from_id(language_id);
    let dialect = usb_ids::Dialect::from_lid_did(language_id, dialect_id);
    match (language, dialect) {
        (Some(language), Some(dialect)) =>
            Some(format!("{}/{}", language.name(), dialect.name())),
        (Some(language), None) =>
            Some(language.name().to_string()),
        _ => None
    }
}
