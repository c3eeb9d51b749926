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

use std::fmt;
use uuid::Uuid;
use crate::usb::errors::DecodeError;

/// Platform capability flavours recognised by their UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformCapability {
    WebUsbPlatform,
    MsOs20Platform,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Device,
    Configuration,
    Interface,
    Endpoint,
    InterfaceAssociation,
    StringLang(u16),
    /// String descriptor zero: the list of supported language codes.
    StringLanguages,
    Bos,
    DeviceCapability(PlatformCapability),
    MsOs20SetHeader,
    MsOs20ConfigurationSubset,
    MsOs20FunctionSubset,
    MsOs20FeatureCompatibleId,
    MsOs20FeatureRegistryProperty,
    MsOs20FeatureMinResumeTime,
    MsOs20FeatureModelId,
    MsOs20FeatureCcgpDevice,
    MsOs20FeatureVendorRevision,
    Unknown,
}

impl DescriptorKind {
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorKind::Device => "Device Descriptor",
            DescriptorKind::Configuration => "Configuration Descriptor",
            DescriptorKind::Interface => "Interface Descriptor",
            DescriptorKind::Endpoint => "Endpoint Descriptor",
            DescriptorKind::InterfaceAssociation => "Interface Association Descriptor",
            DescriptorKind::StringLang(_) => "String Descriptor",
            DescriptorKind::StringLanguages => "Language Codes",
            DescriptorKind::Bos => "BOS Descriptor",
            DescriptorKind::DeviceCapability(PlatformCapability::WebUsbPlatform) => "WebUSB Platform Capability Descriptor",
            DescriptorKind::DeviceCapability(PlatformCapability::MsOs20Platform) => "Microsoft OS 2.0 Platform Capability Descriptor",
            DescriptorKind::DeviceCapability(PlatformCapability::Unknown) => "Device Capability Descriptor",
            DescriptorKind::MsOs20SetHeader => "Microsoft OS 2.0 Descriptor Set Header",
            DescriptorKind::MsOs20ConfigurationSubset => "Microsoft OS 2.0 Configuration Subset Header",
            DescriptorKind::MsOs20FunctionSubset => "Microsoft OS 2.0 Function Subset Header",
            DescriptorKind::MsOs20FeatureCompatibleId => "Microsoft OS 2.0 Compatible ID Descriptor",
            DescriptorKind::MsOs20FeatureRegistryProperty => "Microsoft OS 2.0 Registry Property Descriptor",
            DescriptorKind::MsOs20FeatureMinResumeTime => "Microsoft OS 2.0 Minimum USB Resume Time Descriptor",
            DescriptorKind::MsOs20FeatureModelId => "Microsoft OS 2.0 Model ID Descriptor",
            DescriptorKind::MsOs20FeatureCcgpDevice => "Microsoft OS 2.0 CCGP Device Descriptor",
            DescriptorKind::MsOs20FeatureVendorRevision => "Microsoft OS 2.0 Vendor Revision Descriptor",
            DescriptorKind::Unknown => "Unknown Descriptor",
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorKind::StringLang(language) => write!(f, "{} (language 0x{:04X})", self.name(), language),
            _ => f.write_str(self.name()),
        }
    }
}

/// Raw value of a decoded field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    Uuid(Uuid),
    Text(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Numeric view of integer values, used for counts and indices.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            FieldValue::U8(v) => Some(*v as u32),
            FieldValue::U16(v) => Some(*v as u32),
            FieldValue::U32(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorField {
    pub label: &'static str,
    pub byte_offset: usize,
    pub byte_size: usize,
    pub raw_bytes: Vec<u8>,
    pub formatted_value: String,
    pub raw_value: FieldValue,
}

/// Deferred fetch offered by a decoded node. Executed by
/// [`DescriptorFetcher::invoke`](crate::usb::fetcher::DescriptorFetcher::invoke).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCapability {
    GetStringDescriptor { index: u8 },
    GetWebUsbLandingPage { vendor_code: u8, url_index: u8 },
    GetMsOs20DescriptorSet { vendor_code: u8, total_length: u16 },
    SendMsOs20AltEnumCommand { vendor_code: u8, alt_enum_code: u8 },
}

impl NodeCapability {
    pub fn name(&self) -> String {
        match self {
            NodeCapability::GetStringDescriptor { index } =>
                format!("Get string descriptor {} for all languages", index),
            NodeCapability::GetWebUsbLandingPage { .. } =>
                "Get WebUSB landing page URL".to_string(),
            NodeCapability::GetMsOs20DescriptorSet { .. } =>
                "Get Microsoft OS 2.0 descriptor set".to_string(),
            NodeCapability::SendMsOs20AltEnumCommand { .. } =>
                "Send Microsoft OS 2.0 alternate enumeration command".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorNode {
    pub kind: DescriptorKind,
    pub fields: Vec<DescriptorField>,
    pub children: Vec<DescriptorNode>,
    pub source_offset: usize,
    pub source_length: usize,
    pub capabilities: Vec<NodeCapability>,
}

impl DescriptorNode {
    pub fn new(kind: DescriptorKind, source_offset: usize, source_length: usize) -> Self {
        Self {
            kind,
            fields: Vec::new(),
            children: Vec::new(),
            source_offset,
            source_length,
            capabilities: Vec::new(),
        }
    }

    pub fn field(&self, label: &str) -> Option<&DescriptorField> {
        self.fields.iter().find(|field| field.label == label)
    }

    /// Integer value of the first field with the given label.
    pub fn field_value(&self, label: &str) -> Option<u32> {
        self.field(label).and_then(|field| field.raw_value.as_u32())
    }

    pub fn children_of_kind(&self, kind: DescriptorKind) -> impl Iterator<Item = &DescriptorNode> {
        self.children.iter().filter(move |child| child.kind == kind)
    }

    /// Sum of the sizes of all decoded fields.
    pub fn decoded_size(&self) -> usize {
        self.fields.iter().map(|field| field.byte_size).sum()
    }

    /// Depth-first iterator over this node and its descendants.
    pub fn walk(&self) -> NodeWalk<'_> {
        NodeWalk { stack: vec![self] }
    }
}

pub struct NodeWalk<'a> {
    stack: Vec<&'a DescriptorNode>,
}

impl<'a> Iterator for NodeWalk<'a> {
    type Item = &'a DescriptorNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Input knobs for a decode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeContext {
    /// Language of string descriptors in the buffer, `0x0409` when unknown.
    pub language_code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeResult {
    pub tree: Vec<DescriptorNode>,
    pub errors: Vec<DecodeError>,
    pub raw_buffer: Vec<u8>,
}

impl DecodeResult {
    pub fn new(raw_buffer: &[u8]) -> Self {
        Self {
            tree: Vec::new(),
            errors: Vec::new(),
            raw_buffer: raw_buffer.to_vec(),
        }
    }

    /// All nodes of the tree in document order.
    pub fn nodes(&self) -> impl Iterator<Item = &DescriptorNode> {
        self.tree.iter().flat_map(|node| node.walk())
    }

    /// Deferred fetches offered anywhere in the tree.
    pub fn capabilities(&self) -> Vec<NodeCapability> {
        self.nodes().flat_map(|node| node.capabilities.iter().copied()).collect()
    }
}
