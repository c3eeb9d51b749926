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

/// Standard request codes (`bRequest`) used by the inspector.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardRequestCode {
    /// `GET_DESCRIPTOR`: wValue high byte is the descriptor type, low byte the descriptor index;
    /// wIndex is the language code for string descriptors, zero otherwise.
    GetDescriptor = 0x06,
}

/// `wIndex` values of vendor requests defined by platform capabilities.
///
/// These requests are sent with `bRequest` set to the vendor code advertised by the device
/// in its BOS platform capability descriptor.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorRequestIndex {
    /// WebUSB `GET_URL`: wValue contains the URL descriptor index.
    WebUsbGetUrl = 0x02,
    /// `MS_OS_20_DESCRIPTOR_INDEX`: returns the Microsoft OS 2.0 descriptor set.
    MsOs20DescriptorSet = 0x07,
    /// `MS_OS_20_SET_ALT_ENUMERATION`: wValue high byte contains the alternate enumeration code.
    MsOs20SetAltEnumeration = 0x08,
}

/// `bDescriptorType` of a WebUSB URL descriptor.
pub const WEBUSB_URL_DESCRIPTOR_TYPE: u8 = 0x03;

/// Prefix selected by `bScheme` of a WebUSB URL descriptor.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlScheme {
    Http = 0,
    Https = 1,
    /// The URL carries its own scheme.
    Raw = 255,
}

impl UrlScheme {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(UrlScheme::Http),
            1 => Some(UrlScheme::Https),
            255 => Some(UrlScheme::Raw),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            UrlScheme::Http => "http://",
            UrlScheme::Https => "https://",
            UrlScheme::Raw => "",
        }
    }
}

/// wValue of a `GET_DESCRIPTOR` request.
pub fn descriptor_value(descriptor_type: u8, descriptor_index: u8) -> u16 {
    ((descriptor_type as u16) << 8) | descriptor_index as u16
}
