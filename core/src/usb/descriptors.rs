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

use num_enum::{FromPrimitive, IntoPrimitive};
use uuid::Uuid;

/// `bDescriptorType` values of the standard descriptors the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DescriptorType {
    Device = 0x01,
    Configuration = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    InterfaceAssociation = 0x0B,
    Bos = 0x0F,
    DeviceCapability = 0x10,
    #[num_enum(catch_all)]
    Other(u8),
}

/// `bDevCapabilityType` values of BOS device capability descriptors.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
pub enum DeviceCapabilityType {
    WirelessUsb = 1,
    Usb2_0Extension = 2,
    SuperspeedUsb = 3,
    ContainerId = 4,
    Platform = 5,
    PowerDelivery = 6,
    BatteryInfo = 7,
    PdConsumerPort = 8,
    PdProviderPort = 9,
    SuperspeedPlus = 10,
    PrecisionTimeMeasurement = 11,
    WirelessUsbExt = 12,
    Billboard = 13,
    Authentication = 14,
    BillboardExt = 15,
    ConfigurationSummary = 16,
    FWStatus = 17,
    #[num_enum(catch_all)]
    Reserved(u8),
}

/// `wDescriptorType` values inside a Microsoft OS 2.0 descriptor set.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
pub enum MsOs20DescriptorType {
    SetHeader = 0,
    ConfigurationSubsetHeader = 1,
    FunctionSubsetHeader = 2,
    FeatureCompatibleId = 3,
    FeatureRegistryProperty = 4,
    FeatureMinResumeTime = 5,
    FeatureModelId = 6,
    FeatureCcgpDevice = 7,
    FeatureVendorRevision = 8,
    #[num_enum(catch_all)]
    Other(u16),
}

/// `wPropertyDataType` of a Microsoft OS 2.0 registry property descriptor.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
pub enum RegistryPropertyDataType {
    Sz = 1,
    ExpandSz = 2,
    Binary = 3,
    DwordLittleEndian = 4,
    DwordBigEndian = 5,
    Link = 6,
    MultiSz = 7,
    #[num_enum(catch_all)]
    Reserved(u16),
}

impl RegistryPropertyDataType {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryPropertyDataType::Sz => "REG_SZ",
            RegistryPropertyDataType::ExpandSz => "REG_EXPAND_SZ",
            RegistryPropertyDataType::Binary => "REG_BINARY",
            RegistryPropertyDataType::DwordLittleEndian => "REG_DWORD_LITTLE_ENDIAN",
            RegistryPropertyDataType::DwordBigEndian => "REG_DWORD_BIG_ENDIAN",
            RegistryPropertyDataType::Link => "REG_LINK",
            RegistryPropertyDataType::MultiSz => "REG_MULTI_SZ",
            RegistryPropertyDataType::Reserved(_) => "reserved",
        }
    }
}

pub const DEVICE_DESCRIPTOR_LENGTH: usize = 18;
pub const CONFIGURATION_DESCRIPTOR_LENGTH: usize = 9;
pub const INTERFACE_DESCRIPTOR_LENGTH: usize = 9;
pub const ENDPOINT_DESCRIPTOR_LENGTH: usize = 7;
pub const INTERFACE_ASSOCIATION_DESCRIPTOR_LENGTH: usize = 8;
pub const BOS_DESCRIPTOR_LENGTH: usize = 5;
/// Longest possible string descriptor, `bLength` is a single byte.
pub const MAX_STRING_DESCRIPTOR_LENGTH: u16 = 255;

/// Offset of `wTotalLength` in configuration and BOS descriptors.
pub const TOTAL_LENGTH_OFFSET: usize = 2;
/// Offset of the platform capability UUID inside a device capability descriptor.
pub const PLATFORM_UUID_OFFSET: usize = 4;
/// Device capability header plus reserved byte plus UUID.
pub const PLATFORM_CAPABILITY_HEADER_LENGTH: usize = 20;
/// Size of one MS OS 2.0 descriptor set information block in the platform capability.
pub const MS_OS_20_SET_INFORMATION_LENGTH: usize = 8;

/// {3408B638-09A9-47A0-8BFD-A0768815B665}
pub const WEBUSB_PLATFORM_UUID: Uuid = Uuid::from_u128(0x3408b638_09a9_47a0_8bfd_a0768815b665);
/// {D8DD60DF-4589-4CC7-9CD2-659D9E648A9F}
pub const MS_OS_20_PLATFORM_UUID: Uuid = Uuid::from_u128(0xd8dd60df_4589_4cc7_9cd2_659d9e648a9f);

/// `dwWindowsVersion` of Windows 8.1, the first version reading MS OS 2.0 descriptors.
pub const WINDOWS_8_1_VERSION: u32 = 0x0603_0000;

/// Language used for string descriptors when none was selected (en-US).
pub const DEFAULT_LANGUAGE_CODE: u16 = 0x0409;
