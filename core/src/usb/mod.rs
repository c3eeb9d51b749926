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

use nusb::DeviceInfo;
use crate::usb::errors::FetchError;

pub mod byte_reader;
pub mod consistency;
pub mod descriptor_tree;
pub mod descriptors;
pub mod fetcher;
pub mod fields;
pub mod manual_transfer;
pub mod ms_os_20;
pub mod requests;
pub mod standard_decoder;
pub mod transport;

pub mod errors;

fn matches_device(device_info: &DeviceInfo, vendor_id: u16, product_id: u16, serial_number: Option<&str>) -> bool {
    device_info.vendor_id() == vendor_id
        && device_info.product_id() == product_id
        && serial_number.map_or(true, |serial| device_info.serial_number() == Some(serial))
}

/// Finds the first connected device with the given vendor and product ID, and serial number
/// when one is given.
pub fn find_device(vendor_id: u16, product_id: u16, serial_number: Option<&str>) -> Result<Option<DeviceInfo>, FetchError> {
    let device = nusb::list_devices()?
        .find(|device_info| matches_device(device_info, vendor_id, product_id, serial_number));
    Ok(device)
}
