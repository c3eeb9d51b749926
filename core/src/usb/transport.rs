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
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, trace};
use nusb::transfer::{ControlIn, ControlOut, TransferError};
use nusb::DeviceInfo;
use crate::usb::errors::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    Standard,
    Class,
    Vendor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// Setup stage of a control transfer, without direction and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    pub control_type: ControlType,
    pub recipient: Recipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

/// Completion status reported by the device transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    ShortPacket,
    Babble,
    TransferError,
    Timeout,
    Cancelled,
    Stalled,
    Disconnect,
    PermissionDenied,
}

impl TransferStatus {
    /// Human-readable reason shown to the user next to the status.
    pub fn reason(&self) -> &'static str {
        match self {
            TransferStatus::Completed => "transfer completed",
            TransferStatus::ShortPacket => "descriptor is too short",
            TransferStatus::Babble => "descriptor is too long",
            TransferStatus::TransferError => "transfer error",
            TransferStatus::Timeout => "transfer timed out",
            TransferStatus::Cancelled => "transfer was cancelled",
            TransferStatus::Stalled => "request was stalled by the device",
            TransferStatus::Disconnect => "device was disconnected",
            TransferStatus::PermissionDenied => "permission denied",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::ShortPacket => "SHORT_PACKET",
            TransferStatus::Babble => "BABBLE",
            TransferStatus::TransferError => "TRANSFER_ERROR",
            TransferStatus::Timeout => "TIMEOUT",
            TransferStatus::Cancelled => "CANCELLED",
            TransferStatus::Stalled => "STALLED",
            TransferStatus::Disconnect => "DISCONNECT",
            TransferStatus::PermissionDenied => "PERMISSION_DENIED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResponse {
    pub status: TransferStatus,
    pub data: Vec<u8>,
}

/// A device which can be opened for control transfers.
#[async_trait]
pub trait UsbDevice: Send + Sync {
    /// Opens the device. The device is released when the returned handle is dropped.
    async fn open(&self) -> Result<Box<dyn DeviceHandle>, FetchError>;
}

/// An opened device. Dropping the handle closes the device.
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    async fn control_transfer_in(&self, setup: ControlSetup, length: u16, timeout: Duration) -> TransferResponse;

    async fn control_transfer_out(&self, setup: ControlSetup, data: &[u8], timeout: Duration) -> TransferStatus;
}

/// [`UsbDevice`] backed by the host USB stack through `nusb`.
pub struct NusbDevice {
    device_info: DeviceInfo,
}

impl NusbDevice {
    pub fn new(device_info: DeviceInfo) -> Self {
        Self { device_info }
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }
}

struct NusbDeviceHandle {
    device: nusb::Device,
}

fn to_nusb_control_type(control_type: ControlType) -> nusb::transfer::ControlType {
    match control_type {
        ControlType::Standard => nusb::transfer::ControlType::Standard,
        ControlType::Class => nusb::transfer::ControlType::Class,
        ControlType::Vendor => nusb::transfer::ControlType::Vendor,
    }
}

fn to_nusb_recipient(recipient: Recipient) -> nusb::transfer::Recipient {
    match recipient {
        Recipient::Device => nusb::transfer::Recipient::Device,
        Recipient::Interface => nusb::transfer::Recipient::Interface,
        Recipient::Endpoint => nusb::transfer::Recipient::Endpoint,
        Recipient::Other => nusb::transfer::Recipient::Other,
    }
}

fn to_transfer_status(result: Result<(), TransferError>) -> TransferStatus {
    match result {
        Ok(()) => TransferStatus::Completed,
        Err(TransferError::Cancelled) => TransferStatus::Cancelled,
        Err(TransferError::Stall) => TransferStatus::Stalled,
        Err(TransferError::Disconnected) => TransferStatus::Disconnect,
        Err(_) => TransferStatus::TransferError,
    }
}

#[async_trait]
impl UsbDevice for NusbDevice {
    async fn open(&self) -> Result<Box<dyn DeviceHandle>, FetchError> {
        debug!("Opening device {:04X}:{:04X}", self.device_info.vendor_id(), self.device_info.product_id());
        let device = self.device_info.open()?;
        trace!("Device opened, handle is released on drop");
        Ok(Box::new(NusbDeviceHandle { device }))
    }
}

#[async_trait]
impl DeviceHandle for NusbDeviceHandle {
    async fn control_transfer_in(&self, setup: ControlSetup, length: u16, timeout: Duration) -> TransferResponse {
        let control_in = ControlIn {
            control_type: to_nusb_control_type(setup.control_type),
            recipient: to_nusb_recipient(setup.recipient),
            request: setup.request,
            value: setup.value,
            index: setup.index,
            length,
        };
        match tokio::time::timeout(timeout, self.device.control_in(control_in)).await {
            Ok(completion) => TransferResponse {
                status: to_transfer_status(completion.status),
                data: completion.data,
            },
            Err(_) => TransferResponse {
                status: TransferStatus::Timeout,
                data: Vec::new(),
            },
        }
    }

    async fn control_transfer_out(&self, setup: ControlSetup, data: &[u8], timeout: Duration) -> TransferStatus {
        let control_out = ControlOut {
            control_type: to_nusb_control_type(setup.control_type),
            recipient: to_nusb_recipient(setup.recipient),
            request: setup.request,
            value: setup.value,
            index: setup.index,
            data,
        };
        match tokio::time::timeout(timeout, self.device.control_out(control_out)).await {
            Ok(completion) => to_transfer_status(completion.status),
            Err(_) => TransferStatus::Timeout,
        }
    }
}
