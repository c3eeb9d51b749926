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

//! Arbitrary control transfers entered by the user.

use std::fmt;
use log::info;
use crate::usb::errors::ManualTransferError;
use crate::usb::fetcher::DescriptorFetcher;
use crate::usb::fields::format_hex_bytes;
use crate::usb::transport::{ControlSetup, ControlType, Recipient, TransferStatus, UsbDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Unvalidated user input of a manual transfer.
#[derive(Debug, Clone, Default)]
pub struct ManualTransferInput {
    pub direction: String,
    pub control_type: String,
    pub recipient: String,
    pub request: String,
    pub value: String,
    pub index: String,
    /// Number of bytes to read, ignored for OUT transfers.
    pub length: String,
    /// Hex payload of OUT transfers, e.g. `"01ff"` or `"01 FF"`.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualTransfer {
    pub direction: Direction,
    pub setup: ControlSetup,
    pub length: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualTransferOutcome {
    Read { status: TransferStatus, data: Vec<u8> },
    Written { status: TransferStatus },
}

impl fmt::Display for ManualTransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualTransferOutcome::Read { status, data } if data.is_empty() => write!(f, "{}", status),
            ManualTransferOutcome::Read { status, data } => write!(f, "{}: {}", status, format_hex_bytes(data)),
            ManualTransferOutcome::Written { status } => write!(f, "{}", status),
        }
    }
}

fn parse_direction(text: &str) -> Result<Direction, ManualTransferError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "in" => Ok(Direction::In),
        "out" => Ok(Direction::Out),
        other => Err(format!("unknown direction '{}', expected in or out", other).into()),
    }
}

fn parse_control_type(text: &str) -> Result<ControlType, ManualTransferError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "standard" => Ok(ControlType::Standard),
        "class" => Ok(ControlType::Class),
        "vendor" => Ok(ControlType::Vendor),
        other => Err(format!("unknown request type '{}', expected standard, class or vendor", other).into()),
    }
}

fn parse_recipient(text: &str) -> Result<Recipient, ManualTransferError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "device" => Ok(Recipient::Device),
        "interface" => Ok(Recipient::Interface),
        "endpoint" => Ok(Recipient::Endpoint),
        "other" => Ok(Recipient::Other),
        other => Err(format!("unknown recipient '{}', expected device, interface, endpoint or other", other).into()),
    }
}

/// Decimal or `0x` prefixed hexadecimal number not greater than `max`.
fn parse_number(name: &str, text: &str, max: u32) -> Result<u32, ManualTransferError> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    };
    match parsed {
        Ok(number) if number <= max => Ok(number),
        Ok(number) => Err(format!("{} {} is out of range 0..={}", name, number, max).into()),
        Err(_) => Err(format!("{} '{}' is not a number", name, text).into()),
    }
}

fn parse_hex_payload(text: &str) -> Result<Vec<u8>, ManualTransferError> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("payload '{}' has an odd number of hex digits", digits).into());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| ManualTransferError::InvalidUserInput(format!("'{}' is not a hex payload", digits)))
        })
        .collect()
}

impl ManualTransfer {
    /// Validates user input. Nothing is sent to the device when this fails.
    pub fn parse(input: &ManualTransferInput) -> Result<Self, ManualTransferError> {
        let direction = parse_direction(&input.direction)?;
        let setup = ControlSetup {
            control_type: parse_control_type(&input.control_type)?,
            recipient: parse_recipient(&input.recipient)?,
            request: parse_number("request", &input.request, u8::MAX as u32)? as u8,
            value: parse_number("value", &input.value, u16::MAX as u32)? as u16,
            index: parse_number("index", &input.index, u16::MAX as u32)? as u16,
        };
        let (length, data) = match direction {
            Direction::In => (parse_number("length", &input.length, u16::MAX as u32)? as u16, Vec::new()),
            Direction::Out => {
                let data = parse_hex_payload(&input.data)?;
                if data.len() > u16::MAX as usize {
                    return Err(format!("payload of {} bytes is too long", data.len()).into());
                }
                (data.len() as u16, data)
            }
        };
        Ok(Self { direction, setup, length, data })
    }

    pub async fn execute<D: UsbDevice>(&self, fetcher: &DescriptorFetcher<D>)
        -> Result<ManualTransferOutcome, ManualTransferError>
    {
        info!("Manual {:?} transfer {:?}", self.direction, self.setup);
        let outcome = match self.direction {
            Direction::In => {
                let response = fetcher.transfer_in(self.setup, self.length).await?;
                ManualTransferOutcome::Read { status: response.status, data: response.data }
            }
            Direction::Out => {
                let status = fetcher.transfer_out(self.setup, &self.data).await?;
                ManualTransferOutcome::Written { status }
            }
        };
        Ok(outcome)
    }
}
