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

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use usb_inspector_core::ManualTransferInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

/// Accepts `1209`, `0x1209` and `0X1209`; IDs are always hexadecimal.
fn parse_hex_id(text: &str) -> Result<u16, String> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    u16::from_str_radix(digits, 16).map_err(|e| format!("Invalid ID '{}': {}", text, e))
}

#[derive(Parser)]
#[command(author, version, about = "Inspect USB descriptors of connected devices", long_about = None)]
pub struct Cli {
    /// Set the log level
    #[arg(short, long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    pub log_level: LogLevel,

    /// Timeout of a single control transfer in milliseconds
    #[arg(short, long, default_value_t = 2000, global = true)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct DeviceSelector {
    /// Vendor ID (hex)
    #[arg(long, value_parser = parse_hex_id)]
    pub vid: u16,

    /// Product ID (hex)
    #[arg(long, value_parser = parse_hex_id)]
    pub pid: u16,

    /// Serial number, picks one of several identical devices
    #[arg(long)]
    pub serial: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List connected devices
    List,

    /// Fetch and decode all descriptors of a device
    Dump {
        #[command(flatten)]
        device: DeviceSelector,

        /// Also send the Microsoft OS 2.0 alternate enumeration command when offered
        #[arg(long)]
        alt_enum: bool,
    },

    /// Issue a single control transfer
    Transfer {
        #[command(flatten)]
        device: DeviceSelector,

        /// in or out
        #[arg(long, default_value = "in")]
        direction: String,

        /// standard, class or vendor
        #[arg(long = "type", default_value = "standard")]
        control_type: String,

        /// device, interface, endpoint or other
        #[arg(long, default_value = "device")]
        recipient: String,

        /// bRequest, decimal or 0x hex
        #[arg(long)]
        request: String,

        /// wValue, decimal or 0x hex
        #[arg(long, default_value = "0")]
        value: String,

        /// wIndex, decimal or 0x hex
        #[arg(long, default_value = "0")]
        index: String,

        /// Number of bytes to read
        #[arg(long, default_value = "64")]
        length: String,

        /// Hex payload of an OUT transfer
        #[arg(long, default_value = "")]
        data: String,
    },
}

impl Commands {
    /// Manual transfer input of the `transfer` command.
    pub fn manual_transfer_input(&self) -> Option<ManualTransferInput> {
        match self {
            Commands::Transfer { direction, control_type, recipient, request, value, index, length, data, .. } =>
                Some(ManualTransferInput {
                    direction: direction.clone(),
                    control_type: control_type.clone(),
                    recipient: recipient.clone(),
                    request: request.clone(),
                    value: value.clone(),
                    index: index.clone(),
                    length: length.clone(),
                    data: data.clone(),
                }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_ids() {
        assert_eq!(parse_hex_id("1209"), Ok(0x1209));
        assert_eq!(parse_hex_id("0x2E8a"), Ok(0x2E8A));
        assert!(parse_hex_id("12345").is_err());
    }

    #[test]
    fn test_transfer_arguments() {
        let cli = Cli::parse_from([
            "usb_inspector", "--timeout-ms", "500", "transfer", "--vid", "1209", "--pid", "0001",
            "--request", "6", "--value", "0x0100", "--length", "18",
        ]);
        assert_eq!(cli.timeout_ms, 500);
        let input = cli.command.manual_transfer_input().unwrap();
        assert_eq!(input.direction, "in");
        assert_eq!(input.value, "0x0100");
        assert_eq!(input.recipient, "device");
    }
}
