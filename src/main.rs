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

mod cli;
mod printer;

use std::time::Duration;
use anyhow::{anyhow, Context};
use clap::Parser;
use log::{error, info, warn};
use usb_inspector_core::usb::find_device;
use usb_inspector_core::{
    CapabilityOutcome, DecodeResult, DescriptorFetcher, DescriptorKind, FetchConfig, ManualTransfer,
    NodeCapability, NusbDevice,
};
use crate::cli::{Cli, Commands, DeviceSelector};
use crate::printer::TreeDisplay;

fn print_result(title: &str, result: &DecodeResult) {
    print!("{}", TreeDisplay { title, result });
}

fn list_devices() -> anyhow::Result<()> {
    for device in nusb::list_devices().context("Failed to list USB devices")? {
        println!(
            "Bus {:03} Device {:03}: ID {:04x}:{:04x} {}",
            device.bus_number(),
            device.device_address(),
            device.vendor_id(),
            device.product_id(),
            device.product_string().unwrap_or("")
        );
    }
    Ok(())
}

fn open_fetcher(selector: &DeviceSelector, config: FetchConfig) -> anyhow::Result<DescriptorFetcher<NusbDevice>> {
    let device_info = find_device(selector.vid, selector.pid, selector.serial.as_deref())
        .context("Failed to list USB devices")?
        .ok_or_else(|| anyhow!("Device {:04x}:{:04x} not found", selector.vid, selector.pid))?;
    let fetcher = DescriptorFetcher::new(NusbDevice::new(device_info), config);
    let device_info = fetcher.device().device_info();
    info!("Using device on bus {} address {}", device_info.bus_number(), device_info.device_address());
    Ok(fetcher)
}

async fn dump(fetcher: &DescriptorFetcher<NusbDevice>, alt_enum: bool) -> anyhow::Result<()> {
    let device = fetcher.get_device_descriptor().await.context("Failed to read device descriptor")?;
    print_result("Device descriptor", &device);

    let configurations = device
        .nodes()
        .find(|node| node.kind == DescriptorKind::Device)
        .and_then(|node| node.field_value("Number of Configurations"))
        .unwrap_or(1);
    let mut results = vec![device];

    for index in 0..configurations.min(u8::MAX as u32) as u8 {
        match fetcher.get_configuration_descriptor(index).await {
            Ok(configuration) => {
                print_result(&format!("Configuration descriptor {}", index), &configuration);
                results.push(configuration);
            }
            Err(e) => error!("Failed to read configuration descriptor {}: {}", index, e),
        }
    }

    // Devices below USB 2.1 usually stall this request.
    match fetcher.get_bos_descriptor().await {
        Ok(bos) => {
            print_result("BOS descriptor", &bos);
            results.push(bos);
        }
        Err(e) => info!("No BOS descriptor: {}", e),
    }

    let mut capabilities: Vec<NodeCapability> = Vec::new();
    for capability in results.iter().flat_map(|result| result.capabilities()) {
        if !capabilities.contains(&capability) {
            capabilities.push(capability);
        }
    }

    for capability in capabilities {
        if matches!(capability, NodeCapability::SendMsOs20AltEnumCommand { .. }) && !alt_enum {
            println!("Available: {} (use --alt-enum)", capability.name());
            continue;
        }
        match fetcher.invoke(&capability).await {
            Ok(CapabilityOutcome::Decoded(decoded)) => {
                for result in &decoded {
                    print_result(&capability.name(), result);
                }
            }
            Ok(CapabilityOutcome::LandingPage(landing_page)) => {
                println!("WebUSB landing page: {}", landing_page.url);
                for warning in &landing_page.warnings {
                    println!("  ! {}", warning);
                }
            }
            Ok(CapabilityOutcome::CommandSent) => println!("{}: sent", capability.name()),
            Err(e) => warn!("{} failed: {}", capability.name(), e),
        }
    }
    Ok(())
}

async fn transfer(selector: &DeviceSelector, command: &Commands, config: FetchConfig) -> anyhow::Result<()> {
    let input = command
        .manual_transfer_input()
        .ok_or_else(|| anyhow!("Not a transfer command"))?;
    let transfer = ManualTransfer::parse(&input)?;
    let fetcher = open_fetcher(selector, config)?;
    let outcome = transfer.execute(&fetcher).await.context("Transfer failed")?;
    println!("{}", outcome);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level.to_level_filter())
        .init();

    let config = FetchConfig {
        timeout: Duration::from_millis(cli.timeout_ms),
        ..FetchConfig::default()
    };

    match &cli.command {
        Commands::List => list_devices(),
        Commands::Dump { device, alt_enum } => {
            let fetcher = open_fetcher(device, config)?;
            dump(&fetcher, *alt_enum).await
        }
        Commands::Transfer { device, .. } => transfer(device, &cli.command, config).await,
    }
}
