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

use std::time::Duration;
use log::{debug, info, warn};
use crate::usb::descriptor_tree::{DecodeContext, DecodeResult, NodeCapability};
use crate::usb::descriptors::{
    DescriptorType, BOS_DESCRIPTOR_LENGTH, CONFIGURATION_DESCRIPTOR_LENGTH, DEVICE_DESCRIPTOR_LENGTH,
    MAX_STRING_DESCRIPTOR_LENGTH, TOTAL_LENGTH_OFFSET,
};
use crate::usb::errors::{DecodeError, FetchError};
use crate::usb::ms_os_20::decode_ms_os_20_set;
use crate::usb::requests::{
    descriptor_value, StandardRequestCode, UrlScheme, VendorRequestIndex, WEBUSB_URL_DESCRIPTOR_TYPE,
};
use crate::usb::standard_decoder::{decode_language_codes, decode_standard_descriptors, language_codes};
use crate::usb::transport::{
    ControlSetup, ControlType, DeviceHandle, Recipient, TransferResponse, TransferStatus, UsbDevice,
};

pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_millis(2000);

const URL_DESCRIPTOR_HEADER_LENGTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Timeout of a single control transfer.
    pub timeout: Duration,
    /// Number of bytes requested for string and URL descriptors.
    pub max_string_length: u16,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TRANSFER_TIMEOUT,
            max_string_length: MAX_STRING_DESCRIPTOR_LENGTH,
        }
    }
}

/// WebUSB landing page URL together with transfer warnings raised while fetching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingPage {
    pub url: String,
    pub warnings: Vec<DecodeError>,
}

/// Result of running a [`NodeCapability`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityOutcome {
    Decoded(Vec<DecodeResult>),
    LandingPage(LandingPage),
    CommandSent,
}

/// Fetches descriptors from a device and decodes them.
///
/// Every operation opens the device, issues its control transfers one after another and
/// releases the device again, also when a transfer fails.
pub struct DescriptorFetcher<D: UsbDevice> {
    device: D,
    config: FetchConfig,
}

fn standard_setup(descriptor_type: DescriptorType, index: u8, language: u16) -> ControlSetup {
    ControlSetup {
        control_type: ControlType::Standard,
        recipient: Recipient::Device,
        request: StandardRequestCode::GetDescriptor as u8,
        value: descriptor_value(descriptor_type.into(), index),
        index: language,
    }
}

fn vendor_setup(vendor_code: u8, value: u16, index: VendorRequestIndex) -> ControlSetup {
    ControlSetup {
        control_type: ControlType::Vendor,
        recipient: Recipient::Device,
        request: vendor_code,
        value,
        index: index as u16,
    }
}

fn with_transfer_warnings(mut result: DecodeResult, warnings: Vec<DecodeError>) -> DecodeResult {
    result.errors.splice(0..0, warnings);
    result
}

fn transfer_error(status: TransferStatus) -> FetchError {
    match status {
        TransferStatus::Timeout => FetchError::Timeout,
        status => FetchError::Transfer { status, reason: status.reason() },
    }
}

/// Reads `wTotalLength` from the header of a configuration or BOS descriptor.
fn probe_total_length(name: &'static str, expected_type: DescriptorType, header: &[u8], header_length: usize)
    -> Result<u16, FetchError>
{
    if header.len() < TOTAL_LENGTH_OFFSET + 2 {
        return Err(FetchError::ResponseTooShort { name, expected: header_length, actual: header.len() });
    }
    let expected: u8 = expected_type.into();
    if header[1] != expected {
        return Err(FetchError::WrongType { name, expected, actual: header[1] });
    }
    let total_length = u16::from_le_bytes([header[TOTAL_LENGTH_OFFSET], header[TOTAL_LENGTH_OFFSET + 1]]);
    if (total_length as usize) < header_length {
        return Err(FetchError::InvalidTotalLength { name, declared: total_length, minimum: header_length });
    }
    Ok(total_length)
}

fn parse_url_descriptor(data: &[u8]) -> Result<String, FetchError> {
    const NAME: &str = "WebUSB URL descriptor";
    if data.len() < URL_DESCRIPTOR_HEADER_LENGTH {
        return Err(FetchError::ResponseTooShort {
            name: NAME,
            expected: URL_DESCRIPTOR_HEADER_LENGTH,
            actual: data.len(),
        });
    }
    if data[1] != WEBUSB_URL_DESCRIPTOR_TYPE {
        return Err(FetchError::WrongType { name: NAME, expected: WEBUSB_URL_DESCRIPTOR_TYPE, actual: data[1] });
    }
    let end = (data[0] as usize).clamp(URL_DESCRIPTOR_HEADER_LENGTH, data.len());
    let prefix = match UrlScheme::from_code(data[2]) {
        Some(scheme) => scheme.prefix(),
        None => {
            warn!("Unknown URL scheme {}, showing URL without prefix", data[2]);
            ""
        }
    };
    let url = String::from_utf8_lossy(&data[URL_DESCRIPTOR_HEADER_LENGTH..end]);
    Ok(format!("{}{}", prefix, url))
}

impl<D: UsbDevice> DescriptorFetcher<D> {
    pub fn new(device: D, config: FetchConfig) -> Self {
        Self { device, config }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Control IN transfer whose data is only usable on success. Short and overlong responses
    /// are kept and noted in `warnings`.
    async fn read(&self, handle: &dyn DeviceHandle, setup: ControlSetup, length: u16, warnings: &mut Vec<DecodeError>)
        -> Result<Vec<u8>, FetchError>
    {
        debug!("Control IN {:?}, {} bytes", setup, length);
        let response = handle.control_transfer_in(setup, length, self.config.timeout).await;
        match response.status {
            TransferStatus::Completed => Ok(response.data),
            status @ (TransferStatus::ShortPacket | TransferStatus::Babble) => {
                warn!("Transfer finished with status {}: {}", status, status.reason());
                warnings.push(DecodeError::TransferFailed { status, reason: status.reason() });
                Ok(response.data)
            }
            status => Err(transfer_error(status)),
        }
    }

    /// Reads a descriptor with a `wTotalLength` field: the header first, then the whole descriptor.
    async fn read_with_total_length(
        &self,
        handle: &dyn DeviceHandle,
        name: &'static str,
        setup: ControlSetup,
        descriptor_type: DescriptorType,
        header_length: usize,
        warnings: &mut Vec<DecodeError>,
    ) -> Result<Vec<u8>, FetchError> {
        let header = self.read(handle, setup, header_length as u16, warnings).await?;
        let total_length = probe_total_length(name, descriptor_type, &header, header_length)?;
        debug!("{} declares {} bytes", name, total_length);
        self.read(handle, setup, total_length, warnings).await
    }

    pub async fn get_device_descriptor(&self) -> Result<DecodeResult, FetchError> {
        let handle = self.device.open().await?;
        let mut warnings = Vec::new();
        let setup = standard_setup(DescriptorType::Device, 0, 0);
        let data = self.read(handle.as_ref(), setup, DEVICE_DESCRIPTOR_LENGTH as u16, &mut warnings).await?;
        let result = decode_standard_descriptors(&data, &DecodeContext::default());
        Ok(with_transfer_warnings(result, warnings))
    }

    /// Fetches the configuration descriptor with all of its interface, endpoint and
    /// class-specific descriptors.
    pub async fn get_configuration_descriptor(&self, index: u8) -> Result<DecodeResult, FetchError> {
        let handle = self.device.open().await?;
        let mut warnings = Vec::new();
        let data = self.read_with_total_length(
            handle.as_ref(),
            "Configuration Descriptor",
            standard_setup(DescriptorType::Configuration, index, 0),
            DescriptorType::Configuration,
            CONFIGURATION_DESCRIPTOR_LENGTH,
            &mut warnings,
        ).await?;
        let result = decode_standard_descriptors(&data, &DecodeContext::default());
        Ok(with_transfer_warnings(result, warnings))
    }

    /// Fetches string descriptor `index` in `language`, or in every language the device
    /// supports when no language is given. Index 0 returns the language table itself.
    pub async fn get_string_descriptors(&self, index: u8, language: Option<u16>)
        -> Result<Vec<DecodeResult>, FetchError>
    {
        let handle = self.device.open().await?;
        let mut warnings = Vec::new();
        let length = self.config.max_string_length;
        let language_table_setup = standard_setup(DescriptorType::String, 0, 0);

        if index == 0 {
            let data = self.read(handle.as_ref(), language_table_setup, length, &mut warnings).await?;
            return Ok(vec![with_transfer_warnings(decode_language_codes(&data), warnings)]);
        }

        let languages = match language {
            Some(language) => vec![language],
            None => {
                let data = self.read(handle.as_ref(), language_table_setup, length, &mut warnings).await?;
                let languages = language_codes(&decode_language_codes(&data));
                if languages.is_empty() {
                    return Err(FetchError::NoLanguages);
                }
                languages
            }
        };

        let mut results = Vec::with_capacity(languages.len());
        for language in languages {
            let setup = standard_setup(DescriptorType::String, index, language);
            let mut string_warnings = std::mem::take(&mut warnings);
            let data = self.read(handle.as_ref(), setup, length, &mut string_warnings).await?;
            let context = DecodeContext { language_code: Some(language) };
            results.push(with_transfer_warnings(decode_standard_descriptors(&data, &context), string_warnings));
        }
        Ok(results)
    }

    pub async fn get_bos_descriptor(&self) -> Result<DecodeResult, FetchError> {
        let handle = self.device.open().await?;
        let mut warnings = Vec::new();
        let data = self.read_with_total_length(
            handle.as_ref(),
            "BOS Descriptor",
            standard_setup(DescriptorType::Bos, 0, 0),
            DescriptorType::Bos,
            BOS_DESCRIPTOR_LENGTH,
            &mut warnings,
        ).await?;
        let result = decode_standard_descriptors(&data, &DecodeContext::default());
        Ok(with_transfer_warnings(result, warnings))
    }

    /// Issues the WebUSB `GET_URL` request and returns the landing page URL.
    pub async fn get_webusb_landing_page(&self, vendor_code: u8, url_index: u8) -> Result<LandingPage, FetchError> {
        let handle = self.device.open().await?;
        let mut warnings = Vec::new();
        let setup = vendor_setup(vendor_code, url_index as u16, VendorRequestIndex::WebUsbGetUrl);
        let data = self.read(handle.as_ref(), setup, self.config.max_string_length, &mut warnings).await?;
        let url = parse_url_descriptor(&data)?;
        Ok(LandingPage { url, warnings })
    }

    pub async fn get_ms_os_20_descriptor_set(&self, vendor_code: u8, total_length: u16)
        -> Result<DecodeResult, FetchError>
    {
        let handle = self.device.open().await?;
        let mut warnings = Vec::new();
        let setup = vendor_setup(vendor_code, 0, VendorRequestIndex::MsOs20DescriptorSet);
        let data = self.read(handle.as_ref(), setup, total_length, &mut warnings).await?;
        Ok(with_transfer_warnings(decode_ms_os_20_set(&data), warnings))
    }

    /// Asks the device to switch to its alternate enumeration. The device is expected to
    /// re-enumerate afterwards.
    pub async fn send_ms_os_20_alt_enum_command(&self, vendor_code: u8, alt_enum_code: u8) -> Result<(), FetchError> {
        let handle = self.device.open().await?;
        let setup = vendor_setup(vendor_code, (alt_enum_code as u16) << 8, VendorRequestIndex::MsOs20SetAltEnumeration);
        match handle.control_transfer_out(setup, &[], self.config.timeout).await {
            TransferStatus::Completed => Ok(()),
            status => Err(transfer_error(status)),
        }
    }

    /// Control IN transfer as issued, whatever its completion status.
    pub async fn transfer_in(&self, setup: ControlSetup, length: u16) -> Result<TransferResponse, FetchError> {
        let handle = self.device.open().await?;
        Ok(handle.control_transfer_in(setup, length, self.config.timeout).await)
    }

    /// Control OUT transfer as issued, whatever its completion status.
    pub async fn transfer_out(&self, setup: ControlSetup, data: &[u8]) -> Result<TransferStatus, FetchError> {
        let handle = self.device.open().await?;
        Ok(handle.control_transfer_out(setup, data, self.config.timeout).await)
    }

    pub async fn invoke(&self, capability: &NodeCapability) -> Result<CapabilityOutcome, FetchError> {
        info!("{}", capability.name());
        let outcome = match *capability {
            NodeCapability::GetStringDescriptor { index } =>
                CapabilityOutcome::Decoded(self.get_string_descriptors(index, None).await?),
            NodeCapability::GetWebUsbLandingPage { vendor_code, url_index } =>
                CapabilityOutcome::LandingPage(self.get_webusb_landing_page(vendor_code, url_index).await?),
            NodeCapability::GetMsOs20DescriptorSet { vendor_code, total_length } =>
                CapabilityOutcome::Decoded(vec![self.get_ms_os_20_descriptor_set(vendor_code, total_length).await?]),
            NodeCapability::SendMsOs20AltEnumCommand { vendor_code, alt_enum_code } => {
                self.send_ms_os_20_alt_enum_command(vendor_code, alt_enum_code).await?;
                CapabilityOutcome::CommandSent
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use async_trait::async_trait;
    use crate::usb::descriptor_tree::DescriptorKind;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Open,
        In(ControlSetup, u16),
        Out(ControlSetup, Vec<u8>),
        Close,
    }

    #[derive(Default)]
    struct MockState {
        calls: Vec<Call>,
        responses: VecDeque<TransferResponse>,
    }

    #[derive(Default)]
    pub(crate) struct MockDevice {
        state: Arc<Mutex<MockState>>,
        fail_open: bool,
    }

    impl MockDevice {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn failing_open() -> Self {
            Self { fail_open: true, ..Self::default() }
        }

        /// Queues a response. IN data is cut to the requested length like a device would.
        pub(crate) fn respond(&self, status: TransferStatus, data: &[u8]) {
            self.state.lock().unwrap().responses.push_back(TransferResponse { status, data: data.to_vec() });
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }
    }

    struct MockHandle {
        state: Arc<Mutex<MockState>>,
    }

    impl Drop for MockHandle {
        fn drop(&mut self) {
            self.state.lock().unwrap().calls.push(Call::Close);
        }
    }

    #[async_trait]
    impl UsbDevice for MockDevice {
        async fn open(&self) -> Result<Box<dyn DeviceHandle>, FetchError> {
            if self.fail_open {
                return Err(FetchError::Open(std::io::Error::from(std::io::ErrorKind::PermissionDenied)));
            }
            self.state.lock().unwrap().calls.push(Call::Open);
            Ok(Box::new(MockHandle { state: self.state.clone() }))
        }
    }

    #[async_trait]
    impl DeviceHandle for MockHandle {
        async fn control_transfer_in(&self, setup: ControlSetup, length: u16, _timeout: Duration) -> TransferResponse {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::In(setup, length));
            let mut response = state.responses.pop_front().unwrap_or(TransferResponse {
                status: TransferStatus::Stalled,
                data: Vec::new(),
            });
            response.data.truncate(length as usize);
            response
        }

        async fn control_transfer_out(&self, setup: ControlSetup, data: &[u8], _timeout: Duration) -> TransferStatus {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Out(setup, data.to_vec()));
            state.responses.pop_front().map_or(TransferStatus::Stalled, |response| response.status)
        }
    }

    pub(crate) const DEVICE_DESCRIPTOR: [u8; 18] = [
        0x12, 0x01, 0x10, 0x02, 0xEF, 0x02, 0x01, 0x40,
        0x09, 0x12, 0x01, 0x00, 0x00, 0x01, 0x01, 0x02, 0x03, 0x01,
    ];

    const CONFIGURATION: [u8; 25] = [
        0x09, 0x02, 0x19, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32,
        0x09, 0x04, 0x00, 0x00, 0x01, 0xFF, 0x00, 0x00, 0x00,
        0x07, 0x05, 0x81, 0x02, 0x40, 0x00, 0x00,
    ];

    fn get_descriptor(value: u16, index: u16) -> ControlSetup {
        ControlSetup {
            control_type: ControlType::Standard,
            recipient: Recipient::Device,
            request: 0x06,
            value,
            index,
        }
    }

    fn fetcher(device: MockDevice) -> DescriptorFetcher<MockDevice> {
        DescriptorFetcher::new(device, FetchConfig::default())
    }

    #[tokio::test]
    async fn device_descriptor_request() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Completed, &DEVICE_DESCRIPTOR);
        let fetcher = fetcher(device);

        let result = fetcher.get_device_descriptor().await.unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(result.tree[0].kind, DescriptorKind::Device);
        assert_eq!(result.tree[0].field_value("Vendor ID"), Some(0x1209));
        assert_eq!(fetcher.device().calls(), vec![
            Call::Open,
            Call::In(get_descriptor(0x0100, 0), 18),
            Call::Close,
        ]);
    }

    #[tokio::test]
    async fn configuration_is_fetched_in_two_phases() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Completed, &CONFIGURATION);
        device.respond(TransferStatus::Completed, &CONFIGURATION);
        let fetcher = fetcher(device);

        let result = fetcher.get_configuration_descriptor(0).await.unwrap();
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.raw_buffer.len(), 25);
        assert_eq!(result.tree[0].children[0].children[0].kind, DescriptorKind::Endpoint);
        assert_eq!(fetcher.device().calls(), vec![
            Call::Open,
            Call::In(get_descriptor(0x0200, 0), 9),
            Call::In(get_descriptor(0x0200, 0), 25),
            Call::Close,
        ]);
    }

    #[tokio::test]
    async fn bos_probe_with_wrong_type_is_rejected() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Completed, &[0x05, 0x02, 0x05, 0x00, 0x00]);
        let fetcher = fetcher(device);

        let error = fetcher.get_bos_descriptor().await.unwrap_err();
        assert!(matches!(error, FetchError::WrongType { expected: 0x0F, actual: 0x02, .. }));
        assert_eq!(fetcher.device().calls(), vec![
            Call::Open,
            Call::In(get_descriptor(0x0F00, 0), 5),
            Call::Close,
        ]);
    }

    #[tokio::test]
    async fn total_length_below_header_length_is_rejected() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Completed, &[0x09, 0x02, 0x00, 0x00, 0x01, 0x01, 0x00, 0x80, 0x32]);
        let fetcher = fetcher(device);

        let error = fetcher.get_configuration_descriptor(0).await.unwrap_err();
        assert!(matches!(
            error,
            FetchError::InvalidTotalLength { name: "Configuration Descriptor", declared: 0, minimum: 9 }
        ));
        assert_eq!(fetcher.device().calls(), vec![
            Call::Open,
            Call::In(get_descriptor(0x0200, 0), 9),
            Call::Close,
        ]);
    }

    #[tokio::test]
    async fn short_bos_total_length_is_rejected() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Completed, &[0x05, 0x0F, 0x04, 0x00, 0x00]);
        let fetcher = fetcher(device);

        assert!(matches!(
            fetcher.get_bos_descriptor().await,
            Err(FetchError::InvalidTotalLength { declared: 4, minimum: 5, .. })
        ));
        assert_eq!(fetcher.device().calls().len(), 3);
    }

    #[tokio::test]
    async fn handle_is_released_when_transfer_fails() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Stalled, &[]);
        let fetcher = fetcher(device);

        let error = fetcher.get_configuration_descriptor(1).await.unwrap_err();
        assert!(matches!(error, FetchError::Transfer { status: TransferStatus::Stalled, .. }));
        assert_eq!(fetcher.device().calls().last(), Some(&Call::Close));
        assert_eq!(fetcher.device().calls().len(), 3);
    }

    #[tokio::test]
    async fn timeout_is_an_error() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Timeout, &[]);
        let fetcher = fetcher(device);

        assert!(matches!(fetcher.get_device_descriptor().await, Err(FetchError::Timeout)));
        assert_eq!(fetcher.device().calls().last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn open_failure_is_reported() {
        let fetcher = fetcher(MockDevice::failing_open());
        assert!(matches!(fetcher.get_device_descriptor().await, Err(FetchError::Open(_))));
        assert!(fetcher.device().calls().is_empty());
    }

    #[tokio::test]
    async fn short_packet_is_a_warning() {
        let device = MockDevice::new();
        device.respond(TransferStatus::ShortPacket, &DEVICE_DESCRIPTOR[..10]);
        let fetcher = fetcher(device);

        let result = fetcher.get_device_descriptor().await.unwrap();
        assert_eq!(result.errors[0], DecodeError::TransferFailed {
            status: TransferStatus::ShortPacket,
            reason: "descriptor is too short",
        });
        assert!(matches!(result.errors[1], DecodeError::OutOfBounds { offset: 10, .. }));
        assert_eq!(result.tree[0].fields.len(), 8);
    }

    #[tokio::test]
    async fn strings_are_fetched_for_every_language() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Completed, &[0x06, 0x03, 0x09, 0x04, 0x15, 0x04]);
        device.respond(TransferStatus::Completed, &[0x06, 0x03, b'H', 0x00, b'i', 0x00]);
        device.respond(TransferStatus::Completed, &[0x06, 0x03, b'O', 0x00, b'k', 0x00]);
        let fetcher = fetcher(device);

        let results = fetcher.get_string_descriptors(2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tree[0].kind, DescriptorKind::StringLang(0x0409));
        assert_eq!(results[0].tree[0].field("String").unwrap().formatted_value, "Hi");
        assert_eq!(results[1].tree[0].kind, DescriptorKind::StringLang(0x0415));
        assert_eq!(results[1].tree[0].field("String").unwrap().formatted_value, "Ok");
        assert_eq!(fetcher.device().calls(), vec![
            Call::Open,
            Call::In(get_descriptor(0x0300, 0), 255),
            Call::In(get_descriptor(0x0302, 0x0409), 255),
            Call::In(get_descriptor(0x0302, 0x0415), 255),
            Call::Close,
        ]);
    }

    #[tokio::test]
    async fn string_index_zero_is_the_language_table() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Completed, &[0x04, 0x03, 0x09, 0x04]);
        let fetcher = fetcher(device);

        let results = fetcher.get_string_descriptors(0, None).await.unwrap();
        assert_eq!(language_codes(&results[0]), vec![0x0409]);
        assert_eq!(fetcher.device().calls().len(), 3);
    }

    #[tokio::test]
    async fn empty_language_table() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Completed, &[0x02, 0x03]);
        let fetcher = fetcher(device);

        assert!(matches!(fetcher.get_string_descriptors(1, None).await, Err(FetchError::NoLanguages)));
        assert_eq!(fetcher.device().calls().last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn webusb_landing_page() {
        let device = MockDevice::new();
        let mut descriptor = vec![0x0E, 0x03, 0x01];
        descriptor.extend_from_slice(b"example.com");
        device.respond(TransferStatus::Completed, &descriptor);
        let fetcher = fetcher(device);

        let landing_page = fetcher.get_webusb_landing_page(0x01, 0x01).await.unwrap();
        assert_eq!(landing_page.url, "https://example.com");
        assert!(landing_page.warnings.is_empty());
        let expected_setup = ControlSetup {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request: 0x01,
            value: 0x0001,
            index: 0x0002,
        };
        assert_eq!(fetcher.device().calls()[1], Call::In(expected_setup, 255));
    }

    #[tokio::test]
    async fn truncated_landing_page_keeps_the_warning() {
        let device = MockDevice::new();
        let mut descriptor = vec![0x0E, 0x03, 0x01];
        descriptor.extend_from_slice(b"exam");
        device.respond(TransferStatus::ShortPacket, &descriptor);
        let fetcher = fetcher(device);

        let outcome = fetcher
            .invoke(&NodeCapability::GetWebUsbLandingPage { vendor_code: 0x01, url_index: 0x01 })
            .await
            .unwrap();
        assert_eq!(outcome, CapabilityOutcome::LandingPage(LandingPage {
            url: "https://exam".to_string(),
            warnings: vec![DecodeError::TransferFailed {
                status: TransferStatus::ShortPacket,
                reason: "descriptor is too short",
            }],
        }));
    }

    #[test]
    fn url_schemes() {
        assert_eq!(parse_url_descriptor(&[0x06, 0x03, 0x00, b'a', b'.', b'b']).unwrap(), "http://a.b");
        assert_eq!(parse_url_descriptor(&[0x06, 0x03, 0xFF, b'a', b':', b'b']).unwrap(), "a:b");
        assert!(matches!(parse_url_descriptor(&[0x02, 0x03]), Err(FetchError::ResponseTooShort { .. })));
    }

    #[tokio::test]
    async fn ms_os_20_capabilities() {
        let device = MockDevice::new();
        device.respond(TransferStatus::Completed, &[0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x06, 0x0A, 0x00]);
        device.respond(TransferStatus::Completed, &[]);
        let fetcher = fetcher(device);

        let outcome = fetcher
            .invoke(&NodeCapability::GetMsOs20DescriptorSet { vendor_code: 0x21, total_length: 10 })
            .await
            .unwrap();
        let CapabilityOutcome::Decoded(results) = outcome else {
            panic!("unexpected outcome {:?}", outcome);
        };
        assert_eq!(results[0].tree[0].kind, DescriptorKind::MsOs20SetHeader);
        assert!(results[0].errors.is_empty());

        let outcome = fetcher
            .invoke(&NodeCapability::SendMsOs20AltEnumCommand { vendor_code: 0x21, alt_enum_code: 0x01 })
            .await
            .unwrap();
        assert_eq!(outcome, CapabilityOutcome::CommandSent);

        let vendor = |value, index| ControlSetup {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request: 0x21,
            value,
            index,
        };
        assert_eq!(fetcher.device().calls(), vec![
            Call::Open,
            Call::In(vendor(0x0000, 0x0007), 10),
            Call::Close,
            Call::Open,
            Call::Out(vendor(0x0100, 0x0008), Vec::new()),
            Call::Close,
        ]);
    }
}
