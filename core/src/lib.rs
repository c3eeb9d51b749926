pub mod usb;

pub use usb::descriptor_tree::{DecodeContext, DecodeResult, DescriptorField, DescriptorKind, DescriptorNode, NodeCapability};
pub use usb::errors::{DecodeError, FetchError, ManualTransferError};
pub use usb::fetcher::{CapabilityOutcome, DescriptorFetcher, FetchConfig, LandingPage};
pub use usb::manual_transfer::{ManualTransfer, ManualTransferInput, ManualTransferOutcome};
pub use usb::ms_os_20::decode_ms_os_20_set;
pub use usb::standard_decoder::{decode_language_codes, decode_standard_descriptors};
pub use usb::transport::{NusbDevice, UsbDevice};

pub use nusb::DeviceInfo;
