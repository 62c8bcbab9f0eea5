pub mod capture;
pub mod command;
pub mod config;
pub mod constants;
pub mod device;
pub mod encoder;
pub mod error;
pub mod host;
pub mod metadata;
pub mod session;
pub mod simulated;
pub mod transport;
pub mod trigger;


// Re-export the main entry points for easy access
pub use capture::{CaptureCompletion, CaptureEngine, CaptureHandle, SampleBatch};
pub use config::{CaptureConfig, ChannelWidth, DeviceSettings, HardwareCapability};
pub use device::SumpDevice;
pub use error::SumpError;
pub use host::{CaptureSetup, SumpClient};
pub use metadata::DeviceMetadata;
pub use simulated::{SimulatedEngine, SimulatedHardware};
pub use transport::{SplitLink, Transport};
