// Streams the peripheral logo color from a lighting host to a consumer process over a named pipe.

pub mod color;
pub mod config;
pub mod device;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod status;

pub use color::{Color, DeviceKey, KeyColors};
pub use config::{ConfigError, DeviceSettings, SettingsHandle};
pub use device::{ConnectionState, Device, EvgaDevice, DEVICE_NAME};
pub use error::DeviceError;
pub use logging::{ErrorSink, LogErrorSink};
