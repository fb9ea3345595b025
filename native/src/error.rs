use crate::color::DeviceKey;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Pipe transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("Pipe write timed out after {0:?}")]
    WriteTimeout(Duration),
    #[error("Color map has no entry for {0:?}")]
    MissingKey(DeviceKey),
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),
    #[error("Device is not connected")]
    NotConnected,
    #[error("Failed to start pipe runtime: {0}")]
    Runtime(String),
}
