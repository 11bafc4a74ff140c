// src/error.rs - Device error codes, classification and crate error types
use std::fmt;
use thiserror::Error;

/// Raw status code returned by the motion controller driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const NONE: ErrorCode = ErrorCode(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn kind(self) -> ErrorKind {
        classify(self.0)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which driver subsystem a code belongs to, by numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DriverCore,
    LogSubsystem,
    Undefined,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::DriverCore => "WMX3Api",
            ErrorKind::LogSubsystem => "Log",
            ErrorKind::Undefined => "Undefined",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub const DRIVER_CORE_CODES: std::ops::RangeInclusive<u32> = 0x00000..=0x10000;
pub const LOG_SUBSYSTEM_CODES: std::ops::RangeInclusive<u32> = 0x11000..=0x11FFF;

pub fn classify(code: u32) -> ErrorKind {
    if DRIVER_CORE_CODES.contains(&code) {
        ErrorKind::DriverCore
    } else if LOG_SUBSYSTEM_CODES.contains(&code) {
        ErrorKind::LogSubsystem
    } else {
        ErrorKind::Undefined
    }
}

/// A failed device call, tagged with the operation that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("function: {operation}, ErrorType: {kind}, ErrorCode: {code}")]
pub struct DeviceError {
    pub operation: String,
    pub kind: ErrorKind,
    pub code: ErrorCode,
}

impl DeviceError {
    pub fn new(operation: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            operation: operation.into(),
            kind: code.kind(),
            code,
        }
    }
}

/// Turn a driver status code into a result. Non-zero codes are logged and
/// returned as a classified `DeviceError`.
pub fn check_error_code(operation: &str, code: ErrorCode) -> Result<(), DeviceError> {
    if code.is_none() {
        return Ok(());
    }
    let err = DeviceError::new(operation, code);
    tracing::error!("{}", err);
    Err(err)
}

/// Adapter for driver calls that already return `Result<T, ErrorCode>`.
pub trait DeviceResultExt<T> {
    fn for_operation(self, operation: &str) -> Result<T, DeviceError>;
}

impl<T> DeviceResultExt<T> for Result<T, ErrorCode> {
    fn for_operation(self, operation: &str) -> Result<T, DeviceError> {
        self.map_err(|code| match check_error_code(operation, code) {
            Err(err) => err,
            // A driver reporting failure with the "no error" code is still a failure.
            Ok(()) => DeviceError::new(operation, code),
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Channel {channel} cycle {cycle} has no feedback for axis {axis}")]
    MissingAxis { channel: u8, cycle: usize, axis: usize },
    #[error("Failed to spawn acquisition thread: {0}")]
    WorkerSpawn(std::io::Error),
    #[error("Acquisition thread panicked")]
    WorkerPanicked,
    #[error("Export error: {0}")]
    Export(std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
