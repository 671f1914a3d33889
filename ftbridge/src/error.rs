//! Common error types for ftbridge.
//!
//! This module provides a centralized Error enum using thiserror. Every
//! bridge-device failure lands in one of four kinds (see [`ErrorKind`]):
//! a violated precondition, a failed vendor call, an incomplete write, or a
//! device that is not an FT4222.

use thiserror::Error;

use crate::bridge::{Mode, NativeStatus};

/// Main error type for bridge-device operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A handle is already held by this device object
    #[error("Device is already open")]
    AlreadyOpen,

    /// The operation needs an open handle
    #[error("Device not open")]
    NotOpen,

    /// The operation belongs to a protocol mode that is not active
    #[error("Device not in {expected} mode (current mode: {actual})")]
    WrongMode { expected: Mode, actual: Mode },

    /// A vendor library call returned a failure status
    #[error("{op} failed with status {status}")]
    Device {
        op: &'static str,
        status: NativeStatus,
    },

    /// A write moved fewer bytes than requested
    #[error("{op} incomplete. Written: {transferred}/{requested} bytes")]
    Incomplete {
        op: &'static str,
        transferred: usize,
        requested: usize,
    },

    /// The opened device is not an FT4222 variant
    #[error("Device is not FT4222 (device type {device_type})")]
    WrongDevice { device_type: u32 },
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Not open, already open, or wrong/unset mode. Raised before any
    /// hardware access.
    Precondition,
    /// A native call failed; the error carries the status code.
    DeviceIo,
    /// A write transferred fewer bytes than requested.
    IncompleteTransfer,
    /// The opened device is not the expected chip family.
    WrongDevice,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlreadyOpen | Error::NotOpen | Error::WrongMode { .. } => {
                ErrorKind::Precondition
            }
            Error::Device { .. } => ErrorKind::DeviceIo,
            Error::Incomplete { .. } => ErrorKind::IncompleteTransfer,
            Error::WrongDevice { .. } => ErrorKind::WrongDevice,
        }
    }

    /// Native status code, for errors raised by a vendor call.
    pub fn status(&self) -> Option<NativeStatus> {
        match self {
            Error::Device { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::NotOpen.kind(), ErrorKind::Precondition);
        assert_eq!(Error::AlreadyOpen.kind(), ErrorKind::Precondition);
        assert_eq!(
            Error::WrongMode {
                expected: Mode::I2cMaster,
                actual: Mode::Unknown
            }
            .kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            Error::Incomplete {
                op: "FT4222_I2CMaster_WriteEx",
                transferred: 1,
                requested: 2
            }
            .kind(),
            ErrorKind::IncompleteTransfer
        );
        assert_eq!(
            Error::WrongDevice { device_type: 5 }.kind(),
            ErrorKind::WrongDevice
        );
    }

    #[test]
    fn test_device_error_carries_status() {
        let err = Error::Device {
            op: "FT_Open",
            status: NativeStatus::DEVICE_NOT_FOUND,
        };
        assert_eq!(err.kind(), ErrorKind::DeviceIo);
        assert_eq!(err.status(), Some(NativeStatus::DEVICE_NOT_FOUND));
        assert_eq!(err.to_string(), "FT_Open failed with status 2 (FT_DEVICE_NOT_FOUND)");
    }

    #[test]
    fn test_wrong_mode_message() {
        let err = Error::WrongMode {
            expected: Mode::SpiMaster,
            actual: Mode::I2cMaster,
        };
        assert_eq!(
            err.to_string(),
            "Device not in SPI Master mode (current mode: I2C Master)"
        );
    }
}
