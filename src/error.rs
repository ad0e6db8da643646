//! Error handling for the tycam wrapper.
//!
//! Every SDK call returns a raw status code. [`check`] turns it into a
//! [`TyError::Sdk`] carrying the name of the call, so failures propagate with
//! `?` up to the caller instead of aborting the process.

use std::fmt;

use thiserror::Error;
use tycam_sys as sys;

use crate::common::ComponentId;

/// Result type for tycam operations
pub type Result<T> = std::result::Result<T, TyError>;

/// Status codes reported by the camera SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TyStatus {
    Ok,
    Error,
    NotInited,
    NotImplemented,
    NotPermitted,
    DeviceError,
    InvalidParameter,
    InvalidHandle,
    InvalidComponent,
    InvalidFeature,
    WrongType,
    WrongSize,
    OutOfMemory,
    OutOfRange,
    Timeout,
    WrongMode,
    Busy,
    Idle,
    NoData,
    NoBuffer,
    NullPointer,
    ReadonlyFeature,
    Unknown(i32),
}

impl TyStatus {
    pub fn from_raw(value: i32) -> Self {
        use TyStatus::*;
        match value {
            sys::TY_STATUS_OK => Ok,
            sys::TY_STATUS_ERROR => Error,
            sys::TY_STATUS_NOT_INITED => NotInited,
            sys::TY_STATUS_NOT_IMPLEMENTED => NotImplemented,
            sys::TY_STATUS_NOT_PERMITTED => NotPermitted,
            sys::TY_STATUS_DEVICE_ERROR => DeviceError,
            sys::TY_STATUS_INVALID_PARAMETER => InvalidParameter,
            sys::TY_STATUS_INVALID_HANDLE => InvalidHandle,
            sys::TY_STATUS_INVALID_COMPONENT => InvalidComponent,
            sys::TY_STATUS_INVALID_FEATURE => InvalidFeature,
            sys::TY_STATUS_WRONG_TYPE => WrongType,
            sys::TY_STATUS_WRONG_SIZE => WrongSize,
            sys::TY_STATUS_OUT_OF_MEMORY => OutOfMemory,
            sys::TY_STATUS_OUT_OF_RANGE => OutOfRange,
            sys::TY_STATUS_TIMEOUT => Timeout,
            sys::TY_STATUS_WRONG_MODE => WrongMode,
            sys::TY_STATUS_BUSY => Busy,
            sys::TY_STATUS_IDLE => Idle,
            sys::TY_STATUS_NO_DATA => NoData,
            sys::TY_STATUS_NO_BUFFER => NoBuffer,
            sys::TY_STATUS_NULL_POINTER => NullPointer,
            sys::TY_STATUS_READONLY_FEATURE => ReadonlyFeature,
            other => Unknown(other),
        }
    }

    pub fn as_raw(self) -> i32 {
        use TyStatus::*;
        match self {
            Ok => sys::TY_STATUS_OK,
            Error => sys::TY_STATUS_ERROR,
            NotInited => sys::TY_STATUS_NOT_INITED,
            NotImplemented => sys::TY_STATUS_NOT_IMPLEMENTED,
            NotPermitted => sys::TY_STATUS_NOT_PERMITTED,
            DeviceError => sys::TY_STATUS_DEVICE_ERROR,
            InvalidParameter => sys::TY_STATUS_INVALID_PARAMETER,
            InvalidHandle => sys::TY_STATUS_INVALID_HANDLE,
            InvalidComponent => sys::TY_STATUS_INVALID_COMPONENT,
            InvalidFeature => sys::TY_STATUS_INVALID_FEATURE,
            WrongType => sys::TY_STATUS_WRONG_TYPE,
            WrongSize => sys::TY_STATUS_WRONG_SIZE,
            OutOfMemory => sys::TY_STATUS_OUT_OF_MEMORY,
            OutOfRange => sys::TY_STATUS_OUT_OF_RANGE,
            Timeout => sys::TY_STATUS_TIMEOUT,
            WrongMode => sys::TY_STATUS_WRONG_MODE,
            Busy => sys::TY_STATUS_BUSY,
            Idle => sys::TY_STATUS_IDLE,
            NoData => sys::TY_STATUS_NO_DATA,
            NoBuffer => sys::TY_STATUS_NO_BUFFER,
            NullPointer => sys::TY_STATUS_NULL_POINTER,
            ReadonlyFeature => sys::TY_STATUS_READONLY_FEATURE,
            Unknown(raw) => raw,
        }
    }

    pub fn is_ok(self) -> bool {
        self == TyStatus::Ok
    }

    pub fn description(self) -> &'static str {
        use TyStatus::*;
        match self {
            Ok => "ok",
            Error => "generic error",
            NotInited => "library not initialized",
            NotImplemented => "not implemented",
            NotPermitted => "not permitted",
            DeviceError => "device error",
            InvalidParameter => "invalid parameter",
            InvalidHandle => "invalid handle",
            InvalidComponent => "invalid component",
            InvalidFeature => "invalid feature",
            WrongType => "wrong feature type",
            WrongSize => "wrong size",
            OutOfMemory => "out of memory",
            OutOfRange => "out of range",
            Timeout => "timeout",
            WrongMode => "wrong mode",
            Busy => "device busy",
            Idle => "device idle",
            NoData => "no data",
            NoBuffer => "no buffer queued",
            NullPointer => "null pointer",
            ReadonlyFeature => "read-only feature",
            Unknown(_) => "unknown status",
        }
    }
}

impl fmt::Display for TyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_raw())
    }
}

/// Errors that can occur when working with the camera
#[derive(Debug, Error)]
pub enum TyError {
    /// An SDK call returned a non-success status
    #[error("{call} failed: {status}")]
    Sdk { call: &'static str, status: TyStatus },
    /// Enumeration found no device to open
    #[error("no device found")]
    NoDevice,
    /// The requested device id or address did not match any device
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    /// The device lacks a component the operation needs
    #[error("device has no {0} component")]
    MissingComponent(ComponentId),
    /// The SDK frame buffer is smaller than the caller requires
    #[error("frame buffer too small: need at least {required} bytes, device reports {actual}")]
    BufferTooSmall { required: usize, actual: usize },
    /// A delivered frame or sub-image is inconsistent with its buffer
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Display backend failure
    #[error("viewer error: {0}")]
    Viewer(String),
    #[error("{0}")]
    Other(String),
}

impl TyError {
    /// The SDK status behind this error, if it came from an SDK call.
    pub fn status(&self) -> Option<TyStatus> {
        match self {
            TyError::Sdk { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn sdk(call: &'static str, status: TyStatus) -> Self {
        TyError::Sdk { call, status }
    }
}

impl From<std::ffi::NulError> for TyError {
    fn from(err: std::ffi::NulError) -> Self {
        TyError::InvalidConfiguration(format!("null character in string: {}", err))
    }
}

/// Map a raw SDK status to `Ok(())` or [`TyError::Sdk`].
pub fn check(call: &'static str, raw: i32) -> Result<()> {
    match TyStatus::from_raw(raw) {
        TyStatus::Ok => Ok(()),
        status => Err(TyError::sdk(call, status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_raw_codes() {
        for raw in [0, -1001, -1004, -1014, -1019, -1021] {
            assert_eq!(TyStatus::from_raw(raw).as_raw(), raw);
        }
        assert_eq!(TyStatus::from_raw(-42), TyStatus::Unknown(-42));
    }

    #[test]
    fn check_reports_call_name() {
        let err = check("TYStartCapture", sys::TY_STATUS_BUSY).unwrap_err();
        assert_eq!(err.status(), Some(TyStatus::Busy));
        assert!(err.to_string().starts_with("TYStartCapture failed"));
    }
}
