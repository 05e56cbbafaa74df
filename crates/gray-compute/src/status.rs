//! Status codes reported across the C ABI.
//!
//! Every [`ComputeError`](crate::ComputeError) maps to exactly one status;
//! the mapping never changes as an error travels through the orchestrator.

use std::ffi::CStr;
use std::fmt;

/// Outcome of a grayscale conversion.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Conversion finished, every `gray` field is valid.
    Success = 0,
    /// Null buffer or an element count the device cannot index.
    InvalidValue = 1,
    /// Device memory for the mirror could not be allocated.
    MemoryAllocation = 2,
    /// The device context could not be created.
    InitializationError = 3,
    /// The requested backend is not present on this system.
    NoDevice = 4,
    /// The kernel failed to compile or load.
    KernelCompilation = 5,
    /// Group size or grid does not fit the device limits.
    InvalidConfiguration = 6,
    /// Host/device copy failed.
    TransferFailed = 7,
    /// The kernel could not be launched.
    LaunchFailure = 8,
    /// Waiting for kernel completion failed.
    SynchronizationFailed = 9,
    /// Unexpected failure (a panic caught at the FFI boundary).
    Unknown = 99,
}

impl Status {
    /// All status values, in code order.
    pub const ALL: [Status; 11] = [
        Self::Success,
        Self::InvalidValue,
        Self::MemoryAllocation,
        Self::InitializationError,
        Self::NoDevice,
        Self::KernelCompilation,
        Self::InvalidConfiguration,
        Self::TransferFailed,
        Self::LaunchFailure,
        Self::SynchronizationFailed,
        Self::Unknown,
    ];

    /// Numeric code.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Look up a status by its numeric code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Whether this is [`Status::Success`].
    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Human-readable description.
    pub fn description(self) -> &'static str {
        self.description_cstr().to_str().unwrap_or("unknown error")
    }

    /// [`description`](Self::description) as a NUL-terminated string for C.
    pub fn description_cstr(self) -> &'static CStr {
        match self {
            Self::Success => c"no error",
            Self::InvalidValue => c"invalid argument",
            Self::MemoryAllocation => c"out of device memory",
            Self::InitializationError => c"device initialization error",
            Self::NoDevice => c"no compute device available",
            Self::KernelCompilation => c"kernel compilation failed",
            Self::InvalidConfiguration => c"invalid launch configuration",
            Self::TransferFailed => c"host/device memory transfer failed",
            Self::LaunchFailure => c"kernel launch failed",
            Self::SynchronizationFailed => c"device synchronization failed",
            Self::Unknown => c"unknown error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        for status in Status::ALL {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(42), None);
        assert_eq!(Status::from_code(-1), None);
    }

    #[test]
    fn test_fixed_codes() {
        assert_eq!(Status::Success.code(), 0);
        assert_eq!(Status::InvalidValue.code(), 1);
        assert_eq!(Status::MemoryAllocation.code(), 2);
        assert_eq!(Status::Unknown.code(), 99);
    }

    #[test]
    fn test_display() {
        assert!(Status::Success.is_success());
        assert!(!Status::LaunchFailure.is_success());
        assert_eq!(Status::MemoryAllocation.to_string(), "out of device memory (2)");
    }

    #[test]
    fn test_c_descriptions() {
        for status in Status::ALL {
            let c = status.description_cstr();
            assert!(c.to_bytes().is_ascii());
            assert_eq!(c.to_str().unwrap(), status.description());
        }
        assert_eq!(Status::TransferFailed.description(), "host/device memory transfer failed");
    }
}
