///
/// Synchronization error types.
///
/// Every recoverable failure a tandem primitive can report: allocation
/// failure, contention on a non-blocking acquire, an expired timed wait,
/// and translated OS errors from thread creation. Unrecoverable conditions
/// never show up here; they go through `crate::fatal`.
///

use std::io;
use thiserror::Error;

pub const CODE_EIO: i32 = -5;
pub const CODE_ENOMEM: i32 = -12;
pub const CODE_EACCES: i32 = -13;
pub const CODE_EBUSY: i32 = -16;
pub const CODE_EINVAL: i32 = -22;
pub const CODE_ETIMEDOUT: i32 = -110;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Out of memory")]
    OutOfMemory,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource busy")]
    Busy,

    #[error("Timed out")]
    Timeout,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Thread panicked before it could be joined")]
    ThreadPanicked,

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("TOML parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("{0}")]
    Os(#[from] io::Error),
}

impl SyncError {
    /// Translate an OS error into the taxonomy by its kind.
    ///
    /// Kinds without a dedicated variant are kept as `Os` so the original
    /// message survives.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::OutOfMemory => SyncError::OutOfMemory,
            io::ErrorKind::PermissionDenied => SyncError::PermissionDenied,
            io::ErrorKind::InvalidInput => SyncError::InvalidArgument(err.to_string()),
            io::ErrorKind::WouldBlock => SyncError::Busy,
            io::ErrorKind::TimedOut => SyncError::Timeout,
            _ => SyncError::Os(err),
        }
    }

    /// Stable negative code used across the C ABI.
    pub fn code(&self) -> i32 {
        match self {
            SyncError::OutOfMemory => CODE_ENOMEM,
            SyncError::InvalidArgument(_) | SyncError::Config { .. } | SyncError::ConfigParse(_) => {
                CODE_EINVAL
            }
            SyncError::Busy => CODE_EBUSY,
            SyncError::Timeout => CODE_ETIMEDOUT,
            SyncError::PermissionDenied => CODE_EACCES,
            SyncError::ThreadPanicked | SyncError::Os(_) => CODE_EIO,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, SyncError::Busy)
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
