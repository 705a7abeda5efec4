//! Error and status types returned by the fault-injection filesystem.

use std::path::{Path, PathBuf};

/// Result alias used throughout this crate.
pub type FsResult<T> = Result<T, FsError>;

/// The sum-type every intercepted operation returns (spec §9: `{Ok | IOError |
/// Corruption | NotFound}`, plus the sticky "inactive" error carried by the
/// active gate).
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Generic I/O failure, either genuine or injected.
    #[error("IO error: {0}")]
    IoError(String),

    /// Checksum mismatch or forced pre-write corruption.
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Path does not exist.
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The facade's active gate is closed; this is the sticky error returned
    /// until `ResetState` or re-activation.
    #[error("Filesystem inactive: {0}")]
    Inactive(String),

    /// Pass-through failure from the underlying host filesystem.
    #[error("Underlying filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Build the injected-read-error variant with the spec's fixed message.
    pub fn injected_read_error() -> Self {
        FsError::IoError("Injected read error".to_string())
    }

    /// Build the injected-write-error variant.
    pub fn injected_write_error() -> Self {
        FsError::IoError("Injected write error".to_string())
    }

    /// Build the injected-metadata-error variant.
    pub fn injected_metadata_error() -> Self {
        FsError::IoError("Injected metadata write error".to_string())
    }

    /// Build a checksum-mismatch corruption error carrying both digests.
    pub fn checksum_mismatch(origin: &[u8], current: &[u8]) -> Self {
        FsError::Corruption(format!(
            "Data is corrupted! Origin checksum: {origin:02x?}, current checksum: {current:02x?}"
        ))
    }

    /// Build the forced pre-write corruption error.
    pub fn corrupt_before_write() -> Self {
        FsError::Corruption("Forced corruption before write".to_string())
    }

    /// `true` for the kinds that spec §7 calls "injected" (as opposed to
    /// pass-through I/O failures from the underlying filesystem).
    pub fn is_injected(&self) -> bool {
        matches!(self, FsError::IoError(_) | FsError::Corruption(_))
    }

    /// Wrap a host I/O failure from a call made against `path`, surfacing
    /// `ErrorKind::NotFound` as [`FsError::NotFound`] (spec §7: "`NotFound`
    /// (from underlying probes)") instead of the generic pass-through arm.
    pub(crate) fn from_io_at(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            FsError::NotFound(path.to_path_buf())
        } else {
            FsError::Io(err)
        }
    }
}
