//! A fault-injecting virtual filesystem for storage-engine crash testing.
//!
//! [`FaultInjectionFileSystem`] wraps a host filesystem ([`PosixFileSystem`]
//! by default) and gives the caller deterministic control over durability
//! loss and I/O error injection: buffered writes can be dropped to simulate
//! a crash before fsync, and reads/writes/metadata operations can be made to
//! fail at a configurable rate.
//!
//! The storage engine that would normally sit above this filesystem is out
//! of scope here and treated as an external collaborator; this crate only
//! implements the filesystem it would be tested against.

#![warn(missing_docs)]

pub mod capability;
pub mod checksum;
pub mod control;
pub mod directory;
pub mod error;
pub mod facade;
pub mod file_state;
pub mod file_type;
pub mod path_util;
pub mod read_files;
pub mod writable_file;

pub use capability::{
    CreateOptions, HostDirectory, HostFileSystem, HostRandomAccessFile, HostSequentialFile,
    HostWritableFile, PosixFileSystem,
};
pub use checksum::ChecksumType;
pub use control::ReadOp;
pub use directory::Directory;
pub use error::{FsError, FsResult};
pub use facade::{FaultInjectionFileSystem, PreservedContents};
pub use file_state::FileState;
pub use file_type::FileType;
pub use read_files::{RandomAccessFile, RandomRWFile, SequentialFile};
pub use writable_file::{ChecksumHandoff, WritableFile};
