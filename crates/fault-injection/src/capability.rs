//! The capability-set interface the facade uses to reach the real filesystem.
//!
//! Spec §9 replaces the original's deep `FileSystem -> InjectionFileSystem ->
//! FaultInjectionTestFS` inheritance chain with a single facade holding the
//! underlying filesystem behind one closed trait. [`PosixFileSystem`] is the
//! only implementation; it is a thin `std::fs` shim, grounded on the
//! `OpenOptions` + `sync_all` idiom already used by
//! `format::manifest::ManifestManager::persist` in the teacher crate.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Options controlling how a writable file handle is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// Truncate an existing file's contents to empty. When `false`, an
    /// existing file is opened with its prior contents intact; appends are
    /// still serviced by seeking to end-of-file rather than `O_APPEND`, so
    /// that positioned writes on the same handle are never forced there too.
    pub truncate: bool,
    /// Bypass the facade's internal buffering (spec's "direct I/O" path).
    pub direct: bool,
}

/// A raw, unwrapped handle capable of buffered appends.
pub trait HostWritableFile: Send {
    /// Append `data` at the current end of file.
    fn append(&mut self, data: &[u8]) -> io::Result<()>;
    /// Append `data` at `offset`, independent of the current append position.
    fn positioned_append(&mut self, data: &[u8], offset: u64) -> io::Result<()>;
    /// Flush the OS-level buffer (not necessarily fsync).
    fn flush(&mut self) -> io::Result<()>;
    /// fsync the file to durable storage.
    fn sync(&mut self) -> io::Result<()>;
    /// fsync only the region covering `[offset, offset+nbytes)`, best-effort.
    fn range_sync(&mut self, offset: u64, nbytes: u64) -> io::Result<()>;
    /// Close the handle.
    fn close(&mut self) -> io::Result<()>;
}

/// A raw, unwrapped handle capable of random-offset reads.
pub trait HostRandomAccessFile: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`; returns bytes read.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
    /// A vectorized read: each `(offset, len)` pair yields a result slot.
    fn multi_read(&self, requests: &[(u64, usize)]) -> Vec<io::Result<Vec<u8>>> {
        requests
            .iter()
            .map(|&(offset, len)| {
                let mut buf = vec![0u8; len];
                let n = self.read_at(offset, &mut buf)?;
                buf.truncate(n);
                Ok(buf)
            })
            .collect()
    }
    /// Stable identifier for the file's content, or `0` if unsupported.
    fn unique_id(&self) -> u64 {
        0
    }
}

/// A raw, unwrapped handle capable of forward sequential reads.
pub trait HostSequentialFile: Send {
    /// Read up to `buf.len()` bytes, advancing the cursor; returns bytes read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Read up to `buf.len()` bytes starting at `offset`, not affecting the cursor.
    fn positioned_read(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

/// A raw, unwrapped directory handle.
pub trait HostDirectory: Send {
    /// fsync the directory (durability for the entries it contains).
    fn fsync(&mut self) -> io::Result<()>;
    /// Close the handle.
    fn close(&mut self) -> io::Result<()>;
}

/// The closed capability set the facade depends on to reach the host
/// filesystem, standing in for the full `FileSystem` interface the original
/// exposes (spec §9).
pub trait HostFileSystem: Send + Sync {
    /// Create `path` and all missing ancestor directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    /// Open (creating if necessary) a writable file handle.
    fn new_writable_file(
        &self,
        path: &Path,
        opts: CreateOptions,
    ) -> io::Result<Box<dyn HostWritableFile>>;
    /// Open a random-access read handle.
    fn new_random_access_file(&self, path: &Path) -> io::Result<Box<dyn HostRandomAccessFile>>;
    /// Open a sequential read handle.
    fn new_sequential_file(&self, path: &Path) -> io::Result<Box<dyn HostSequentialFile>>;
    /// Open a directory handle (for `fsync`).
    fn new_directory(&self, path: &Path) -> io::Result<Box<dyn HostDirectory>>;
    /// Delete a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    /// Rename `from` to `to`, replacing any existing file at `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Hard-link `from` to `to`.
    fn link(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Whether a path currently exists.
    fn file_exists(&self, path: &Path) -> bool;
    /// The size in bytes of an existing file.
    fn file_size(&self, path: &Path) -> io::Result<u64>;
    /// Read the full contents of a file (used to snapshot small rename/link targets).
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// Overwrite a file's contents (used to restore preserved rename/link targets).
    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// `std::fs`-backed [`HostFileSystem`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixFileSystem;

impl HostFileSystem for PosixFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn new_writable_file(
        &self,
        path: &Path,
        opts: CreateOptions,
    ) -> io::Result<Box<dyn HostWritableFile>> {
        // Deliberately never `O_APPEND`: on Linux that flag forces every
        // write — including `pwrite`/`write_all_at` — to the end of file and
        // ignores the caller's offset, which would break `positioned_append`
        // for reopened and random-rw handles. Sequential appends instead
        // seek to the end themselves in `PosixWritableFile::append`.
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(opts.truncate)
            .open(path)?;
        Ok(Box::new(PosixWritableFile { file }))
    }

    fn new_random_access_file(&self, path: &Path) -> io::Result<Box<dyn HostRandomAccessFile>> {
        let file = File::open(path)?;
        Ok(Box::new(PosixRandomAccessFile { file }))
    }

    fn new_sequential_file(&self, path: &Path) -> io::Result<Box<dyn HostSequentialFile>> {
        let file = File::open(path)?;
        Ok(Box::new(PosixSequentialFile { file, pos: 0 }))
    }

    fn new_directory(&self, path: &Path) -> io::Result<Box<dyn HostDirectory>> {
        let file = File::open(path)?;
        Ok(Box::new(PosixDirectory { file }))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn link(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::hard_link(from, to)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }
}

struct PosixWritableFile {
    file: File,
}

impl HostWritableFile for PosixWritableFile {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        // The handle is opened without `O_APPEND` (see `new_writable_file`),
        // so the end-of-file position has to be sought explicitly here.
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(data)
    }

    fn positioned_append(&mut self, data: &[u8], offset: u64) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.write_all_at(data, offset)
    }

    fn flush(&mut self) -> io::Result<()> {
        use std::io::Write;
        self.file.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn range_sync(&mut self, _offset: u64, _nbytes: u64) -> io::Result<()> {
        // No portable range-fsync in std; best-effort full sync.
        self.file.sync_data()
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct PosixRandomAccessFile {
    file: File,
}

impl HostRandomAccessFile for PosixRandomAccessFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }
}

struct PosixSequentialFile {
    file: File,
    pos: u64,
}

impl HostSequentialFile for PosixSequentialFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        let n = self.file.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn positioned_read(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }
}

struct PosixDirectory {
    file: File,
}

impl HostDirectory for PosixDirectory {
    fn fsync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
