//! Read-path wrappers: random-access, random-rw, and sequential files
//! (spec §4.5). All three consult the thread-local read-error program and
//! the facade's random-read-error toggle after delegating to the host.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::capability::{HostRandomAccessFile, HostSequentialFile, HostWritableFile};
use crate::checksum;
use crate::control::{self, ReadOp};
use crate::error::{FsError, FsResult};
use crate::facade::FacadeInner;
use crate::writable_file::ChecksumHandoff;

fn apply_read_outcome(
    facade: &FacadeInner,
    buf: &mut [u8],
    n: usize,
    op: ReadOp,
) -> FsResult<usize> {
    let injection = control::maybe_inject_read_error(op, true, false, true);
    if let Some(e) = injection.error {
        return Err(e);
    }
    if injection.corrupt_last_byte && n > 0 {
        buf[n - 1] = buf[n - 1].wrapping_add(1);
    }
    if facade.maybe_random_read_error() {
        return Err(FsError::injected_read_error());
    }
    Ok(n)
}

/// A random-access read handle.
pub struct RandomAccessFile {
    facade: Arc<FacadeInner>,
    filename: PathBuf,
    host: Box<dyn HostRandomAccessFile>,
}

impl RandomAccessFile {
    pub(crate) fn new(
        facade: Arc<FacadeInner>,
        filename: PathBuf,
        host: Box<dyn HostRandomAccessFile>,
    ) -> Self {
        RandomAccessFile {
            facade,
            filename,
            host,
        }
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        self.facade.check_active()?;
        let n = self.host.read_at(offset, buf)?;
        apply_read_outcome(&self.facade, buf, n, ReadOp::Read)
    }

    /// Asynchronous read, modeled as an inline synchronous callback
    /// invocation (spec §9: no real async runtime in scope).
    pub fn read_async<F>(&self, offset: u64, buf: &mut [u8], completion: F)
    where
        F: FnOnce(FsResult<usize>),
    {
        if let Err(e) = self.facade.check_active() {
            completion(Err(e));
            return;
        }
        let injection = control::maybe_inject_read_error(ReadOp::Read, true, false, true);
        if let Some(e) = injection.error {
            completion(Err(e));
            return;
        }
        let result = self
            .host
            .read_at(offset, buf)
            .map_err(FsError::from)
            .and_then(|n| {
                if injection.corrupt_last_byte && n > 0 {
                    buf[n - 1] = buf[n - 1].wrapping_add(1);
                }
                if self.facade.maybe_random_read_error() {
                    Err(FsError::injected_read_error())
                } else {
                    Ok(n)
                }
            });
        completion(result);
    }

    /// Vectorized read. Each sub-request is independently subject to
    /// injection; a trailing whole-batch draw then applies (spec §4.5/§4.6),
    /// and the random-read-error toggle applies last, across the batch.
    pub fn multi_read(&self, requests: &[(u64, usize)]) -> Vec<FsResult<Vec<u8>>> {
        if let Err(e) = self.facade.check_active() {
            return requests.iter().map(|_| Err(control::clone_error(&e))).collect();
        }

        let raw = self.host.multi_read(requests);
        let mut any_injected = false;
        let mut out = Vec::with_capacity(raw.len());

        for r in raw {
            match r {
                Err(e) => out.push(Err(FsError::from(e))),
                Ok(mut data) => {
                    let injection =
                        control::maybe_inject_read_error(ReadOp::MultiReadSingleReq, false, false, true);
                    if injection.fired() {
                        any_injected = true;
                    }
                    if let Some(e) = injection.error {
                        out.push(Err(e));
                    } else if injection.empty_result {
                        out.push(Ok(Vec::new()));
                    } else {
                        if injection.corrupt_last_byte {
                            if let Some(last) = data.last_mut() {
                                *last = last.wrapping_add(1);
                            }
                        }
                        out.push(Ok(data));
                    }
                }
            }
        }

        let trailing =
            control::maybe_inject_read_error(ReadOp::MultiRead, !any_injected, false, false);
        if let Some(e) = trailing.error {
            for slot in out.iter_mut() {
                if slot.is_ok() {
                    *slot = Err(control::clone_error(&e));
                }
            }
        }

        if self.facade.maybe_random_read_error() {
            for slot in out.iter_mut() {
                if slot.is_ok() {
                    *slot = Err(FsError::injected_read_error());
                }
            }
        }

        out
    }

    /// A stable identifier for the file's content, or `0` on failure or when
    /// the unique-id-fail toggle is set.
    pub fn unique_id(&self) -> u64 {
        if self.facade.unique_id_fail() {
            return 0;
        }
        self.host.unique_id()
    }
}

/// A forward-sequential read handle.
pub struct SequentialFile {
    facade: Arc<FacadeInner>,
    #[allow(dead_code)]
    filename: PathBuf,
    host: Mutex<Box<dyn HostSequentialFile>>,
}

impl SequentialFile {
    pub(crate) fn new(
        facade: Arc<FacadeInner>,
        filename: PathBuf,
        host: Box<dyn HostSequentialFile>,
    ) -> Self {
        SequentialFile {
            facade,
            filename,
            host: Mutex::new(host),
        }
    }

    /// Read up to `buf.len()` bytes, advancing the cursor.
    pub fn read(&self, buf: &mut [u8]) -> FsResult<usize> {
        self.facade.check_active()?;
        let n = self.host.lock().read(buf)?;
        apply_read_outcome(&self.facade, buf, n, ReadOp::Read)
    }

    /// Read up to `buf.len()` bytes at `offset`, not affecting the cursor.
    pub fn positioned_read(&self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        self.facade.check_active()?;
        let n = self.host.lock().positioned_read(offset, buf)?;
        apply_read_outcome(&self.facade, buf, n, ReadOp::Read)
    }
}

/// A combined random-read / random-write handle.
///
/// The capability surface has no dedicated "random-rw" host trait; this
/// wrapper holds both a [`HostWritableFile`] (for positioned writes) and a
/// [`HostRandomAccessFile`] (for positioned reads) opened on the same path,
/// which is sound against a POSIX-style host that allows multiple handles
/// on one file (see DESIGN.md).
pub struct RandomRWFile {
    facade: Arc<FacadeInner>,
    filename: PathBuf,
    write: Mutex<Box<dyn HostWritableFile>>,
    read: Box<dyn HostRandomAccessFile>,
}

impl RandomRWFile {
    pub(crate) fn new(
        facade: Arc<FacadeInner>,
        filename: PathBuf,
        write: Box<dyn HostWritableFile>,
        read: Box<dyn HostRandomAccessFile>,
    ) -> Self {
        RandomRWFile {
            facade,
            filename,
            write: Mutex::new(write),
            read,
        }
    }

    /// Write `data` at `offset`, independent of any append cursor.
    pub fn write(&self, offset: u64, data: &[u8], handoff: Option<ChecksumHandoff>) -> FsResult<()> {
        self.facade.check_active()?;

        if self.facade.corrupt_before_write() {
            return Err(FsError::corrupt_before_write());
        }
        if let Some(h) = &handoff {
            if !matches!(h.ty, crate::checksum::ChecksumType::None) {
                let recomputed = checksum::compute(h.ty, data);
                if recomputed != h.checksum {
                    return Err(FsError::checksum_mismatch(&h.checksum, &recomputed));
                }
            }
        }

        let _ = self.write.lock().positioned_append(data, offset);

        if self.facade.maybe_inject_write_error(&self.filename) {
            return Err(FsError::injected_write_error());
        }
        Ok(())
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        self.facade.check_active()?;
        let n = self.read.read_at(offset, buf)?;
        apply_read_outcome(&self.facade, buf, n, ReadOp::Read)
    }

    /// fsync the handle.
    pub fn sync(&self) -> FsResult<()> {
        self.facade.check_active()?;
        self.write.lock().sync()?;
        Ok(())
    }

    /// Close the handle, removing it from the facade's open-file tracking.
    pub fn close(&self) -> FsResult<()> {
        self.facade.check_active()?;
        if self.facade.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }
        self.write.lock().close()?;
        self.facade.writable_file_closed(&self.filename);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::FaultInjectionFileSystem;
    use tempfile::tempdir;

    #[test]
    fn sequential_read_returns_written_bytes() {
        let dir = tempdir().unwrap();
        let fs = FaultInjectionFileSystem::new_posix(dir.path());
        let path = dir.path().join("seq.log");
        let w = fs.new_writable_file(&path).unwrap();
        w.append(b"hello world").unwrap();
        w.close().unwrap();

        let r = fs.new_sequential_file(&path).unwrap();
        let mut buf = [0u8; 5];
        let n = r.read(&mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn random_access_read_at_offset() {
        let dir = tempdir().unwrap();
        let fs = FaultInjectionFileSystem::new_posix(dir.path());
        let path = dir.path().join("ra.log");
        let w = fs.new_writable_file(&path).unwrap();
        w.append(b"0123456789").unwrap();
        w.close().unwrap();

        let r = fs.new_random_access_file(&path).unwrap();
        let mut buf = [0u8; 4];
        let n = r.read(5, &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"5678");
    }

    #[test]
    fn unique_id_fail_toggle_forces_zero() {
        let dir = tempdir().unwrap();
        let fs = FaultInjectionFileSystem::new_posix(dir.path());
        let path = dir.path().join("u.log");
        let w = fs.new_writable_file(&path).unwrap();
        w.append(b"x").unwrap();
        w.close().unwrap();

        let r = fs.new_random_access_file(&path).unwrap();
        fs.set_unique_id_fail(true);
        assert_eq!(r.unique_id(), 0);
    }

    #[test]
    fn random_rw_write_then_read_back() {
        let dir = tempdir().unwrap();
        let fs = FaultInjectionFileSystem::new_posix(dir.path());
        let path = dir.path().join("rw.dat");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let rw = fs.new_random_rw_file(&path).unwrap();
        rw.write(4, b"abcd", None).unwrap();
        rw.sync().unwrap();

        let mut buf = [0u8; 4];
        let n = rw.read(4, &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"abcd", "positioned write must land at offset 4, not append");

        // Bytes outside the written range must be untouched by the write.
        let mut tail = [0u8; 4];
        let n = rw.read(12, &mut tail).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&tail, &[0u8; 4]);
    }
}
