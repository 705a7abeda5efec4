//! Writable-file wrapper: buffers unsynced appends, injects write/metadata
//! errors, and verifies caller-supplied checksums (spec §4.3).

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::capability::HostWritableFile;
use crate::checksum::{self, ChecksumType};
use crate::error::{FsError, FsResult};
use crate::facade::FacadeInner;
use crate::file_state::FileState;

/// A caller-supplied checksum to verify against the bytes being appended.
#[derive(Debug, Clone)]
pub struct ChecksumHandoff {
    /// The algorithm the checksum was computed under.
    pub ty: ChecksumType,
    /// The caller's digest.
    pub checksum: Vec<u8>,
}

struct WritableFileInner {
    host: Box<dyn HostWritableFile>,
    direct: bool,
    closed: bool,
}

/// A writable file handle wrapping the host filesystem's writable file.
///
/// All operations serialize on this handle's own mutex (spec §5). The
/// [`FileState`] is shared with the facade's `DbFileStateMap` entry (when
/// this file is tracked), so crash-simulation calls like
/// [`FaultInjectionFileSystem::drop_unsynced_file_data`](crate::facade::FaultInjectionFileSystem::drop_unsynced_file_data)
/// mutate the same buffer this handle appends to, rather than a detached copy.
pub struct WritableFile {
    facade: Arc<FacadeInner>,
    filename: PathBuf,
    state: Arc<Mutex<FileState>>,
    inner: Mutex<WritableFileInner>,
}

impl WritableFile {
    pub(crate) fn new(
        facade: Arc<FacadeInner>,
        filename: PathBuf,
        host: Box<dyn HostWritableFile>,
        direct: bool,
    ) -> Self {
        let state = Arc::new(Mutex::new(FileState::new(filename.clone())));
        Self::with_shared_state(facade, filename, host, direct, state)
    }

    /// Construct sharing an existing `FileState` handle — used when the
    /// facade already tracks this path (`ReopenWritableFile`, `NewRandomRWFile`)
    /// so that crash-simulation operations on the facade's map are visible
    /// to this handle's own appends/syncs.
    pub(crate) fn with_shared_state(
        facade: Arc<FacadeInner>,
        filename: PathBuf,
        host: Box<dyn HostWritableFile>,
        direct: bool,
        state: Arc<Mutex<FileState>>,
    ) -> Self {
        WritableFile {
            facade,
            filename,
            state,
            inner: Mutex::new(WritableFileInner {
                host,
                direct,
                closed: false,
            }),
        }
    }

    /// Append `data` with no checksum handoff.
    pub fn append(&self, data: &[u8]) -> FsResult<()> {
        self.append_impl(data, None)
    }

    /// Append `data`, verifying it against `handoff` first.
    pub fn append_checked(&self, data: &[u8], handoff: ChecksumHandoff) -> FsResult<()> {
        self.append_impl(data, Some(handoff))
    }

    /// Append `data` at `offset`, independent of the append cursor,
    /// verifying it against `handoff` first.
    ///
    /// Per spec §9 (Open Question), this forwards to the underlying file and
    /// discards its status, returning only the write-error-injection status —
    /// preserved as observed rather than "fixed", see DESIGN.md.
    pub fn positioned_append(
        &self,
        data: &[u8],
        offset: u64,
        handoff: ChecksumHandoff,
    ) -> FsResult<()> {
        self.facade.check_active()?;
        self.verify_handoff(data, &handoff)?;

        let mut inner = self.inner.lock();
        let _ = inner.host.positioned_append(data, offset);
        drop(inner);

        if self.facade.maybe_inject_write_error(&self.filename) {
            return Err(FsError::injected_write_error());
        }
        Ok(())
    }

    fn append_impl(&self, data: &[u8], handoff: Option<ChecksumHandoff>) -> FsResult<()> {
        self.facade.check_active()?;

        if let Some(h) = &handoff {
            self.verify_handoff(data, h)?;
        }

        let mut inner = self.inner.lock();
        if inner.direct {
            let _ = inner.host.append(data);
        } else {
            let mut state = self.state.lock();
            state.buffer.extend_from_slice(data);
            state.pos += data.len() as i64;
        }
        drop(inner);

        if self.facade.maybe_inject_write_error(&self.filename) {
            return Err(FsError::injected_write_error());
        }
        Ok(())
    }

    fn verify_handoff(&self, data: &[u8], handoff: &ChecksumHandoff) -> FsResult<()> {
        if self.facade.corrupt_before_write() {
            return Err(FsError::corrupt_before_write());
        }
        if !matches!(handoff.ty, ChecksumType::None) {
            let recomputed = checksum::compute(handoff.ty, data);
            if recomputed != handoff.checksum {
                return Err(FsError::checksum_mismatch(&handoff.checksum, &recomputed));
            }
        }
        Ok(())
    }

    /// Record the current append position as the last-flushed position.
    pub fn flush(&self) -> FsResult<()> {
        self.facade.check_active()?;
        let mut state = self.state.lock();
        state.pos_at_last_flush = state.pos;
        Ok(())
    }

    /// Flush the unsynced buffer to the underlying file and fsync it.
    pub fn sync(&self) -> FsResult<()> {
        self.facade.check_active()?;
        let mut inner = self.inner.lock();

        if inner.direct {
            return Ok(());
        }

        let mut state = self.state.lock();
        let buffer = std::mem::take(&mut state.buffer);
        let result = inner.host.append(&buffer).map_err(FsError::from);
        let _ = inner.host.sync();
        state.pos_at_last_sync = state.pos;

        result
    }

    /// fsync only the prefix of the buffer covering `[offset, offset+nbytes)`.
    pub fn range_sync(&self, offset: u64, nbytes: u64) -> FsResult<()> {
        self.facade.check_active()?;
        let mut inner = self.inner.lock();
        let mut state = self.state.lock();

        let sync_limit = offset as i64 + nbytes as i64;
        let buf_begin = state.pos_at_last_sync.max(0);
        if sync_limit < buf_begin {
            return Ok(());
        }

        let n = (state.buffer.len() as i64).min(sync_limit - buf_begin) as usize;
        let prefix: Vec<u8> = state.buffer.drain(..n).collect();
        let _ = inner.host.append(&prefix);
        let _ = inner.host.range_sync(offset, nbytes);
        // Notified unconditionally even though only a prefix may have been
        // flushed — spec §9 Open Question, preserved as observed.
        state.pos_at_last_sync = offset as i64 + n as i64;
        Ok(())
    }

    /// Close the handle, flushing any remaining buffered bytes.
    pub fn close(&self) -> FsResult<()> {
        self.facade.check_active()?;

        if self.facade.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }

        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;

        let close_status = if inner.direct {
            Ok(())
        } else {
            let buffer = std::mem::take(&mut self.state.lock().buffer);
            inner.host.append(&buffer).map_err(FsError::from)
        };

        if close_status.is_ok() {
            let _ = inner.host.sync();
            let _ = inner.host.close();
            drop(inner);
            self.facade.writable_file_closed(&self.filename);

            if self.facade.maybe_inject_metadata_error() {
                return Err(FsError::injected_metadata_error());
            }
        }

        close_status
    }
}

impl Drop for WritableFile {
    fn drop(&mut self) {
        let already_closed = self.inner.lock().closed;
        if !already_closed {
            if let Err(e) = self.close() {
                tracing::warn!(
                    error = %e,
                    filename = %self.filename.display(),
                    "WritableFile close on drop failed"
                );
            }
        }
    }
}
