//! Directory wrapper: intercepts `fsync` for metadata-error injection and
//! notifies the facade so it can prune its "new files since last sync"
//! ledger (spec §4.4).

use std::path::PathBuf;
use std::sync::Arc;

use crate::capability::HostDirectory;
use crate::error::FsResult;
use crate::facade::FacadeInner;

/// A directory handle wrapping the host filesystem's directory handle.
pub struct Directory {
    facade: Arc<FacadeInner>,
    dirname: PathBuf,
    host: Box<dyn HostDirectory>,
}

impl Directory {
    pub(crate) fn new(facade: Arc<FacadeInner>, dirname: PathBuf, host: Box<dyn HostDirectory>) -> Self {
        Directory {
            facade,
            dirname,
            host,
        }
    }

    /// The trimmed directory name this handle keys into `DirNewFilesMap`.
    pub fn dirname(&self) -> &std::path::Path {
        &self.dirname
    }

    /// fsync the directory, pruning the facade's new-files ledger for it.
    pub fn fsync(&mut self) -> FsResult<()> {
        self.fsync_impl()
    }

    /// Equivalent to [`Directory::fsync`]; the spec distinguishes a
    /// `FsyncWithDirOptions` entry point but gives it identical semantics.
    pub fn fsync_with_dir_options(&mut self) -> FsResult<()> {
        self.fsync_impl()
    }

    fn fsync_impl(&mut self) -> FsResult<()> {
        self.facade.check_active()?;

        if self.facade.maybe_inject_metadata_error() {
            return Err(crate::error::FsError::injected_metadata_error());
        }

        self.facade.sync_dir(&self.dirname);

        self.host.fsync()?;

        if self.facade.maybe_inject_metadata_error() {
            return Err(crate::error::FsError::injected_metadata_error());
        }

        Ok(())
    }

    /// Close the directory handle.
    pub fn close(&mut self) -> FsResult<()> {
        self.facade.check_active()?;
        self.host.close()?;
        Ok(())
    }
}
