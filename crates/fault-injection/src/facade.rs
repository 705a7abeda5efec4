//! The top-level facade: file/directory creation, rename/delete/link, the
//! two global ledgers (`DbFileStateMap`, `DirNewFilesMap`), and the crash
//! simulation / reset / diagnostics entry points (spec §3, §4.7, §6).
//!
//! Grounded on `DatabaseHandle`'s `Arc<Mutex<...>>`-guarded coordinator
//! shape: one facade, cloned cheaply via `Arc`, handed to every wrapper it
//! issues as a non-owning back-reference (spec §9 — the facade outlives
//! every wrapper it creates).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::capability::{CreateOptions, HostFileSystem, PosixFileSystem};
use crate::control::{self, FaultProgramming};
use crate::directory::Directory;
use crate::error::{FsError, FsResult};
use crate::file_state::FileState;
use crate::file_type::FileType;
use crate::path_util;
use crate::read_files::{RandomAccessFile, RandomRWFile, SequentialFile};
use crate::writable_file::WritableFile;

/// Snapshot of what existed at a rename/link destination before the
/// operation overwrote it (spec §3 `PreservedContents`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreservedContents {
    /// The file is new; there was nothing to preserve.
    New,
    /// The destination held fewer than 1 KiB, captured verbatim.
    Bytes(Vec<u8>),
}

/// Threshold under which a pre-existing rename/link destination's contents
/// are preserved instead of discarded (spec §6).
pub const PRESERVE_SIZE_LIMIT: u64 = 1024;

#[derive(Default)]
struct FacadeState {
    programming: FaultProgramming,
    db_file_state: HashMap<PathBuf, Arc<Mutex<FileState>>>,
    dir_new_files: HashMap<PathBuf, HashMap<String, PreservedContents>>,
    open_managed_files: HashSet<PathBuf>,
}

pub(crate) struct FacadeInner {
    host: Box<dyn HostFileSystem>,
    state: Mutex<FacadeState>,
}

impl FacadeInner {
    pub(crate) fn check_active(&self) -> FsResult<()> {
        self.state.lock().programming.check_active()
    }

    pub(crate) fn maybe_inject_metadata_error(&self) -> bool {
        self.state.lock().programming.maybe_inject_metadata_error()
    }

    pub(crate) fn maybe_inject_write_error(&self, filename: &Path) -> bool {
        let (_, name) = path_util::split(filename);
        let file_type = FileType::parse(&name);
        self.state
            .lock()
            .programming
            .maybe_inject_write_error(file_type)
    }

    pub(crate) fn corrupt_before_write(&self) -> bool {
        self.state.lock().programming.corrupt_before_write()
    }

    pub(crate) fn unique_id_fail(&self) -> bool {
        self.state.lock().programming.unique_id_fail()
    }

    pub(crate) fn maybe_random_read_error(&self) -> bool {
        self.state.lock().programming.maybe_random_read_error()
    }

    /// A tracked writable/random-rw file has closed: it stops counting as
    /// open. Its `FileState` is the same shared object already in
    /// `db_file_state`, so no snapshot needs copying back in.
    pub(crate) fn writable_file_closed(&self, filename: &Path) {
        self.state.lock().open_managed_files.remove(filename);
    }

    pub(crate) fn sync_dir(&self, dirname: &Path) {
        self.state.lock().dir_new_files.remove(dirname);
    }
}

/// The Fault-Injection File System: a facade wrapping a host filesystem.
///
/// Cheaply `Clone`-able; every clone shares the same underlying state and
/// error programming, matching how a single coordinator object is handed
/// around a database's internals.
#[derive(Clone)]
pub struct FaultInjectionFileSystem {
    inner: Arc<FacadeInner>,
}

impl FaultInjectionFileSystem {
    /// Wrap an arbitrary [`HostFileSystem`].
    pub fn new(host: Box<dyn HostFileSystem>) -> Self {
        FaultInjectionFileSystem {
            inner: Arc::new(FacadeInner {
                host,
                state: Mutex::new(FacadeState::default()),
            }),
        }
    }

    /// Convenience constructor wrapping a plain `std::fs`-backed filesystem
    /// rooted wherever the caller likes (the root itself is not special —
    /// callers pass absolute paths under it).
    pub fn new_posix(_root: &Path) -> Self {
        FaultInjectionFileSystem::new(Box::new(PosixFileSystem))
    }

    fn untrack_file(state: &mut FacadeState, fname: &Path) {
        state.db_file_state.remove(fname);
    }

    /// Open a directory handle for `dirname`.
    pub fn new_directory(&self, dirname: &Path) -> FsResult<Directory> {
        self.inner.check_active()?;
        let host_dir = self.inner.host.new_directory(dirname)?;
        Ok(Directory::new(
            self.inner.clone(),
            path_util::trim_trailing_separators(dirname),
            host_dir,
        ))
    }

    /// Create (or truncate) a writable file at `fname`.
    pub fn new_writable_file(&self, fname: &Path) -> FsResult<WritableFile> {
        self.new_writable_file_with_options(
            fname,
            CreateOptions {
                truncate: true,
                direct: false,
            },
        )
    }

    /// Create a writable file with explicit [`CreateOptions`].
    pub fn new_writable_file_with_options(
        &self,
        fname: &Path,
        opts: CreateOptions,
    ) -> FsResult<WritableFile> {
        self.inner.check_active()?;
        if self.inner.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }

        let host_file = self.inner.host.new_writable_file(fname, opts)?;

        let wf = if opts.direct {
            WritableFile::new(self.inner.clone(), fname.to_path_buf(), host_file, true)
        } else {
            let shared = Arc::new(Mutex::new(FileState::new(fname.to_path_buf())));
            let mut state = self.inner.state.lock();
            state.db_file_state.insert(fname.to_path_buf(), shared.clone());
            state.open_managed_files.insert(fname.to_path_buf());
            let (dir, name) = path_util::split(fname);
            state
                .dir_new_files
                .entry(dir)
                .or_default()
                .insert(name, PreservedContents::New);
            drop(state);
            WritableFile::with_shared_state(
                self.inner.clone(),
                fname.to_path_buf(),
                host_file,
                false,
                shared,
            )
        };

        if self.inner.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }
        Ok(wf)
    }

    /// Reopen an existing writable file for append.
    pub fn reopen_writable_file(&self, fname: &Path) -> FsResult<WritableFile> {
        self.reopen_writable_file_with_options(
            fname,
            CreateOptions {
                truncate: false,
                direct: false,
            },
        )
    }

    /// Reopen with explicit [`CreateOptions`].
    pub fn reopen_writable_file_with_options(
        &self,
        fname: &Path,
        opts: CreateOptions,
    ) -> FsResult<WritableFile> {
        self.inner.check_active()?;

        if opts.direct {
            let host_file = self.inner.host.new_writable_file(fname, opts)?;
            return Ok(WritableFile::new(
                self.inner.clone(),
                fname.to_path_buf(),
                host_file,
                true,
            ));
        }

        if self.inner.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }

        let existed_before = self.inner.host.file_exists(fname);
        let host_file = self.inner.host.new_writable_file(fname, opts)?;

        let mut state = self.inner.state.lock();
        if let Some(existing) = state.db_file_state.get(fname).cloned() {
            state.open_managed_files.insert(fname.to_path_buf());
            drop(state);
            return Ok(WritableFile::with_shared_state(
                self.inner.clone(),
                fname.to_path_buf(),
                host_file,
                false,
                existing,
            ));
        }

        if !existed_before {
            let shared = Arc::new(Mutex::new(FileState::new(fname.to_path_buf())));
            state.db_file_state.insert(fname.to_path_buf(), shared.clone());
            let (dir, name) = path_util::split(fname);
            state
                .dir_new_files
                .entry(dir)
                .or_default()
                .insert(name, PreservedContents::New);
            state.open_managed_files.insert(fname.to_path_buf());
            drop(state);
            return Ok(WritableFile::with_shared_state(
                self.inner.clone(),
                fname.to_path_buf(),
                host_file,
                false,
                shared,
            ));
        }

        // Existed before, but the facade never tracked it: external data.
        drop(state);
        Ok(WritableFile::new(
            self.inner.clone(),
            fname.to_path_buf(),
            host_file,
            false,
        ))
    }

    /// Open a combined random-read/random-write handle.
    pub fn new_random_rw_file(&self, fname: &Path) -> FsResult<RandomRWFile> {
        self.inner.check_active()?;
        if self.inner.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }

        let write_handle = self
            .inner
            .host
            .new_writable_file(fname, CreateOptions::default())?;
        let read_handle = self.inner.host.new_random_access_file(fname)?;

        {
            let shared = Arc::new(Mutex::new(FileState::new(fname.to_path_buf())));
            let mut state = self.inner.state.lock();
            state.db_file_state.insert(fname.to_path_buf(), shared);
            state.open_managed_files.insert(fname.to_path_buf());
            let (dir, name) = path_util::split(fname);
            state
                .dir_new_files
                .entry(dir)
                .or_default()
                .insert(name, PreservedContents::New);
        }

        Ok(RandomRWFile::new(
            self.inner.clone(),
            fname.to_path_buf(),
            write_handle,
            read_handle,
        ))
    }

    /// Open a random-access read handle.
    pub fn new_random_access_file(&self, fname: &Path) -> FsResult<RandomAccessFile> {
        self.inner.check_active()?;
        if self.inner.maybe_random_read_error() {
            return Err(FsError::injected_read_error());
        }
        let injection =
            control::maybe_inject_read_error(control::ReadOp::Open, true, false, false);
        if let Some(err) = injection.error {
            return Err(err);
        }
        let host_file = self
            .inner
            .host
            .new_random_access_file(fname)
            .map_err(|e| FsError::from_io_at(fname, e))?;
        Ok(RandomAccessFile::new(
            self.inner.clone(),
            fname.to_path_buf(),
            host_file,
        ))
    }

    /// Open a forward-sequential read handle.
    pub fn new_sequential_file(&self, fname: &Path) -> FsResult<SequentialFile> {
        self.inner.check_active()?;
        if self.inner.maybe_random_read_error() {
            return Err(FsError::injected_read_error());
        }
        let injection =
            control::maybe_inject_read_error(control::ReadOp::Open, true, false, false);
        if let Some(err) = injection.error {
            return Err(err);
        }
        let host_file = self
            .inner
            .host
            .new_sequential_file(fname)
            .map_err(|e| FsError::from_io_at(fname, e))?;
        Ok(SequentialFile::new(
            self.inner.clone(),
            fname.to_path_buf(),
            host_file,
        ))
    }

    /// Delete `fname`.
    pub fn delete_file(&self, fname: &Path) -> FsResult<()> {
        self.inner.check_active()?;
        if self.inner.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }
        self.inner
            .host
            .remove_file(fname)
            .map_err(|e| FsError::from_io_at(fname, e))?;
        {
            let mut state = self.inner.state.lock();
            Self::untrack_file(&mut state, fname);
        }
        if self.inner.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }
        Ok(())
    }

    /// Rename `src` to `dst`, replacing any existing file at `dst`.
    pub fn rename_file(&self, src: &Path, dst: &Path) -> FsResult<()> {
        self.inner.check_active()?;
        if self.inner.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }

        let previous_contents = self.snapshot_destination(dst)?;

        self.inner.host.rename(src, dst)?;

        {
            let mut state = self.inner.state.lock();
            if let Some(fs) = state.db_file_state.remove(src) {
                state.db_file_state.insert(dst.to_path_buf(), fs);
            }

            let (src_dir, src_name) = path_util::split(src);
            let moved = state
                .dir_new_files
                .get_mut(&src_dir)
                .and_then(|m| m.remove(&src_name));
            if moved.is_some() {
                let (dst_dir, dst_name) = path_util::split(dst);
                let prior = state
                    .dir_new_files
                    .entry(dst_dir)
                    .or_default()
                    .insert(dst_name, previous_contents);
                debug_assert!(prior.is_none());
            }
        }

        if self.inner.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }
        Ok(())
    }

    /// Hard-link `src` to `dst`.
    pub fn link_file(&self, src: &Path, dst: &Path) -> FsResult<()> {
        self.inner.check_active()?;
        if self.inner.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }

        self.inner.host.link(src, dst)?;

        {
            let mut state = self.inner.state.lock();
            // A value copy, not an `Arc::clone`: `src` and `dst` now name the
            // same inode but remain independently trackable paths, each with
            // its own future handles and its own unsynced-buffer lifecycle.
            // Aliasing the same `Arc<Mutex<FileState>>` here would mean an
            // append through a handle opened on one path silently mutates the
            // other's tracked position too.
            if let Some(fs) = state.db_file_state.get(src) {
                let copy = fs.lock().clone();
                state
                    .db_file_state
                    .insert(dst.to_path_buf(), Arc::new(Mutex::new(copy)));
            }

            let (src_dir, src_name) = path_util::split(src);
            let source_is_new = state
                .dir_new_files
                .get(&src_dir)
                .map(|m| m.contains_key(&src_name))
                .unwrap_or(false);
            if source_is_new {
                let (dst_dir, dst_name) = path_util::split(dst);
                let prior = state
                    .dir_new_files
                    .entry(dst_dir)
                    .or_default()
                    .insert(dst_name, PreservedContents::New);
                debug_assert!(prior.is_none());
            }
        }

        if self.inner.maybe_inject_metadata_error() {
            return Err(FsError::injected_metadata_error());
        }
        Ok(())
    }

    fn snapshot_destination(&self, dst: &Path) -> FsResult<PreservedContents> {
        if !self.inner.host.file_exists(dst) {
            return Ok(PreservedContents::New);
        }
        let size = self.inner.host.file_size(dst)?;
        if size < PRESERVE_SIZE_LIMIT {
            let bytes = self.inner.host.read_file(dst)?;
            Ok(PreservedContents::Bytes(bytes))
        } else {
            Ok(PreservedContents::New)
        }
    }

    /// Pass-through: the underlying filesystem has no async I/O queue this
    /// facade models (spec §9 treats async completion as a synchronous
    /// callback), so this is a no-op kept only for API parity with §6.
    pub fn poll(&self) -> FsResult<()> {
        Ok(())
    }

    /// See [`FaultInjectionFileSystem::poll`].
    pub fn abort_io(&self) -> FsResult<()> {
        Ok(())
    }

    /// Drop every open managed file's unsynced buffer.
    pub fn drop_unsynced_file_data(&self) {
        let state = self.inner.state.lock();
        for shared in state.db_file_state.values() {
            let mut fs = shared.lock();
            if !fs.is_fully_synced() {
                fs.drop_unsynced_data();
            }
        }
    }

    /// Truncate every open managed file's unsynced buffer at a random offset.
    pub fn drop_random_unsynced_file_data(&self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let state = self.inner.state.lock();
        for shared in state.db_file_state.values() {
            let mut fs = shared.lock();
            if !fs.is_fully_synced() {
                fs.drop_random_unsynced_data(&mut rng);
            }
        }
    }

    /// Undo every file creation that has not been covered by a directory
    /// fsync since: delete files new since the last sync, and restore
    /// preserved bytes at overwritten rename/link destinations.
    pub fn delete_files_created_after_last_dir_sync(&self) -> FsResult<()> {
        let snapshot: Vec<(PathBuf, String, PreservedContents)> = {
            let state = self.inner.state.lock();
            state
                .dir_new_files
                .iter()
                .flat_map(|(dir, files)| {
                    files
                        .iter()
                        .map(move |(name, preserved)| (dir.clone(), name.clone(), preserved.clone()))
                })
                .collect()
        };

        let mut first_err = None;
        for (dir, name, preserved) in snapshot {
            let path = dir.join(&name);
            let result = match preserved {
                PreservedContents::New => self.inner.host.remove_file(&path),
                PreservedContents::Bytes(bytes) => self.inner.host.write_file(&path, &bytes),
            };
            if let Err(e) = result {
                if first_err.is_none() {
                    first_err = Some(FsError::from(e));
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Clear both ledgers, disable every injector, and reopen the active gate.
    pub fn reset_state(&self) {
        let mut state = self.inner.state.lock();
        state.db_file_state.clear();
        state.dir_new_files.clear();
        state.open_managed_files.clear();
        state.programming.reset();
    }

    /// Close the active gate with `error`; every gated operation will return
    /// it until [`FaultInjectionFileSystem::reset_state`] or
    /// [`FaultInjectionFileSystem::set_active`].
    pub fn set_inactive(&self, error: FsError) {
        self.inner.state.lock().programming.set_inactive(error);
    }

    /// Reopen the active gate.
    pub fn set_active(&self) {
        self.inner.state.lock().programming.set_active();
    }

    /// Enable write-error injection at `1/one_in` for `allowed_types` (or
    /// every type, when `inject_for_all_file_types` is set).
    pub fn enable_write_error(
        &self,
        one_in: u32,
        allowed_types: HashSet<FileType>,
        inject_for_all_file_types: bool,
    ) {
        self.inner
            .state
            .lock()
            .programming
            .enable_write_error(one_in, allowed_types, inject_for_all_file_types);
    }

    /// Disable write-error injection.
    pub fn disable_write_error(&self) {
        self.inner.state.lock().programming.disable_write_error();
    }

    /// Enable metadata-write-error injection at `1/one_in`.
    pub fn enable_metadata_error(&self, one_in: u32) {
        self.inner
            .state
            .lock()
            .programming
            .enable_metadata_error(one_in);
    }

    /// Disable metadata-write-error injection.
    pub fn disable_metadata_error(&self) {
        self.inner
            .state
            .lock()
            .programming
            .disable_metadata_error();
    }

    /// Set the data-corruption-before-write toggle.
    pub fn set_corrupt_before_write(&self, on: bool) {
        self.inner
            .state
            .lock()
            .programming
            .set_corrupt_before_write(on);
    }

    /// Set the unique-id-failure toggle.
    pub fn set_unique_id_fail(&self, on: bool) {
        self.inner.state.lock().programming.set_unique_id_fail(on);
    }

    /// Set the random-read-error toggle.
    pub fn set_random_read_error(&self, on: bool) {
        self.inner
            .state
            .lock()
            .programming
            .set_random_read_error(on);
    }

    /// Install this thread's read-error injection program.
    pub fn set_read_error_program(&self, one_in: u32, seed: u64) {
        control::set_read_error_program(one_in, seed);
    }

    /// Disable this thread's read-error injection program.
    pub fn disable_read_error_program(&self) {
        control::disable_read_error_program();
    }

    /// This thread's read-error injection count.
    pub fn read_error_count(&self) -> u64 {
        control::read_error_count()
    }

    /// This thread's most recent read-error injection message.
    pub fn read_error_last_message(&self) -> String {
        control::read_error_last_message()
    }

    /// Emit the last injection's type, message, and simulated call stack.
    ///
    /// Spec §6 calls for a no-op on platforms without backtrace support;
    /// this crate never captures a genuine stack (see DESIGN.md), so the
    /// "frames" are the synthetic tags the controller recorded.
    pub fn print_fault_backtrace(&self) -> String {
        let count = control::read_error_count();
        let message = control::read_error_last_message();
        let frames = control::read_error_last_frames();
        format!(
            "fault #{count}: {message} (frames: {})",
            if frames.is_empty() {
                "none".to_string()
            } else {
                frames.join(" -> ")
            }
        )
    }

    /// The last known [`FileState`] the facade recorded for `fname`, if any.
    ///
    /// A test/diagnostic accessor, not part of the wrapped-engine API.
    pub fn file_state(&self, fname: &Path) -> Option<FileState> {
        self.inner
            .state
            .lock()
            .db_file_state
            .get(fname)
            .map(|shared| shared.lock().clone())
    }
}
