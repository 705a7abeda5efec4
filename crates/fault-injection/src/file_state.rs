//! Per-writable-file buffered-write state (spec §3 `FileState`).

use rand::Rng;

/// Sentinel for "never flushed" / "never synced".
pub const NEVER: i64 = -1;

/// Buffered-write bookkeeping for one managed writable file.
///
/// Invariant: `pos_at_last_sync <= pos_at_last_flush <= pos`.
/// `is_fully_synced()` holds iff `buffer` is empty and `pos_at_last_sync == pos`.
#[derive(Debug, Clone)]
pub struct FileState {
    /// Absolute path; identity of the file this state describes.
    pub filename: std::path::PathBuf,
    /// Unsynced-append bytes. Truncating this buffer models lost writes.
    pub buffer: Vec<u8>,
    /// Total bytes appended since open.
    pub pos: i64,
    /// Position at the last `Flush`, or [`NEVER`].
    pub pos_at_last_flush: i64,
    /// Position at the last `Sync`, or [`NEVER`].
    pub pos_at_last_sync: i64,
}

impl FileState {
    /// Create fresh state for a newly opened file.
    pub fn new(filename: std::path::PathBuf) -> Self {
        FileState {
            filename,
            buffer: Vec::new(),
            pos: 0,
            pos_at_last_flush: NEVER,
            pos_at_last_sync: NEVER,
        }
    }

    /// Drop all unsynced data. Idempotent; always succeeds.
    pub fn drop_unsynced_data(&mut self) {
        self.buffer.clear();
    }

    /// Truncate the unsynced buffer at a uniformly random offset.
    ///
    /// No-op when the buffer is already empty.
    pub fn drop_random_unsynced_data(&mut self, rng: &mut impl Rng) {
        if self.buffer.is_empty() {
            return;
        }
        let t = rng.gen_range(0..self.buffer.len());
        self.buffer.truncate(t);
    }

    /// Whether this file has no unsynced data and its last sync covered
    /// everything appended so far.
    pub fn is_fully_synced(&self) -> bool {
        self.buffer.is_empty() && self.pos_at_last_sync == self.pos
    }
}
