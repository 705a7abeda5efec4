//! Property tests for the seven invariants.

use fault_injection_fs::checksum::{self, ChecksumType};
use fault_injection_fs::{ChecksumHandoff, FaultInjectionFileSystem, FsError};
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    Append(Vec<u8>),
    Flush,
    Sync,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(Op::Append),
        Just(Op::Flush),
        Just(Op::Sync),
    ]
}

proptest! {
    /// 1. `0 <= pos_at_last_sync <= pos_at_last_flush <= pos` always holds for
    /// an open managed writable file, across any sequence of append/flush/sync.
    #[test]
    fn position_ordering_holds_across_any_op_sequence(ops in proptest::collection::vec(op_strategy(), 0..20)) {
        let dir = tempdir().unwrap();
        let fs = FaultInjectionFileSystem::new_posix(dir.path());
        let path = dir.path().join("ordered.log");
        let f = fs.new_writable_file(&path).unwrap();

        for op in ops {
            match op {
                Op::Append(bytes) => { let _ = f.append(&bytes); }
                Op::Flush => { let _ = f.flush(); }
                Op::Sync => { let _ = f.sync(); }
            }
            let state = fs.file_state(&path).unwrap();
            prop_assert!(state.pos_at_last_sync <= state.pos_at_last_flush || state.pos_at_last_flush == fault_injection_fs::file_state::NEVER);
            prop_assert!(state.pos_at_last_flush <= state.pos);
            prop_assert!(state.pos_at_last_sync <= state.pos);
        }
        f.close().unwrap();
    }

    /// 2. After `Sync` returns OK on a non-direct-I/O file, the buffer is
    /// empty and `pos_at_last_sync == pos`.
    #[test]
    fn sync_clears_buffer_and_catches_up_position(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
        let dir = tempdir().unwrap();
        let fs = FaultInjectionFileSystem::new_posix(dir.path());
        let path = dir.path().join("synced.log");
        let f = fs.new_writable_file(&path).unwrap();

        f.append(&payload).unwrap();
        f.sync().unwrap();

        let state = fs.file_state(&path).unwrap();
        prop_assert!(state.buffer.is_empty());
        prop_assert_eq!(state.pos_at_last_sync, state.pos);
        f.close().unwrap();
    }

    /// 3. After `DropUnsyncedFileData`, every tracked file's buffer is empty,
    /// and the underlying file recovers exactly its synced prefix.
    #[test]
    fn drop_unsynced_recovers_exactly_the_synced_prefix(
        synced in proptest::collection::vec(any::<u8>(), 0..32),
        unsynced in proptest::collection::vec(any::<u8>(), 0..32),
    ) {
        let dir = tempdir().unwrap();
        let fs = FaultInjectionFileSystem::new_posix(dir.path());
        let path = dir.path().join("drop.log");
        let f = fs.new_writable_file(&path).unwrap();

        f.append(&synced).unwrap();
        f.sync().unwrap();
        f.append(&unsynced).unwrap();
        f.flush().unwrap();

        fs.drop_unsynced_file_data();
        let state = fs.file_state(&path).unwrap();
        prop_assert!(state.buffer.is_empty());

        f.close().unwrap();
        let on_disk = std::fs::read(&path).unwrap();
        prop_assert_eq!(on_disk, synced);
    }

    /// 4. `DeleteFilesCreatedAfterLastDirSync` deletes files created since the
    /// last dir fsync and restores small (< 1 KiB) overwritten destinations
    /// byte-for-byte.
    #[test]
    fn dir_sync_restoration_matches_preservation_threshold(
        old_contents in proptest::collection::vec(any::<u8>(), 0..1023),
    ) {
        let dir = tempdir().unwrap();
        let fs = FaultInjectionFileSystem::new_posix(dir.path());

        let small = dir.path().join("small");
        std::fs::write(&small, &old_contents).unwrap();

        let tmp = dir.path().join("tmp");
        let ftmp = fs.new_writable_file(&tmp).unwrap();
        ftmp.append(b"new-contents").unwrap();
        ftmp.close().unwrap();

        fs.rename_file(&tmp, &small).unwrap();
        fs.delete_files_created_after_last_dir_sync().unwrap();

        prop_assert_eq!(std::fs::read(&small).unwrap(), old_contents);
    }

    /// 5. Checksum handoff round-trip: a correct checksum always appends
    /// (modulo unrelated injection, disabled here); a wrong one always fails
    /// with `Corruption` and buffers nothing.
    #[test]
    fn checksum_handoff_round_trips(payload in proptest::collection::vec(any::<u8>(), 1..64)) {
        let dir = tempdir().unwrap();
        let fs = FaultInjectionFileSystem::new_posix(dir.path());
        let path = dir.path().join("checksum.log");
        let f = fs.new_writable_file(&path).unwrap();

        let good = checksum::compute(ChecksumType::Crc32c, &payload);
        f.append_checked(&payload, ChecksumHandoff { ty: ChecksumType::Crc32c, checksum: good })
            .unwrap();

        let before = fs.file_state(&path).unwrap().buffer.len();
        let bad = vec![0xDEu8, 0xAD, 0xBE, 0xEF];
        let err = f
            .append_checked(&payload, ChecksumHandoff { ty: ChecksumType::Crc32c, checksum: bad })
            .unwrap_err();
        prop_assert!(matches!(err, FsError::Corruption(_)));
        prop_assert_eq!(fs.file_state(&path).unwrap().buffer.len(), before);
        f.close().unwrap();
    }

    /// 7. Rename bookkeeping: after `RenameFile(s, t)` succeeds, the tracked
    /// state moves from `s` to `t` iff `s` was tracked to begin with.
    #[test]
    fn rename_moves_tracked_state_iff_source_was_tracked(track_source in any::<bool>()) {
        let dir = tempdir().unwrap();
        let fs = FaultInjectionFileSystem::new_posix(dir.path());
        let src = dir.path().join("s");
        let dst = dir.path().join("t");

        if track_source {
            let f = fs.new_writable_file(&src).unwrap();
            f.append(b"x").unwrap();
            f.close().unwrap();
        } else {
            std::fs::write(&src, b"x").unwrap();
        }

        let was_tracked = fs.file_state(&src).is_some();
        prop_assert_eq!(was_tracked, track_source);

        fs.rename_file(&src, &dst).unwrap();

        prop_assert!(fs.file_state(&src).is_none());
        prop_assert_eq!(fs.file_state(&dst).is_some(), was_tracked);
    }
}

/// 6. `ResetState` is idempotent: calling it twice leaves the facade
/// observably identical to calling it once.
#[test]
fn reset_state_twice_matches_reset_state_once() {
    let dir = tempdir().unwrap();
    let fs_a = FaultInjectionFileSystem::new_posix(dir.path());
    fs_a.set_inactive(FsError::Inactive("boom".to_string()));
    fs_a.set_corrupt_before_write(true);
    fs_a.reset_state();

    let dir_b = tempdir().unwrap();
    let fs_b = FaultInjectionFileSystem::new_posix(dir_b.path());
    fs_b.set_inactive(FsError::Inactive("boom".to_string()));
    fs_b.set_corrupt_before_write(true);
    fs_b.reset_state();
    fs_b.reset_state();

    let path_a = dir.path().join("a");
    let path_b = dir_b.path().join("b");
    let fa = fs_a.new_writable_file(&path_a).unwrap();
    let fb = fs_b.new_writable_file(&path_b).unwrap();
    assert!(fa.append(b"hi").is_ok());
    assert!(fb.append(b"hi").is_ok());
    fa.close().unwrap();
    fb.close().unwrap();
}
