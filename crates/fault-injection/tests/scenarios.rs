//! End-to-end scenarios S1-S6.

use fault_injection_fs::checksum::{self, ChecksumType};
use fault_injection_fs::{ChecksumHandoff, FaultInjectionFileSystem};
use tempfile::tempdir;

#[test]
fn s1_unsynced_drop() {
    let dir = tempdir().unwrap();
    let fs = FaultInjectionFileSystem::new_posix(dir.path());
    let path = dir.path().join("a.log");

    let f = fs.new_writable_file(&path).unwrap();
    f.append(b"hello").unwrap();
    f.flush().unwrap();

    fs.drop_unsynced_file_data();
    f.close().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"");
}

#[test]
fn s2_partial_sync() {
    let dir = tempdir().unwrap();
    let fs = FaultInjectionFileSystem::new_posix(dir.path());
    let path = dir.path().join("b.log");

    let f = fs.new_writable_file(&path).unwrap();
    f.append(b"abcd").unwrap();
    f.sync().unwrap();
    f.append(b"efgh").unwrap();

    fs.drop_unsynced_file_data();
    f.close().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"abcd");
}

#[test]
fn s3_dir_sync_ledger() {
    let dir = tempdir().unwrap();
    let fs = FaultInjectionFileSystem::new_posix(dir.path());

    let x = dir.path().join("x");
    let y = dir.path().join("y");
    let fx = fs.new_writable_file(&x).unwrap();
    fx.close().unwrap();
    let fy = fs.new_writable_file(&y).unwrap();
    fy.close().unwrap();

    let mut d = fs.new_directory(dir.path()).unwrap();
    d.fsync().unwrap();

    let z = dir.path().join("z");
    let fz = fs.new_writable_file(&z).unwrap();
    fz.close().unwrap();

    fs.delete_files_created_after_last_dir_sync().unwrap();

    assert!(x.exists());
    assert!(y.exists());
    assert!(!z.exists());
}

#[test]
fn s4_rename_preservation() {
    let dir = tempdir().unwrap();
    let fs = FaultInjectionFileSystem::new_posix(dir.path());

    let small = dir.path().join("small");
    std::fs::write(&small, b"old").unwrap();

    let tmp = dir.path().join("tmp");
    let ftmp = fs.new_writable_file(&tmp).unwrap();
    ftmp.append(b"new").unwrap();
    ftmp.close().unwrap();

    fs.rename_file(&tmp, &small).unwrap();
    fs.delete_files_created_after_last_dir_sync().unwrap();

    assert_eq!(std::fs::read(&small).unwrap(), b"old");
}

#[test]
fn s5_checksum_handoff() {
    let dir = tempdir().unwrap();
    let fs = FaultInjectionFileSystem::new_posix(dir.path());
    let path = dir.path().join("c.log");
    let f = fs.new_writable_file(&path).unwrap();

    let good_sum = checksum::compute(ChecksumType::Crc32c, b"payload");
    f.append_checked(
        b"payload",
        ChecksumHandoff {
            ty: ChecksumType::Crc32c,
            checksum: good_sum,
        },
    )
    .unwrap();

    let err = f
        .append_checked(
            b"payload",
            ChecksumHandoff {
                ty: ChecksumType::Crc32c,
                checksum: vec![0xDE, 0xAD, 0xBE, 0xEF],
            },
        )
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Origin checksum"));
    assert!(msg.contains("current checksum"));
}

#[test]
fn s6_read_error_program() {
    let dir = tempdir().unwrap();
    let fs = FaultInjectionFileSystem::new_posix(dir.path());
    let path = dir.path().join("r.log");
    let f = fs.new_writable_file(&path).unwrap();
    f.append(b"data").unwrap();
    f.close().unwrap();

    let r = fs.new_random_access_file(&path).unwrap();
    fs.set_read_error_program(1, 42);
    let mut buf = [0u8; 4];
    let err = r.read(0, &mut buf).unwrap_err();
    assert!(err.is_injected());
    assert_eq!(fs.read_error_count(), 1);
    assert!(!fs.read_error_last_message().is_empty());
    fs.disable_read_error_program();
}
