//! S3 — a directory with `age_limit = 60` drops a file whose mtime is 120s
//! old: the file is removed from the pool candidate set and exactly one
//! `DELETE_LOG` record with reason `AGE_INPUT` is written.

use afd_fabric::scan::{apply_age_limit, ScanCandidate};

#[test]
fn file_older_than_age_limit_is_deleted_and_logged_once() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("f.txt");
    std::fs::write(&src, vec![0u8; 37]).unwrap();

    let now = 1_000_000u64;
    let candidate = ScanCandidate { name: "f.txt".to_string(), path: src.clone(), size: 37, mtime_secs: now - 120 };

    let log_path = tmp.path().join("delete_log");
    let dir_id = 0xd1;
    let deleted = apply_age_limit(&candidate, dir_id, 60, now, &log_path).unwrap();

    assert!(deleted, "a file older than age_limit must be dropped");
    assert!(!src.exists(), "the source file must be removed from the input directory");

    let bytes = std::fs::read(&log_path).unwrap();
    assert!(!bytes.is_empty(), "exactly one delete_log record must be written");
    // dir_id is the second little-endian u32 field after file_size (u64).
    let logged_dir_id = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    assert_eq!(logged_dir_id, dir_id);
}

#[test]
fn file_within_age_limit_is_kept_and_not_logged() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("f.txt");
    std::fs::write(&src, b"still fresh").unwrap();

    let now = 1_000_000u64;
    let candidate = ScanCandidate { name: "f.txt".to_string(), path: src.clone(), size: 11, mtime_secs: now - 30 };
    let log_path = tmp.path().join("delete_log");
    let deleted = apply_age_limit(&candidate, 1, 60, now, &log_path).unwrap();

    assert!(!deleted);
    assert!(src.exists());
    assert!(!log_path.exists());
}
