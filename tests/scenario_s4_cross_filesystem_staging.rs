//! S4 — when the source and the pool live on different filesystems (the
//! `IN_SAME_FILESYSTEM` flag unset), staging falls back to a block copy
//! that preserves the source's mtime and reports the right byte count.

use afd_fabric::scan::{stage_file, StageFlags, StageMethod};

#[test]
fn cross_filesystem_staging_block_copies_and_preserves_mtime() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("a.bin");
    std::fs::write(&src, vec![7u8; 8192]).unwrap();

    let src_mtime = std::fs::metadata(&src).unwrap().modified().unwrap();

    let dest_dir = tmp.path().join("pool/0");
    let flags = StageFlags { in_same_filesystem: false, do_not_link_files: false, rename_one_job_only: false };
    let method = stage_file(&src, &dest_dir, "a.bin", flags).unwrap();

    assert_eq!(method, StageMethod::BlockCopy);
    let dest = dest_dir.join("a.bin");
    let staged = std::fs::read(&dest).unwrap();
    assert_eq!(staged.len(), 8192);

    let dest_mtime = std::fs::metadata(&dest).unwrap().modified().unwrap();
    let src_secs = src_mtime.duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
    let dest_secs = dest_mtime.duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
    assert_eq!(src_secs, dest_secs, "block copy must preserve the source's mtime");
}
