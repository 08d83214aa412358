//! S7 — a typesize profile mismatch refuses attach instead of silently
//! interpreting bytes laid out under a different build, and leaves no
//! partial state behind: the on-disk file is untouched by the failed
//! check.

use afd_fabric::error::AreaError;
use afd_fabric::typesize::{check_typesize_data, TypesizeProfile, TYPESIZE_FILE};

#[test]
fn mutated_profile_is_refused_with_version_mismatch_shaped_error() {
    let tmp = tempfile::tempdir().unwrap();

    // Seed a profile from a different build (narrower off_t).
    let mut mutated = TypesizeProfile::current();
    mutated.off_t_bits = 32;
    mutated.layout_version = TypesizeProfile::current().layout_version + 1;
    std::fs::write(tmp.path().join(TYPESIZE_FILE), serde_json::to_string_pretty(&mutated).unwrap()).unwrap();

    let before = std::fs::read_to_string(tmp.path().join(TYPESIZE_FILE)).unwrap();
    let err = check_typesize_data(tmp.path()).unwrap_err();
    assert!(matches!(err, AreaError::TypesizeMismatch(_)));

    let after = std::fs::read_to_string(tmp.path().join(TYPESIZE_FILE)).unwrap();
    assert_eq!(before, after, "a refused attach must not rewrite or otherwise touch the on-disk profile");
}

#[test]
fn matching_profile_is_accepted() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join(TYPESIZE_FILE),
        serde_json::to_string_pretty(&TypesizeProfile::current()).unwrap(),
    )
    .unwrap();
    assert!(check_typesize_data(tmp.path()).is_ok());
}
