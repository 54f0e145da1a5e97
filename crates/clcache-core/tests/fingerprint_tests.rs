use clcache_core::cache::{cache_file_name, compute_hash, fingerprint, format_fingerprint};
use proptest::prelude::*;
use std::path::Path;

#[test]
fn test_fingerprint_is_hash_of_concatenation() {
    let expected = compute_hash(b"kernel void k() {}-DN=4PlatDev");
    assert_eq!(fingerprint("kernel void k() {}", "-DN=4", "Plat", "Dev"), expected);
}

#[test]
fn test_option_change_changes_file_name() {
    let path = Path::new("kernels/k.cl");
    let a = cache_file_name(path, fingerprint("src", "-DN=4", "P", "D"));
    let b = cache_file_name(path, fingerprint("src", "-DN=8", "P", "D"));
    assert_ne!(a, b);
    assert!(a.starts_with("k.cl."));
    assert!(a.ends_with(".bin"));
}

#[test]
fn test_hex_width_matches_pointer_width() {
    let hex = format_fingerprint(fingerprint("s", "o", "p", "d"));
    assert_eq!(hex.len(), std::mem::size_of::<usize>() * 2);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
}

proptest! {
    #[test]
    fn prop_fingerprint_is_deterministic(
        source in ".{0,200}",
        options in "[ -~]{0,40}",
        platform in "[A-Za-z ]{1,20}",
        device in "[A-Za-z0-9 ]{1,20}",
    ) {
        prop_assert_eq!(
            fingerprint(&source, &options, &platform, &device),
            fingerprint(&source, &options, &platform, &device)
        );
    }

    #[test]
    fn prop_source_edit_changes_fingerprint(
        source in "[a-z ]{1,100}",
        extra in "[a-z]{1,10}",
    ) {
        let edited = format!("{}{}", source, extra);
        prop_assert_ne!(
            fingerprint(&source, "-DN=4", "P", "D"),
            fingerprint(&edited, "-DN=4", "P", "D")
        );
    }

    #[test]
    fn prop_device_name_changes_fingerprint(
        device in "[A-Za-z0-9]{1,20}",
        other in "[A-Za-z0-9]{1,20}",
    ) {
        prop_assume!(device != other);
        prop_assert_ne!(
            fingerprint("src", "-DN=4", "P", &device),
            fingerprint("src", "-DN=4", "P", &other)
        );
    }

    #[test]
    fn prop_cache_file_name_shape(hash in any::<usize>(), stem in "[a-z_]{1,12}") {
        let name = cache_file_name(Path::new(&format!("dir/{}.cl", stem)), hash);
        prop_assert_eq!(name, format!("{}.cl.{}.bin", stem, format_fingerprint(hash)));
    }
}
