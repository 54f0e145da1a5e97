use clcache_core::errors::ErrorKind;
use clcache_core::source::{expand_source, SourceExpander};
use indoc::indoc;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[test]
fn test_file_without_includes_is_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let source = indoc! {"
        kernel void power(global int* input, global int* output) {
            uint gid = get_global_id(0);
            output[gid] = input[gid];
        }
    "};
    write(temp_dir.path(), "device.cl", source);

    let expanded = expand_source(temp_dir.path().join("device.cl")).unwrap();
    assert_eq!(expanded, source);
}

#[test]
fn test_include_is_inlined_in_place() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "common.h", "#define N 4\n");
    write(
        temp_dir.path(),
        "k.cl",
        indoc! {r#"
            #include "common.h"
            kernel void k(global int* out) { out[0] = N; }
        "#},
    );

    let expanded = expand_source(temp_dir.path().join("k.cl")).unwrap();
    assert_eq!(
        expanded,
        "#define N 4\n\nkernel void k(global int* out) { out[0] = N; }\n"
    );
}

#[test]
fn test_include_resolved_relative_to_including_file() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "lib/math.h", "#include \"consts.h\"\nfloat sq(float x);\n");
    write(temp_dir.path(), "lib/consts.h", "#define PI 3.14159f\n");
    write(temp_dir.path(), "k.cl", "#include \"lib/math.h\"\n");

    let expanded = expand_source(temp_dir.path().join("k.cl")).unwrap();
    assert!(expanded.contains("#define PI 3.14159f"));
    assert!(expanded.contains("float sq(float x);"));
}

#[test]
fn test_same_include_twice_appears_once() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "common.h", "#define SHARED 1\n");
    write(temp_dir.path(), "a.h", "#include \"common.h\"\nint a;\n");
    write(temp_dir.path(), "b.h", "#include \"common.h\"\nint b;\n");
    write(
        temp_dir.path(),
        "k.cl",
        "#include \"common.h\"\n#include \"a.h\"\n#include \"b.h\"\n#include \"common.h\"\n",
    );

    let expanded = expand_source(temp_dir.path().join("k.cl")).unwrap();
    assert_eq!(occurrences(&expanded, "#define SHARED 1"), 1);
    assert_eq!(occurrences(&expanded, "int a;"), 1);
    assert_eq!(occurrences(&expanded, "int b;"), 1);
}

#[test]
fn test_include_through_different_spellings_appears_once() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "common.h", "#define SHARED 1\n");
    write(temp_dir.path(), "sub/x.h", "#include \"../common.h\"\n");
    write(temp_dir.path(), "k.cl", "#include \"common.h\"\n#include \"sub/x.h\"\n");

    let expanded = expand_source(temp_dir.path().join("k.cl")).unwrap();
    assert_eq!(occurrences(&expanded, "#define SHARED 1"), 1);
}

#[test]
fn test_include_cycle_terminates() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "a.cl", "#include \"b.cl\"\nint from_a;\n");
    write(temp_dir.path(), "b.cl", "#include \"a.cl\"\nint from_b;\n");

    let expanded = expand_source(temp_dir.path().join("a.cl")).unwrap();
    assert_eq!(occurrences(&expanded, "int from_a;"), 1);
    assert_eq!(occurrences(&expanded, "int from_b;"), 1);
}

#[test]
fn test_missing_include_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "k.cl", "#include \"missing.h\"\n");

    let err = expand_source(temp_dir.path().join("k.cl")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.to_string().contains("missing.h"));
}

#[test]
fn test_each_call_starts_with_fresh_include_set() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "common.h", "#define SHARED 1\n");
    write(temp_dir.path(), "k.cl", "#include \"common.h\"\n");

    let first = expand_source(temp_dir.path().join("k.cl")).unwrap();
    let second = expand_source(temp_dir.path().join("k.cl")).unwrap();
    assert_eq!(first, second);
    assert_eq!(occurrences(&second, "#define SHARED 1"), 1);
}

#[test]
fn test_backslash_include_path() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "lib/util.h", "int util;\n");
    write(temp_dir.path(), "k.cl", "#include \"lib\\util.h\"\n");

    let mut expander = SourceExpander::new();
    let expanded = expander.expand(temp_dir.path().join("k.cl")).unwrap();
    assert!(expanded.contains("int util;"));
    assert_eq!(expander.included_files().len(), 2);
}
