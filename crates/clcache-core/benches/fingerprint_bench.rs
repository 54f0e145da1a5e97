use clcache_core::cache::{compute_hash, fingerprint};
use clcache_core::expand_source;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fs;
use tempfile::TempDir;

fn bench_fingerprint_small(c: &mut Criterion) {
    let source = r#"
        kernel void saxpy(float a, global const float* x, global float* y) {
            uint gid = get_global_id(0);
            y[gid] = a * x[gid] + y[gid];
        }
    "#;

    c.bench_function("fingerprint_small", |b| {
        b.iter(|| {
            fingerprint(
                black_box(source),
                black_box("-DN=4 -cl-kernel-arg-info"),
                black_box("NVIDIA CUDA"),
                black_box("GeForce RTX 3080"),
            )
        })
    });
}

fn bench_hash_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_scaling");

    for size in [1_024usize, 16_384, 262_144].iter() {
        let data = vec![b'x'; *size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| compute_hash(black_box(data)))
        });
    }

    group.finish();
}

fn bench_expand_includes(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let mut root = String::new();
    for i in 0..20 {
        let header = format!("inc{}.h", i);
        fs::write(
            temp_dir.path().join(&header),
            format!("#include \"common.h\"\n#define VALUE_{} {}\n", i, i),
        )
        .unwrap();
        root.push_str(&format!("#include \"{}\"\n", header));
    }
    fs::write(temp_dir.path().join("common.h"), "#define SHARED 1\n").unwrap();
    root.push_str("kernel void k(global int* out) { out[0] = SHARED; }\n");
    let path = temp_dir.path().join("k.cl");
    fs::write(&path, root).unwrap();

    c.bench_function("expand_twenty_includes", |b| {
        b.iter(|| expand_source(black_box(&path)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_fingerprint_small,
    bench_hash_scaling,
    bench_expand_includes
);
criterion_main!(benches);
