//! Resolution and emission performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use tokc::*;

fn write_sources(dir: &TempDir, alias_count: usize) {
    let mut core = serde_json::Map::new();
    for i in 0..alias_count {
        core.insert(format!("step{}", i), json!({"value": i * 4}));
    }
    fs::write(
        dir.path().join("core.json"),
        serde_json::to_string(&json!({ "spacing": core })).unwrap(),
    )
    .unwrap();

    let mut aliases = serde_json::Map::new();
    for i in 0..alias_count {
        aliases.insert(
            format!("alias{}", i),
            json!({"value": format!("{{core.spacing.step{}}}", i)}),
        );
    }
    fs::write(
        dir.path().join("aliases.json"),
        serde_json::to_string(&json!({ "spacing": aliases })).unwrap(),
    )
    .unwrap();
}

fn bench_reference_resolution(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    write_sources(&dir, 100);

    let doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("aliases.json")).unwrap())
            .unwrap();

    c.bench_function("resolve_document_100_aliases", |b| {
        b.iter(|| {
            let mut resolver = TokenResolver::new(ResolverOptions {
                roots: vec![dir.path().to_path_buf()],
                structural_lookup: false,
            });
            black_box(resolver.resolve_document("aliases", black_box(&doc)))
        })
    });
}

fn bench_arithmetic_resolution(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("scale.json"),
        serde_json::to_string(&json!({"base": {"value": 8}, "ratio": {"value": 1.5}})).unwrap(),
    )
    .unwrap();

    c.bench_function("resolve_arithmetic", |b| {
        b.iter(|| {
            let mut resolver = TokenResolver::new(ResolverOptions {
                roots: vec![dir.path().to_path_buf()],
                structural_lookup: false,
            });
            black_box(resolver.resolve_value(
                black_box("({scale.base} * {scale.ratio}) + {scale.base}"),
                "bench",
            ))
        })
    });
}

fn bench_color_expressions(c: &mut Criterion) {
    c.bench_function("color_mix_oklch", |b| {
        b.iter(|| {
            let mut resolver = TokenResolver::new(ResolverOptions::default());
            black_box(try_parse_color(
                black_box("mix(#0ea5e9, #111827, 0.35)"),
                ColorFormat::Hex,
                &mut resolver,
                "bench",
            ))
        })
    });

    c.bench_function("color_on_contrast", |b| {
        b.iter(|| {
            let mut resolver = TokenResolver::new(ResolverOptions::default());
            black_box(try_parse_color(
                black_box("on_contrast(#888888, #eeeeee, #777777, 4.5)"),
                ColorFormat::Hex,
                &mut resolver,
                "bench",
            ))
        })
    });
}

fn bench_full_build(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("tokens");
    fs::create_dir_all(&source).unwrap();
    let inner = TempDir::new().unwrap();
    write_sources(&inner, 50);
    for name in ["core.json", "aliases.json"] {
        fs::copy(inner.path().join(name), source.join(name)).unwrap();
    }

    let options = BuildOptions {
        source_dirs: vec![source],
        cache_dir: dir.path().join("cache"),
        scss_dir: Some(dir.path().join("scss")),
        ..Default::default()
    };

    c.bench_function("full_build_two_documents", |b| {
        b.iter(|| build(black_box(&options)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_reference_resolution,
    bench_arithmetic_resolution,
    bench_color_expressions,
    bench_full_build
);

criterion_main!(benches);
