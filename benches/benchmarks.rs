//! Benchmark suite for refactor-swarm.
//!
//! Covers the pure, tool-free parts of a run:
//! - Batch scheduling over chains, fans and cycles
//! - Import extraction from Python source
//! - Signature extraction from Python source
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! cargo bench -- --save-baseline main
//! cargo bench -- --baseline main
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use refactor_swarm::graph::{extract_imports, extract_signatures, schedule_batches, DependencyGraph};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

// ============================================================================
// Graph construction helpers
// ============================================================================

fn module(i: usize) -> PathBuf {
    PathBuf::from(format!("/sb/mod_{:04}.py", i))
}

/// `mod_i` imports `mod_{i+1}`; the last module imports nothing.
fn chain(size: usize) -> DependencyGraph {
    let raw: BTreeMap<PathBuf, BTreeSet<String>> = (0..size)
        .map(|i| {
            let deps = if i + 1 < size {
                BTreeSet::from([format!("mod_{:04}", i + 1)])
            } else {
                BTreeSet::new()
            };
            (module(i), deps)
        })
        .collect();
    DependencyGraph::from_tokens(&raw)
}

/// Rings of `ring` modules, each ring importing the previous one.
fn rings(size: usize, ring: usize) -> DependencyGraph {
    let raw: BTreeMap<PathBuf, BTreeSet<String>> = (0..size)
        .map(|i| {
            let start = i - i % ring;
            let next = start + (i + 1 - start) % ring;
            let mut deps = BTreeSet::from([format!("mod_{:04}", next.min(size - 1))]);
            if start >= ring {
                deps.insert(format!("mod_{:04}", start - ring));
            }
            (module(i), deps)
        })
        .collect();
    DependencyGraph::from_tokens(&raw)
}

fn python_source(functions: usize) -> String {
    let mut source = String::from("import os\nfrom typing import List\nimport inventory.models\n\n");
    for i in 0..functions {
        source.push_str(&format!(
            "def handler_{i}(items: List[int], scale: float = 1.0) -> float:\n    return sum(items) * scale\n\n"
        ));
    }
    source.push_str(
        "class Store:\n    region: str = 'eu'\n\n    def __init__(self, name):\n        self.name = name\n        self.items = []\n",
    );
    source
}

// ============================================================================
// Scheduling Benchmarks
// ============================================================================

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_batches");

    for size in [10, 100, 500] {
        let acyclic = chain(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("chain", size), &acyclic, |b, graph| {
            b.iter(|| black_box(schedule_batches(black_box(graph))));
        });

        let cyclic = rings(size, 5);
        group.bench_with_input(BenchmarkId::new("rings_of_5", size), &cyclic, |b, graph| {
            b.iter(|| black_box(schedule_batches(black_box(graph))));
        });
    }

    group.finish();
}

// ============================================================================
// Extraction Benchmarks
// ============================================================================

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");

    for functions in [10, 100] {
        let source = python_source(functions);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("imports", functions), &source, |b, src| {
            b.iter(|| black_box(extract_imports(black_box(src))));
        });
        group.bench_with_input(BenchmarkId::new("signatures", functions), &source, |b, src| {
            b.iter(|| black_box(extract_signatures(black_box(src))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_schedule, bench_extraction);
criterion_main!(benches);
