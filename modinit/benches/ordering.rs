use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modinit::prelude::*;
use modinit::{compute_levels, compute_order, validate};

// =============================================================================
// Graph Shapes
// =============================================================================

/// Each module depends on the one before it
fn chain(size: usize) -> ModuleGraph {
    let mut graph = ModuleGraph::new();
    for i in 0..size {
        let dep = (i > 0).then(|| format!("m{}", i - 1));
        let deps: Vec<&str> = dep.iter().map(String::as_str).collect();
        graph
            .register_sync(format!("m{i}"), &deps, || Ok(()))
            .unwrap();
    }
    graph
}

/// Layers of `width` modules, each depending on every module of the layer below
fn layered(layers: usize, width: usize) -> ModuleGraph {
    let mut graph = ModuleGraph::new();
    for layer in 0..layers {
        let below: Vec<String> = if layer == 0 {
            Vec::new()
        } else {
            (0..width).map(|i| format!("l{}_{i}", layer - 1)).collect()
        };
        let deps: Vec<&str> = below.iter().map(String::as_str).collect();
        for i in 0..width {
            graph
                .register_sync(format!("l{layer}_{i}"), &deps, || Ok(()))
                .unwrap();
        }
    }
    graph
}

/// Pseudo-random DAG: every module depends on up to four earlier modules
fn sparse(size: usize) -> ModuleGraph {
    let mut graph = ModuleGraph::new();
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    for i in 0..size {
        let mut deps = Vec::new();
        if i > 0 {
            for _ in 0..4 {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                deps.push(format!("n{}", state as usize % i));
            }
        }
        let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
        graph
            .register_sync(format!("n{i}"), &deps, || Ok(()))
            .unwrap();
    }
    graph
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_compute_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_order");

    for size in [100, 1_000, 10_000] {
        let graph = chain(size);
        group.bench_with_input(BenchmarkId::new("chain", size), &graph, |b, graph| {
            b.iter(|| black_box(compute_order(graph).unwrap()))
        });

        let graph = sparse(size);
        group.bench_with_input(BenchmarkId::new("sparse", size), &graph, |b, graph| {
            b.iter(|| black_box(compute_order(graph).unwrap()))
        });
    }

    let graph = layered(50, 20);
    group.bench_function("layered_50x20", |b| {
        b.iter(|| black_box(compute_order(&graph).unwrap()))
    });

    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");

    for size in [1_000, 10_000] {
        let graph = sparse(size);
        group.bench_with_input(BenchmarkId::new("sparse", size), &graph, |b, graph| {
            b.iter(|| validate(black_box(graph)).unwrap())
        });
    }

    group.finish();
}

fn bench_levels(c: &mut Criterion) {
    let graph = layered(50, 20);
    c.bench_function("compute_levels/layered_50x20", |b| {
        b.iter(|| black_box(compute_levels(&graph).unwrap()))
    });
}

fn bench_run(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("run");

    for (name, config) in [
        ("sequential", RunConfig::SEQUENTIAL),
        ("concurrent_8", RunConfig::concurrent(8)),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                rt.block_on(async {
                    let coordinator = Coordinator::new(config);
                    for layer in 0..10 {
                        for i in 0..20 {
                            let deps: Vec<String> = if layer == 0 {
                                Vec::new()
                            } else {
                                vec![format!("l{}_{i}", layer - 1)]
                            };
                            let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                            coordinator
                                .register(format!("l{layer}_{i}"), &deps, || async { Ok(()) })
                                .unwrap();
                        }
                    }
                    black_box(coordinator.run().await.unwrap())
                })
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compute_order,
    bench_validate,
    bench_levels,
    bench_run,
);
criterion_main!(benches);
