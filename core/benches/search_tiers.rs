use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use mineproof_core::*;

/// (label, size, mines, topology), roughly beginner to expert density.
const TIERS: [(&str, Coord2, CellCount, Topology); 4] = [
    ("beginner", (9, 9), 10, Topology::Moore),
    ("intermediate", (16, 16), 40, Topology::Moore),
    ("neumann", (16, 16), 30, Topology::Neumann),
    ("hex", (16, 16), 35, Topology::Hex),
];

fn request(size: Coord2, mines: CellCount, topology: Topology) -> LayoutRequest {
    LayoutRequest::new(size, topology, mines, (size.0 / 2, size.1 / 2))
        .expect("bench tiers are valid")
}

fn bench_oracle(c: &mut Criterion) {
    let mut group = c.benchmark_group("oracle");
    let oracle = DeductionOracle::default();

    for (label, size, mines, topology) in TIERS {
        let request = request(size, mines, topology);
        let layout = RandomLayoutGenerator::new(7)
            .generate(&request)
            .expect("sampling cannot fail");
        let mut field = Field::new(size, topology).expect("bench tiers are valid");

        group.bench_with_input(BenchmarkId::from_parameter(label), &layout, |b, layout| {
            b.iter(|| {
                request
                    .install(&mut field, layout)
                    .expect("layout fits the field");
                black_box(oracle.solve(&mut field, &StopToken::new()))
            })
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(10);
    let oracle = DeductionOracle::default();
    let workers = std::thread::available_parallelism().map_or(1, |n| n.get());

    for (label, size, mines, topology) in TIERS {
        let request = request(size, mines, topology);

        group.bench_function(BenchmarkId::new(label, workers), |b| {
            b.iter(|| {
                let handoff = MemoryHandoff::new();
                black_box(
                    LayoutSearch::new(&request, &oracle)
                        .with_workers(workers)
                        .with_budget(Duration::from_secs(60))
                        .run(&handoff),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_oracle, bench_search);
criterion_main!(benches);
