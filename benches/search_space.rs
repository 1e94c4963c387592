use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use segnas::nas::{SearchSpaceConfig, SegmentationSearchSpace};

fn space(max_layers: usize) -> SegmentationSearchSpace {
    let config = SearchSpaceConfig::new("bench")
        .with_layers(1, max_layers)
        .with_img_size(256);
    SegmentationSearchSpace::with_defaults(config).unwrap()
}

fn bench_random_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_sample");

    for max_layers in [4, 12, 24].iter() {
        let space = space(*max_layers);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        group.bench_with_input(BenchmarkId::from_parameter(max_layers), max_layers, |b, _| {
            b.iter(|| black_box(space.random_sample(&mut rng)))
        });
    }

    group.finish();
}

fn bench_operators(c: &mut Criterion) {
    let space = space(12);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
    let parent_a = space.random_sample(&mut rng);
    let parent_b = space.random_sample(&mut rng);

    c.bench_function("get_neighbors", |b| {
        b.iter(|| black_box(space.get_neighbors(&parent_a, 10, &mut rng)))
    });

    c.bench_function("crossover", |b| {
        b.iter(|| black_box(space.crossover(&parent_a, &parent_b, 10, &mut rng)))
    });

    c.bench_function("get_arch_repr", |b| {
        b.iter(|| black_box(space.get_arch_repr(&parent_a).unwrap()))
    });
}

criterion_group!(benches, bench_random_sample, bench_operators);
criterion_main!(benches);
