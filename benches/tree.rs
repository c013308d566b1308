// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use broadtree::{Aabb, RefineConfig, Tree, Vec3};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_aabb(rng: &mut StdRng, extent: f32) -> Aabb {
    let x = rng.gen_range(0.0..extent);
    let y = rng.gen_range(0.0..extent);
    let z = rng.gen_range(0.0..extent);
    Aabb::new(Vec3::new(x, y, z), Vec3::new(x + 1.0, y + 1.0, z + 1.0))
}

fn filled_tree(count: usize) -> Tree {
    let mut rng = StdRng::seed_from_u64(42);
    let mut tree = Tree::new(count as i32);
    let extent = (count as f32).cbrt() * 2.0;
    for _ in 0..count {
        tree.add(random_aabb(&mut rng, extent));
    }
    tree
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_add");
    for &count in &[100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut rng = StdRng::seed_from_u64(7);
            let extent = (count as f32).cbrt() * 2.0;
            b.iter(|| {
                let mut tree = Tree::new(count as i32);
                for _ in 0..count {
                    tree.add(random_aabb(&mut rng, extent));
                }
                std::hint::black_box(tree.leaf_count())
            });
        });
    }
    group.finish();
}

fn bench_refit_and_refine(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_refit_and_refine");
    for &count in &[1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || filled_tree(count),
                |mut tree| {
                    tree.refit_and_refine(0, RefineConfig::default()).unwrap();
                    std::hint::black_box(tree.node_count())
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_self_overlaps(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_self_overlaps");
    for &count in &[1_000usize, 10_000] {
        let tree = filled_tree(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let mut pairs = 0usize;
                tree.get_self_overlaps(&mut |_a: i32, _b: i32| pairs += 1);
                std::hint::black_box(pairs)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_add, bench_refit_and_refine, bench_self_overlaps);
criterion_main!(benches);
