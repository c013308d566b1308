// Copyright 2016 broadtree Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use broadtree::{Aabb, BroadPhase, CollidableMobility, CollidableReference, Vec3};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_aabb(rng: &mut StdRng, extent: f32) -> Aabb {
    let x = rng.gen_range(0.0..extent);
    let y = rng.gen_range(0.0..extent);
    let z = rng.gen_range(0.0..extent);
    Aabb::new(Vec3::new(x, y, z), Vec3::new(x + 1.0, y + 1.0, z + 1.0))
}

fn populated_phase(count: usize) -> BroadPhase {
    let mut rng = StdRng::seed_from_u64(1234);
    let mut phase = BroadPhase::with_capacity(count as i32, 0);
    let extent = (count as f32).cbrt() * 2.0;
    for i in 0..count {
        let cref = CollidableReference::new(CollidableMobility::Dynamic, i as i32);
        phase.add_active(cref, random_aabb(&mut rng, extent));
    }
    phase
}

fn bench_full_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadphase_full_frame");
    for &count in &[1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || populated_phase(count),
                |mut phase| {
                    phase.update().unwrap();
                    let mut pairs = 0usize;
                    phase.get_self_overlaps(&mut |_a: i32, _b: i32| pairs += 1);
                    std::hint::black_box(pairs)
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_add_remove_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadphase_add_remove_churn");
    group.bench_function("1000_leaves_500_churned", |b| {
        b.iter_batched(
            || populated_phase(1_000),
            |mut phase| {
                let mut rng = StdRng::seed_from_u64(99);
                for i in (0..1_000i32).step_by(2) {
                    phase.remove_active_at(i).ok();
                    let cref = CollidableReference::new(CollidableMobility::Dynamic, i);
                    phase.add_active(cref, random_aabb(&mut rng, 40.0));
                }
                std::hint::black_box(phase.active_leaf_count())
            },
            criterion::BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_full_frame, bench_add_remove_churn);
criterion_main!(benches);
