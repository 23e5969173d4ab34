#![allow(unused)]
extern crate ssapre;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ssapre::prelude::*;
use std::hint::black_box;

/// Chain of `count` diamonds. Every left arm and every merge computes `a + b`,
/// so each diamond carries one partial redundancy.
fn diamond_chain(count: usize) -> SsaFunction {
    SsaFunctionBuilder::new(3, 0).build_with(|f| {
        let (a, b, c) = (f.arg(0), f.arg(1), f.arg(2));
        for i in 0..count {
            let head = i * 3;
            f.block(head, |blk| blk.branch(c, head + 1, head + 2));
            f.block(head + 1, |blk| {
                let _ = blk.add(a, b);
                blk.jump(head + 3);
            });
            f.block(head + 2, |blk| blk.jump(head + 3));
        }
        f.block(count * 3, |blk| {
            let sum = blk.add(a, b);
            blk.ret_val(sum);
        });
    })
}

/// Profile where the arms without the computation are cold.
fn chain_profile(count: usize) -> FrequencyProfile {
    let mut profile = FrequencyProfile::new();
    for i in 0..count {
        let head = i * 3;
        profile.set_block_frequency(head, 100);
        profile.set_block_frequency(head + 1, 90);
        profile.set_block_frequency(head + 2, 10);
    }
    profile.set_block_frequency(count * 3, 100);
    profile
}

/// Benchmark classical placement against min-cut placement on growing inputs
///
/// The function is rebuilt outside the timed section so only the pass itself
/// is measured.
fn bench_diamond_chain(c: &mut Criterion) {
    let classical = SsaPrePass::new(PreConfig::classical());
    let speculative = SsaPrePass::new(PreConfig::default());

    let mut group = c.benchmark_group("ssapre_diamond_chain");
    for count in [4usize, 16, 64] {
        let profile = chain_profile(count);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("classical", count), &count, |b, &n| {
            b.iter_batched(
                || (diamond_chain(n), EventLog::new()),
                |(mut ssa, events)| {
                    let outcome = classical.run_function(&mut ssa, None, &events).unwrap();
                    black_box(outcome)
                },
                criterion::BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("min_cut", count), &count, |b, &n| {
            b.iter_batched(
                || (diamond_chain(n), EventLog::new()),
                |(mut ssa, events)| {
                    let outcome = speculative
                        .run_function(&mut ssa, Some(&profile), &events)
                        .unwrap();
                    black_box(outcome)
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_diamond_chain);
criterion_main!(benches);
