//! Fixpoint and slicing benchmarks.
//!
//! Run with:
//! ```bash
//! cargo bench --bench fixpoint
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use microslice::dependency::{DataDependency, DataDependencyConfig, LocatedLValue};
use microslice::microcode::{Microcode, MicrocodeAddress};
use microslice::parser::parse_term;
use microslice::slicing::{compute_slice, find_useless_statements};
use microslice::term::Terms;

/// A chain of `n` assignments `r{i+1} := r{i} + [sp + i]`, with a store
/// every fourth step and a back edge every eighth.
fn build_chain(terms: &Terms, n: u64) -> Microcode {
    let mut mc = Microcode::new();
    let p = |i: u64| MicrocodeAddress::new(i * 4, 0);
    for i in 0..n {
        let (lval, rval) = if i % 4 == 3 {
            (format!("[%sp + {}]", i), format!("%r{}", i))
        } else {
            (format!("%r{}", i + 1), format!("%r{} + [%sp + {}]", i, i))
        };
        let lval = parse_term(terms, &lval).unwrap();
        let rval = parse_term(terms, &rval).unwrap();
        mc.add_assignment(terms, p(i), p(i + 1), lval, rval, None).unwrap();
        if i % 8 == 7 {
            mc.add_skip(p(i + 1), p(i - 6), None);
        }
    }
    mc
}

fn bench_fixpoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixpoint");

    for n in [16u64, 64, 256] {
        group.bench_with_input(BenchmarkId::new("simple_sets", n), &n, |b, &n| {
            b.iter(|| {
                let terms = Terms::default();
                let mc = build_chain(&terms, n);
                let seed = LocatedLValue::parse(&terms, MicrocodeAddress::new(n * 4, 0), &format!("%r{}", n)).unwrap();
                let mut dd = DataDependency::new(&terms, &mc, DataDependencyConfig::slicing(), &[seed]);
                dd.compute_fixpoint(mc.node_count())
            })
        });
    }

    group.finish();
}

fn bench_slicing(c: &mut Criterion) {
    let mut group = c.benchmark_group("slicing");

    for n in [16u64, 64] {
        group.bench_with_input(BenchmarkId::new("compute_slice", n), &n, |b, &n| {
            b.iter(|| {
                let terms = Terms::default();
                let mc = build_chain(&terms, n);
                let seed = terms.mk_register(&format!("r{}", n));
                compute_slice(&terms, &mc, MicrocodeAddress::new(n * 4, 0), seed).len()
            })
        });
        group.bench_with_input(BenchmarkId::new("useless", n), &n, |b, &n| {
            let terms = Terms::default();
            let mc = build_chain(&terms, n);
            b.iter(|| find_useless_statements(&terms, &mc).len())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fixpoint, bench_slicing);
criterion_main!(benches);
