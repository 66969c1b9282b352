//! Criterion benchmarks for the integrator and signal pipeline.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features simd
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use wilson_fc::coupling::Coupling;
use wilson_fc::dynamics::{ExecutionTier, ModelParams, Network, State};
use wilson_fc::integrator::{Integrator, TimeGrid};
use wilson_fc::matrix::Matrix;
use wilson_fc::metrics::correlation_matrix;
use wilson_fc::prng::Prng;
use wilson_fc::signal::filter_and_envelope;

fn params() -> ModelParams {
    ModelParams {
        mu: 1.0,
        sigma: 0.25,
        a_ee: 3.5,
        a_ie: 2.5,
        a_ii: 0.0,
        r_e: 0.5,
        r_i: 0.5,
        rho_e: 0.14,
        sqdt_d: 0.002 / 0.0001f64.sqrt(),
        tau_e: 0.01,
        tau_i: 0.02,
    }
}

fn ring_sc(n: usize) -> Matrix {
    let mut sc = Matrix::zeros(n, n);
    for i in 0..n {
        sc.set(i, (i + 1) % n, 1.0);
        sc.set((i + 1) % n, i, 1.0);
    }
    sc
}

/// 1000 integration steps with varying node counts.
fn bench_integrate_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("integrate_size");
    let params = params();
    let grid = TimeGrid::new(0.0, 1000.0, 1.0).unwrap();

    for size in [16, 68, 128, 256].iter() {
        group.throughput(Throughput::Elements(*size as u64 * 1000));
        let cm = Coupling::Uniform(0.5).build(&ring_sc(*size)).unwrap();
        let p = vec![0.4; *size];
        let q = vec![0.0; *size];

        group.bench_with_input(BenchmarkId::new("scalar", size), size, |b, &size| {
            let net = Network::new(&cm, &p, &q).unwrap();
            let integ = Integrator::new(net, &params, 0.0001, 10).unwrap();
            let mut rng = Prng::new(42);
            b.iter(|| {
                let (state, _) = integ
                    .integrate(&grid, State::broadcast(size, 0.1, 0.1, 1.0), 2.0, &mut rng)
                    .unwrap();
                black_box(state.e()[0])
            });
        });
    }

    group.finish();
}

/// Scalar vs SIMD coupling kernel at a fixed size.
fn bench_integrate_tiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("integrate_tier");
    let params = params();
    let grid = TimeGrid::new(0.0, 1000.0, 1.0).unwrap();
    let size = 256;
    let cm = Coupling::Uniform(0.5).build(&ring_sc(size)).unwrap();
    let p = vec![0.4; size];
    let q = vec![0.0; size];

    for tier in [ExecutionTier::Scalar, ExecutionTier::Simd] {
        group.bench_function(format!("{tier:?}_256"), |b| {
            let net = Network::new(&cm, &p, &q).unwrap();
            let integ = Integrator::new(net, &params, 0.0001, 10)
                .unwrap()
                .with_tier(tier);
            let mut rng = Prng::new(42);
            b.iter(|| {
                let (state, _) = integ
                    .integrate(&grid, State::broadcast(size, 0.1, 0.1, 1.0), 2.0, &mut rng)
                    .unwrap();
                black_box(state.e()[0])
            });
        });
    }

    group.finish();
}

/// Filtering, envelope and FC for a recorded window.
fn bench_signal_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal");
    let nodes = 68;

    for t_len in [1000, 5000].iter() {
        let mut rng = Prng::new(7);
        let mut activity = Matrix::zeros(*t_len, nodes);
        for node in 0..nodes {
            let mut col = vec![0.0; *t_len];
            rng.fill_normal(&mut col, 0.2, 0.05);
            activity.set_column(node, &col);
        }

        group.bench_with_input(BenchmarkId::new("envelope_fc", t_len), &activity, |b, a| {
            b.iter(|| {
                let (_, env) = filter_and_envelope(a, 0.001).unwrap();
                black_box(correlation_matrix(&env).get(0, 1))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_integrate_sizes,
    bench_integrate_tiers,
    bench_signal_pipeline
);
criterion_main!(benches);
