// benches/benchmarks.rs — Performance benchmarks (criterion)
//
// The simulate stage dominates a refinement iteration:
//   1. Permanent evaluation — Ryser's formula, one call per output pattern
//   2. Full execution — compile, propagate, check, sample
//   3. Critique — findings and scores over an executed design

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use labloop::critique::PhysicsCritic;
use labloop::design::parse::parse_design;
use labloop::design::ExperimentDesign;
use labloop::simulation::permanent::{permanent, C64};
use labloop::simulation::{LinearOpticsExecutor, SimulationExecutor};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn random_matrix(n: usize, seed: u64) -> DMatrix<C64> {
    let mut rng = StdRng::seed_from_u64(seed);
    DMatrix::from_fn(n, n, |_, _| {
        C64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    })
}

/// `photons` single photons into the first modes of a Haar-random chip.
fn boson_sampler(modes: usize, photons: usize) -> ExperimentDesign {
    let mut components: Vec<String> = (0..photons)
        .map(|m| format!(r#"{{"id":"s{m}","type":"source","parameters":{{"mode":{m}}}}}"#))
        .collect();
    components.push(format!(
        r#"{{"id":"chip","type":"interferometer","parameters":{{"dimension":{modes},"kind":"haar","seed":7}}}}"#
    ));
    components.extend((0..modes).map(|m| {
        format!(r#"{{"id":"d{m}","type":"detector","parameters":{{"mode":{m}}}}}"#)
    }));
    let text = format!(
        r#"{{"title":"boson sampling {photons}x{modes}","modes":{modes},"components":[{}]}}"#,
        components.join(",")
    );
    parse_design(&text, 1).expect("benchmark design parses")
}

// ─── Benchmark: Permanent ───────────────────────────────────────────────────

fn bench_permanent(c: &mut Criterion) {
    let mut group = c.benchmark_group("permanent");
    for n in [4usize, 8, 12] {
        let m = random_matrix(n, n as u64);
        group.bench_with_input(BenchmarkId::from_parameter(n), &m, |b, m| {
            b.iter(|| permanent(black_box(m)))
        });
    }
    group.finish();
}

// ─── Benchmark: Execution ───────────────────────────────────────────────────

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");
    let executor = LinearOpticsExecutor::default().with_seed(1).with_shots(1000);

    for (modes, photons) in [(4usize, 2usize), (6, 3), (8, 4)] {
        let design = boson_sampler(modes, photons);
        group.bench_with_input(
            BenchmarkId::new("boson_sampling", format!("{photons}x{modes}")),
            &design,
            |b, d| b.iter(|| executor.execute(black_box(d))),
        );
    }
    group.finish();
}

// ─── Benchmark: Critique ────────────────────────────────────────────────────

fn bench_critique(c: &mut Criterion) {
    let design = boson_sampler(6, 3);
    let result = LinearOpticsExecutor::default()
        .with_seed(1)
        .with_shots(1000)
        .execute(&design);
    let critic = PhysicsCritic::new();

    c.bench_function("critique_6x3", |b| {
        b.iter(|| critic.evaluate(black_box(&design), black_box(&result)))
    });
}

criterion_group!(benches, bench_permanent, bench_execute, bench_critique);
criterion_main!(benches);
