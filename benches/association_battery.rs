use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seroscan::associate::run_association_battery;
use seroscan::config::{AnalysisConfig, InfectionTest};
use seroscan::stats::{spearman_test, welch_t_test};
use seroscan::types::{AntigenPanel, CohortTable, Participant};

const N_PARTICIPANTS: usize = 183;
const N_ANTIGENS: usize = 342;

fn synthetic_cohort(seed: u64) -> CohortTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let participants = (0..N_PARTICIPANTS)
        .map(|i| {
            let age_days: f64 = rng.gen_range(180.0..3650.0);
            let foi: f64 = rng.gen_range(0.0..2.0);
            Participant {
                id: format!("P{i:03}"),
                age_days: Some(age_days),
                age_years: Some(age_days / 365.25),
                age_months: Some(age_days / 30.42),
                infection_marker: Some(rng.gen_range(0.0..1.0)),
                force_of_infection: Some(foi),
                sqrt_force_of_infection: Some(foi.sqrt()),
                lifetime_exposure: Some(age_days / 365.25 * foi),
            }
        })
        .collect();
    let panel = AntigenPanel::new((0..N_ANTIGENS).map(|a| format!("Ag{a:03}")).collect());
    let levels = Array2::from_shape_fn((N_PARTICIPANTS, N_ANTIGENS), |_| rng.gen_range(0.0..4.0));
    CohortTable {
        participants,
        panel,
        levels,
    }
}

fn benchmark_battery(c: &mut Criterion) {
    let table = synthetic_cohort(0x5E20);
    let modes = [
        ("literal", InfectionTest::Literal),
        ("grouped", InfectionTest::Grouped { threshold: 0.5 }),
    ];

    let mut group = c.benchmark_group("association_battery");
    group.throughput(Throughput::Elements(N_ANTIGENS as u64));
    for (name, mode) in modes {
        let analysis = AnalysisConfig {
            infection_test: mode,
            ..AnalysisConfig::default()
        };
        group.bench_with_input(BenchmarkId::new("full_panel", name), &analysis, |b, input| {
            b.iter(|| {
                let report = run_association_battery(black_box(&table), black_box(input));
                black_box(report);
            });
        });
    }
    group.finish();
}

fn benchmark_single_tests(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xA55E);
    let x: Vec<f64> = (0..N_PARTICIPANTS).map(|_| rng.gen_range(0.0..1.0)).collect();
    let y: Vec<f64> = (0..N_PARTICIPANTS).map(|_| rng.gen_range(0.0..1.0)).collect();

    let mut group = c.benchmark_group("single_antigen");
    group.bench_function("spearman", |b| {
        b.iter(|| black_box(spearman_test(black_box(&x), black_box(&y))));
    });
    group.bench_function("welch", |b| {
        b.iter(|| black_box(welch_t_test(black_box(&x[..90]), black_box(&y[90..]))));
    });
    group.finish();
}

criterion_group!(association_battery, benchmark_battery, benchmark_single_tests);
criterion_main!(association_battery);
