use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use streamsim_core::AlgorithmKind;
use streamsim_sim::{LogTarget, ScenarioKind};

fn bench_congested_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("congested_run");
    group.sample_size(10);

    for algorithm in AlgorithmKind::ALL {
        let scenario = ScenarioKind::Congested
            .build(42, algorithm)
            .expect("scenario catalog is valid");
        group.bench_with_input(
            BenchmarkId::from_parameter(algorithm),
            &scenario,
            |b, scenario| {
                b.iter(|| {
                    let mut sim = scenario
                        .simulation(LogTarget::Memory)
                        .expect("memory logs never fail");
                    sim.run().expect("scenario runs to completion")
                });
            },
        );
    }
    group.finish();
}

fn bench_link_transmit(c: &mut Criterion) {
    use streamsim_core::SimTime;
    use streamsim_sim::{DeterministicRng, SharedLink};

    c.bench_function("link_transmit_2mb", |b| {
        let mut rng = DeterministicRng::from_seed(1);
        b.iter(|| {
            let mut link = SharedLink::builder().rate_bps(20_000_000).build();
            link.transmit(SimTime::ZERO, 2_000_000, &mut rng)
        });
    });
}

criterion_group!(benches, bench_congested_run, bench_link_transmit);
criterion_main!(benches);
