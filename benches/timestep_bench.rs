use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use neighborhood_change::core::config::SimulationConfig;
use neighborhood_change::data::CityInputs;
use neighborhood_change::simulation::Simulation;

fn bench_timestep(c: &mut Criterion) {
    let mut group = c.benchmark_group("timestep");
    let inputs = CityInputs::synthetic(100, 0).unwrap();

    for agents in [150usize, 1_000, 5_000] {
        group.bench_with_input(BenchmarkId::new("agents", agents), &agents, |b, &agents| {
            b.iter_batched(
                || {
                    let config = SimulationConfig {
                        num_agents: agents,
                        ..Default::default()
                    };
                    Simulation::new(config, &inputs).unwrap()
                },
                |mut sim| {
                    sim.step().unwrap();
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(timestep_benches, bench_timestep);
criterion_main!(timestep_benches);
