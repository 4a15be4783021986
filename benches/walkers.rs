//! Benchmarks for walker balancing.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use fractal_walkers::{
    compute::{
        Bounds, ContinuousUniform, Environment, FunctionEnv, Swarm, Walkers, relativize,
    },
    schema::{Landscape, WalkersConfig},
};

fn config(n_walkers: usize) -> WalkersConfig {
    WalkersConfig {
        n_walkers,
        accumulate_rewards: false,
        minimize: true,
        random_seed: Some(42),
        ..Default::default()
    }
}

fn bench_balance(c: &mut Criterion) {
    let mut group = c.benchmark_group("balance");

    for n_walkers in [64, 256, 1024, 4096] {
        let dims = 16;
        let mut env = FunctionEnv::from_landscape(
            Landscape::Rastrigin,
            Bounds::uniform(dims, -5.12, 5.12).unwrap(),
        )
        .with_seed(1);
        let env_states = env.reset(n_walkers).unwrap();

        let mut walkers = Walkers::new(
            config(n_walkers),
            &env.state_spec(),
            &Default::default(),
        )
        .unwrap();
        walkers.reset(Some(&env_states), None, None).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_walkers", n_walkers)),
            &n_walkers,
            |b, _| {
                b.iter(|| {
                    black_box(walkers.balance().unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_swarm_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("swarm_step");

    for dims in [2, 8, 32] {
        let env = FunctionEnv::from_landscape(
            Landscape::Sphere,
            Bounds::uniform(dims, -5.0, 5.0).unwrap(),
        )
        .with_seed(1);
        let model =
            ContinuousUniform::new(Bounds::uniform(dims, -0.1, 0.1).unwrap()).with_seed(2);
        let mut swarm = Swarm::new(config(256), env, model).unwrap();
        swarm.reset().unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_dims", dims)),
            &dims,
            |b, _| {
                b.iter(|| {
                    black_box(swarm.run_step().unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_relativize(c: &mut Criterion) {
    let values: Vec<f64> = (0..4096).map(|i| (i as f64 * 0.37).sin()).collect();
    c.bench_function("relativize_4096", |b| {
        b.iter(|| relativize(black_box(&values)));
    });
}

criterion_group!(benches, bench_balance, bench_swarm_step, bench_relativize);
criterion_main!(benches);
