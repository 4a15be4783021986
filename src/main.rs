//! Fractal walkers CLI - Optimize a benchmark landscape from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::path::PathBuf;

use fractal_walkers::{
    compute::{
        Bounds, ContinuousUniform, FunctionEnv, Model, NormalContinuous, Swarm, SwarmError,
    },
    schema::{ModelConfig, RunConfig, SwarmResult},
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json>", args[0]);
        eprintln!();
        eprintln!("Minimize or maximize a benchmark function with a walker swarm.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to run configuration file");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let mut config = RunConfig::from_path(&config_path).unwrap_or_else(|e| {
        eprintln!("Error loading config: {}", e);
        std::process::exit(1);
    });

    // Fix the seed so the run can be repeated
    let seed = config.walkers.random_seed.unwrap_or_else(rand::random);
    config.walkers.random_seed = Some(seed);

    println!("Fractal Walkers");
    println!("===============");
    println!("Landscape: {:?} in {} dimensions", config.landscape, config.dims);
    println!("Bounds: [{}, {}]", config.low, config.high);
    println!("Walkers: {}", config.walkers.n_walkers);
    println!(
        "Objective: {}",
        if config.walkers.minimize {
            "minimize"
        } else {
            "maximize"
        }
    );
    println!("Seed: {}", seed);
    println!();

    let result = build_and_run(&config, seed).unwrap_or_else(|e| {
        eprintln!("Error running swarm: {}", e);
        std::process::exit(1);
    });

    println!();
    println!("Best solution:");
    println!("  Reward: {:.6}", result.best_reward);
    println!("  Point: {:?}", result.best_observation);
    println!("  Stopped: {:?}", result.stop_reason);
    println!(
        "Time: {:.2}s ({:.1} iterations/s)",
        result.elapsed_seconds,
        result.iterations as f64 / result.elapsed_seconds
    );
}

fn build_and_run(config: &RunConfig, seed: u64) -> Result<SwarmResult, SwarmError> {
    let bounds = Bounds::uniform(config.dims, config.low, config.high)?;
    let env =
        FunctionEnv::from_landscape(config.landscape, bounds).with_seed(seed.wrapping_add(1));

    let step = config.model.step();
    let action_bounds = Bounds::uniform(config.dims, -step, step)?;
    match config.model {
        ModelConfig::Uniform { .. } => {
            let model = ContinuousUniform::new(action_bounds).with_seed(seed.wrapping_add(2));
            run_swarm(config, env, model)
        }
        ModelConfig::Normal { loc, scale, .. } => {
            let model =
                NormalContinuous::new(loc, scale, action_bounds)?.with_seed(seed.wrapping_add(2));
            run_swarm(config, env, model)
        }
    }
}

fn run_swarm<M: Model>(
    config: &RunConfig,
    env: FunctionEnv,
    model: M,
) -> Result<SwarmResult, SwarmError> {
    let mut swarm = Swarm::new(config.walkers.clone(), env, model)?;
    let interval = config
        .walkers
        .max_iters
        .map_or(100, |max_iters| (max_iters / 10).max(1));

    println!("Running swarm...");
    swarm.run_with_callback(|progress| {
        // Print progress every 10%
        if progress.iteration > 0 && progress.iteration % interval == 0 {
            println!(
                "  Iteration {}: best={:.6}, efficiency={:.3}, dead={:.1}%, cloned={:.1}%",
                progress.iteration,
                progress.best_reward,
                progress.efficiency,
                progress.dead_fraction * 100.0,
                progress.cloned_fraction * 100.0
            );
        }
    })
}

fn print_example_config() {
    let config = RunConfig::default();

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example config: {}", e),
    }
}
