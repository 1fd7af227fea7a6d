use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use forest_kernel::{
    build_kernel, check_program, BuildOptions, KernelError, KernelParams, MachineConfig, Parallelism,
    Workload, BASELINE_CYCLES,
};

/// Generate, verify and simulate a forest-walk kernel.
#[derive(Debug, Parser)]
#[command(name = "forestc", version, about)]
struct Cli {
    /// Tree height in levels.
    #[arg(long, default_value_t = 10)]
    height: usize,

    /// Walk rounds.
    #[arg(long, default_value_t = 16)]
    rounds: usize,

    /// Number of walkers.
    #[arg(long, default_value_t = 256)]
    batch: usize,

    /// Seed for the random workload.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Machine description (JSON). Defaults to the standard machine.
    #[arg(long, value_name = "FILE")]
    machine: Option<PathBuf>,

    /// Temporary register sets. Searches when omitted.
    #[arg(long)]
    parallelism: Option<usize>,

    /// Gather and clamp every round instead of tracking tree levels.
    #[arg(long)]
    no_shortcuts: bool,

    /// Emit per-stage comparisons and check them during simulation.
    #[arg(long)]
    trace_checks: bool,

    /// Write the generated program as JSON.
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error ({:?}): {}", e.category(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), KernelError> {
    let config = match &cli.machine {
        Some(path) => MachineConfig::from_file(path)?,
        None => MachineConfig::default(),
    };
    let params = KernelParams::new(cli.height, cli.batch, cli.rounds);
    let options = BuildOptions {
        parallelism: cli.parallelism.map_or(Parallelism::Auto, Parallelism::Fixed),
        shortcuts: !cli.no_shortcuts,
        trace_checks: cli.trace_checks,
        ..BuildOptions::default()
    };

    let start = Instant::now();
    let kernel = build_kernel(&params, &config, &options)?;
    let build_time = start.elapsed();

    if let Some(path) = &cli.dump {
        if let Err(e) = fs::write(path, kernel.program.to_json_pretty()) {
            eprintln!("Warning: could not write {}: {}", path.display(), e);
        }
    }

    let workload = Workload::random(&params, cli.seed);
    let run = check_program(&kernel.program, &config, &workload, cli.trace_checks)?;

    println!(
        "height {}  nodes {}  batch {}  rounds {}",
        params.forest_height, params.n_nodes, params.batch_size, params.rounds
    );
    println!("Parallelism:           {:>6}", kernel.parallelism);
    println!("Critical path:         {:>6}", kernel.schedule.critical_path);
    println!("Build time:            {:>9.2?}", build_time);
    if cli.trace_checks {
        println!("Trace checks passed:   {:>6}", run.trace_checks);
    }
    println!("CYCLES: {}", kernel.cycles());
    if kernel.cycles() > 0 {
        println!("Speedup over baseline: {:.2}x", BASELINE_CYCLES as f64 / kernel.cycles() as f64);
    }
    println!();
    print!("{}", kernel.stats);
    Ok(())
}
