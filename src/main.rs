//! Neighborhood Change - Entry Point
//!
//! Runs single simulations and parameter sweeps from a TOML experiment file,
//! resumes runs from checkpoints and prints zone reports.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use neighborhood_change::core::config::ExperimentConfig;
use neighborhood_change::core::error::{Result, SimError};
use neighborhood_change::data::CityInputs;
use neighborhood_change::simulation::{
    best_fit, run_sweep, Checkpoint, JsonDirectorySink, Simulation,
};

/// Neighborhood Change - agents learning where to live
#[derive(Parser, Debug)]
#[command(name = "neighborhood-change")]
#[command(about = "Simulate residential relocation with learning agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the base simulation of an experiment
    Run {
        #[command(flatten)]
        setup: Setup,
    },
    /// Run every (rho, alpha) combination of an experiment
    Sweep {
        #[command(flatten)]
        setup: Setup,
    },
    /// Continue a run from a checkpoint file
    Resume {
        #[arg(long)]
        checkpoint: PathBuf,

        /// New final timestep (defaults to the checkpoint's own t_max)
        #[arg(long)]
        t_max: Option<u64>,

        /// Prefix for written checkpoint files (defaults to the checkpoint's own)
        #[arg(long)]
        city_key: Option<String>,

        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the zone summaries stored in a checkpoint
    Report {
        #[arg(long)]
        checkpoint: PathBuf,
    },
}

#[derive(Args, Debug)]
struct Setup {
    /// Experiment file (TOML); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// City inputs (JSON)
    #[arg(long, conflicts_with = "synthetic")]
    inputs: Option<PathBuf>,

    /// Generate a synthetic city with this many zones
    #[arg(long)]
    synthetic: Option<usize>,

    /// Seed for the synthetic city
    #[arg(long, default_value_t = 0)]
    city_seed: u64,

    /// Overrides the experiment's output directory
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Setup {
    fn experiment(&self) -> Result<ExperimentConfig> {
        let mut experiment = match &self.config {
            Some(path) => ExperimentConfig::load(path)?,
            None => ExperimentConfig::default(),
        };
        if let Some(output) = &self.output {
            experiment.output_dir = output.clone();
        }
        Ok(experiment)
    }

    fn inputs(&self) -> Result<CityInputs> {
        match (&self.inputs, self.synthetic) {
            (Some(path), _) => CityInputs::load(path),
            (None, Some(n_zones)) => CityInputs::synthetic(n_zones, self.city_seed),
            (None, None) => Err(SimError::InvalidInput(
                "either --inputs or --synthetic is required".into(),
            )),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("neighborhood_change=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run { setup } => run(&setup),
        Command::Sweep { setup } => sweep(&setup),
        Command::Resume {
            checkpoint,
            t_max,
            city_key,
            output,
        } => resume(&checkpoint, t_max, city_key, output),
        Command::Report { checkpoint } => report(&checkpoint),
    }
}

fn run(setup: &Setup) -> Result<()> {
    let experiment = setup.experiment()?;
    let inputs = setup.inputs()?;

    let mut simulation = Simulation::new(experiment.simulation.clone(), &inputs)?
        .with_city_key(experiment.city_key.as_str());
    let mut sink = JsonDirectorySink::new(&experiment.output_dir)?;
    let output = simulation.run(&mut sink)?;

    tracing::info!(files = sink.written().len(), dir = %experiment.output_dir.display(), "checkpoints written");
    println!("{}", output.to_json());
    Ok(())
}

fn sweep(setup: &Setup) -> Result<()> {
    let experiment = setup.experiment()?;
    let inputs = setup.inputs()?;

    let results = run_sweep(&experiment, &inputs)?;
    for result in &results {
        println!("{}", result.output.summary());
    }

    match best_fit(&results) {
        Some(best) => println!(
            "\nBest fit: rho={} alpha={} (calibration error {:.4})",
            best.rho,
            best.alpha,
            best.calibration_error().unwrap_or(f64::NAN)
        ),
        None => println!("\nNo zone has reference income; calibration skipped"),
    }
    Ok(())
}

fn resume(
    path: &Path,
    t_max: Option<u64>,
    city_key: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let checkpoint = Checkpoint::load(path)?;
    let output_dir = match output {
        Some(dir) => dir,
        None => path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let mut simulation = Simulation::from_checkpoint(checkpoint)?;
    if let Some(city_key) = city_key {
        simulation = simulation.with_city_key(city_key);
    }
    if let Some(t_max) = t_max {
        simulation.extend_to(t_max)?;
    }
    tracing::info!(
        timestep = simulation.timestep(),
        t_max = simulation.config().t_max,
        "resuming from checkpoint"
    );

    let mut sink = JsonDirectorySink::new(output_dir)?;
    let output = simulation.run(&mut sink)?;
    println!("{}", output.to_json());
    Ok(())
}

fn report(path: &Path) -> Result<()> {
    let checkpoint = Checkpoint::load(path)?;
    let summaries = checkpoint.zone_summaries()?;

    println!(
        "t={} rho={} alpha={} agents={}",
        checkpoint.timestep,
        checkpoint.config.rho,
        checkpoint.config.alpha,
        checkpoint.agents.len()
    );
    println!(
        "{:>5}  {:<24} {:>6} {:>10} {:>10} {:>10}",
        "zone", "name", "pop", "avg_dow", "norm_dow", "expected"
    );
    for zone in &summaries {
        let fmt_opt = |v: Option<f64>| v.map(|x| format!("{:.4}", x)).unwrap_or_else(|| "-".into());
        println!(
            "{:>5}  {:<24} {:>6} {:>10.4} {:>10} {:>10}",
            zone.id,
            zone.name,
            zone.population,
            zone.avg_endowment,
            fmt_opt(zone.normalized_endowment),
            fmt_opt(zone.expected_income),
        );
    }
    Ok(())
}
