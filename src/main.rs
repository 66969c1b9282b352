use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use wilson_fc::config::{RunConfig, SweepMode};
use wilson_fc::dynamics::ExecutionTier;
use wilson_fc::sweep::Sweep;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding global.json, simulation_parameters.json and plotting_parameters.json
    #[arg(long, default_value = "configs", global = true)]
    config_dir: PathBuf,

    /// Directory holding avg_sc_<group>_<scale>.csv and avg_fc_<group>_<scale>.csv
    #[arg(long, default_value = "data/avg_conn_matrices_no_subcortical", global = true)]
    data_dir: PathBuf,

    /// Use the SIMD coupling kernel when built with the `simd` feature
    #[arg(long, global = true)]
    simd: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sweep a single global coupling G over the structural connectome
    Run(Target),
    /// Sweep intra/inter-hemispheric couplings over the G1 x G2 grid
    RunHemispheric(Target),
}

#[derive(Args, Debug)]
struct Target {
    /// Where result tables, logs and artifacts are written
    #[arg(long)]
    results_dir: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt::init();

    let (mode, target, default_root) = match &cli.command {
        Command::Run(t) => (SweepMode::Uniform, t, "results_global"),
        Command::RunHemispheric(t) => (SweepMode::Hemispheric, t, "results_hemispheric"),
    };
    let results_dir = target
        .results_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_root));

    let config = RunConfig::load(&cli.config_dir)?;
    info!("Configuration loaded from {:?}", cli.config_dir);
    info!("Connectivity data: {:?}", cli.data_dir);

    let tier = if cli.simd {
        ExecutionTier::Simd
    } else {
        ExecutionTier::Scalar
    };
    if tier.effective() != tier {
        info!("SIMD requested but not compiled in; using the scalar kernel");
    }

    let rows = Sweep::new(&config, &cli.data_dir, results_dir, mode)
        .with_tier(tier)
        .run()?;
    info!("Finished {} simulations", rows.len());
    Ok(())
}
