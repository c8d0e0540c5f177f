//! Command-line surface for `msmrs`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::entry::{load_config, run_fit, run_score, run_sweep_file, run_transform};
use crate::model::{FitOptions, DEFAULT_EPSILON, DEFAULT_MESH};

#[derive(Debug, Parser)]
#[command(name = "msmrs", version, about = "Cortical surface registration with FSL MSM")]
pub struct Cli {
    /// TOML tool config; defaults to `FSL_PATH` from the environment.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register source contrast maps onto target maps.
    Fit(FitArgs),
    /// Resample a contrast map through a fitted alignment.
    Transform(TransformArgs),
    /// R² of transformed source maps against target maps.
    Score(ScoreArgs),
    /// Fit and evaluate one alignment per regularization value.
    Sweep(SweepArgs),
}

#[derive(Debug, Args)]
pub struct FitArgs {
    /// Source `.func.gii` files; their darrays are concatenated in order.
    #[arg(long, required = true, num_args = 1..)]
    pub source: Vec<PathBuf>,

    /// Target `.func.gii` files, same number of darrays as the source.
    #[arg(long, required = true, num_args = 1..)]
    pub target: Vec<PathBuf>,

    #[arg(long, default_value = DEFAULT_MESH)]
    pub mesh: PathBuf,

    /// Output directory for the deformed mesh and model manifest.
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    #[arg(long, default_value_t = DEFAULT_EPSILON)]
    pub epsilon: f64,

    #[arg(long)]
    pub verbose: bool,

    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, Args)]
pub struct TransformArgs {
    /// Model manifest written by `fit`.
    #[arg(long)]
    pub model: PathBuf,

    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Debug, Args)]
pub struct ScoreArgs {
    #[arg(long)]
    pub model: PathBuf,

    #[arg(long)]
    pub source: PathBuf,

    #[arg(long)]
    pub target: PathBuf,
}

#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Sweep definition (epsilons, mesh, train/test pairs).
    #[arg(long)]
    pub sweep: PathBuf,

    /// Write results as CSV.
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Fit(args) => {
            let options = FitOptions {
                mesh_file: args.mesh,
                output_dir: args.out,
                verbose: args.verbose,
                debug: args.debug,
            };
            let (fitted, manifest) =
                run_fit(&config, args.epsilon, &args.source, &args.target, &options)?;
            println!("deformed mesh: {}", fitted.transformed_mesh_path.display());
            println!("model: {}", manifest.display());
        }
        Command::Transform(args) => {
            run_transform(&config, &args.model, &args.input, &args.out)?;
            println!("{}", args.out.display());
        }
        Command::Score(args) => {
            let score = run_score(&config, &args.model, &args.source, &args.target)?;
            println!("{score}");
        }
        Command::Sweep(args) => {
            let records = run_sweep_file(&config, &args.sweep, args.csv.as_deref())?;
            println!("epsilon\tcorrelation\tbaseline");
            for r in &records {
                println!("{}\t{:.4}\t{:.4}", r.epsilon, r.correlation, r.baseline_correlation);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_args_parse_with_defaults() {
        let cli = Cli::try_parse_from([
            "msmrs", "fit", "--source", "a.gii", "b.gii", "--target", "c.gii", "d.gii",
        ])
        .unwrap();
        match cli.command {
            Command::Fit(args) => {
                assert_eq!(args.source.len(), 2);
                assert_eq!(args.mesh, PathBuf::from(DEFAULT_MESH));
                assert_eq!(args.epsilon, DEFAULT_EPSILON);
                assert!(!args.verbose);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(cli.config.is_none());
    }

    #[test]
    fn global_config_after_subcommand() {
        let cli = Cli::try_parse_from([
            "msmrs", "sweep", "--sweep", "sweep.toml", "--config", "msmrs.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("msmrs.toml")));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
