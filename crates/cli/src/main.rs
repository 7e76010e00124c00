use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use extract::RuleClassifier;
use log::info;
use merge::{merge_databases, verify_merge};
use process::generate;
use std::{fs::read_to_string, path::PathBuf, thread};
use types::TileMakerConfig;

fn default_thread_count() -> usize {
    thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

#[derive(Parser)]
#[command(version, about, long_about)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an OSM PBF extract into an MBTiles database.
    Generate {
        #[arg(short = 'i', long)]
        osm_pbf_file: PathBuf,

        #[arg(short, long)]
        output_path: PathBuf,

        #[arg(short, long)]
        config_path: Option<PathBuf>,

        #[arg(short, long, default_value_t = default_thread_count())]
        threads: usize,
    },
    /// Merge two MBTiles databases into a third.
    Merge {
        #[arg(short = 'a', long)]
        source_a: PathBuf,

        #[arg(short = 'b', long)]
        source_b: PathBuf,

        #[arg(short, long)]
        output_path: PathBuf,

        #[arg(short, long)]
        config_path: Option<PathBuf>,
    },
    /// Check that every tile of `small` exists in `large`.
    Verify {
        #[arg(short, long)]
        small: PathBuf,

        #[arg(short, long)]
        large: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Args::parse();

    match cli.command {
        Commands::Generate {
            osm_pbf_file,
            output_path,
            config_path,
            threads,
        } => {
            let config = tile_maker_config(config_path.as_ref())?;
            let classifier = RuleClassifier::new(config.classifier.clone());
            info!("Read file {}", osm_pbf_file.display());
            let report = generate(&config, &classifier, &osm_pbf_file, &output_path, threads)
                .with_context(|| {
                    format!("Failed to generate tiles from {}", osm_pbf_file.display())
                })?;
            info!(
                "Wrote {} tiles to {}",
                report.tiles_written,
                output_path.display()
            );
        }
        Commands::Merge {
            source_a,
            source_b,
            output_path,
            config_path,
        } => {
            let config = tile_maker_config(config_path.as_ref())?;
            merge_databases(
                &source_a,
                &source_b,
                &output_path,
                &config.name,
                &config.description,
            )?;
        }
        Commands::Verify { small, large } => {
            let count = verify_merge(&small, &large)?;
            info!("{} tiles present", count);
        }
    }
    Ok(())
}

fn tile_maker_config(config_path: Option<&PathBuf>) -> Result<TileMakerConfig> {
    let Some(config_path) = config_path else {
        return Ok(TileMakerConfig::default());
    };
    let config_str = read_to_string(config_path)
        .with_context(|| format!("Could not read config {}", config_path.display()))?;
    serde_json::from_str(&config_str)
        .with_context(|| format!("Invalid config {}", config_path.display()))
}
