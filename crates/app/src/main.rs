use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use bankin_assist::{DisambiguationSettings, Disambiguator, OpenAiBackend};
use bankin_core::{BatchStats, PipelineConfig};
use bankin_import::TrainedNameModel;
use bankin_app::{BatchPipeline, ResolutionContext};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bankin")]
#[command(about = "Resolve the customer behind each credit line of a bank-statement batch")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every batch listed in the configuration file
    Run {
        /// Pipeline configuration
        #[arg(env = "BANKIN_CONFIG", default_value = "bankin.toml")]
        config: PathBuf,
    },

    /// Train a name model from a `raw_name,clean_name` CSV
    Train {
        /// Labelled training pairs
        pairs: PathBuf,
        /// Where to write the model JSON
        model: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.command {
        Command::Run { config } => run(&config).await,
        Command::Train { pairs, model } => train(&pairs, &model),
    }
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = PipelineConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let context = ResolutionContext::load(&config).context("loading registries")?;

    let mut pipeline = BatchPipeline::<OpenAiBackend>::new(context);
    if config.assist.enabled {
        match OpenAiBackend::from_env(&config.assist) {
            Ok(backend) => {
                let settings = DisambiguationSettings::from_config(&config.thresholds, &config.assist);
                pipeline = pipeline.with_assistant(Disambiguator::new(backend, settings));
            }
            Err(e) => tracing::warn!("Assisted matching disabled: {e}"),
        }
    }
    if let Some(path) = &config.storage.path {
        let pool = bankin_storage::create_db(path)
            .await
            .with_context(|| format!("opening audit store {}", path.display()))?;
        pipeline = pipeline.with_store(pool);
    }

    let mut totals = BatchStats::default();
    let mut failed = 0;
    for spec in &config.batches {
        match pipeline.run_batch(spec, config.output_dir.as_deref()).await {
            Ok(report) => totals += report.stats,
            Err(e) => {
                tracing::error!("Batch {} failed: {e}", spec.input.display());
                failed += 1;
            }
        }
    }

    tracing::info!(
        "All batches: {} rows processed, {} matched, {} unresolved, {} assisted calls ({} failed)",
        totals.processed,
        totals.matched(),
        totals.unresolved,
        totals.ai_invocations,
        totals.ai_failures
    );
    if failed > 0 {
        bail!("{failed} of {} batches failed", config.batches.len());
    }
    Ok(())
}

fn train(pairs_path: &Path, model_path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::open(pairs_path).with_context(|| format!("opening {}", pairs_path.display()))?;
    let pairs = TrainedNameModel::read_training_pairs(file)?;
    let model = TrainedNameModel::train(&pairs)?;
    model.save(model_path)?;
    tracing::info!("Saved name model to {}", model_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_and_train() {
        let cli = Cli::try_parse_from(["bankin", "run", "conf/bankin.toml"]).unwrap();
        assert!(matches!(&cli.command, Command::Run { config } if config.as_path() == Path::new("conf/bankin.toml")));

        let cli = Cli::try_parse_from(["bankin", "train", "pairs.csv", "model.json"]).unwrap();
        match cli.command {
            Command::Train { pairs, model } => {
                assert_eq!(pairs, PathBuf::from("pairs.csv"));
                assert_eq!(model, PathBuf::from("model.json"));
            }
            Command::Run { .. } => panic!("expected train"),
        }
    }

    #[test]
    fn train_needs_both_paths() {
        let err = Cli::try_parse_from(["bankin", "train", "pairs.csv"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert!(Cli::try_parse_from(["bankin", "resolve"]).is_err());
    }
}
