use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use contact_pipeline::app::ImportUseCase;
use contact_pipeline::config::Config;
use contact_pipeline::constants::METRICS_ADDR_ENV;
use contact_pipeline::domain::Contact;
use contact_pipeline::infra::JsonFileOutputAdapter;
use contact_pipeline::logging;
use contact_pipeline::metrics;
use contact_pipeline::pipeline::batch::BatchProcessor;
use contact_pipeline::pipeline::ingestion::{CachedContactStore, ContactStore, JsonFileContactStore};
use contact_pipeline::pipeline::processing::normalize::{NormalizationService, NormalizationStats, RuleAction};
use contact_pipeline::pipeline::processing::similarity::FeatureGrouper;

#[derive(Parser)]
#[command(name = "contact_pipeline")]
#[command(about = "Contact normalization and duplicate grouping")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (defaults to $CONTACT_PIPELINE_CONFIG or contact_pipeline.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply normalization rules to a JSON array of contacts
    Normalize {
        /// Input JSON file
        #[arg(long)]
        input: PathBuf,
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Normalize and group duplicates in batches
    Process {
        /// Input JSON file
        #[arg(long)]
        input: PathBuf,
        /// Output file for the full result; only the report is printed when omitted
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        threshold: Option<f64>,
        /// Group batch representatives once more across batches
        #[arg(long)]
        reconcile: bool,
        /// Skip the field normalizer and group contacts as given
        #[arg(long)]
        no_normalize: bool,
    },
    /// List the active normalization rules
    Rules,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NormalizeOutput {
    contacts: Vec<Contact>,
    stats: NormalizationStats,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load_or_default(Config::default_path())?,
    };
    Ok(config)
}

fn build_normalizer(config: &Config) -> anyhow::Result<NormalizationService> {
    let service = NormalizationService::new();
    for rule in config.custom_rules()? {
        service.add_custom_rule(rule);
    }
    Ok(service)
}

fn read_contacts(path: &Path) -> anyhow::Result<Vec<Contact>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse contacts in {}", path.display()))
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", body),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    logging::init_logging();

    if let Ok(addr) = std::env::var(METRICS_ADDR_ENV) {
        match addr.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => warn!("Ignoring {}={}: {}", METRICS_ADDR_ENV, addr, e),
        }
    }

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Normalize { input, output } => {
            let normalizer = build_normalizer(&config)?;
            let contacts = read_contacts(&input)?;
            let result = normalizer.normalize_contacts(&contacts);
            write_json(
                &NormalizeOutput {
                    contacts: result.normalized,
                    stats: result.stats,
                },
                output.as_deref(),
            )?;
        }
        Commands::Process {
            input,
            output,
            batch_size,
            threshold,
            reconcile,
            no_normalize,
        } => {
            let mut processor = BatchProcessor::new(Arc::new(FeatureGrouper::new()));
            if !no_normalize {
                processor = processor.with_normalizer(Arc::new(build_normalizer(&config)?));
            }

            let mut store = CachedContactStore::new(JsonFileContactStore::new(&input), config.store.cache_ttl());
            if let Some(limiter) = config.store.rate_limiter() {
                store = store.with_rate_limiter(limiter);
            }
            let store: Arc<dyn ContactStore> = Arc::new(store);

            let mut use_case = ImportUseCase::new(store, Arc::new(processor), config.store.page_size);
            if let Some(path) = output {
                use_case = use_case.with_output(Arc::new(JsonFileOutputAdapter::new(path)));
            }

            let mut options = config.batch_options();
            if let Some(batch_size) = batch_size {
                options = options.batch_size(batch_size);
            }
            if let Some(threshold) = threshold {
                options = options.similarity_threshold(threshold);
            }
            if reconcile {
                options = options.cross_batch_reconciliation(true);
            }
            let options = options
                .on_progress(|percent, stage| info!("{}: {}%", stage, percent))
                .on_error(|e| warn!("Batch error: {}", e));

            let (report, _) = use_case.run(options).await?;
            write_json(&report, None)?;
        }
        Commands::Rules => {
            let normalizer = build_normalizer(&config)?;
            for (index, rule) in normalizer.rules().iter().enumerate() {
                let kind = match &rule.action {
                    RuleAction::Pattern { pattern, .. } => format!("pattern {}", pattern.as_str()),
                    RuleAction::Transform { .. } => "transform".to_string(),
                };
                println!("{:>2}. [{}] {} ({})", index + 1, rule.field, rule.description, kind);
            }
        }
    }

    Ok(())
}
