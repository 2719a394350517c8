//! Relex CLI - Command-line interface
//!
//! Usage:
//!   relex export-vectors <corpus> <output>
//!   relex train-vectors <vectors> <model>
//!   relex test-vectors <vectors> <model>
//!   relex train <corpus> <model>
//!   relex devtest <corpus> <model>
//!   relex decode <corpus> <model>

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use relex_core::{ConfigError, LoggingConfig, RelexConfig};
use relex_extractor::alt_models::AltModelBank;
use relex_extractor::collector::PotentialRelationCollector;
use relex_extractor::corpus::load_corpus;
use relex_extractor::feature::{registry, FeatureTypeSet};
use relex_extractor::inventory::{EntityTypeSet, RelationTypeSet};
use relex_extractor::language::{relation_utilities, RelationUtilities};
use relex_extractor::tag_set::TagSet;
use relex_extractor::word_clusters::WordClusterTable;
use relex_extractor::{
    InstanceLayout, ObservationModel, ObservationResources, RelationInventory, RelationModel,
    RelationTrainer,
};

#[derive(Parser)]
#[command(name = "relex")]
#[command(about = "Relation extraction between entity mentions")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect candidate pairs from a corpus into a training-vector file
    ExportVectors {
        /// JSON-lines sentence corpus
        corpus: PathBuf,
        /// Training-vector file to write
        output: PathBuf,
    },
    /// Train the relation model from a training-vector file
    TrainVectors { vectors: PathBuf, model: PathBuf },
    /// Score a relation model against a training-vector file
    TestVectors { vectors: PathBuf, model: PathBuf },
    /// Train the observation model from a corpus
    Train { corpus: PathBuf, model: PathBuf },
    /// Decode a gold corpus and report recall and precision
    Devtest {
        corpus: PathBuf,
        model: PathBuf,
        /// Per-pair report file (stdout when omitted)
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
    /// Print decoded relations as JSON lines
    Decode { corpus: PathBuf, model: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RelexConfig::from_file(path)?.with_env_override()?,
        None => RelexConfig::from_env()?,
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::ExportVectors { corpus, output } => export_vectors(&config, &corpus, &output),
        Commands::TrainVectors { vectors, model } => {
            let mut relation_model = RelationModel::new(&config.model, inventory(&config)?)?;
            relation_model.train(&vectors)?;
            relation_model.save(&model)?;
            Ok(())
        }
        Commands::TestVectors { vectors, model } => {
            let relation_model = RelationModel::load(&model, &config.model, inventory(&config)?)?;
            let summary = relation_model.test_model(&vectors)?;
            println!(
                "{} out of {} total instances correct",
                summary.correct, summary.total
            );
            println!(
                "{} out of {} yes/no decisions correct",
                summary.yes_no_correct, summary.total
            );
            Ok(())
        }
        Commands::Train { corpus, model } => {
            let trainer = trainer(&config)?;
            let sentences = load_corpus(&corpus)?;
            let trained = trainer.train(&sentences, features(&config)?)?;
            trained.save(&model, &trainer.parameters())?;
            Ok(())
        }
        Commands::Devtest {
            corpus,
            model,
            report,
        } => {
            let trainer = trainer(&config)?;
            let observation_model = load_observation_model(&config, &model)?;
            let sentences = load_corpus(&corpus)?;
            let mut out: Box<dyn Write> = match &report {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path)
                        .with_context(|| format!("creating report {}", path.display()))?,
                )),
                None => Box::new(std::io::stdout().lock()),
            };
            trainer.dev_test(&sentences, &observation_model, &mut out)?;
            out.flush()?;
            Ok(())
        }
        Commands::Decode { corpus, model } => {
            let trainer = trainer(&config)?;
            let observation_model = load_observation_model(&config, &model)?;
            let sentences = load_corpus(&corpus)?;
            let decoded = trainer.decode(&sentences, &observation_model)?;
            let mut out = std::io::stdout().lock();
            for relation in &decoded {
                writeln!(out, "{}", serde_json::to_string(relation)?)?;
            }
            info!("Decoded {} relations", decoded.len());
            Ok(())
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// Resources
// ============================================================================

fn required<'a>(path: &'a Option<PathBuf>, key: &str) -> Result<&'a Path, ConfigError> {
    path.as_deref()
        .ok_or_else(|| ConfigError::MissingRequired(key.to_string()))
}

fn word_clusters(config: &RelexConfig) -> anyhow::Result<WordClusterTable> {
    let prefixes = &config.resources.word_cluster_prefix_lengths;
    Ok(match &config.resources.word_cluster_table {
        Some(path) => WordClusterTable::from_file(path, prefixes)?,
        None => WordClusterTable::new(prefixes),
    })
}

fn inventory(config: &RelexConfig) -> anyhow::Result<RelationInventory> {
    let resources = &config.resources;
    let types_file = required(&resources.relation_types_file, "resources.relation_types_file")?;
    Ok(RelationInventory {
        relation_types: Arc::new(RelationTypeSet::from_file(types_file)?),
        entity_types: Arc::new(EntityTypeSet::from_config(resources)),
        word_clusters: Arc::new(word_clusters(config)?),
        layout: InstanceLayout::from_names(&resources.instance_extensions)?,
    })
}

fn export_vectors(config: &RelexConfig, corpus: &Path, output: &Path) -> anyhow::Result<()> {
    let utilities = relation_utilities(&config.resources)?;
    let inventory = inventory(config)?;
    let collector = PotentialRelationCollector::new(
        utilities.as_ref(),
        &inventory.entity_types,
        &inventory.relation_types,
        &inventory.layout,
    );
    let sentences = load_corpus(corpus)?;
    let table = collector.collect_corpus(&sentences)?;
    table.save(output)?;
    info!("Wrote {} training vectors to {}", table.len(), output.display());
    Ok(())
}

fn observation_resources(config: &RelexConfig) -> anyhow::Result<ObservationResources> {
    let utilities: Arc<dyn RelationUtilities> = relation_utilities(&config.resources)?;
    let mut alt_models = AltModelBank::new();
    if config.observation.use_alt_models {
        alt_models = AltModelBank::from_specs(&config.observation.alt_models, &inventory(config)?)?;
    }
    Ok(ObservationResources::new(
        utilities,
        Arc::new(EntityTypeSet::from_config(&config.resources)),
    )
    .with_word_clusters(Arc::new(word_clusters(config)?))
    .with_alt_models(Arc::new(alt_models))
    .with_config(config.observation.clone()))
}

fn tag_set(config: &RelexConfig) -> anyhow::Result<TagSet> {
    let resources = &config.resources;
    let path = if config.trainer.filter_mode {
        required(&resources.filter_tag_set_file, "resources.filter_tag_set_file")?
    } else {
        required(&resources.tag_set_file, "resources.tag_set_file")?
    };
    Ok(TagSet::from_file(path)?)
}

fn features(config: &RelexConfig) -> anyhow::Result<FeatureTypeSet> {
    let path = required(&config.resources.features_file, "resources.features_file")?;
    Ok(FeatureTypeSet::from_file(
        &registry(),
        path,
        config.trainer.max_features_per_extraction,
    )?)
}

fn trainer(config: &RelexConfig) -> anyhow::Result<RelationTrainer> {
    Ok(RelationTrainer::new(
        config.trainer.clone(),
        observation_resources(config)?,
        tag_set(config)?,
    )?)
}

fn load_observation_model(config: &RelexConfig, path: &Path) -> anyhow::Result<ObservationModel> {
    Ok(ObservationModel::load(path, tag_set(config)?, features(config)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_devtest() {
        let cli = Cli::parse_from([
            "relex", "--config", "relex.toml", "devtest", "dev.jsonl", "obs.model", "-r", "out.txt",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("relex.toml")));
        assert!(matches!(
            cli.command,
            Commands::Devtest { report: Some(_), .. }
        ));
    }

    #[test]
    fn test_missing_resource_is_reported() {
        let config = RelexConfig::default();
        let err = features(&config).unwrap_err();
        assert!(err.to_string().contains("resources.features_file"));
    }
}
