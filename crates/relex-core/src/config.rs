//! Relex Configuration Management
//!
//! Handles configuration from environment variables and TOML files.
//! Training parameters that have no safe default are optional here and
//! checked by `validate()` before any training starts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelexConfig {
    /// Training-vector relation model parameters
    pub model: ModelConfig,

    /// Observation-based trainer parameters
    pub trainer: TrainerConfig,

    /// Observation construction switches
    pub observation: ObservationConfig,

    /// Resource files and entity type inventory
    pub resources: ResourceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl RelexConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Relation model
        if let Ok(value) = std::env::var("RELEX_SPLIT_LEVEL") {
            config.model.is_split_level_decision = Some(parse_bool("RELEX_SPLIT_LEVEL", &value)?);
        }
        if let Ok(mode) = std::env::var("RELEX_TRAIN_MODE") {
            config.model.train_mode = Some(mode.parse()?);
        }
        if let Ok(criterion) = std::env::var("RELEX_STOP_CRITERION") {
            config.model.stop_criterion = Some(criterion.parse()?);
        }
        if let Ok(percent) = std::env::var("RELEX_PERCENT_HELD_OUT") {
            config.model.percent_held_out =
                Some(percent.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "RELEX_PERCENT_HELD_OUT".to_string(),
                    value: percent,
                })?);
        }

        // Resources
        if let Ok(language) = std::env::var("RELEX_LANGUAGE") {
            config.resources.language = language.parse()?;
        }
        if let Ok(path) = std::env::var("RELEX_WORD_CLUSTER_TABLE") {
            config.resources.word_cluster_table = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("RELEX_RELATION_TYPES") {
            config.resources.relation_types_file = Some(PathBuf::from(path));
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;

        if env_config.model.is_split_level_decision.is_some() {
            self.model.is_split_level_decision = env_config.model.is_split_level_decision;
        }
        if env_config.model.train_mode.is_some() {
            self.model.train_mode = env_config.model.train_mode;
        }
        if env_config.model.stop_criterion.is_some() {
            self.model.stop_criterion = env_config.model.stop_criterion;
        }
        if env_config.model.percent_held_out.is_some() {
            self.model.percent_held_out = env_config.model.percent_held_out;
        }
        if env_config.resources.language != ResourceConfig::default().language {
            self.resources.language = env_config.resources.language;
        }
        if env_config.resources.word_cluster_table.is_some() {
            self.resources.word_cluster_table = env_config.resources.word_cluster_table;
        }
        if env_config.resources.relation_types_file.is_some() {
            self.resources.relation_types_file = env_config.resources.relation_types_file;
        }
        if env_config.logging.level != LoggingConfig::default().level {
            self.logging.level = env_config.logging.level;
        }

        Ok(self)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Relation model (training-vector driver) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Consult a binary existence model before the type model
    pub is_split_level_decision: Option<bool>,

    /// Iterative scaling variant
    pub train_mode: Option<TrainMode>,

    /// Stopping criterion for training
    pub stop_criterion: Option<StopCriterion>,

    /// Percentage of events held out for likelihood checks (0-100)
    pub percent_held_out: Option<u32>,

    /// Gaussian prior variance, required for IIS_GAUSSIAN
    pub gaussian_variance: Option<f64>,

    /// Features added per round in IIS_FEATURE_SELECTION (1-10)
    pub num_features_to_add: usize,

    /// Features seen fewer times than this are pruned
    pub pruning_cutoff: u32,

    /// Convergence threshold
    pub threshold: f64,

    /// Iteration cap for the inner scaling loop
    pub max_iterations: usize,

    /// Check the stopping criterion every N iterations
    pub stop_check_frequency: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            is_split_level_decision: None,
            train_mode: None,
            stop_criterion: None,
            percent_held_out: None,
            gaussian_variance: None,
            num_features_to_add: 1,
            pruning_cutoff: 0,
            threshold: 0.0001,
            max_iterations: 1000,
            stop_check_frequency: 1,
        }
    }
}

impl ModelConfig {
    /// Check that every required parameter is present and in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_split_level_decision.is_none() {
            return Err(ConfigError::MissingRequired(
                "is_split_level_decision".to_string(),
            ));
        }
        let mode = self
            .train_mode
            .ok_or_else(|| ConfigError::MissingRequired("relation_train_mode".to_string()))?;
        if self.stop_criterion.is_none() {
            return Err(ConfigError::MissingRequired(
                "relation_train_stop_criterion".to_string(),
            ));
        }
        let percent = self.percent_held_out.ok_or_else(|| {
            ConfigError::MissingRequired("relation_train_percent_held_out".to_string())
        })?;
        if percent > 100 {
            return Err(ConfigError::InvalidValue {
                key: "relation_train_percent_held_out".to_string(),
                value: percent.to_string(),
            });
        }
        if mode == TrainMode::IisGaussian && self.gaussian_variance.is_none() {
            return Err(ConfigError::MissingRequired(
                "relation_train_gaussian_variance".to_string(),
            ));
        }
        if mode == TrainMode::IisFeatureSelection && !(1..=10).contains(&self.num_features_to_add)
        {
            return Err(ConfigError::InvalidValue {
                key: "num_relation_features_to_add".to_string(),
                value: self.num_features_to_add.to_string(),
            });
        }
        if self.stop_check_frequency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "stop_check_frequency".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Observation-based trainer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Iterative scaling variant
    pub mode: TrainMode,

    /// Features seen fewer times than this are pruned
    pub pruning_cutoff: u32,

    /// Percentage of events held out (0-50)
    pub percent_held_out: u32,

    /// Iteration cap
    pub max_iterations: usize,

    /// Gaussian prior variance (used by IIS_GAUSSIAN)
    pub gaussian_variance: f64,

    /// Minimum change in held-out likelihood that still counts as progress
    pub min_likelihood_delta: f64,

    /// Check the stopping criterion every N iterations
    pub stop_check_frequency: usize,

    /// Collapse every relation tag onto a single "is relation" tag
    pub filter_mode: bool,

    /// Soft cap on tuples returned by one feature extraction
    pub max_features_per_extraction: usize,

    /// Number of hypotheses kept when decoding
    pub n_best: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            mode: TrainMode::Gis,
            pruning_cutoff: 0,
            percent_held_out: 0,
            max_iterations: 1000,
            gaussian_variance: 1.0,
            min_likelihood_delta: 0.0001,
            stop_check_frequency: 1,
            filter_mode: false,
            max_features_per_extraction: 8,
            n_best: 5,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.percent_held_out > 50 {
            return Err(ConfigError::InvalidValue {
                key: "maxent_trainer_percent_held_out".to_string(),
                value: self.percent_held_out.to_string(),
            });
        }
        if self.stop_check_frequency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "maxent_trainer_stop_check_frequency".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Switches that shape how observations are built
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Fall back to proposition-tree paths when no proposition links a pair
    pub simulate_props_from_proptrees: bool,

    /// Ask the alt-model bank for predictions while populating
    pub use_alt_models: bool,

    /// Reproduce the historical shared-ancestor distance field swap
    pub legacy_ancestor_distance_swap: bool,

    /// Words-between spans longer than this become `:TOO_LONG`
    pub max_words_between: usize,

    /// Secondary vector models whose predictions become features
    pub alt_models: Vec<AltModelSpec>,
}

/// One secondary relation model consulted while populating observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltModelSpec {
    /// Name used in `alt-model` features
    pub name: String,

    /// Trained relation model file
    pub model_file: PathBuf,

    /// Whether the file holds an existence model ahead of the type model
    #[serde(default)]
    pub is_split_level_decision: bool,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            simulate_props_from_proptrees: false,
            use_alt_models: true,
            legacy_ancestor_distance_swap: true,
            max_words_between: 10,
            alt_models: Vec::new(),
        }
    }
}

/// Resource files and the entity type inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Language of the relation utilities
    pub language: Language,

    /// Relation type inventory file
    pub relation_types_file: Option<PathBuf>,

    /// `word bitstring` cluster table
    pub word_cluster_table: Option<PathBuf>,

    /// Prefix lengths used to derive cluster ids
    pub word_cluster_prefix_lengths: Vec<usize>,

    /// Feature type names file
    pub features_file: Option<PathBuf>,

    /// Outcome tag set file for the observation trainer
    pub tag_set_file: Option<PathBuf>,

    /// Tag set whose last tag is used in filter mode
    pub filter_tag_set_file: Option<PathBuf>,

    /// `surface root` segmentation table (Arabic stemming)
    pub segmentation_table: Option<PathBuf>,

    /// Entity types recognized by the mention finder
    pub recognized_entity_types: Vec<String>,

    /// Entity types allowed as relation arguments
    pub relation_arg_entity_types: Vec<String>,

    /// Trailing instance fields beyond the fixed thirteen
    pub instance_extensions: Vec<String>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        let types: Vec<String> = ["PER", "ORG", "GPE", "LOC", "FAC", "VEH", "WEA"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            language: Language::Generic,
            relation_types_file: None,
            word_cluster_table: None,
            word_cluster_prefix_lengths: vec![32, 24, 16, 8],
            features_file: None,
            tag_set_file: None,
            filter_tag_set_file: None,
            segmentation_table: None,
            recognized_entity_types: types.clone(),
            relation_arg_entity_types: types,
            instance_extensions: vec![],
        }
    }
}

/// Iterative scaling variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainMode {
    #[serde(rename = "GIS")]
    Gis,
    #[serde(rename = "IIS")]
    Iis,
    #[serde(rename = "IIS_GAUSSIAN")]
    IisGaussian,
    #[serde(rename = "IIS_FEATURE_SELECTION")]
    IisFeatureSelection,
}

impl TrainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gis => "GIS",
            Self::Iis => "IIS",
            Self::IisGaussian => "IIS_GAUSSIAN",
            Self::IisFeatureSelection => "IIS_FEATURE_SELECTION",
        }
    }
}

impl std::fmt::Display for TrainMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrainMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GIS" => Ok(Self::Gis),
            "IIS" => Ok(Self::Iis),
            "IIS_GAUSSIAN" => Ok(Self::IisGaussian),
            "IIS_FEATURE_SELECTION" => Ok(Self::IisFeatureSelection),
            _ => Err(ConfigError::InvalidValue {
                key: "relation_train_mode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Training stopping criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopCriterion {
    #[serde(rename = "PROBS_CONVERGE")]
    ProbsConverge,
    #[serde(rename = "HELD_OUT_LIKELIHOOD")]
    HeldOutLikelihood,
}

impl StopCriterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProbsConverge => "PROBS_CONVERGE",
            Self::HeldOutLikelihood => "HELD_OUT_LIKELIHOOD",
        }
    }
}

impl std::fmt::Display for StopCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StopCriterion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PROBS_CONVERGE" => Ok(Self::ProbsConverge),
            "HELD_OUT_LIKELIHOOD" => Ok(Self::HeldOutLikelihood),
            _ => Err(ConfigError::InvalidValue {
                key: "relation_train_stop_criterion".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Supported languages for relation utilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Chinese,
    Arabic,
    #[default]
    Generic,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::English => "english",
            Self::Chinese => "chinese",
            Self::Arabic => "arabic",
            Self::Generic => "generic",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "english" | "en" => Ok(Self::English),
            "chinese" | "zh" => Ok(Self::Chinese),
            "arabic" | "ar" => Ok(Self::Arabic),
            "generic" => Ok(Self::Generic),
            _ => Err(ConfigError::InvalidValue {
                key: "RELEX_LANGUAGE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_model() -> ModelConfig {
        ModelConfig {
            is_split_level_decision: Some(true),
            train_mode: Some(TrainMode::Gis),
            stop_criterion: Some(StopCriterion::ProbsConverge),
            percent_held_out: Some(10),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = RelexConfig::default();
        assert_eq!(config.model.max_iterations, 1000);
        assert_eq!(config.trainer.max_features_per_extraction, 8);
        assert_eq!(config.resources.word_cluster_prefix_lengths, vec![32, 24, 16, 8]);
        assert!(config.observation.legacy_ancestor_distance_swap);
    }

    #[test]
    fn test_train_mode_parse() {
        assert_eq!("GIS".parse::<TrainMode>().unwrap(), TrainMode::Gis);
        assert_eq!("iis_gaussian".parse::<TrainMode>().unwrap(), TrainMode::IisGaussian);
        assert_eq!(
            "IIS_FEATURE_SELECTION".parse::<TrainMode>().unwrap(),
            TrainMode::IisFeatureSelection
        );
        assert!("SCGIS".parse::<TrainMode>().is_err());
    }

    #[test]
    fn test_stop_criterion_parse() {
        assert_eq!(
            "HELD_OUT_LIKELIHOOD".parse::<StopCriterion>().unwrap(),
            StopCriterion::HeldOutLikelihood
        );
        assert!("NEVER".parse::<StopCriterion>().is_err());
    }

    #[test]
    fn test_validate_missing_required() {
        let err = ModelConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(_)));

        let mut config = complete_model();
        config.stop_criterion = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(key)) if key == "relation_train_stop_criterion"
        ));
    }

    #[test]
    fn test_validate_ranges() {
        assert!(complete_model().validate().is_ok());

        let mut config = complete_model();
        config.percent_held_out = Some(101);
        assert!(config.validate().is_err());

        let mut config = complete_model();
        config.train_mode = Some(TrainMode::IisGaussian);
        assert!(config.validate().is_err());
        config.gaussian_variance = Some(1.0);
        assert!(config.validate().is_ok());

        let mut config = complete_model();
        config.train_mode = Some(TrainMode::IisFeatureSelection);
        config.num_features_to_add = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trainer_held_out_limit() {
        let mut trainer = TrainerConfig::default();
        assert!(trainer.validate().is_ok());
        trainer.percent_held_out = 60;
        assert!(trainer.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let toml_text = r#"
            [model]
            is_split_level_decision = true
            train_mode = "IIS_GAUSSIAN"
            stop_criterion = "HELD_OUT_LIKELIHOOD"
            percent_held_out = 20
            gaussian_variance = 2.5

            [resources]
            language = "chinese"
        "#;
        let config: RelexConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.model.train_mode, Some(TrainMode::IisGaussian));
        assert_eq!(config.model.gaussian_variance, Some(2.5));
        assert_eq!(config.resources.language, Language::Chinese);
        assert_eq!(config.model.max_iterations, 1000);
        assert!(config.model.validate().is_ok());
    }

    #[test]
    fn test_alt_models_from_toml() {
        let toml_text = r#"
            [[observation.alt_models]]
            name = "ace2004"
            model_file = "/models/ace2004.maxent"
        "#;
        let config: RelexConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.observation.alt_models.len(), 1);
        assert_eq!(config.observation.alt_models[0].name, "ace2004");
        assert!(!config.observation.alt_models[0].is_split_level_decision);
        assert!(config.observation.use_alt_models);
    }
}
