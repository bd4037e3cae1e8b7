//! Configuration
//!
//! Defaults, then an optional YAML file, then `RNA_*` environment variables
//! (a `.env` file is loaded first when present).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::{ClassifyError, Result};

pub use crate::classifier::{AggregatorConfig, ConfidenceScaling};
pub use crate::embedding::EmbeddingConfig;
pub use crate::retrieval::IndexConfig;
pub use crate::structure::ValidationLimits;
pub use crate::telemetry::{LogFormat, LoggingConfig};

const ENV_PREFIX: &str = "RNA_";

/// Names the YAML file to read when no path is passed explicitly
pub const CONFIG_FILE_VAR: &str = "RNA_CONFIG_FILE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON / JSON-lines reference records
    pub reference_path: Option<PathBuf>,
    /// Prebuilt index; preferred over `reference_path` when the file exists
    pub snapshot_path: Option<PathBuf>,
    pub index: IndexConfig,
    pub aggregator: AggregatorConfig,
    pub embedding: EmbeddingConfig,
    pub validation: ValidationLimits,
    pub logging: LoggingConfig,
}

impl Config {
    /// Full resolution: `.env`, the YAML file (explicit path or `RNA_CONFIG_FILE`), then env.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_FILE_VAR).map(PathBuf::from));
        let mut config = match file {
            Some(file) => Self::from_yaml_file(&file)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClassifyError::Config(format!("cannot read {:?}: {}", path, e)))?;
        debug!("Loaded configuration file {:?}", path);
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| ClassifyError::Config(e.to_string()))
    }

    /// Override fields from `RNA_*` variables; other variables are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.trim();
            match name {
                "REFERENCE_PATH" => self.reference_path = Some(PathBuf::from(value)),
                "SNAPSHOT_PATH" => self.snapshot_path = Some(PathBuf::from(value)),
                "METRIC" => self.index.metric = Some(value.parse()?),
                "DEFAULT_TOP_K" => self.index.default_top_k = parse(&key, value)?,
                "MAX_TOP_K" => self.index.max_top_k = parse(&key, value)?,
                "MIN_SIMILARITY" => self.index.min_similarity = Some(parse(&key, value)?),
                "SUBFAMILY_MARGIN" => self.aggregator.subfamily_margin = parse(&key, value)?,
                "CONFIDENCE_SCALING" => self.aggregator.confidence_scaling = value.parse()?,
                "SEQUENCE_WEIGHT" => self.embedding.sequence_weight = parse(&key, value)?,
                "STRUCTURE_WEIGHT" => self.embedding.structure_weight = parse(&key, value)?,
                "PROJECTION_PATH" => self.embedding.projection_path = Some(PathBuf::from(value)),
                "MAX_SEQUENCE_LENGTH" => self.validation.max_sequence_length = parse(&key, value)?,
                "LOG_LEVEL" => self.logging.level = value.to_string(),
                "LOG_FORMAT" => {
                    self.logging.format = value.parse().map_err(ClassifyError::Config)?
                }
                "LOG_DIR" => self.logging.directory = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let index = &self.index;
        if index.max_top_k == 0 {
            return Err(ClassifyError::Config("index.max_top_k must be at least 1".into()));
        }
        if index.default_top_k == 0 || index.default_top_k > index.max_top_k {
            return Err(ClassifyError::Config(format!(
                "index.default_top_k must be in 1..={}, got {}",
                index.max_top_k, index.default_top_k
            )));
        }
        if let Some(threshold) = index.min_similarity {
            if !threshold.is_finite() {
                return Err(ClassifyError::Config("index.min_similarity must be finite".into()));
            }
        }

        let margin = self.aggregator.subfamily_margin;
        if !margin.is_finite() || margin < 0.0 {
            return Err(ClassifyError::Config(format!(
                "aggregator.subfamily_margin must be a non-negative number, got {}",
                margin
            )));
        }

        let (seq_w, struct_w) = (self.embedding.sequence_weight, self.embedding.structure_weight);
        if !seq_w.is_finite() || !struct_w.is_finite() || seq_w < 0.0 || struct_w < 0.0 {
            return Err(ClassifyError::Config("embedding weights must be non-negative".into()));
        }
        if seq_w == 0.0 && struct_w == 0.0 {
            return Err(ClassifyError::Config("embedding weights cannot both be zero".into()));
        }

        if self.validation.max_sequence_length == 0 {
            return Err(ClassifyError::Config(
                "validation.max_sequence_length must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ClassifyError::Config(format!("{}={}: {}", key, value, e)))
}
