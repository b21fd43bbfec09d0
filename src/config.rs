//! Configuration loading for pantun-sense.
//!
//! Settings come from `pantun.toml`, with environment variable overrides for
//! the artifact paths. A missing config file is not an error; defaults apply.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{model, Evaluator, NatureVocabulary, DEFAULT_MODEL_TIMEOUT_MS};

const CONFIG_FILE: &str = "pantun.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Nature word list location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyConfig {
    pub path: PathBuf,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/alam_keywords.txt"),
        }
    }
}

/// Statistical classifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model artifact (JSON). Absent means the model is never consulted.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_MODEL_TIMEOUT_MS
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vocabulary: VocabularyConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

impl Config {
    /// Load from `pantun.toml` in cwd or the user config dir, else defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::parse_file(&path)?,
            None => {
                debug!("no {CONFIG_FILE} found, using defaults");
                Config::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::parse_file(path.as_ref())?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "read config");
        Self::from_toml(&content)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("PANTUN_VOCABULARY") {
            self.vocabulary.path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("PANTUN_MODEL") {
            self.model.path = Some(PathBuf::from(path));
        }
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }

        let home_config = dirs::home_dir()?
            .join(".config")
            .join("pantun-sense")
            .join(CONFIG_FILE);
        home_config.exists().then_some(home_config)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model.timeout_ms)
    }

    /// Load the configured artifacts and build an evaluator. Unreadable
    /// artifacts degrade instead of failing.
    pub fn build_evaluator(&self) -> Evaluator {
        let vocabulary = Arc::new(NatureVocabulary::load_or_empty(&self.vocabulary.path));
        let mut evaluator = Evaluator::new(vocabulary).with_model_timeout(self.model_timeout());
        if let Some(classifier) = self.model.path.as_ref().and_then(model::load_or_disabled) {
            evaluator = evaluator.with_classifier(classifier);
        }
        evaluator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.model.timeout_ms, DEFAULT_MODEL_TIMEOUT_MS);
        assert!(config.model.path.is_none());
    }

    #[test]
    fn parses_sections() {
        let config = Config::from_toml(
            r#"
            [vocabulary]
            path = "/srv/words.txt"

            [model]
            path = "/srv/model.json"
            timeout_ms = 40
            "#,
        )
        .unwrap();
        assert_eq!(config.vocabulary.path, PathBuf::from("/srv/words.txt"));
        assert_eq!(config.model.path, Some(PathBuf::from("/srv/model.json")));
        assert_eq!(config.model_timeout(), Duration::from_millis(40));
    }

    #[test]
    fn default_timeout_matches_evaluator() {
        let evaluator = Evaluator::new(Arc::new(NatureVocabulary::empty()));
        assert_eq!(Config::default().model_timeout(), evaluator.model_timeout());
    }

    #[test]
    fn rendered_config_parses_back() {
        let config = Config {
            vocabulary: VocabularyConfig {
                path: PathBuf::from("/srv/words.txt"),
            },
            model: ModelConfig {
                path: Some(PathBuf::from("/srv/model.json")),
                timeout_ms: 75,
            },
        };
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[model]"), "got {rendered}");
        assert_eq!(Config::from_toml(&rendered).unwrap(), config);
        assert_eq!(
            Config::from_toml(&Config::default().to_toml().unwrap()).unwrap(),
            Config::default()
        );
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = Config::from_toml("[model\npath = 3").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::parse_file(&dir.path().join("absent.toml"));
        assert!(matches!(err, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn evaluator_degrades_when_artifacts_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            vocabulary: VocabularyConfig {
                path: dir.path().join("missing.txt"),
            },
            model: ModelConfig {
                path: Some(dir.path().join("missing.json")),
                timeout_ms: 10,
            },
        };
        let evaluator = config.build_evaluator();
        assert!(evaluator.vocabulary().is_empty());
        let verdict = evaluator.evaluate("Burung terbang tinggi di awan");
        assert!(!verdict.metrics.has_nature);
        assert!(verdict.model_quality.is_none());
    }

    #[test]
    fn evaluator_uses_configured_vocabulary() {
        let mut words = tempfile::NamedTempFile::new().unwrap();
        writeln!(words, "awan").unwrap();
        let config = Config {
            vocabulary: VocabularyConfig {
                path: words.path().to_path_buf(),
            },
            model: ModelConfig::default(),
        };
        let evaluator = config.build_evaluator();
        assert!(evaluator.evaluate("Burung terbang tinggi di awan").metrics.has_nature);
    }
}
