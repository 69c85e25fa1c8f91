use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::classifier::{OverrideRule, TrainingConfig, DEFAULT_HYPOTHESIS_TEMPLATE};
use crate::runtime::RuntimeConfig;
use crate::translation::{TranslationConfig, TranslationProvider};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("{0}")]
    Invalid(String),
}

/// Root directory for downloaded models and the learned artifact.
///
/// Resolution order: `CROPSAGE_CACHE`, the platform cache directory,
/// `~/.cache`, then the system temp directory.
pub fn cache_root() -> PathBuf {
    cache_root_with(|name| env::var(name).ok())
}

/// [`cache_root`] with `CROPSAGE_CACHE` looked up through `lookup`.
pub fn cache_root_with(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = lookup("CROPSAGE_CACHE") {
        return PathBuf::from(path);
    }
    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("cropsage");
    }
    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".cache").join("cropsage");
    }
    env::temp_dir().join("cropsage")
}

/// Settings for [`Pipeline`](crate::Pipeline). Every field has a default,
/// so a config file only needs the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Zero-shot scores must be strictly above this to be used
    pub zero_shot_threshold: f32,
    pub rule_confidence: f32,
    pub hypothesis_template: String,
    pub zero_shot_timeout_ms: u64,
    pub translation: TranslationConfig,
    pub artifact_path: PathBuf,
    pub models_dir: PathBuf,
    pub overrides: Vec<OverrideRule>,
    /// ONNX Runtime thread pools for the zero-shot model; 0 lets the runtime decide
    pub onnx_inter_threads: usize,
    pub onnx_intra_threads: usize,
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let root = cache_root();
        Self {
            zero_shot_threshold: 0.45,
            rule_confidence: 0.98,
            hypothesis_template: DEFAULT_HYPOTHESIS_TEMPLATE.to_string(),
            zero_shot_timeout_ms: 30_000,
            translation: TranslationConfig::default(),
            artifact_path: root.join("crop_model.json"),
            models_dir: root.join("models"),
            overrides: vec![OverrideRule::iron_deficiency()],
            onnx_inter_threads: 0,
            onnx_intra_threads: 0,
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise defaults, then applies `CROPSAGE_*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_overrides(|name| env::var(name).ok())
    }

    /// Applies overrides looked up by variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = lookup("CROPSAGE_ARTIFACT") {
            self.artifact_path = PathBuf::from(path);
        }
        if let Some(value) = lookup("CROPSAGE_ZERO_SHOT_THRESHOLD") {
            self.zero_shot_threshold = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "CROPSAGE_ZERO_SHOT_THRESHOLD",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("CROPSAGE_TRANSLATION") {
            self.translation.provider = match value.trim().to_lowercase().as_str() {
                "google" => TranslationProvider::Google,
                "disabled" | "off" | "none" => TranslationProvider::Disabled,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "CROPSAGE_TRANSLATION",
                        value,
                    })
                }
            };
        }
        if let Some(endpoint) = lookup("CROPSAGE_TRANSLATION_ENDPOINT") {
            self.translation.endpoint = endpoint;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.zero_shot_threshold) {
            return Err(ConfigError::Invalid(format!(
                "zero_shot_threshold must be within [0, 1], got {}",
                self.zero_shot_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.rule_confidence) {
            return Err(ConfigError::Invalid(format!(
                "rule_confidence must be within [0, 1], got {}",
                self.rule_confidence
            )));
        }
        if self.training.c <= 0.0 || self.training.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "training.c and training.learning_rate must be positive, got {} and {}",
                self.training.c, self.training.learning_rate
            )));
        }
        if !self.hypothesis_template.contains("{}") {
            return Err(ConfigError::Invalid(
                "hypothesis_template must contain a {} placeholder".to_string(),
            ));
        }
        Ok(())
    }

    pub fn zero_shot_timeout(&self) -> Duration {
        Duration::from_millis(self.zero_shot_timeout_ms)
    }

    /// Session settings for loading the zero-shot model.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            inter_threads: self.onnx_inter_threads,
            intra_threads: self.onnx_intra_threads,
            ..RuntimeConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.zero_shot_threshold, 0.45);
        assert_eq!(config.rule_confidence, 0.98);
        assert_eq!(config.hypothesis_template, "This text is about {}.");
        assert_eq!(config.overrides, vec![OverrideRule::iron_deficiency()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_root_lookup() {
        let root = cache_root_with(|name| (name == "CROPSAGE_CACHE").then(|| "/tmp/cropsage-test-cache".to_string()));
        assert_eq!(root, PathBuf::from("/tmp/cropsage-test-cache"));

        let fallback = cache_root_with(|_| None);
        assert!(fallback.ends_with("cropsage"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"zero_shot_threshold": 0.6, "translation": {"provider": "disabled"}}"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.zero_shot_threshold, 0.6);
        assert_eq!(config.rule_confidence, 0.98);
        assert_eq!(config.translation.provider, TranslationProvider::Disabled);
        assert_eq!(config.translation.timeout_ms, 10_000);
    }

    #[test]
    fn test_runtime_and_training_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"onnx_intra_threads": 4, "training": {"max_iter": 50}}"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        let runtime = config.runtime_config();
        assert_eq!(runtime.intra_threads, 4);
        assert_eq!(runtime.inter_threads, 0);
        assert_eq!(config.training.max_iter, 50);
        assert_eq!(config.training.c, 1.0);

        let config = PipelineConfig {
            training: TrainingConfig { learning_rate: 0.0, ..TrainingConfig::default() },
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(PipelineConfig::from_file(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            PipelineConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CROPSAGE_ARTIFACT", "/data/model.json"),
            ("CROPSAGE_ZERO_SHOT_THRESHOLD", "0.7"),
            ("CROPSAGE_TRANSLATION", "Disabled"),
            ("CROPSAGE_TRANSLATION_ENDPOINT", "http://localhost:9000/translate"),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::default()
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.artifact_path, PathBuf::from("/data/model.json"));
        assert_eq!(config.zero_shot_threshold, 0.7);
        assert_eq!(config.translation.provider, TranslationProvider::Disabled);
        assert_eq!(config.translation.endpoint, "http://localhost:9000/translate");
    }

    #[test]
    fn test_invalid_env_values() {
        let result = PipelineConfig::default()
            .with_overrides(|name| (name == "CROPSAGE_ZERO_SHOT_THRESHOLD").then(|| "high".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));

        let result = PipelineConfig::default()
            .with_overrides(|name| (name == "CROPSAGE_ZERO_SHOT_THRESHOLD").then(|| "1.5".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_template_needs_placeholder() {
        let config = PipelineConfig {
            hypothesis_template: "About plants.".into(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
