use fieldmemo_protocol::SCHEMA_VERSION;
use fieldmemo_semantics::{ClassifierConfig, KeyConfig, MatcherConfig};
use fieldmemo_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Environment variable naming a config file when none is passed explicitly.
pub const CONFIG_ENV: &str = "FIELDMEMO_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fields per inference request.
    pub inference_batch_size: usize,
    /// Randomized delay between fills, lower bound.
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
    /// Fuzzy threshold of the memory fallback strategy.
    pub memory_fallback_threshold: f32,
    /// Store non-cached values after filling them.
    pub write_back: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inference_batch_size: 10,
            pacing_min_ms: 150,
            pacing_max_ms: 400,
            memory_fallback_threshold: 0.6,
            write_back: true,
        }
    }
}

/// Every tunable of the engine in one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub schema_version: u32,
    pub classifier: ClassifierConfig,
    pub keys: KeyConfig,
    pub matcher: MatcherConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            classifier: ClassifierConfig::default(),
            keys: KeyConfig::default(),
            matcher: MatcherConfig::default(),
            store: StoreConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(PipelineError::Config(format!(
                "schema_version {} is not supported (expected {SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        validate_unit("keys.ml_confidence_threshold", self.keys.ml_confidence_threshold)?;
        validate_unit("matcher.threshold", self.matcher.threshold)?;
        validate_unit("matcher.hint_tie_margin", self.matcher.hint_tie_margin)?;
        validate_unit("store.read_threshold", self.store.read_threshold)?;
        validate_unit(
            "pipeline.memory_fallback_threshold",
            self.pipeline.memory_fallback_threshold,
        )?;
        if self.pipeline.pacing_min_ms > self.pipeline.pacing_max_ms {
            return Err(PipelineError::Config(format!(
                "pipeline.pacing_min_ms ({}) exceeds pipeline.pacing_max_ms ({})",
                self.pipeline.pacing_min_ms, self.pipeline.pacing_max_ms
            )));
        }
        if self.pipeline.inference_batch_size == 0 {
            return Err(PipelineError::Config(
                "pipeline.inference_batch_size must be at least 1".into(),
            ));
        }
        if self.store.ttl_days == 0 {
            return Err(PipelineError::Config("store.ttl_days must be at least 1".into()));
        }
        if self.store.max_row_index == 0 {
            return Err(PipelineError::Config(
                "store.max_row_index must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a config document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| PipelineError::Config(format!("parse config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw).map_err(|err| match err {
            PipelineError::Config(message) => {
                PipelineError::Config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Loads `path`, else the file named by [`CONFIG_ENV`], else defaults.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                log::debug!("Loading config from {}", path.display());
                Self::load(&path).await
            }
            None => Ok(Self::default()),
        }
    }

    /// Writes the config atomically (temporary file + rename).
    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn validate_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::Config(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config = EngineConfig::from_json(
            r#"{"schema_version": 1, "matcher": {"threshold": 0.7}, "pipeline": {"write_back": false}}"#,
        )
        .unwrap();
        assert_eq!(config.matcher.threshold, 0.7);
        assert_eq!(config.matcher.hint_tie_margin, 0.05);
        assert!(!config.pipeline.write_back);
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn invalid_documents_are_rejected() {
        let cases = [
            (r#"{"schema_version": 2}"#, "schema_version 2"),
            (r#"{"store": {"read_threshold": 1.5}}"#, "store.read_threshold"),
            (
                r#"{"pipeline": {"pacing_min_ms": 500, "pacing_max_ms": 100}}"#,
                "pacing_min_ms",
            ),
            (r#"{"store": {"max_row_index": 0}}"#, "store.max_row_index"),
            (r#"{"unknown": true}"#, "unknown field"),
        ];
        for (raw, expected) in cases {
            let err = EngineConfig::from_json(raw).unwrap_err().to_string();
            assert!(err.contains(expected), "{raw}: {err}");
        }
    }

    #[tokio::test]
    async fn save_then_load() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("conf/fieldmemo.json");
        let mut config = EngineConfig::default();
        config.pipeline.inference_batch_size = 3;
        config.save(&path).await.unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(EngineConfig::load(&path).await.unwrap(), config);
        assert_eq!(
            EngineConfig::load_or_default(Some(&path)).await.unwrap(),
            config
        );
    }
}
