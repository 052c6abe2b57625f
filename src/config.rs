/// Configuration module.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::IndexError;

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./codegraph.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_line_window_size() -> usize {
    25
}

fn default_line_overlap() -> usize {
    4
}

fn default_max_parallel_files() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_max_chunks() -> usize {
    8
}

fn default_max_hops() -> usize {
    2
}

fn default_root() -> String {
    "./".to_string()
}

fn default_extensions() -> Vec<String> {
    [
        "py", "js", "ts", "jsx", "tsx", "java", "cpp", "c", "h", "go", "rs", "rb", "php", "swift",
        "kt", "scala", "json", "yaml", "yml", "xml", "html", "css", "md", "txt", "sh", "bash",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ignore_dirs() -> Vec<String> {
    [
        "__pycache__",
        ".git",
        "node_modules",
        ".venv",
        "venv",
        "dist",
        "build",
        ".pytest_cache",
        "htmlcov",
        "target",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Fallback log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub expand: ExpandConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// How a file is turned into chunks.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Syntax-aware chunking; unsupported languages warn and use lines.
    #[serde(alias = "ast")]
    Structured,
    /// Fixed line windows only.
    #[serde(alias = "lines")]
    Line,
    /// Structured where a grammar exists, lines elsewhere.
    #[default]
    Auto,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    #[serde(default)]
    pub chunking_strategy: ChunkingStrategy,

    #[serde(default = "default_line_window_size")]
    pub line_window_size: usize,

    #[serde(default = "default_line_overlap")]
    pub line_overlap: usize,

    #[serde(default = "default_max_parallel_files")]
    pub max_parallel_files: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ExpandConfig {
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    #[serde(default = "default_root")]
    pub root: String,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            ingest: IngestConfig::default(),
            expand: ExpandConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunking_strategy: ChunkingStrategy::default(),
            line_window_size: default_line_window_size(),
            line_overlap: default_line_overlap(),
            max_parallel_files: default_max_parallel_files(),
        }
    }
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            max_chunks: default_max_chunks(),
            max_hops: default_max_hops(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            extensions: default_extensions(),
            ignore_dirs: default_ignore_dirs(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl IngestConfig {
    /// Check the line window and parallelism settings.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.line_window_size == 0 {
            return Err(IndexError::InvalidConfig(
                "line_window_size must be positive".to_string(),
            ));
        }
        if self.line_overlap == 0 || self.line_overlap >= self.line_window_size {
            return Err(IndexError::InvalidConfig(format!(
                "line_overlap must be in 1..{} (got {})",
                self.line_window_size, self.line_overlap
            )));
        }
        if self.max_parallel_files == 0 {
            return Err(IndexError::InvalidConfig(
                "max_parallel_files must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        self.ingest.validate()?;
        anyhow::ensure!(self.expand.max_hops > 0, "expand.max_hops must be positive");
        anyhow::ensure!(
            !self.discovery.extensions.is_empty(),
            "at least one discovery extension must be specified"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ingest.chunking_strategy, ChunkingStrategy::Auto);
        assert_eq!(config.ingest.line_window_size, 25);
        assert_eq!(config.ingest.line_overlap, 4);
        assert!(config.ingest.max_parallel_files > 0);
        assert_eq!(config.expand.max_chunks, 8);
        assert_eq!(config.expand.max_hops, 2);
        assert!(config.discovery.ignore_dirs.contains(&"node_modules".to_string()));
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"ingest": {"chunking_strategy": "line", "line_window_size": 40}, "db_path": "./test.db"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.ingest.chunking_strategy, ChunkingStrategy::Line);
        assert_eq!(config.ingest.line_window_size, 40);
        assert_eq!(config.db_path, "./test.db");
        // Other fields should have defaults
        assert_eq!(config.ingest.line_overlap, 4);
        assert_eq!(config.expand.max_hops, 2);
    }

    #[test]
    fn test_strategy_aliases() {
        let ast: ChunkingStrategy = serde_json::from_str(r#""ast""#).unwrap();
        let lines: ChunkingStrategy = serde_json::from_str(r#""lines""#).unwrap();
        assert_eq!(ast, ChunkingStrategy::Structured);
        assert_eq!(lines, ChunkingStrategy::Line);
    }

    #[test]
    fn test_validate_ok() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_overlap() {
        let mut config = Config::default();
        config.ingest.line_overlap = config.ingest.line_window_size;
        assert!(config.validate().is_err());

        config.ingest.line_overlap = 0;
        assert!(matches!(
            config.ingest.validate(),
            Err(IndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_bad_parallelism() {
        let mut config = Config::default();
        config.ingest.max_parallel_files = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.db_path, default_db_path());
        assert!(!path.exists(), "template only written for the default path");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.ingest, config.ingest);
        assert_eq!(parsed.db_path, config.db_path);
        assert_eq!(parsed.discovery, config.discovery);
    }
}
