use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::search::DEFAULT_TOP_K;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow any origin, method and header (CORS)
    #[serde(default = "default_cors_allow_any")]
    pub cors_allow_any: bool,

    /// Largest accepted request body, including multipart query images
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_allow_any() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allow_any: default_cors_allow_any(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    #[serde(default = "default_visual_url")]
    pub visual_url: String,

    #[serde(default = "default_text_url")]
    pub text_url: String,

    #[serde(default = "default_tokenizer_url")]
    pub tokenizer_url: String,
}

fn default_model_name() -> String {
    "ViT-B/32".to_string()
}

fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("clipserve")
        .join("models")
}

fn default_intra_threads() -> usize {
    4
}

// Qdrant's ONNX exports of CLIP ViT-B/32
fn default_visual_url() -> String {
    "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx".to_string()
}

fn default_text_url() -> String {
    "https://huggingface.co/Qdrant/clip-ViT-B-32-text/resolve/main/model.onnx".to_string()
}

fn default_tokenizer_url() -> String {
    "https://huggingface.co/Qdrant/clip-ViT-B-32-text/resolve/main/tokenizer.json".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            models_dir: default_models_dir(),
            intra_threads: default_intra_threads(),
            visual_url: default_visual_url(),
            text_url: default_text_url(),
            tokenizer_url: default_tokenizer_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-candidate download timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Accept `file://` URLs and bare paths as candidates
    #[serde(default)]
    pub allow_local_files: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_user_agent() -> String {
    format!("clipserve/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_bytes: default_max_bytes(),
            allow_local_files: false,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// top_k used by text-to-image search when the request omits it
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
        }
    }
}

impl Config {
    /// Load from `$CLIPSERVE_CONFIG` or the default location, writing a
    /// default file there if none exists yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            tracing::info!(path = ?config_path, "Wrote default config");
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Apply `PORT` from the environment, if set and valid.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CLIPSERVE_CONFIG") {
            return PathBuf::from(path);
        }

        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clipserve")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9100

            [fetch]
            allow_local_files = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.fetch.allow_local_files);
        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.search.default_top_k, 5);
        assert_eq!(config.model.name, "ViT-B/32");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.search.default_top_k = 12;
        config.model.intra_threads = 2;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.search.default_top_k, 12);
        assert_eq!(loaded.model.intra_threads, 2);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = \"not a port\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
        assert!(Config::load_from(&dir.path().join("missing.toml")).is_err());
    }
}
