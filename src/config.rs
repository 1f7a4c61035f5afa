use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .pr-review.toml, constructed once
/// at startup and passed by reference into the gateway and task runner.
/// All fields are optional — the service works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Gateway bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path for the task store.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Model API key. If None, falls back to GEMINI_API_KEY env var.
    pub api_key: Option<String>,

    /// Model name for the generateContent endpoint.
    #[serde(default = "default_model")]
    pub name: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            name: default_model(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_db_path() -> String {
    "pr-review.db".to_string()
}

fn default_model() -> String {
    "gemini-pro".to_string()
}

impl Config {
    /// Load configuration from .pr-review.toml in the current directory,
    /// or defaults if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(".pr-review.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }

    /// Resolve the model API key: config file value takes precedence,
    /// falls back to GEMINI_API_KEY env var.
    pub fn model_api_key(&self) -> Option<String> {
        self.model
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
    }
}
