use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::llm::{ApiProvider, LLMConfig};

pub const CONFIG_PATH_ENV: &str = "SCHOLAR_CHAT_CONFIG";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MODEL_ENV: &str = "SCHOLAR_CHAT_MODEL";
pub const ENDPOINT_ENV: &str = "SCHOLAR_CHAT_ENDPOINT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub llm: LLMConfig,
    pub catalog: CatalogConfig,
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base works endpoint the interpreter builds request URLs from.
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Contact address sent with every request (OpenAlex polite pool).
    pub mailto: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Separator the model places between per-record summaries.
    pub delimiter: String,
    pub max_tokens: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openalex.org/works".to_string(),
            request_timeout_secs: 30,
            mailto: None,
            user_agent: concat!("scholar-chat/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            delimiter: "---".to_string(),
            max_tokens: 4096,
        }
    }
}

impl ChatConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.llm.model.trim().is_empty() {
            return Err("llm.model must not be empty".into());
        }
        if self.llm.max_tokens == 0 {
            return Err("llm.max_tokens must be > 0".into());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err("llm.temperature must be in [0.0, 2.0]".into());
        }
        if self.llm.connect_timeout_secs == 0 || self.llm.request_timeout_secs == 0 {
            return Err("llm timeouts must be > 0".into());
        }
        if let ApiProvider::Custom { endpoint } = &self.llm.provider {
            if !is_http_url(endpoint) {
                return Err("llm.provider.custom.endpoint must be an http(s) URL".into());
            }
        }
        if !is_http_url(&self.catalog.base_url) {
            return Err("catalog.base_url must be an http(s) URL".into());
        }
        if self.catalog.request_timeout_secs == 0 {
            return Err("catalog.request_timeout_secs must be > 0".into());
        }
        if self.summary.delimiter.trim().is_empty() {
            return Err("summary.delimiter must not be blank".into());
        }
        if self.summary.max_tokens == 0 {
            return Err("summary.max_tokens must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file (if any), then apply environment overrides.
    pub fn load() -> Result<Self, String> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "Loading config file");
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("scholar-chat").join("config.json"))
    }

    /// Apply overrides from a key lookup (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.llm.api_key = key;
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.llm.model = model;
        }
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
            self.llm.provider = ApiProvider::Custom { endpoint };
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}
