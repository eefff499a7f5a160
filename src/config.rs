use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    #[default]
    AzureOpenai,
    Openai,
}

impl std::str::FromStr for ModelProvider {
    type Err = ChatError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "azure_openai" | "azure" => Ok(ModelProvider::AzureOpenai),
            "openai" => Ok(ModelProvider::Openai),
            other => Err(ChatError::Config(format!("unknown model provider `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,
    #[serde(default = "default_model")]
    pub model: String,
    /// Azure deployment name.
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            model: default_model(),
            deployment: None,
            api_version: None,
            endpoint: None,
            api_key: None,
            request_timeout_secs: None,
        }
    }
}

fn default_model() -> String {
    "gpt-4.1-nano".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_search_endpoint(),
            max_results: default_max_results(),
            request_timeout_secs: None,
        }
    }
}

fn default_search_endpoint() -> String {
    "https://api.tavily.com/search".into()
}

fn default_max_results() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Least recently used sessions are dropped beyond this many.
    /// `None` keeps every session for the life of the process.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: Option<usize>,
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            recursion_limit: default_recursion_limit(),
        }
    }
}

fn default_max_sessions() -> Option<usize> {
    Some(256)
}

fn default_recursion_limit() -> usize {
    25
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| ChatError::Config(format!("failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(provider) = env::var("CHATLOOP_MODEL_PROVIDER") {
            self.model.provider = provider.parse()?;
        }
        if let Ok(model) = env::var("CHATLOOP_MODEL") {
            self.model.model = model;
        }
        if let Ok(deployment) = env::var("AZURE_OPENAI_DEPLOYMENT_NAME") {
            self.model.deployment = Some(deployment);
        }
        if let Ok(version) = env::var("AZURE_OPENAI_API_VERSION") {
            self.model.api_version = Some(version);
        }
        match self.model.provider {
            ModelProvider::AzureOpenai => {
                if let Ok(endpoint) = env::var("AZURE_OPENAI_ENDPOINT") {
                    self.model.endpoint = Some(endpoint);
                }
                if let Ok(key) = env::var("AZURE_OPENAI_API_KEY") {
                    self.model.api_key = Some(key);
                }
            }
            ModelProvider::Openai => {
                if let Ok(endpoint) = env::var("OPENAI_BASE_URL") {
                    self.model.endpoint = Some(endpoint);
                }
                if let Ok(key) = env::var("OPENAI_API_KEY") {
                    self.model.api_key = Some(key);
                }
            }
        }
        if let Ok(key) = env::var("TAVILY_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Ok(max) = env::var("CHATLOOP_SEARCH_MAX_RESULTS") {
            self.search.max_results = parse_env("CHATLOOP_SEARCH_MAX_RESULTS", &max)?;
        }
        if let Ok(max) = env::var("CHATLOOP_MAX_SESSIONS") {
            self.session.max_sessions = match max.as_str() {
                "" | "unbounded" => None,
                raw => Some(parse_env("CHATLOOP_MAX_SESSIONS", raw)?),
            };
        }
        if let Ok(limit) = env::var("CHATLOOP_RECURSION_LIMIT") {
            self.session.recursion_limit = parse_env("CHATLOOP_RECURSION_LIMIT", &limit)?;
        }
        Ok(())
    }
}

fn parse_env(name: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>()
        .map_err(|err| ChatError::Config(format!("`{name}` must be a number, got `{raw}`: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_filled_in() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.model.provider, ModelProvider::AzureOpenai);
        assert_eq!(cfg.model.model, "gpt-4.1-nano");
        assert_eq!(cfg.search.max_results, 2);
        assert_eq!(cfg.session.recursion_limit, 25);
        assert!(cfg.model.api_key.is_none());
    }

    #[test]
    #[serial]
    fn loads_and_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[model]\nprovider='azure_openai'\ndeployment='from-file'\napi_version='2024-10-21'\n[session]\nrecursion_limit=10"
        )
        .unwrap();

        env::set_var("AZURE_OPENAI_DEPLOYMENT_NAME", "from-env");
        env::set_var("TAVILY_API_KEY", "tvly-test");
        let cfg = AppConfig::from_env_or_file(file.path()).unwrap();
        env::remove_var("AZURE_OPENAI_DEPLOYMENT_NAME");
        env::remove_var("TAVILY_API_KEY");

        assert_eq!(cfg.model.deployment.as_deref(), Some("from-env"));
        assert_eq!(cfg.model.api_version.as_deref(), Some("2024-10-21"));
        assert_eq!(cfg.search.api_key.as_deref(), Some("tvly-test"));
        assert_eq!(cfg.session.recursion_limit, 10);
        assert_eq!(cfg.session.max_sessions, Some(256));
    }

    #[test]
    #[serial]
    fn rejects_malformed_numbers() {
        env::set_var("CHATLOOP_RECURSION_LIMIT", "many");
        let result = AppConfig::from_env();
        env::remove_var("CHATLOOP_RECURSION_LIMIT");

        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    #[serial]
    fn unbounded_sessions_can_be_requested() {
        env::set_var("CHATLOOP_MAX_SESSIONS", "unbounded");
        let cfg = AppConfig::from_env().unwrap();
        env::remove_var("CHATLOOP_MAX_SESSIONS");

        assert_eq!(cfg.session.max_sessions, None);
    }
}
