pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    300
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            base_path: String::new(),
            runtime_worker_threads: None,
        }
    }
}

/// Upstream chat provider credentials and identity.
///
/// Each field can come from `config.yaml` or be overridden by the
/// `COZE_API_URL`, `COZE_API_TOKEN` and `COZE_BOT_ID` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub api_url: String,
    /// Bearer token; never serialized back out.
    #[serde(default, skip_serializing)]
    pub api_token: String,
    #[serde(default)]
    pub bot_id: String,
    /// Fixed synthetic user id attached to every conversation turn.
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_user_id() -> String {
    "123456789".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_token: String::new(),
            bot_id: String::new(),
            user_id: default_user_id(),
        }
    }
}

impl UpstreamConfig {
    /// Apply `COZE_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Override credentials from a lookup function. Blank values are ignored
    /// so an empty exported variable does not wipe a file-provided value.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(api_url) = non_blank(var("COZE_API_URL")) {
            self.api_url = api_url;
        }
        if let Some(api_token) = non_blank(var("COZE_API_TOKEN")) {
            self.api_token = api_token;
        }
        if let Some(bot_id) = non_blank(var("COZE_BOT_ID")) {
            self.bot_id = bot_id;
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate the result.
///
/// A missing file is not an error: the relay can run from environment
/// variables alone.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails for a reason other
/// than absence, [`ConfigError::Yaml`] when parsing fails, or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(ConfigError::Io(err)),
    };
    config.upstream.apply_env_overrides();
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.http_pool_max_idle_per_host, 16);
        assert_eq!(config.upstream.user_id, "123456789");
        assert_eq!(config.features.log_level, "INFO");
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = "\
server:
  port: 8080
upstream:
  api_url: https://api.coze.com/v3/chat
  api_token: secret-token
  bot_id: bot-42
features:
  log_level: DEBUG
";
        let config: AppConfig = serde_yaml::from_str(yaml).expect("parse yaml");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.upstream.api_url, "https://api.coze.com/v3/chat");
        assert_eq!(config.upstream.api_token, "secret-token");
        assert_eq!(config.upstream.bot_id, "bot-42");
        assert_eq!(config.features.log_level, "DEBUG");
    }

    #[test]
    fn test_env_overrides_win() {
        let mut upstream = UpstreamConfig {
            api_url: "https://file.example/v3/chat".to_string(),
            api_token: "file-token".to_string(),
            bot_id: "file-bot".to_string(),
            user_id: default_user_id(),
        };
        upstream.apply_overrides(|name| match name {
            "COZE_API_URL" => Some("https://env.example/v3/chat".to_string()),
            "COZE_BOT_ID" => Some("env-bot".to_string()),
            _ => None,
        });
        assert_eq!(upstream.api_url, "https://env.example/v3/chat");
        assert_eq!(upstream.api_token, "file-token");
        assert_eq!(upstream.bot_id, "env-bot");
    }

    #[test]
    fn test_blank_env_override_is_ignored() {
        let mut upstream = UpstreamConfig {
            api_token: "file-token".to_string(),
            ..UpstreamConfig::default()
        };
        upstream.apply_overrides(|name| match name {
            "COZE_API_TOKEN" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(upstream.api_token, "file-token");
    }

    #[test]
    fn test_token_is_not_serialized() {
        let config = UpstreamConfig {
            api_token: "secret".to_string(),
            ..UpstreamConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).expect("serialize");
        assert!(!yaml.contains("secret"));
    }
}
