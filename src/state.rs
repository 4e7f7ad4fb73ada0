use crate::config::AppConfig;
use crate::error::RelayError;
use crate::transport::HttpTransport;

/// Shared application state accessible to all handlers. Read-only after
/// startup; per-request parser state lives in the handlers.
pub struct AppState {
    pub config: AppConfig,
    pub upstream_url: url::Url,
    pub transport: HttpTransport,
}

impl AppState {
    /// Build the state, parsing the upstream endpoint once so request
    /// handlers never re-validate it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the configured upstream URL does
    /// not parse.
    pub fn new(config: AppConfig, transport: HttpTransport) -> Result<Self, RelayError> {
        let upstream_url = url::Url::parse(&config.upstream.api_url)
            .map_err(|err| RelayError::Config(format!("invalid upstream api_url: {err}")))?;
        Ok(Self {
            config,
            upstream_url,
            transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, UpstreamConfig};

    #[test]
    fn test_state_parses_upstream_url_once() {
        let config = AppConfig {
            upstream: UpstreamConfig {
                api_url: "https://api.coze.com/v3/chat".to_string(),
                api_token: "pat-test".to_string(),
                bot_id: "bot-1".to_string(),
                ..UpstreamConfig::default()
            },
            ..AppConfig::default()
        };
        let state = AppState::new(config, HttpTransport::new(&ServerConfig::default()))
            .expect("valid state");
        assert_eq!(state.upstream_url.as_str(), "https://api.coze.com/v3/chat");
    }

    #[test]
    fn test_state_rejects_invalid_upstream_url() {
        let config = AppConfig {
            upstream: UpstreamConfig {
                api_url: "not a url".to_string(),
                ..UpstreamConfig::default()
            },
            ..AppConfig::default()
        };
        let result = AppState::new(config, HttpTransport::new(&ServerConfig::default()));
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
