use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is
/// violated. Runs once at startup so a misconfigured relay fails fast
/// instead of surfacing per-request 500s.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is
/// violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream_config(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if upstream.api_url.trim().is_empty() {
        return Err(validation_err(
            "upstream.api_url is required (or set COZE_API_URL)",
        ));
    }
    if !upstream.api_url.starts_with("http://") && !upstream.api_url.starts_with("https://") {
        return Err(validation_err(
            "upstream.api_url must start with http:// or https://",
        ));
    }
    url::Url::parse(&upstream.api_url)
        .map_err(|err| validation_err(format!("upstream.api_url is not a valid URL: {err}")))?;
    if upstream.api_token.trim().is_empty() {
        return Err(validation_err(
            "upstream.api_token is required (or set COZE_API_TOKEN)",
        ));
    }
    if upstream.bot_id.trim().is_empty() {
        return Err(validation_err(
            "upstream.bot_id is required (or set COZE_BOT_ID)",
        ));
    }
    if upstream.user_id.trim().is_empty() {
        return Err(validation_err("upstream.user_id cannot be empty"));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
