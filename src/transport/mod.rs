//! HTTP transport to the upstream chat provider.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;

use crate::config::ServerConfig;
use crate::error::RelayError;

fn build_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
) -> Result<reqwest::Client, RelayError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .timeout(timeout)
        .build()
        .map_err(|err| RelayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Lazily-built pooled HTTP client for upstream requests.
///
/// One upstream failure is terminal for a request: there is no retry loop
/// here, callers surface the error directly.
pub struct HttpTransport {
    client: OnceLock<Arc<reqwest::Client>>,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new transport with connection pooling and timeouts from the
    /// given server config.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };
        Self {
            client: OnceLock::new(),
            pool_max_idle_per_host: config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            timeout: Duration::from_secs(config.timeout),
        }
    }

    fn client(&self) -> Arc<reqwest::Client> {
        if let Some(existing) = self.client.get() {
            return existing.clone();
        }

        let built = match build_client(
            self.pool_max_idle_per_host,
            self.pool_idle_timeout,
            self.timeout,
        ) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                Arc::new(reqwest::Client::new())
            }
        };
        let _ = self.client.set(built.clone());
        self.client.get().cloned().unwrap_or(built)
    }

    /// Send a streaming POST to the upstream; the caller reads the response
    /// body as a stream.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the request cannot be executed.
    pub async fn send_stream(
        &self,
        url: &url::Url,
        bearer_token: &str,
        body: Bytes,
    ) -> Result<reqwest::Response, RelayError> {
        self.client()
            .post(url.clone())
            .bearer_auth(bearer_token)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| RelayError::Transport(format!("upstream request failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_is_lazy() {
        let transport = HttpTransport::new(&ServerConfig::default());
        assert!(transport.client.get().is_none());
        let _ = transport.client();
        assert!(transport.client.get().is_some());
    }

    #[test]
    fn test_client_is_cached() {
        let transport = HttpTransport::new(&ServerConfig::default());
        let first = transport.client();
        let second = transport.client();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_zero_idle_timeout_disables_pool_timeout() {
        let transport = HttpTransport::new(&ServerConfig {
            http_pool_idle_timeout_secs: 0,
            ..ServerConfig::default()
        });
        assert!(transport.pool_idle_timeout.is_none());
    }
}
