//! Backend dialing.
//!
//! The routing engine never constructs a `tonic::transport::Channel`
//! directly — it goes through a `Dialer` trait so tests can substitute an
//! in-process channel without a real TCP connection.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::error::{GatewayError, Result};

/// Drives how the engine connects to a backend server address during rebuild.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Use plaintext HTTP/2 (no TLS) when dialing backends.
    pub plaintext: bool,

    /// Maximum time to wait for a connection to be established.
    pub connect_timeout: Duration,

    /// Idle keepalive ping interval; `None` disables keepalive pings.
    pub keepalive: Option<Duration>,

    /// Custom User-Agent string sent on every call.
    pub user_agent: Option<String>,

    /// Maximum encoded size of a response message, in bytes. `None` means
    /// tonic's default.
    pub max_msg_size: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            plaintext: true,
            connect_timeout: Duration::from_secs(10),
            keepalive: None,
            user_agent: None,
            max_msg_size: None,
        }
    }
}

/// Dials a backend server address into a reusable gRPC channel.
///
/// Routes reference backends by address string (`"host:port"`); the engine
/// holds at most one `Channel` per address, shared across every route whose
/// `call.server` names it.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, server: &str) -> Result<Channel>;
}

/// The production dialer: builds a `tonic::transport::Channel` per the
/// engine-wide `ConnectionConfig`.
pub struct GrpcDialer {
    config: ConnectionConfig,
}

impl GrpcDialer {
    pub fn new(config: ConnectionConfig) -> Self {
        GrpcDialer { config }
    }
}

#[async_trait]
impl Dialer for GrpcDialer {
    async fn dial(&self, server: &str) -> Result<Channel> {
        let scheme = if self.config.plaintext { "http" } else { "https" };
        let uri = format!("{scheme}://{server}");

        let mut endpoint = Endpoint::from_shared(uri)
            .map_err(|e| GatewayError::Dial(format!("invalid backend address {server:?}: {e}")))?
            .connect_timeout(self.config.connect_timeout);

        if let Some(interval) = self.config.keepalive {
            endpoint = endpoint.keep_alive_timeout(interval).keep_alive_while_idle(true);
        }

        if let Some(ua) = &self.config.user_agent {
            endpoint = endpoint
                .user_agent(ua.as_str())
                .map_err(|e| GatewayError::Dial(format!("invalid user agent: {e}")))?;
        }

        if let Some(max) = self.config.max_msg_size {
            endpoint = endpoint.buffer_size(max);
        }

        if !self.config.plaintext {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| GatewayError::Dial(format!("TLS configuration error: {e}")))?;
        }

        endpoint
            .connect()
            .await
            .map_err(|e| GatewayError::Dial(format!("failed to connect to {server}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_plaintext_with_ten_second_timeout() {
        let config = ConnectionConfig::default();
        assert!(config.plaintext);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn dial_rejects_an_unparseable_address() {
        let dialer = GrpcDialer::new(ConnectionConfig::default());
        let err = dialer.dial("not a valid uri authority \u{0}").await.unwrap_err();
        assert!(matches!(err, GatewayError::Dial(_)));
    }
}
