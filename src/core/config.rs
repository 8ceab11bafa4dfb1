//! Transport configuration
//!
//! Every value here is fixed once [`Transport::dial`](crate::Transport::dial)
//! returns. Defaults target the provider's public TLS intake; tests point the
//! endpoint at a local plain-TCP listener instead.

use super::error::{Result, TransportError};
use super::overflow_policy::OverflowPolicy;
use std::fmt;
use std::time::Duration;

/// Default intake host
pub const DEFAULT_INTAKE_HOST: &str = "intake.logs.datadoghq.com";
/// Default intake TLS port
pub const DEFAULT_INTAKE_PORT: u16 = 10516;
/// Name checked against the intake certificate (`*.logs.datadoghq.com`)
pub const DEFAULT_SERVER_NAME: &str = "intake.logs.datadoghq.com";
/// Default bound on TCP connect and TLS handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Default per-attempt write deadline
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default idle time before TCP keep-alive probes start
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5 * 60);
/// Default number of jobs the queue admits before applying the overflow policy
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// Default number of send workers; 1 keeps records in submission order
pub const DEFAULT_CONCURRENCY: usize = 1;
/// Default first backoff interval
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Default ceiling for a single backoff interval
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(60);
/// Default total time a reconnect may keep retrying
pub const DEFAULT_BACKOFF_DEADLINE: Duration = Duration::from_secs(15 * 60);

/// TLS settings for the intake connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// Name presented via SNI and checked against the server certificate
    pub server_name: String,
    /// Skip certificate and hostname validation (test stubs only)
    pub accept_invalid_certs: bool,
    /// Extra PEM trust anchor, e.g. for a private intake relay
    pub root_certificate_pem: Option<String>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            accept_invalid_certs: false,
            root_certificate_pem: None,
        }
    }
}

/// Where and how the connection manager dials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    /// `None` means plain TCP
    pub tls: Option<TlsOptions>,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    /// Idle time before keep-alive probes; `None` leaves keep-alive off
    pub keep_alive: Option<Duration>,
}

impl EndpointConfig {
    /// Plain TCP endpoint, mainly for local stubs
    pub fn plain(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: None,
            ..Self::default()
        }
    }

    /// TLS endpoint validated against `server_name`
    pub fn tls(host: impl Into<String>, port: u16, server_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            tls: Some(TlsOptions {
                server_name: server_name.into(),
                ..TlsOptions::default()
            }),
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(TransportError::config("EndpointConfig", "host is empty"));
        }
        if self.port == 0 {
            return Err(TransportError::config("EndpointConfig", "port must be non-zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(TransportError::config(
                "EndpointConfig",
                "connect_timeout must be non-zero",
            ));
        }
        if self.write_timeout.is_zero() {
            return Err(TransportError::config(
                "EndpointConfig",
                "write_timeout must be non-zero",
            ));
        }
        if self.keep_alive.is_some_and(|period| period.is_zero()) {
            return Err(TransportError::config(
                "EndpointConfig",
                "keep_alive must be non-zero when set",
            ));
        }
        if let Some(tls) = &self.tls {
            if tls.server_name.trim().is_empty() {
                return Err(TransportError::config("TlsOptions", "server_name is empty"));
            }
        }
        Ok(())
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_INTAKE_HOST.to_string(),
            port: DEFAULT_INTAKE_PORT,
            tls: Some(TlsOptions::default()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            keep_alive: Some(DEFAULT_KEEP_ALIVE),
        }
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls.is_some() { "tls" } else { "tcp" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Exponential backoff policy for reconnection attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// First interval
    pub base: Duration,
    /// Largest single interval
    pub cap: Duration,
    /// Total time after the first failure before giving up
    pub deadline: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
            deadline: DEFAULT_BACKOFF_DEADLINE,
        }
    }
}

/// Reserved attributes stamped on every record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultTags {
    pub host: String,
    pub service: String,
    pub source: String,
}

/// Full transport configuration
#[derive(Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// API key prefixed to every record (required)
    pub api_key: String,
    pub tags: DefaultTags,
    pub endpoint: EndpointConfig,
    pub backoff: BackoffPolicy,
    pub queue_capacity: usize,
    pub concurrency: usize,
    pub overflow_policy: OverflowPolicy,
}

impl TransportConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Check every field before any socket is opened
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(TransportError::MissingApiKey);
        }
        if self.api_key.chars().any(|c| c.is_whitespace()) {
            return Err(TransportError::config(
                "TransportConfig",
                "api_key must not contain whitespace",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(TransportError::config(
                "JobQueue",
                "capacity must be greater than or equal to 1",
            ));
        }
        if self.concurrency == 0 {
            return Err(TransportError::config(
                "JobQueue",
                "concurrency must be greater than or equal to 1",
            ));
        }
        if self.backoff.base > self.backoff.cap {
            return Err(TransportError::config(
                "BackoffPolicy",
                "base must not exceed cap",
            ));
        }
        if let OverflowPolicy::BlockWithTimeout(timeout) = self.overflow_policy {
            if timeout.is_zero() {
                return Err(TransportError::config(
                    "OverflowPolicy",
                    "BlockWithTimeout requires a non-zero timeout",
                ));
            }
        }
        self.endpoint.validate()
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            tags: DefaultTags::default(),
            endpoint: EndpointConfig::default(),
            backoff: BackoffPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            concurrency: DEFAULT_CONCURRENCY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

// Keeps the API key out of debug output.
impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("api_key", &"<redacted>")
            .field("tags", &self.tags)
            .field("endpoint", &self.endpoint)
            .field("backoff", &self.backoff)
            .field("queue_capacity", &self.queue_capacity)
            .field("concurrency", &self.concurrency)
            .field("overflow_policy", &self.overflow_policy)
            .finish()
    }
}
