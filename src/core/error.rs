//! Error types for the transport

use std::io;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No API key configured
    #[error("No API key provided. Generate one in the account API settings of the log intake provider")]
    MissingApiKey,

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// TCP connect or TLS handshake failure
    #[error("Failed to connect to {endpoint}: {source}")]
    Dial {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Backoff budget spent without a successful dial
    #[error("Failed to reconnect after {attempts} attempts: {source}")]
    ReconnectExhausted {
        attempts: u32,
        #[source]
        source: Box<TransportError>,
    },

    /// Socket write failure
    #[error("Write to log intake failed: {source}")]
    Write {
        #[source]
        source: io::Error,
    },

    /// Connection already closed
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Admission attempted after shutdown
    #[error("Queue is closed")]
    QueueClosed,

    /// Entry field not representable on the wire
    #[error("Cannot serialize field '{field}': {message}")]
    Serialization { field: String, message: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        TransportError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a dial error for the given endpoint
    pub fn dial(endpoint: impl Into<String>, source: io::Error) -> Self {
        TransportError::Dial {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Create a write error
    pub fn write(source: io::Error) -> Self {
        TransportError::Write { source }
    }

    /// Create a serialization error for a named field
    pub fn serialization(field: impl Into<String>, message: impl Into<String>) -> Self {
        TransportError::Serialization {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Network-layer failure that a later attempt may get past
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Dial { .. } | TransportError::Write { .. } | TransportError::Io(_)
        )
    }
}
