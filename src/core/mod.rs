//! Core transport types

pub mod config;
pub mod error;
pub mod log_context;
pub mod log_entry;
pub mod log_level;
pub mod metrics;
pub mod overflow_policy;
pub mod record;

pub use config::{BackoffPolicy, DefaultTags, EndpointConfig, TlsOptions, TransportConfig};
pub use error::{Result, TransportError};
pub use log_context::{FieldValue, LogContext};
pub use log_entry::LogEntry;
pub use log_level::LogLevel;
pub use metrics::TransportMetrics;
pub use overflow_policy::{OverflowCallback, OverflowPolicy, SendErrorCallback};
pub use record::{encode_entry, Record};
