//! # Log Intake Transport
//!
//! Ships structured log entries to a remote log-intake endpoint over a
//! persistent TLS connection without blocking the caller on network I/O.
//!
//! ## Features
//!
//! - **Non-blocking**: entries are encoded on the caller's thread and sent by
//!   a small worker pool behind a bounded queue
//! - **Resilient**: a failed write reconnects with jittered exponential
//!   backoff and retries exactly once
//! - **Ordered**: a single worker (the default) writes records in submission
//!   order
//! - **Observable**: send failures surface through the `log` facade,
//!   metrics and callbacks
//!
//! Each record on the wire is `<api-key> <json>\n`.

pub mod connection;
pub mod core;
pub mod macros;
pub mod queue;
pub mod transport;

pub mod prelude {
    pub use crate::core::{
        BackoffPolicy, DefaultTags, EndpointConfig, FieldValue, LogContext, LogEntry, LogLevel,
        OverflowCallback, OverflowPolicy, Result, SendErrorCallback, TlsOptions,
        TransportConfig, TransportError, TransportMetrics,
    };
    pub use crate::transport::{Transport, TransportBuilder};
}

pub use crate::core::{
    BackoffPolicy, DefaultTags, EndpointConfig, FieldValue, LogContext, LogEntry, LogLevel,
    OverflowCallback, OverflowPolicy, Record, Result, SendErrorCallback, TlsOptions,
    TransportConfig, TransportError, TransportMetrics,
};
pub use crate::transport::{Transport, TransportBuilder};
