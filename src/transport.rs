//! Transport facade
//!
//! Binds the job queue to the connection manager. `handle_entry` encodes
//! the entry on the caller's thread and hands a send job to the queue; the
//! network write happens on a worker. Failures of that write are reported
//! through the diagnostic log, the metrics and the optional send-error
//! callback, never to the producer.

use crate::connection::ConnectionManager;
use crate::core::{
    BackoffPolicy, DefaultTags, EndpointConfig, LogEntry, OverflowCallback, OverflowPolicy,
    Record, Result, SendErrorCallback, TransportConfig, TransportError, TransportMetrics,
};
use crate::queue::{Job, JobQueue};
use log::warn;
use std::io;
use std::sync::Arc;

/// What every send job shares
struct SendContext {
    connection: ConnectionManager,
    metrics: Arc<TransportMetrics>,
    on_send_error: Option<SendErrorCallback>,
}

impl SendContext {
    fn send(&self, record: &Record) -> Result<()> {
        match self.connection.write(record.as_bytes()) {
            Ok(()) => {
                self.metrics.record_sent();
                Ok(())
            }
            Err(err) => {
                self.metrics.record_send_failure();
                Err(err)
            }
        }
    }
}

/// A pre-encoded record waiting for a worker
pub struct SendJob {
    record: Record,
    context: Arc<SendContext>,
}

impl Job for SendJob {
    fn run(self) {
        if let Err(err) = self.context.send(&self.record) {
            warn!(
                "dropping log record ({} bytes) after failed send: {}",
                self.record.len(),
                err
            );
            if let Some(ref callback) = self.context.on_send_error {
                callback(&err);
            }
        }
    }
}

/// Non-blocking log shipper
///
/// # Example
///
/// ```no_run
/// use log_intake_transport::{fields, LogEntry, LogLevel, Transport};
///
/// let transport = Transport::builder()
///     .api_key("0123456789abcdef")
///     .service("checkout")
///     .build()?;
///
/// let entry = LogEntry::new(LogLevel::Info, "order placed")
///     .with_fields(fields! { "order_id" => 42, "total" => 19.99 });
/// transport.handle_entry(&entry)?;
///
/// transport.flush();
/// transport.close()?;
/// # Ok::<(), log_intake_transport::TransportError>(())
/// ```
pub struct Transport {
    api_key: String,
    tags: DefaultTags,
    context: Arc<SendContext>,
    queue: JobQueue<SendJob>,
}

impl Transport {
    /// Validate the config, connect, and start the send workers
    ///
    /// A missing API key fails before any network call.
    pub fn dial(config: TransportConfig) -> Result<Self> {
        Self::dial_with_callbacks(config, None, None)
    }

    fn dial_with_callbacks(
        config: TransportConfig,
        on_overflow: Option<OverflowCallback>,
        on_send_error: Option<SendErrorCallback>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(TransportMetrics::new());
        let connection = ConnectionManager::connect(
            config.endpoint,
            config.backoff,
            Arc::clone(&metrics),
        )?;

        let queue = JobQueue::with_config(
            config.queue_capacity,
            config.concurrency,
            config.overflow_policy,
            on_overflow,
            Arc::clone(&metrics),
        );

        Ok(Self {
            api_key: config.api_key,
            tags: config.tags,
            context: Arc::new(SendContext {
                connection,
                metrics,
                on_send_error,
            }),
            queue,
        })
    }

    /// Create a builder for Transport
    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    /// Encode an entry and queue it for sending
    ///
    /// Only admission errors come back: [`TransportError::QueueClosed`] after
    /// `close`, or [`TransportError::Serialization`] when a field has no JSON
    /// form (the entry is dropped). Network failures of the queued send are
    /// reported on the side channel.
    pub fn handle_entry(&self, entry: &LogEntry) -> Result<()> {
        if self.queue.is_closed() {
            return Err(TransportError::QueueClosed);
        }

        let record = match Record::from_entry(&self.api_key, &self.tags, entry) {
            Ok(record) => record,
            Err(err) => {
                self.context.metrics.record_serialization_failure();
                warn!("dropping log entry that cannot be encoded: {}", err);
                return Err(err);
            }
        };

        self.queue.push(SendJob {
            record,
            context: Arc::clone(&self.context),
        })
    }

    /// Frame a payload with the API key and write it synchronously
    ///
    /// Returns the payload length on success. The payload should be a single
    /// line; an embedded newline splits it into two records on the intake.
    pub fn write(&self, payload: &[u8]) -> Result<usize> {
        let record = Record::frame(&self.api_key, payload);
        self.context.send(&record)?;
        Ok(payload.len())
    }

    /// Block until every queued or in-flight send has completed
    pub fn flush(&self) {
        self.queue.wait();
    }

    /// Stop accepting entries, drain pending sends, then close the connection
    ///
    /// The connection close may report [`TransportError::ConnectionClosed`]
    /// when an earlier failure already left no live connection.
    pub fn close(&self) -> Result<()> {
        self.queue.close();
        self.context.connection.close()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Sends admitted but not yet finished
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn tags(&self) -> &DefaultTags {
        &self.tags
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        self.context.connection.endpoint()
    }

    pub fn metrics(&self) -> &TransportMetrics {
        &self.context.metrics
    }
}

impl io::Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Transport::write(self, buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Transport::flush(self);
        Ok(())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        match self.close() {
            Ok(()) | Err(TransportError::ConnectionClosed) => {}
            Err(err) => warn!("error closing log intake transport: {}", err),
        }
    }
}

/// Builder for constructing a Transport with a fluent API
///
/// # Example
/// ```no_run
/// use log_intake_transport::prelude::*;
/// use std::sync::Arc;
///
/// let transport = Transport::builder()
///     .api_key("0123456789abcdef")
///     .host("web-1")
///     .service("checkout")
///     .source("rust")
///     .queue_capacity(500)
///     .overflow_policy(OverflowPolicy::DropNewest)
///     .on_overflow(Arc::new(|count: u64| {
///         eprintln!("ALERT: {} log records dropped", count);
///     }))
///     .build()?;
/// # Ok::<(), TransportError>(())
/// ```
pub struct TransportBuilder {
    config: TransportConfig,
    on_overflow: Option<OverflowCallback>,
    on_send_error: Option<SendErrorCallback>,
}

impl TransportBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::from_config(TransportConfig::default())
    }

    /// Start from an existing configuration
    pub fn from_config(config: TransportConfig) -> Self {
        Self {
            config,
            on_overflow: None,
            on_send_error: None,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = api_key.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.tags.host = host.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.config.tags.service = service.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.tags.source = source.into();
        self
    }

    /// Override where records are sent
    #[must_use = "builder methods return a new value"]
    pub fn endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.config.backoff = backoff;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Number of send workers
    ///
    /// Anything above 1 gives up ordering between records.
    #[must_use = "builder methods return a new value"]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the overflow policy for the send queue
    ///
    /// Default is `Block`.
    #[must_use = "builder methods return a new value"]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow_policy = policy;
        self
    }

    /// Callback invoked when records are dropped due to queue overflow
    #[must_use = "builder methods return a new value"]
    pub fn on_overflow(mut self, callback: OverflowCallback) -> Self {
        self.on_overflow = Some(callback);
        self
    }

    /// Callback invoked when a queued send fails for good
    #[must_use = "builder methods return a new value"]
    pub fn on_send_error(mut self, callback: SendErrorCallback) -> Self {
        self.on_send_error = Some(callback);
        self
    }

    /// Validate, connect and return the Transport
    pub fn build(self) -> Result<Transport> {
        Transport::dial_with_callbacks(self.config, self.on_overflow, self.on_send_error)
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
