//! Connection manager
//!
//! Owns the single live connection to the intake. Writes hold the lock for
//! the whole record so concurrent workers never interleave bytes on the
//! stream. A failed write triggers one reconnect cycle and one more write;
//! after that the error is returned.

use super::backoff::Backoff;
use super::transport::{self, Connection};
use crate::core::{BackoffPolicy, EndpointConfig, Result, TransportError, TransportMetrics};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// First write plus the single retry after a reconnect
const MAX_WRITE_ATTEMPTS: u32 = 2;

pub struct ConnectionManager {
    endpoint: EndpointConfig,
    backoff: BackoffPolicy,
    conn: Mutex<Option<Connection>>,
    closed: AtomicBool,
    metrics: Arc<TransportMetrics>,
}

impl ConnectionManager {
    /// Create a manager without connecting
    pub fn new(
        endpoint: EndpointConfig,
        backoff: BackoffPolicy,
        metrics: Arc<TransportMetrics>,
    ) -> Self {
        Self {
            endpoint,
            backoff,
            conn: Mutex::new(None),
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    /// Create a manager and establish the first connection
    pub fn connect(
        endpoint: EndpointConfig,
        backoff: BackoffPolicy,
        metrics: Arc<TransportMetrics>,
    ) -> Result<Self> {
        let manager = Self::new(endpoint, backoff, metrics);
        manager.dial()?;
        Ok(manager)
    }

    /// Open a new connection and swap it in for the current one
    pub fn dial(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }

        debug!("dialing log intake at {}", self.endpoint);
        let conn = transport::connect(&self.endpoint)
            .map_err(|err| TransportError::dial(self.endpoint.address(), err))?;

        self.install(conn)
    }

    /// Swap in a freshly dialed connection
    ///
    /// `close` may have run while the dial was in flight; the closed flag is
    /// checked again under the lock so a late connection is shut down
    /// instead of outliving the manager.
    fn install(&self, conn: Connection) -> Result<()> {
        let mut guard = self.conn.lock();
        if self.is_closed() {
            drop(guard);
            let _ = conn.shutdown();
            return Err(TransportError::ConnectionClosed);
        }
        let previous = guard.replace(conn);
        drop(guard);

        if let Some(previous) = previous {
            let _ = previous.shutdown();
        }
        Ok(())
    }

    /// Dial until it succeeds or the backoff budget runs out
    pub fn redial(&self) -> Result<()> {
        let mut backoff = Backoff::new(self.backoff.clone());
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match self.dial() {
                Ok(()) => {
                    self.metrics.record_reconnect();
                    info!(
                        "reconnected to log intake at {} after {} attempt(s)",
                        self.endpoint, attempts
                    );
                    return Ok(());
                }
                Err(TransportError::ConnectionClosed) => {
                    return Err(TransportError::ConnectionClosed);
                }
                Err(err) => err,
            };

            match backoff.next_sleep(Instant::now()) {
                Some(delay) => {
                    debug!(
                        "reconnect attempt {} to {} failed: {}; retrying in {:?}",
                        attempts, self.endpoint, err, delay
                    );
                    thread::sleep(delay);
                }
                None => {
                    warn!(
                        "giving up reconnecting to {} after {} attempts: {}",
                        self.endpoint, attempts, err
                    );
                    return Err(TransportError::ReconnectExhausted {
                        attempts,
                        source: Box::new(err),
                    });
                }
            }
        }
    }

    /// Write one framed record
    ///
    /// On failure the connection is re-established (with backoff) and the
    /// write is retried exactly once. A failed reconnect or a second failed
    /// write is returned to the caller.
    pub fn write(&self, record: &[u8]) -> Result<()> {
        let mut attempt = 1;
        loop {
            let err = match self.try_write(record) {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if attempt >= MAX_WRITE_ATTEMPTS || self.is_closed() {
                return Err(err);
            }

            warn!(
                "write to log intake at {} failed: {}; reconnecting",
                self.endpoint, err
            );
            self.redial()?;
            attempt += 1;
        }
    }

    fn try_write(&self, record: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }

        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or_else(|| {
            TransportError::write(io::Error::new(
                io::ErrorKind::NotConnected,
                "no active connection",
            ))
        })?;

        let result = conn
            .set_write_timeout(self.endpoint.write_timeout)
            .and_then(|()| conn.write_all(record));

        if let Err(err) = result {
            // A partially written record leaves the stream unusable.
            if let Some(broken) = guard.take() {
                let _ = broken.shutdown();
            }
            return Err(TransportError::write(err));
        }
        Ok(())
    }

    /// Close the live connection
    ///
    /// Returns [`TransportError::ConnectionClosed`] when there is no live
    /// connection, e.g. after an unrecovered failure or a second close.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        let conn = self.conn.lock().take();
        match conn {
            Some(conn) => {
                conn.shutdown()?;
                Ok(())
            }
            None => Err(TransportError::ConnectionClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }
}
