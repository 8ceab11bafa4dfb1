//! Connection management for the intake stream
//!
//! `transport` dials TCP (optionally wrapped in TLS), `backoff` paces
//! reconnect attempts, and `manager` ties them into write-then-retry-once.

pub mod backoff;
pub mod manager;
pub mod transport;

pub use backoff::Backoff;
pub use manager::ConnectionManager;
pub use transport::Connection;
