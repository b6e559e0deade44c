//! Buffered batch delivery of log lines to an HTTPS log sink.
//!
//! This crate is the final stage of the collector pipeline: workers hand it
//! individual formatted messages, and it takes care of framing them as
//! syslog-shaped lines, batching them into bounded HTTP POST bodies, and
//! keeping a bounded number of requests in flight.
//!
//! ```text
//!   workers ──buffer()──► pending bytes ──trigger/period──► POST (≤ concurrency)
//! ```
//!
//! Delivery is best-effort by contract: a failed POST is logged and its batch
//! dropped. The producer side owns retransmission policy, not this client.

mod client;
mod line;

pub use client::{
    DeliveryClient, DeliveryConfig, DeliveryError, DEFAULT_CONCURRENCY, DEFAULT_PERIOD,
    DEFAULT_REQUEST_SIZE_TRIGGER, DEFAULT_REQUEST_TIMEOUT,
};

use chrono::{DateTime, Utc};

/// Destination seam for log messages.
///
/// Workers route records through this trait so tests can substitute a
/// recording sink for the real HTTP client.
pub trait Sink: Send + Sync {
    /// Queue one message for delivery.
    fn buffer(
        &self,
        priority: u8,
        when: DateTime<Utc>,
        host: &str,
        procid: &str,
        body: &[u8],
    ) -> Result<(), DeliveryError>;
}

impl Sink for DeliveryClient {
    fn buffer(
        &self,
        priority: u8,
        when: DateTime<Utc>,
        host: &str,
        procid: &str,
        body: &[u8],
    ) -> Result<(), DeliveryError> {
        DeliveryClient::buffer(self, priority, when, host, procid, body)
    }
}
