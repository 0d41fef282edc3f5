// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for name registration, lookup, subscription and expiry.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A register/request/subscribe message was handed to the transport.
///
/// # Log Level
/// `debug!`
///
/// # Example
/// ```
/// use the_switchboard::observability::messages::name_service::NameRequestSubmitted;
///
/// let msg = NameRequestSubmitted {
///     kind: "request",
///     name: "telemetry",
///     request_id: 4,
///     expiration_ms: Some(1000),
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct NameRequestSubmitted<'a> {
    pub kind: &'a str,
    pub name: &'a str,
    pub request_id: u64,
    pub expiration_ms: Option<u64>,
}

impl Display for NameRequestSubmitted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.expiration_ms {
            Some(ms) => write!(
                f,
                "Submitted name {} #{} for '{}' (expires in {}ms)",
                self.kind, self.request_id, self.name, ms
            ),
            None => write!(
                f,
                "Submitted name {} #{} for '{}'",
                self.kind, self.request_id, self.name
            ),
        }
    }
}

impl StructuredLog for NameRequestSubmitted<'_> {
    fn log(&self) {
        tracing::debug!(
            kind = self.kind,
            name = self.name,
            request_id = self.request_id,
            expiration_ms = self.expiration_ms,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "name_request",
            span_name = name,
            kind = self.kind,
            name = self.name,
            request_id = self.request_id,
        )
    }
}

/// The transport could not take the message right now.
///
/// # Log Level
/// `warn!` - The caller decides whether to retry
pub struct NameRequestWouldBlock<'a> {
    pub kind: &'a str,
    pub name: &'a str,
}

impl Display for NameRequestWouldBlock<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Name {} for '{}' would block; request not kept",
            self.kind, self.name
        )
    }
}

impl StructuredLog for NameRequestWouldBlock<'_> {
    fn log(&self) {
        tracing::warn!(kind = self.kind, name = self.name, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("name_request_would_block", span_name = name, kind = self.kind)
    }
}

/// Name info was delivered to a pending request's callback.
///
/// # Log Level
/// `debug!`
pub struct NameInfoDelivered<'a> {
    pub name: &'a str,
    pub request_id: u64,
    pub endpoints: usize,
}

impl Display for NameInfoDelivered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Delivered name info for '{}' to request #{} ({} endpoints)",
            self.name, self.request_id, self.endpoints
        )
    }
}

/// A pending request reached its expiration without (further) answers.
///
/// # Log Level
/// `info!`
pub struct NameRequestExpired<'a> {
    pub name: &'a str,
    pub request_id: u64,
}

impl Display for NameRequestExpired<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Name request #{} for '{}' expired", self.request_id, self.name)
    }
}

impl StructuredLog for NameRequestExpired<'_> {
    fn log(&self) {
        tracing::info!(name = self.name, request_id = self.request_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "name_request_expired",
            span_name = name,
            name = self.name,
            request_id = self.request_id,
        )
    }
}

/// A name-info callback returned an error.
///
/// # Log Level
/// `error!`
pub struct NameCallbackFailed<'a> {
    pub name: &'a str,
    pub request_id: u64,
    pub error: &'a anyhow::Error,
}

impl Display for NameCallbackFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Name-info callback for '{}' (request #{}) failed: {:#}",
            self.name, self.request_id, self.error
        )
    }
}

impl StructuredLog for NameCallbackFailed<'_> {
    fn log(&self) {
        tracing::error!(
            name = self.name,
            request_id = self.request_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("name_callback_failed", span_name = name, name = self.name)
    }
}

/// A name-service response could not be decoded.
///
/// # Log Level
/// `warn!`
pub struct NameResponseMalformed<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for NameResponseMalformed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Discarding malformed name-service response: {}", self.error)
    }
}

/// A name server stopped sending heartbeats.
///
/// # Log Level
/// `warn!`
pub struct NameServerExpired {
    pub server_id: u64,
    pub silent_for: Duration,
}

impl Display for NameServerExpired {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Name server {:#x} silent for {:?}; forgetting it",
            self.server_id, self.silent_for
        )
    }
}

impl StructuredLog for NameServerExpired {
    fn log(&self) {
        tracing::warn!(
            server_id = self.server_id,
            silent_for_ms = self.silent_for.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("name_server_expired", span_name = name, server_id = self.server_id)
    }
}

/// Live subscriptions were sent again.
///
/// # Log Level
/// `info!`
pub struct Resubscribed {
    pub count: usize,
}

impl Display for Resubscribed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Re-sent {} name subscriptions", self.count)
    }
}
