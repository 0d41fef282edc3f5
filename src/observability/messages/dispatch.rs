// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the dispatcher loop and event routing.
//!
//! This module contains message types for logging events related to:
//! * Dispatcher start and stop
//! * Events dropped during channel or sequence resolution
//! * Application handler failures
//! * Wrapper construction for objects first seen through an event

use crate::channel::{ChannelHandle, ChannelKind};
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Dispatcher entered its loop.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_switchboard::channel::ChannelHandle;
/// use the_switchboard::observability::messages::dispatch::DispatcherStarted;
/// use std::time::Duration;
///
/// let msg = DispatcherStarted {
///     mode: "listening",
///     channel: ChannelHandle(3),
///     group: "listening_group",
///     poll_interval: Duration::from_millis(200),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct DispatcherStarted<'a> {
    pub mode: &'a str,
    pub channel: ChannelHandle,
    pub group: &'a str,
    pub poll_interval: Duration,
}

impl Display for DispatcherStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatcher started in {} mode on {} (group '{}', poll interval {:?})",
            self.mode, self.channel, self.group, self.poll_interval
        )
    }
}

impl StructuredLog for DispatcherStarted<'_> {
    fn log(&self) {
        tracing::info!(
            mode = self.mode,
            channel = %self.channel,
            group = self.group,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "dispatcher",
            span_name = name,
            mode = self.mode,
            channel = %self.channel,
            group = self.group,
        )
    }
}

/// Dispatcher left its loop and returned to idle.
///
/// # Log Level
/// `info!` - Important operational event
pub struct DispatcherStopped {
    pub ticks: u64,
    pub delivered: u64,
    pub dropped: u64,
}

impl Display for DispatcherStopped {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatcher stopped after {} ticks: {} events delivered, {} dropped",
            self.ticks, self.delivered, self.dropped
        )
    }
}

impl StructuredLog for DispatcherStopped {
    fn log(&self) {
        tracing::info!(
            ticks = self.ticks,
            delivered = self.delivered,
            dropped = self.dropped,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("dispatcher_stopped", span_name = name, ticks = self.ticks)
    }
}

/// An event could not be routed and was discarded.
///
/// # Log Level
/// `warn!` - The loop continues, but the application never sees the event
///
/// # Example
/// ```
/// use the_switchboard::errors::DispatchError;
/// use the_switchboard::observability::messages::dispatch::EventDropped;
///
/// let error = DispatchError::UnknownChannelType { raw: 42 };
/// let msg = EventDropped {
///     event: "data",
///     reason: &error,
/// };
///
/// assert!(msg.to_string().contains("unknown channel type 42"));
/// ```
pub struct EventDropped<'a> {
    pub event: &'a str,
    pub reason: &'a dyn std::error::Error,
}

impl Display for EventDropped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Dropped {} event: {}", self.event, self.reason)
    }
}

impl StructuredLog for EventDropped<'_> {
    fn log(&self) {
        tracing::warn!(
            event = self.event,
            reason = %self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("event_dropped", span_name = name, event = self.event)
    }
}

/// An application handler returned an error.
///
/// # Log Level
/// `error!` - Failure requiring attention; dispatch continues
pub struct HandlerFailed<'a> {
    pub event: &'a str,
    pub channel: ChannelHandle,
    pub error: &'a anyhow::Error,
}

impl Display for HandlerFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Handler for {} event on {} failed: {:#}",
            self.event, self.channel, self.error
        )
    }
}

impl StructuredLog for HandlerFailed<'_> {
    fn log(&self) {
        tracing::error!(
            event = self.event,
            channel = %self.channel,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "handler_failed",
            span_name = name,
            event = self.event,
            channel = %self.channel,
        )
    }
}

/// A wrapper was constructed for an object first seen through an event.
///
/// # Log Level
/// `debug!`
pub struct WrapperConstructed<'a> {
    pub object: &'a str,
    pub id: u64,
}

impl Display for WrapperConstructed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Constructed {} wrapper for native id {:#x}", self.object, self.id)
    }
}

/// Creation events for UDP channels carry no connection and are skipped.
///
/// # Log Level
/// `debug!`
pub struct CreationIgnored {
    pub channel: ChannelHandle,
    pub kind: ChannelKind,
}

impl Display for CreationIgnored {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Ignoring creation of {} channel {}", self.kind, self.channel)
    }
}

/// Unregistering the listening channel at loop exit failed.
///
/// # Log Level
/// `warn!`
pub struct UnregisterFailed<'a> {
    pub channel: ChannelHandle,
    pub error: &'a dyn std::error::Error,
}

impl Display for UnregisterFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Failed to unregister {}: {}", self.channel, self.error)
    }
}
