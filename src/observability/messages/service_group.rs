// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for service-group membership, smartbeats and timeouts.
//!
//! Most of these are consistency warnings: the tracker saw an event for a
//! group or service it cannot resolve and had to drop it or deliver it
//! with a placeholder.

use crate::observability::messages::StructuredLog;
use crate::service_group::{GroupId, ServiceId, ServiceState};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// An event named a group that is not mapped.
///
/// # Log Level
/// `warn!` - Consistency warning; the event is dropped
///
/// # Example
/// ```
/// use the_switchboard::observability::messages::service_group::GroupUnresolved;
///
/// let msg = GroupUnresolved {
///     event: "smartbeat",
///     group: 7,
///     service: 12,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct GroupUnresolved<'a> {
    pub event: &'a str,
    pub group: GroupId,
    pub service: ServiceId,
}

impl Display for GroupUnresolved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dropping {} for service {}: group {} is not known",
            self.event, self.service, self.group
        )
    }
}

impl StructuredLog for GroupUnresolved<'_> {
    fn log(&self) {
        tracing::warn!(
            event = self.event,
            group = self.group,
            service = self.service,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "group_unresolved",
            span_name = name,
            group = self.group,
            service = self.service,
        )
    }
}

/// An event named a service that is not mapped.
///
/// # Log Level
/// `warn!` - Consistency warning; the event is dropped
pub struct ServiceUnresolved<'a> {
    pub event: &'a str,
    pub group: Option<GroupId>,
    pub service: ServiceId,
}

impl Display for ServiceUnresolved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.group {
            Some(group) => write!(
                f,
                "Dropping {} in group {}: service {} is not known",
                self.event, group, self.service
            ),
            None => write!(
                f,
                "Dropping {}: service {} is not known",
                self.event, self.service
            ),
        }
    }
}

impl StructuredLog for ServiceUnresolved<'_> {
    fn log(&self) {
        tracing::warn!(
            event = self.event,
            group = self.group,
            service = self.service,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("service_unresolved", span_name = name, service = self.service)
    }
}

/// A service was added without a native reference to build its wrapper
/// from; a placeholder stands in.
///
/// # Log Level
/// `warn!`
pub struct ServicePlaceholder {
    pub group: GroupId,
    pub service: ServiceId,
}

impl Display for ServicePlaceholder {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Service {} added to group {} without a native reference; using a placeholder",
            self.service, self.group
        )
    }
}

/// A smartbeat payload could not be decoded.
///
/// # Log Level
/// `warn!`
pub struct SmartbeatDecodeFailed<'a> {
    pub service: ServiceId,
    pub error: &'a dyn std::error::Error,
}

impl Display for SmartbeatDecodeFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dropping smartbeat from service {}: {}",
            self.service, self.error
        )
    }
}

/// A service went silent for longer than the activity timeout.
///
/// # Log Level
/// `warn!`
pub struct ServiceTimedOut {
    pub group: GroupId,
    pub service: ServiceId,
    pub silent_for: Duration,
}

impl Display for ServiceTimedOut {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Service {} in group {} timed out after {:?} of silence",
            self.service, self.group, self.silent_for
        )
    }
}

impl StructuredLog for ServiceTimedOut {
    fn log(&self) {
        tracing::warn!(
            group = self.group,
            service = self.service,
            silent_for_ms = self.silent_for.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "service_timed_out",
            span_name = name,
            group = self.group,
            service = self.service,
        )
    }
}

/// A service callback returned an error.
///
/// # Log Level
/// `error!`
pub struct ServiceCallbackFailed<'a> {
    pub event: &'a str,
    pub service: ServiceId,
    pub error: &'a anyhow::Error,
}

impl Display for ServiceCallbackFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Service callback for {} on service {} failed: {:#}",
            self.event, self.service, self.error
        )
    }
}

/// The native layer reported a transition the lifecycle does not allow.
/// It is still delivered; the native layer is authoritative.
///
/// # Log Level
/// `warn!`
pub struct UnexpectedTransition {
    pub service: ServiceId,
    pub from: ServiceState,
    pub to: ServiceState,
}

impl Display for UnexpectedTransition {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Service {} reported unexpected transition {} -> {}",
            self.service, self.from, self.to
        )
    }
}
