// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::Options;
use crate::sequence::ServiceType;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub type ServiceId = u64;
pub type GroupId = u64;

/// Lifecycle of a service.
///
/// `Starting -> Running -> Stopping -> Stopped`, with `TimedOut` reachable
/// from any non-terminal state when smartbeats stop. Code 0 is not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Starting,
    Running,
    Stopping,
    Stopped,
    TimedOut,
}

impl ServiceState {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(ServiceState::Starting),
            2 => Some(ServiceState::Running),
            3 => Some(ServiceState::Stopping),
            4 => Some(ServiceState::Stopped),
            5 => Some(ServiceState::TimedOut),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            ServiceState::Starting => 1,
            ServiceState::Running => 2,
            ServiceState::Stopping => 3,
            ServiceState::Stopped => 4,
            ServiceState::TimedOut => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::TimedOut)
    }

    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, TimedOut) | (_, Stopped) => true,
            (Starting, Running) | (Starting, Stopping) => true,
            (Running, Stopping) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// A service's standing inside one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    Expected,
    Joined,
    Error,
}

impl MembershipState {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(MembershipState::Expected),
            2 => Some(MembershipState::Joined),
            0xff => Some(MembershipState::Error),
            _ => None,
        }
    }
}

/// What the native layer knows about a service when it announces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRef {
    pub id: ServiceId,
    pub name: String,
    pub service_type: ServiceType,
    pub state: ServiceState,
}

/// Library wrapper for a service.
#[derive(Debug, PartialEq, Eq)]
pub struct Service {
    id: ServiceId,
    name: Option<String>,
    service_type: Option<ServiceType>,
    placeholder: bool,
}

impl Service {
    pub fn from_native(native: &ServiceRef) -> Self {
        Self {
            id: native.id,
            name: Some(native.name.clone()),
            service_type: Some(native.service_type),
            placeholder: false,
        }
    }

    /// Stand-in for a service announced without a native reference.
    pub fn placeholder(id: ServiceId) -> Self {
        Self {
            id,
            name: None,
            service_type: None,
            placeholder: true,
        }
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn service_type(&self) -> Option<ServiceType> {
        self.service_type
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "service '{}' ({})", name, self.id),
            None => write!(f, "service {}", self.id),
        }
    }
}

/// A named group of services. Its options carry the key of the callback
/// adapter registered for it.
#[derive(Debug)]
pub struct ServiceGroup {
    id: GroupId,
    name: String,
    options: Options,
    activity_timeout: Option<Duration>,
}

impl ServiceGroup {
    pub fn new(id: GroupId, name: impl Into<String>, options: Options) -> Self {
        Self {
            id,
            name: name.into(),
            options,
            activity_timeout: None,
        }
    }

    /// Override the tracker-wide activity timeout for members of this group.
    pub fn with_activity_timeout(mut self, timeout: Duration) -> Self {
        self.activity_timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn activity_timeout(&self) -> Option<Duration> {
        self.activity_timeout
    }
}
