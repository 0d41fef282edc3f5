// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ProtocolError;
use crate::sequence::Element;
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Most endpoints a single name can advertise.
pub const MAX_ENDPOINTS: usize = 5;

/// Opaque application data handed back with every name-info callback.
pub type AppInfo = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FtState {
    #[default]
    Standby,
    Active,
}

impl FtState {
    pub fn from_raw(raw: u8) -> Result<Self, ProtocolError> {
        match raw {
            0 => Ok(FtState::Standby),
            1 => Ok(FtState::Active),
            other => Err(ProtocolError::UnknownFtState(other)),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            FtState::Standby => 0,
            FtState::Active => 1,
        }
    }

    /// Parse the `fault_tolerant_state` option value.
    pub fn from_option(value: &str) -> Option<Self> {
        match value {
            "active" => Some(FtState::Active),
            "standby" => Some(FtState::Standby),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameEndpoint {
    pub address: Ipv4Addr,
    pub port: u16,
    pub protocol: Option<String>,
}

impl fmt::Display for NameEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.protocol {
            Some(protocol) => write!(f, "{}://{}:{}", protocol, self.address, self.port),
            None => write!(f, "{}:{}", self.address, self.port),
        }
    }
}

/// Why a name-info callback fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameInfoEvent {
    Delivered,
    Expired,
}

/// The resolution of a name at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameInfo {
    name: String,
    endpoints: Vec<NameEndpoint>,
    ft_state: FtState,
    removed: bool,
    #[serde(skip)]
    meta_data: Vec<Element>,
}

impl NameInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints: Vec::new(),
            ft_state: FtState::default(),
            removed: false,
            meta_data: Vec::new(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Vec<NameEndpoint>) -> Self {
        self.endpoints = endpoints;
        self.endpoints.truncate(MAX_ENDPOINTS);
        self
    }

    pub fn with_ft_state(mut self, ft_state: FtState) -> Self {
        self.ft_state = ft_state;
        self
    }

    pub fn with_removed(mut self, removed: bool) -> Self {
        self.removed = removed;
        self
    }

    /// Attach application elements. Tags `1..=9` belong to the name-service
    /// protocol (see [`RESERVED_TAGS`](crate::name_service::protocol::RESERVED_TAGS));
    /// an element using one of them is read back as a protocol field rather
    /// than as metadata.
    pub fn with_meta_data(mut self, meta_data: Vec<Element>) -> Self {
        self.meta_data = meta_data;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[NameEndpoint] {
        &self.endpoints
    }

    pub fn ft_state(&self) -> FtState {
        self.ft_state
    }

    /// True when a subscription is being told the name went away.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Application elements the registrant attached to the name.
    pub fn meta_data(&self) -> &[Element] {
        &self.meta_data
    }
}
