// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Channel identity and the wrapper constructed for each native channel.
//!
//! A channel is an endpoint (TCP server, TCP client, accepted connection,
//! UDP listener, ...) owned by the native layer. The library only ever sees
//! an opaque [`ChannelHandle`] plus a raw kind code; [`ChannelKind::from_raw`]
//! is the single place those codes are interpreted.

use crate::errors::DispatchError;
use serde::Serialize;
use std::fmt;

/// Opaque native identity of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChannelHandle(pub u64);

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch#{:x}", self.0)
    }
}

/// Application-chosen channel id (used for logging and lookup by peers).
pub type ChannelId = u64;

/// OS-level descriptor reported alongside created/destroyed events.
pub type Fd = i32;

/// The native channel kinds the library knows how to wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    TcpServer,
    TcpClient,
    RawUdpListener,
    RawUdpClient,
    UdpListener,
    UdpClient,
    TcpAccepted,
}

impl ChannelKind {
    /// Map a native kind code onto a known kind.
    ///
    /// Unknown codes are an error; the caller decides whether that aborts
    /// the operation or just drops an event.
    pub fn from_raw(raw: u16) -> Result<Self, DispatchError> {
        match raw {
            1 => Ok(ChannelKind::TcpServer),
            2 => Ok(ChannelKind::TcpClient),
            3 => Ok(ChannelKind::RawUdpListener),
            4 => Ok(ChannelKind::RawUdpClient),
            5 => Ok(ChannelKind::UdpListener),
            6 => Ok(ChannelKind::UdpClient),
            7 => Ok(ChannelKind::TcpAccepted),
            _ => Err(DispatchError::UnknownChannelType { raw }),
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            ChannelKind::TcpServer => 1,
            ChannelKind::TcpClient => 2,
            ChannelKind::RawUdpListener => 3,
            ChannelKind::RawUdpClient => 4,
            ChannelKind::UdpListener => 5,
            ChannelKind::UdpClient => 6,
            ChannelKind::TcpAccepted => 7,
        }
    }

    /// TCP kinds carry per-connection lifecycle events; UDP kinds do not.
    pub fn is_connection_oriented(self) -> bool {
        matches!(
            self,
            ChannelKind::TcpServer | ChannelKind::TcpClient | ChannelKind::TcpAccepted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::TcpServer => "tcp_server",
            ChannelKind::TcpClient => "tcp_client",
            ChannelKind::RawUdpListener => "rawudp_listener",
            ChannelKind::RawUdpClient => "rawudp_client",
            ChannelKind::UdpListener => "udp_listener",
            ChannelKind::UdpClient => "udp_client",
            ChannelKind::TcpAccepted => "tcp_accepted",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Library-side wrapper for a native channel.
///
/// Wrappers are shared through the object registry as `Arc<Channel>`; two
/// lookups of the same handle while it is mapped yield the same allocation.
#[derive(Debug, PartialEq, Eq)]
pub struct Channel {
    handle: ChannelHandle,
    id: ChannelId,
    kind: ChannelKind,
    name: Option<String>,
}

impl Channel {
    pub fn new(handle: ChannelHandle, id: ChannelId, kind: ChannelKind, name: Option<String>) -> Self {
        Self {
            handle,
            id,
            kind,
            name,
        }
    }

    /// Build the wrapper for a channel first seen through a native event.
    pub fn from_native(handle: ChannelHandle, id: ChannelId, raw_kind: u16) -> Result<Self, DispatchError> {
        let kind = ChannelKind::from_raw(raw_kind)?;
        Ok(Self::new(handle, id, kind, None))
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} '{}' ({}, id {})", self.kind, name, self.handle, self.id),
            None => write!(f, "{} ({}, id {})", self.kind, self.handle, self.id),
        }
    }
}
