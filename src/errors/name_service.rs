// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for name registration, lookup and the name-service wire format.

use crate::errors::NativeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NameServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Registrations and requests must carry a positive expiration window
    #[error("invalid expiration {expiration_ms}ms for name '{name}'")]
    InvalidExpiration { name: String, expiration_ms: u64 },

    #[error("name service channel is not connected")]
    NotConnected,

    #[error("failed to create request sequence")]
    SequenceCreateFailed(#[source] NativeError),

    /// A hard transport failure; the request's callback binding has been closed
    #[error("sending '{name}' to the name server failed")]
    SendFailed {
        name: String,
        #[source]
        source: NativeError,
    },

    #[error("malformed name-service message")]
    Protocol(#[from] ProtocolError),
}

/// Decode failures for name-service sequences.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("message carries no name element")]
    MissingName,

    #[error("heartbeat carries no server id")]
    MissingServerId,

    #[error("element with tag {tag} is not valid UTF-8")]
    InvalidUtf8 { tag: u64 },

    #[error("element with tag {tag} has length {actual}, expected {expected}")]
    BadLength { tag: u64, expected: usize, actual: usize },

    #[error("unknown fault-tolerance state {0}")]
    UnknownFtState(u8),
}
