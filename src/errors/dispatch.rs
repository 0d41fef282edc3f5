// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while creating, resolving or dispatching on channels.

use crate::channel::ChannelHandle;
use crate::errors::NativeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The native layer reported a channel kind the library cannot wrap
    #[error("unknown channel type {raw}")]
    UnknownChannelType { raw: u16 },

    /// An event referenced a channel neither the registry nor the native layer knows
    #[error("channel {0} could not be resolved")]
    UnresolvedChannel(ChannelHandle),

    /// A dispatch loop is already active on this environment
    #[error("dispatcher is already running")]
    AlreadyRunning,

    #[error("failed to create channel '{name}'")]
    ChannelCreateFailed {
        name: String,
        #[source]
        source: NativeError,
    },

    #[error("failed to destroy channel {channel}")]
    ChannelDestroyFailed {
        channel: ChannelHandle,
        #[source]
        source: NativeError,
    },

    #[error("failed to create sequence")]
    SequenceCreateFailed(#[source] NativeError),

    #[error("send on {channel} failed")]
    SendFailed {
        channel: ChannelHandle,
        #[source]
        source: NativeError,
    },

    /// Registering or unregistering a channel with the native event loop failed
    #[error("event loop registration for {channel} failed")]
    Registration {
        channel: ChannelHandle,
        #[source]
        source: NativeError,
    },
}
