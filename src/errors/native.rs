// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Failures reported by the native transport layer.

use crate::channel::ChannelHandle;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("native layer does not know channel {0}")]
    UnknownChannel(ChannelHandle),

    #[error("failed to create channel '{name}': {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("send on {handle} failed: {reason}")]
    SendFailed { handle: ChannelHandle, reason: String },

    #[error("native resources exhausted: {0}")]
    ResourceExhausted(String),
}
