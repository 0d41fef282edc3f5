// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// A smartbeat payload that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmartbeatError {
    #[error("smartbeat payload truncated: {actual} bytes, expected {expected}")]
    Truncated { expected: usize, actual: usize },
}
