// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! * `dispatch` - dispatcher lifecycle and event routing
//! * `name_service` - name registration, lookup and expiry
//! * `service_group` - membership, smartbeats and activity timeouts
//!
//! Messages that matter operationally also implement [`StructuredLog`],
//! which emits the event at its documented level with each field recorded
//! as a structured `tracing` field.

use std::fmt::Display;
use tracing::Span;

pub mod dispatch;
pub mod name_service;
pub mod service_group;

/// A message that knows its own log level and structured fields.
pub trait StructuredLog: Display {
    /// Emit the message at its documented level.
    fn log(&self);

    /// A span carrying the message's fields, for instrumenting the work it
    /// describes.
    fn span(&self, name: &str) -> Span;
}
