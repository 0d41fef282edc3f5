// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Every operational event the switchboard logs is a small message struct
//! implementing `Display`, so log text lives in one place per subsystem
//! instead of being scattered through the dispatch code.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::dispatch` - dispatcher lifecycle and event routing
//! * `messages::name_service` - name registration, lookup and expiry
//! * `messages::service_group` - membership, smartbeats and timeouts
//!
//! # Usage
//!
//! ```rust
//! use the_switchboard::observability::messages::dispatch::EventDropped;
//!
//! let error = std::io::Error::new(std::io::ErrorKind::Other, "unknown channel type 42");
//! let msg = EventDropped {
//!     event: "data",
//!     reason: &error,
//! };
//!
//! tracing::warn!("{}", msg);
//! ```

pub mod messages;
