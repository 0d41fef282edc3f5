// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Native layer implementations.
//!
//! The switchboard talks to transports and event sources only through
//! [`crate::traits::NativeLayer`]. Socket-backed layers live outside this
//! crate.
//!
//! # Available Backends
//!
//! ## Loopback Backend
//! In-memory channels and an injected event queue:
//! - **Name traffic**: answered by an attached in-process `NameServer`
//! - **Data**: paired channels deliver each other's sends
//! - **Probing**: shared counters record polls, sends and releases
//! - **Use Case**: tests, demos, single-process wiring
//!
//! # Examples
//!
//! ```rust
//! use the_switchboard::backends::LoopbackNative;
//! use the_switchboard::name_service::NameServer;
//!
//! let native = LoopbackNative::new().with_name_server(NameServer::new(1));
//! let injector = native.injector();
//! injector.smartbeat_raw(1, 2, vec![0; 24]);
//! ```

pub mod loopback;

pub use loopback::{LoopbackInjector, LoopbackNative, LoopbackProbe};
