// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Event dispatch.
//!
//! The [`Dispatcher`] owns the loop; everything it dispatches against lives
//! in [`crate::environment::EnvCore`].

pub mod dispatcher;

pub use dispatcher::{DispatchContext, DispatchStats, Dispatcher, DispatcherState, StopHandle};
