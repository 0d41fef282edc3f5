// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;       // native layer implementations
pub mod binding;        // callback bindings + caller table
pub mod channel;        // channel wrappers
pub mod config;         // config + options
pub mod engine;         // dispatcher
pub mod environment;    // environment-owned state
pub mod errors;         // error handling
pub mod name_service;   // name-service client + in-process server
pub mod observability;
pub mod registry;       // handle -> wrapper maps
pub mod sequence;       // sequences + views
pub mod service_group;  // membership + smartbeats
pub mod traits;         // native layer + callback seams
