// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod dispatch;
mod name_service;
mod native;
mod service_group;

pub use config::{ConfigError, OptionsError};
pub use dispatch::DispatchError;
pub use name_service::{NameServiceError, ProtocolError};
pub use native::NativeError;
pub use service_group::SmartbeatError;
