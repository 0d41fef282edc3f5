// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod callbacks;
pub mod native;

pub use callbacks::{DispatchCallback, NameInfoCallback, ServiceCallback};
pub use native::{ChannelSpec, NativeEvent, NativeLayer, SendFlags, SendOutcome};
