// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod client;
pub mod info;
pub mod protocol;
pub mod server;

pub use client::{
    NameRequestAdapter, NameServiceClient, NameServiceIo, NameServiceStats, RequestKind, Submission,
};
pub use info::{AppInfo, FtState, NameEndpoint, NameInfo, NameInfoEvent, MAX_ENDPOINTS};
pub use protocol::{NameMessage, RequestId};
pub use server::{NameServer, Outbound};
