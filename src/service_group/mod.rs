// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Service groups: membership, lifecycle state and smartbeat health.

mod service;
mod smartbeat;
mod tracker;

pub use service::{
    GroupId, MembershipState, Service, ServiceGroup, ServiceId, ServiceRef, ServiceState,
};
pub use smartbeat::{Smartbeat, SMARTBEAT_LEN};
pub use tracker::{Delivery, ServiceGroupAdapter, ServiceGroupTracker, ServiceStatus};
