// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod handle_registry;

pub use handle_registry::HandleRegistry;

use crate::channel::{Channel, ChannelHandle};
use crate::sequence::{Sequence, SequenceHandle};
use crate::service_group::{GroupId, Service, ServiceGroup, ServiceId};

/// Every native-handle to wrapper mapping owned by one environment.
///
/// One registry per object family keeps handle namespaces apart: a channel
/// handle and a sequence handle with the same numeric value never collide.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    pub channels: HandleRegistry<ChannelHandle, Channel>,
    pub sequences: HandleRegistry<SequenceHandle, Sequence>,
    pub services: HandleRegistry<ServiceId, Service>,
    pub groups: HandleRegistry<GroupId, ServiceGroup>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}
