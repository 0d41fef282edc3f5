// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::{ChannelHandle, ChannelId, ChannelKind, Fd};
use crate::config::Options;
use crate::errors::NativeError;
use crate::sequence::{Sequence, SequenceHandle};
use crate::service_group::{GroupId, MembershipState, ServiceId, ServiceRef, ServiceState};
use async_trait::async_trait;
use std::time::Duration;

/// Result of handing a sequence to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    WouldBlock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendFlags {
    pub nonblocking: bool,
}

/// What the application asks the native layer to open.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub id: ChannelId,
    pub kind: ChannelKind,
    pub options: Options,
}

/// One event surfaced by [`NativeLayer::poll`].
#[derive(Debug)]
pub enum NativeEvent {
    DataReceived {
        channel: ChannelHandle,
        sequence: Sequence,
    },
    NameResponse {
        channel: ChannelHandle,
        sequence: Sequence,
    },
    ChannelCreated {
        channel: ChannelHandle,
        fd: Fd,
    },
    ChannelDestroyed {
        channel: ChannelHandle,
        fd: Fd,
    },
    ServiceAdded {
        group: GroupId,
        service: ServiceId,
        state: MembershipState,
        native: Option<ServiceRef>,
    },
    ServiceRemoved {
        group: GroupId,
        service: ServiceId,
        state: MembershipState,
    },
    ServiceStateChanged {
        service: ServiceId,
        old: ServiceState,
        new: ServiceState,
    },
    Smartbeat {
        group: GroupId,
        service: ServiceId,
        payload: Vec<u8>,
    },
}

impl NativeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NativeEvent::DataReceived { .. } => "data",
            NativeEvent::NameResponse { .. } => "name_response",
            NativeEvent::ChannelCreated { .. } => "channel_created",
            NativeEvent::ChannelDestroyed { .. } => "channel_destroyed",
            NativeEvent::ServiceAdded { .. } => "service_added",
            NativeEvent::ServiceRemoved { .. } => "service_removed",
            NativeEvent::ServiceStateChanged { .. } => "service_state_changed",
            NativeEvent::Smartbeat { .. } => "smartbeat",
        }
    }
}

/// The transport and event source underneath the switchboard.
///
/// Channel kinds come back as raw codes so the library, not the native
/// layer, decides which kinds it can wrap.
#[async_trait]
pub trait NativeLayer: Send {
    fn create_channel(&mut self, spec: &ChannelSpec) -> Result<ChannelHandle, NativeError>;

    fn destroy_channel(&mut self, channel: ChannelHandle) -> Result<(), NativeError>;

    fn channel_id(&self, channel: ChannelHandle) -> Option<ChannelId>;

    fn channel_kind(&self, channel: ChannelHandle) -> Option<u16>;

    fn send(
        &mut self,
        channel: ChannelHandle,
        sequence: &Sequence,
        flags: SendFlags,
    ) -> Result<SendOutcome, NativeError>;

    /// Reserve a handle for a locally built sequence.
    fn create_sequence(&mut self) -> Result<SequenceHandle, NativeError>;

    fn destroy_sequence(&mut self, sequence: SequenceHandle);

    /// Add a channel to the set the event source watches.
    fn register(&mut self, channel: ChannelHandle, group: &str) -> Result<(), NativeError>;

    fn unregister(&mut self, channel: ChannelHandle) -> Result<(), NativeError>;

    /// Wait up to `timeout` for events and return whatever is ready.
    async fn poll(&mut self, timeout: Duration) -> Vec<NativeEvent>;
}
