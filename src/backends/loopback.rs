// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-memory native layer.
//!
//! Events are queued through a [`LoopbackInjector`] and surfaced by
//! [`NativeLayer::poll`]. An attached [`NameServer`] answers name traffic
//! sent on channels opened with a `name_server_address` option, and pairs
//! of channels can be wired together so data sent on one arrives on the
//! other. Counters shared through a [`LoopbackProbe`] let tests observe what
//! the library asked of the native layer.

use crate::channel::{ChannelHandle, ChannelId, Fd};
use crate::config::consts::OPT_NAME_SERVER_ADDRESS;
use crate::errors::NativeError;
use crate::name_service::protocol::{heartbeat, NameMessage};
use crate::name_service::server::Outbound;
use crate::name_service::NameServer;
use crate::sequence::{Sequence, SequenceBuilder, SequenceHandle};
use crate::service_group::{GroupId, MembershipState, ServiceId, ServiceRef, ServiceState, Smartbeat};
use crate::traits::{ChannelSpec, NativeEvent, NativeLayer, SendFlags, SendOutcome};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

const FD_BASE: Fd = 100;

#[derive(Debug, Clone)]
struct LoopChannel {
    id: ChannelId,
    raw_kind: u16,
    name: String,
    lifecycle_events: bool,
    name_server: bool,
    peer: Option<ChannelHandle>,
}

#[derive(Debug, Default)]
struct Counters {
    polls: AtomicU64,
    registrations: AtomicU64,
    unregistrations: AtomicU64,
    sends: AtomicU64,
    would_blocks: AtomicU64,
    channels_created: AtomicU64,
    channels_destroyed: AtomicU64,
    sequences_created: AtomicU64,
    sequences_destroyed: AtomicU64,
}

/// Read-only view of the loopback's activity counters.
#[derive(Debug, Clone, Default)]
pub struct LoopbackProbe {
    counters: Arc<Counters>,
}

impl LoopbackProbe {
    pub fn polls(&self) -> u64 {
        self.counters.polls.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> u64 {
        self.counters.registrations.load(Ordering::SeqCst)
    }

    pub fn unregistrations(&self) -> u64 {
        self.counters.unregistrations.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> u64 {
        self.counters.sends.load(Ordering::SeqCst)
    }

    pub fn would_blocks(&self) -> u64 {
        self.counters.would_blocks.load(Ordering::SeqCst)
    }

    pub fn channels_created(&self) -> u64 {
        self.counters.channels_created.load(Ordering::SeqCst)
    }

    pub fn channels_destroyed(&self) -> u64 {
        self.counters.channels_destroyed.load(Ordering::SeqCst)
    }

    pub fn sequences_created(&self) -> u64 {
        self.counters.sequences_created.load(Ordering::SeqCst)
    }

    pub fn sequences_destroyed(&self) -> u64 {
        self.counters.sequences_destroyed.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Queues native events from outside the dispatch loop.
///
/// Cloneable and `Send`, so a test or a helper task can feed events while
/// the dispatcher is running.
#[derive(Debug, Clone)]
pub struct LoopbackInjector {
    events: UnboundedSender<NativeEvent>,
    handles: Arc<AtomicU64>,
}

impl LoopbackInjector {
    /// Queue `event`. Returns false once the loopback has been dropped.
    pub fn inject(&self, event: NativeEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Deliver a sequence built from `builder` as data received on `channel`.
    pub fn data(&self, channel: ChannelHandle, builder: SequenceBuilder) -> SequenceHandle {
        let handle = self.next_sequence();
        self.inject(NativeEvent::DataReceived {
            channel,
            sequence: builder.build(handle),
        });
        handle
    }

    pub fn name_response(&self, channel: ChannelHandle, message: &NameMessage) -> SequenceHandle {
        let handle = self.next_sequence();
        self.inject(NativeEvent::NameResponse {
            channel,
            sequence: message.to_builder().build(handle),
        });
        handle
    }

    pub fn heartbeat(&self, channel: ChannelHandle, server_id: u64) {
        let handle = self.next_sequence();
        self.inject(NativeEvent::NameResponse {
            channel,
            sequence: heartbeat(server_id).build(handle),
        });
    }

    pub fn channel_created(&self, channel: ChannelHandle, fd: Fd) {
        self.inject(NativeEvent::ChannelCreated { channel, fd });
    }

    pub fn channel_destroyed(&self, channel: ChannelHandle, fd: Fd) {
        self.inject(NativeEvent::ChannelDestroyed { channel, fd });
    }

    pub fn service_added(
        &self,
        group: GroupId,
        service: ServiceId,
        state: MembershipState,
        native: Option<ServiceRef>,
    ) {
        self.inject(NativeEvent::ServiceAdded {
            group,
            service,
            state,
            native,
        });
    }

    pub fn service_removed(&self, group: GroupId, service: ServiceId, state: MembershipState) {
        self.inject(NativeEvent::ServiceRemoved {
            group,
            service,
            state,
        });
    }

    pub fn state_changed(&self, service: ServiceId, old: ServiceState, new: ServiceState) {
        self.inject(NativeEvent::ServiceStateChanged { service, old, new });
    }

    pub fn smartbeat(&self, group: GroupId, service: ServiceId, smartbeat: &Smartbeat) {
        self.smartbeat_raw(group, service, smartbeat.encode().to_vec());
    }

    /// Queue a smartbeat with an arbitrary payload, valid or not.
    pub fn smartbeat_raw(&self, group: GroupId, service: ServiceId, payload: Vec<u8>) {
        self.inject(NativeEvent::Smartbeat {
            group,
            service,
            payload,
        });
    }

    fn next_sequence(&self) -> SequenceHandle {
        SequenceHandle(self.handles.fetch_add(1, Ordering::SeqCst))
    }
}

pub struct LoopbackNative {
    events: UnboundedReceiver<NativeEvent>,
    injector: LoopbackInjector,
    channels: HashMap<ChannelHandle, LoopChannel>,
    tombstones: HashMap<ChannelHandle, LoopChannel>,
    registered: HashMap<ChannelHandle, String>,
    live_sequences: HashSet<SequenceHandle>,
    server: Option<NameServer>,
    blocked_sends: usize,
    fail_next_send: bool,
    fail_next_create: bool,
    probe: LoopbackProbe,
}

impl LoopbackNative {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            events: receiver,
            injector: LoopbackInjector {
                events: sender,
                handles: Arc::new(AtomicU64::new(1)),
            },
            channels: HashMap::new(),
            tombstones: HashMap::new(),
            registered: HashMap::new(),
            live_sequences: HashSet::new(),
            server: None,
            blocked_sends: 0,
            fail_next_send: false,
            fail_next_create: false,
            probe: LoopbackProbe::default(),
        }
    }

    /// Answer name traffic with `server`.
    pub fn with_name_server(mut self, server: NameServer) -> Self {
        self.server = Some(server);
        self
    }

    pub fn injector(&self) -> LoopbackInjector {
        self.injector.clone()
    }

    pub fn probe(&self) -> LoopbackProbe {
        self.probe.clone()
    }

    pub fn name_server(&self) -> Option<&NameServer> {
        self.server.as_ref()
    }

    /// The next `count` nonblocking sends report `WouldBlock`.
    pub fn block_sends(&mut self, count: usize) {
        self.blocked_sends = count;
    }

    pub fn fail_next_send(&mut self) {
        self.fail_next_send = true;
    }

    pub fn fail_next_create(&mut self) {
        self.fail_next_create = true;
    }

    /// Open a channel the library did not ask for, as a peer connecting in
    /// would. `raw_kind` is not validated.
    pub fn open_foreign(&mut self, raw_kind: u16, id: ChannelId) -> ChannelHandle {
        let handle = self.next_channel();
        self.channels.insert(
            handle,
            LoopChannel {
                id,
                raw_kind,
                name: format!("foreign-{}", id),
                lifecycle_events: false,
                name_server: false,
                peer: None,
            },
        );
        handle
    }

    /// Wire two channels so a send on either arrives as data on the other.
    pub fn connect_pair(&mut self, a: ChannelHandle, b: ChannelHandle) -> Result<(), NativeError> {
        for (from, to) in [(a, b), (b, a)] {
            let channel = self
                .channels
                .get_mut(&from)
                .ok_or(NativeError::UnknownChannel(from))?;
            channel.peer = Some(to);
        }
        Ok(())
    }

    pub fn is_registered(&self, channel: ChannelHandle) -> bool {
        self.registered.contains_key(&channel)
    }

    pub fn live_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn live_sequences(&self) -> usize {
        self.live_sequences.len()
    }

    fn next_channel(&self) -> ChannelHandle {
        ChannelHandle(self.injector.handles.fetch_add(1, Ordering::SeqCst))
    }

    fn lookup(&self, channel: ChannelHandle) -> Option<&LoopChannel> {
        self.channels
            .get(&channel)
            .or_else(|| self.tombstones.get(&channel))
    }

    fn fd(channel: ChannelHandle) -> Fd {
        FD_BASE + (channel.0 % 1000) as Fd
    }

    fn serve(&mut self, from: ChannelHandle, sequence: &Sequence) -> Result<(), NativeError> {
        let Some(server) = self.server.as_mut() else {
            return Ok(());
        };
        let message = NameMessage::decode(sequence).map_err(|error| NativeError::SendFailed {
            handle: from,
            reason: error.to_string(),
        })?;
        let outbound = server.handle(from, message);
        self.answer(outbound);
        Ok(())
    }

    fn answer(&self, outbound: Vec<Outbound>) {
        for outbound in outbound {
            let handle = self.injector.next_sequence();
            self.injector.inject(NativeEvent::NameResponse {
                channel: outbound.channel,
                sequence: outbound.message.to_builder().build(handle),
            });
        }
    }
}

impl Default for LoopbackNative {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NativeLayer for LoopbackNative {
    fn create_channel(&mut self, spec: &ChannelSpec) -> Result<ChannelHandle, NativeError> {
        if std::mem::take(&mut self.fail_next_create) {
            return Err(NativeError::CreateFailed {
                name: spec.name.clone(),
                reason: "loopback refused the channel".to_string(),
            });
        }

        let handle = self.next_channel();
        let channel = LoopChannel {
            id: spec.id,
            raw_kind: spec.kind.raw(),
            name: spec.name.clone(),
            lifecycle_events: spec.options.has_dispatcher_callbacks(),
            name_server: spec.options.find_text(OPT_NAME_SERVER_ADDRESS).is_some(),
            peer: None,
        };
        tracing::debug!(channel = %handle, name = %channel.name, kind = %spec.kind, "Loopback channel created");
        if channel.lifecycle_events {
            self.injector.channel_created(handle, Self::fd(handle));
        }
        self.channels.insert(handle, channel);
        LoopbackProbe::bump(&self.probe.counters.channels_created);
        Ok(handle)
    }

    fn destroy_channel(&mut self, channel: ChannelHandle) -> Result<(), NativeError> {
        let closed = self
            .channels
            .remove(&channel)
            .ok_or(NativeError::UnknownChannel(channel))?;
        self.registered.remove(&channel);

        if closed.name_server {
            if let Some(server) = self.server.as_mut() {
                let notices = server.channel_closed(channel, Instant::now());
                self.answer(notices);
            }
        }
        if let Some(peer) = closed.peer.and_then(|peer| self.channels.get_mut(&peer)) {
            peer.peer = None;
        }
        if closed.lifecycle_events {
            self.injector.channel_destroyed(channel, Self::fd(channel));
        }
        self.tombstones.insert(channel, closed);
        LoopbackProbe::bump(&self.probe.counters.channels_destroyed);
        Ok(())
    }

    fn channel_id(&self, channel: ChannelHandle) -> Option<ChannelId> {
        self.lookup(channel).map(|c| c.id)
    }

    fn channel_kind(&self, channel: ChannelHandle) -> Option<u16> {
        self.lookup(channel).map(|c| c.raw_kind)
    }

    fn send(
        &mut self,
        channel: ChannelHandle,
        sequence: &Sequence,
        flags: SendFlags,
    ) -> Result<SendOutcome, NativeError> {
        let target = self
            .channels
            .get(&channel)
            .cloned()
            .ok_or(NativeError::UnknownChannel(channel))?;

        if std::mem::take(&mut self.fail_next_send) {
            return Err(NativeError::SendFailed {
                handle: channel,
                reason: "connection reset by loopback".to_string(),
            });
        }
        if flags.nonblocking && self.blocked_sends > 0 {
            self.blocked_sends -= 1;
            LoopbackProbe::bump(&self.probe.counters.would_blocks);
            return Ok(SendOutcome::WouldBlock);
        }

        LoopbackProbe::bump(&self.probe.counters.sends);
        if target.name_server {
            self.serve(channel, sequence)?;
        } else if let Some(peer) = target.peer {
            let handle = self.injector.next_sequence();
            self.injector.inject(NativeEvent::DataReceived {
                channel: peer,
                sequence: sequence.to_builder().build(handle),
            });
        }
        Ok(SendOutcome::Sent)
    }

    fn create_sequence(&mut self) -> Result<SequenceHandle, NativeError> {
        let handle = self.injector.next_sequence();
        self.live_sequences.insert(handle);
        LoopbackProbe::bump(&self.probe.counters.sequences_created);
        Ok(handle)
    }

    fn destroy_sequence(&mut self, sequence: SequenceHandle) {
        self.live_sequences.remove(&sequence);
        LoopbackProbe::bump(&self.probe.counters.sequences_destroyed);
    }

    fn register(&mut self, channel: ChannelHandle, group: &str) -> Result<(), NativeError> {
        if !self.channels.contains_key(&channel) {
            return Err(NativeError::UnknownChannel(channel));
        }
        self.registered.insert(channel, group.to_string());
        LoopbackProbe::bump(&self.probe.counters.registrations);
        Ok(())
    }

    fn unregister(&mut self, channel: ChannelHandle) -> Result<(), NativeError> {
        LoopbackProbe::bump(&self.probe.counters.unregistrations);
        match self.registered.remove(&channel) {
            Some(_) => Ok(()),
            None => Err(NativeError::UnknownChannel(channel)),
        }
    }

    async fn poll(&mut self, timeout: Duration) -> Vec<NativeEvent> {
        LoopbackProbe::bump(&self.probe.counters.polls);
        if let Some(server) = self.server.as_mut() {
            let notices = server.expire(Instant::now());
            self.answer(notices);
        }

        let mut ready = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            ready.push(event);
        }
        if !ready.is_empty() || timeout.is_zero() {
            return ready;
        }

        if let Ok(Some(event)) = tokio::time::timeout(timeout, self.events.recv()).await {
            ready.push(event);
            while let Ok(event) = self.events.try_recv() {
                ready.push(event);
            }
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use crate::config::Options;
    use crate::sequence::SequenceType;

    fn spec(name: &str, kind: ChannelKind, options: Options) -> ChannelSpec {
        ChannelSpec {
            name: name.to_string(),
            id: 7,
            kind,
            options,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_empty() {
        let mut native = LoopbackNative::new();
        let started = Instant::now();

        let events = native.poll(Duration::from_millis(200)).await;

        assert!(events.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(native.probe().polls(), 1);
    }

    #[tokio::test]
    async fn test_injected_events_are_drained_together() {
        let mut native = LoopbackNative::new();
        let injector = native.injector();
        injector.service_removed(1, 2, MembershipState::Joined);
        injector.smartbeat(1, 2, &Smartbeat::new(0, 0, 9));

        let events = native.poll(Duration::from_millis(10)).await;
        let kinds: Vec<&str> = events.iter().map(NativeEvent::kind).collect();
        assert_eq!(kinds, vec!["service_removed", "smartbeat"]);
    }

    #[tokio::test]
    async fn test_lifecycle_events_follow_dispatcher_callback_options() {
        let mut native = LoopbackNative::new();
        let mut options = Options::new();
        options.append_dispatcher_callbacks();

        let watched = native.create_channel(&spec("watched", ChannelKind::TcpServer, options)).unwrap();
        let quiet = native.create_channel(&spec("quiet", ChannelKind::TcpClient, Options::new())).unwrap();
        native.destroy_channel(watched).unwrap();
        native.destroy_channel(quiet).unwrap();

        let events = native.poll(Duration::from_millis(10)).await;
        let kinds: Vec<&str> = events.iter().map(NativeEvent::kind).collect();
        assert_eq!(kinds, vec!["channel_created", "channel_destroyed"]);

        // Destroyed channels still answer kind queries.
        assert_eq!(native.channel_kind(watched), Some(ChannelKind::TcpServer.raw()));
        assert_eq!(native.live_channels(), 0);
    }

    #[tokio::test]
    async fn test_paired_channels_carry_data() {
        let mut native = LoopbackNative::new();
        let a = native.create_channel(&spec("a", ChannelKind::TcpClient, Options::new())).unwrap();
        let b = native.create_channel(&spec("b", ChannelKind::TcpAccepted, Options::new())).unwrap();
        native.connect_pair(a, b).unwrap();

        let handle = native.create_sequence().unwrap();
        let mut builder = Sequence::builder("greeting", 3);
        builder.copy_str("hello", 1);
        let sequence = builder.build(handle);

        assert_eq!(
            native.send(a, &sequence, SendFlags::default()).unwrap(),
            SendOutcome::Sent
        );
        native.destroy_sequence(handle);

        let events = native.poll(Duration::from_millis(10)).await;
        match events.as_slice() {
            [NativeEvent::DataReceived { channel, sequence }] => {
                assert_eq!(*channel, b);
                assert_eq!(sequence.find_by_type(1), Some(&b"hello"[..]));
            }
            other => panic!("unexpected events: {:?}", other),
        }
        assert_eq!(native.live_sequences(), 0);
    }

    #[test]
    fn test_send_failure_modes() {
        let mut native = LoopbackNative::new();
        let a = native.create_channel(&spec("a", ChannelKind::UdpClient, Options::new())).unwrap();
        let sequence = Sequence::builder("x", 1).build(SequenceHandle(0));
        let nonblocking = SendFlags { nonblocking: true };

        native.block_sends(1);
        assert_eq!(native.send(a, &sequence, nonblocking).unwrap(), SendOutcome::WouldBlock);
        assert_eq!(native.send(a, &sequence, nonblocking).unwrap(), SendOutcome::Sent);

        native.fail_next_send();
        assert!(matches!(
            native.send(a, &sequence, nonblocking),
            Err(NativeError::SendFailed { .. })
        ));
        assert_eq!(
            native.send(ChannelHandle(999), &sequence, nonblocking),
            Err(NativeError::UnknownChannel(ChannelHandle(999)))
        );

        let probe = native.probe();
        assert_eq!(probe.would_blocks(), 1);
        assert_eq!(probe.sends(), 1);
    }

    #[tokio::test]
    async fn test_name_traffic_is_answered_by_attached_server() {
        let mut native = LoopbackNative::new().with_name_server(NameServer::new(42));
        let mut options = Options::new();
        options.append_text(OPT_NAME_SERVER_ADDRESS, "loopback");
        let ns = native.create_channel(&spec("name_server", ChannelKind::TcpClient, options)).unwrap();

        let mut registration = NameMessage::new(SequenceType::Request, "printer");
        registration.request_id = Some(5);
        let sequence = registration.to_builder().build(SequenceHandle(0));
        native.send(ns, &sequence, SendFlags { nonblocking: true }).unwrap();

        let events = native.poll(Duration::from_millis(10)).await;
        match events.as_slice() {
            [NativeEvent::NameResponse { channel, sequence }] => {
                assert_eq!(*channel, ns);
                let ack = NameMessage::decode(sequence).unwrap();
                assert_eq!(ack.name, "printer");
                assert_eq!(ack.request_id, Some(5));
                assert_eq!(ack.server_id, Some(42));
            }
            other => panic!("unexpected events: {:?}", other),
        }
        assert_eq!(native.name_server().unwrap().names(None), vec!["printer"]);
    }

    #[test]
    fn test_fail_next_create_applies_once() {
        let mut native = LoopbackNative::new();
        native.fail_next_create();
        assert!(native.create_channel(&spec("a", ChannelKind::TcpServer, Options::new())).is_err());
        assert!(native.create_channel(&spec("a", ChannelKind::TcpServer, Options::new())).is_ok());
    }

    #[test]
    fn test_register_requires_live_channel() {
        let mut native = LoopbackNative::new();
        let a = native.create_channel(&spec("a", ChannelKind::TcpServer, Options::new())).unwrap();

        native.register(a, "listeners").unwrap();
        assert!(native.is_registered(a));
        native.unregister(a).unwrap();
        assert!(native.unregister(a).is_err());
        assert!(native.register(ChannelHandle(999), "listeners").is_err());
    }
}
