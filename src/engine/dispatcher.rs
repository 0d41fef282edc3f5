// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Single-threaded dispatch loop.
//!
//! Each tick polls the native layer for up to one poll interval, routes
//! every event it returned, and runs timer housekeeping (name-request
//! expiration and service activity timeouts). A stop request is observed
//! at the next tick boundary.

use crate::binding::{CallbackBinding, CallerKind};
use crate::channel::{Channel, ChannelHandle, ChannelKind, Fd};
use crate::config::DispatcherConfig;
use crate::environment::EnvCore;
use crate::errors::DispatchError;
use crate::name_service::NameServiceClient;
use crate::observability::messages::dispatch::{
    CreationIgnored, DispatcherStarted, DispatcherStopped, EventDropped, HandlerFailed,
    UnregisterFailed,
};
use crate::observability::messages::StructuredLog;
use crate::registry::ObjectRegistry;
use crate::sequence::{Sequence, SequenceHandle};
use crate::service_group::{Delivery, ServiceGroupTracker};
use crate::traits::{DispatchCallback, NativeEvent, NativeLayer, SendOutcome};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    Idle,
    Running,
    Stopping,
}

/// Shared stop flag for one dispatcher.
///
/// Clones are cheap and `Send`; stopping from another thread or from inside
/// a callback are the same operation.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    state: Arc<AtomicU8>,
}

impl StopHandle {
    /// Ask a running loop to stop. Returns false if the dispatcher was not
    /// running; stopping an idle dispatcher does nothing.
    pub fn stop(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, STOPPING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn state(&self) -> DispatcherState {
        match self.state.load(Ordering::SeqCst) {
            RUNNING => DispatcherState::Running,
            STOPPING => DispatcherState::Stopping,
            _ => DispatcherState::Idle,
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.state() == DispatcherState::Stopping
    }

    fn begin(&self) -> bool {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish(&self) {
        self.state.store(IDLE, Ordering::SeqCst);
    }
}

/// Counters for the most recent run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub ticks: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub handler_failures: u64,
    pub consistency_warnings: u64,
}

/// What a dispatch callback may touch while it runs.
pub struct DispatchContext<'a> {
    core: &'a mut EnvCore,
    stop: &'a StopHandle,
}

impl<'a> DispatchContext<'a> {
    fn new(core: &'a mut EnvCore, stop: &'a StopHandle) -> Self {
        Self { core, stop }
    }

    /// Stop the loop after the current tick.
    pub fn stop(&self) -> bool {
        self.stop.stop()
    }

    /// Hand a name-service response to the client. Returns how many
    /// pending callbacks it answered.
    pub fn invoke_name_service(&mut self, sequence: &Sequence) -> usize {
        self.core.name_service.invoke(sequence, Instant::now())
    }

    pub fn send(&mut self, channel: ChannelHandle, sequence: &Sequence) -> Result<SendOutcome, DispatchError> {
        self.core.send(channel, sequence)
    }

    /// Everything else the environment offers: name operations, local
    /// sequences, channels, service groups.
    pub fn env(&mut self) -> &mut EnvCore {
        &mut *self.core
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.core.registry
    }

    pub fn name_service(&self) -> &NameServiceClient {
        &self.core.name_service
    }

    pub fn groups(&self) -> &ServiceGroupTracker {
        &self.core.groups
    }

    pub fn native(&mut self) -> &mut dyn NativeLayer {
        &mut *self.core.native
    }
}

pub struct Dispatcher {
    poll_interval: Duration,
    stop: StopHandle,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            stop: StopHandle::default(),
            stats: DispatchStats::default(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> DispatcherState {
        self.stop.state()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Bind `binding` to a fresh dispatcher caller, register `channel` with
    /// the native event source under `group`, and dispatch until stopped.
    ///
    /// The channel is unregistered exactly once on the way out. The
    /// binding stays bound so the application can inspect or close it.
    pub async fn run_listening<C>(
        &mut self,
        core: &mut EnvCore,
        channel: &Arc<Channel>,
        group: &str,
        binding: &mut CallbackBinding<C>,
    ) -> Result<DispatchStats, DispatchError>
    where
        C: DispatchCallback + ?Sized,
    {
        if !self.stop.begin() {
            return Err(DispatchError::AlreadyRunning);
        }
        self.stats = DispatchStats::default();

        binding.bind(core.callers.register(CallerKind::Dispatcher));
        if let Err(source) = core.native.register(channel.handle(), group) {
            binding.unbind();
            self.stop.finish();
            return Err(DispatchError::Registration {
                channel: channel.handle(),
                source,
            });
        }

        let started = DispatcherStarted {
            mode: "listening",
            channel: channel.handle(),
            group,
            poll_interval: self.poll_interval,
        };
        started.log();
        let span = started.span("run_listening");

        async {
            while !self.stop.is_stopping() {
                let events = core.native.poll(self.poll_interval).await;
                self.stats.ticks += 1;
                for event in events {
                    self.route(core, binding.callback_mut(), event);
                }
                self.housekeeping(core);
            }
        }
        .instrument(span)
        .await;

        if let Err(error) = core.native.unregister(channel.handle()) {
            tracing::warn!(
                "{}",
                UnregisterFailed {
                    channel: channel.handle(),
                    error: &error,
                }
            );
        }
        self.stop.finish();

        DispatcherStopped {
            ticks: self.stats.ticks,
            delivered: self.stats.events_delivered,
            dropped: self.stats.events_dropped,
        }
        .log();
        Ok(self.stats.clone())
    }

    /// One non-looping dispatch step: wait up to `timeout` for events,
    /// route them, and run housekeeping. A zero timeout never waits; callers
    /// that pump in a tight loop back off themselves.
    pub async fn run_client_timed<C>(
        &mut self,
        core: &mut EnvCore,
        binding: &mut CallbackBinding<C>,
        timeout: Duration,
    ) -> Result<usize, DispatchError>
    where
        C: DispatchCallback + ?Sized,
    {
        if !self.stop.begin() {
            return Err(DispatchError::AlreadyRunning);
        }
        if !binding.is_bound() {
            binding.bind(core.callers.register(CallerKind::Dispatcher));
        }

        let events = core.native.poll(timeout).await;
        self.stats.ticks += 1;
        let handled = events.len();
        for event in events {
            self.route(core, binding.callback_mut(), event);
        }
        self.housekeeping(core);

        self.stop.finish();
        Ok(handled)
    }

    fn route<C>(&mut self, core: &mut EnvCore, callback: &mut C, event: NativeEvent)
    where
        C: DispatchCallback + ?Sized,
    {
        let kind = event.kind();
        match event {
            NativeEvent::DataReceived { channel, sequence } => {
                self.deliver_sequence(core, callback, kind, channel, sequence, false);
            }
            NativeEvent::NameResponse { channel, sequence } => {
                self.deliver_sequence(core, callback, kind, channel, sequence, true);
            }
            NativeEvent::ChannelCreated { channel, fd } => {
                self.channel_created(core, callback, kind, channel, fd);
            }
            NativeEvent::ChannelDestroyed { channel, fd } => {
                self.channel_destroyed(core, callback, kind, channel, fd);
            }
            NativeEvent::ServiceAdded {
                group,
                service,
                state,
                native,
            } => {
                let now = Instant::now();
                self.tracked(core, |core| {
                    core.groups
                        .added(&mut core.registry, group, service, state, native, now)
                });
            }
            NativeEvent::ServiceRemoved {
                group,
                service,
                state,
            } => {
                self.tracked(core, |core| {
                    core.groups.removed(&mut core.registry, group, service, state)
                });
            }
            NativeEvent::ServiceStateChanged { service, old, new } => {
                self.tracked(core, |core| {
                    core.groups.state_changed(&core.registry, service, old, new)
                });
            }
            NativeEvent::Smartbeat {
                group,
                service,
                payload,
            } => {
                let now = Instant::now();
                self.tracked(core, |core| {
                    core.groups
                        .smartbeat(&core.registry, group, service, &payload, now)
                });
            }
        }
    }

    fn deliver_sequence<C>(
        &mut self,
        core: &mut EnvCore,
        callback: &mut C,
        kind: &str,
        channel: ChannelHandle,
        sequence: Sequence,
        name_response: bool,
    ) where
        C: DispatchCallback + ?Sized,
    {
        let handle = sequence.handle();
        let wrapper = match core.resolve_channel(channel) {
            Ok(wrapper) => wrapper,
            Err(error) => {
                self.drop_event(kind, &error);
                core.native.destroy_sequence(handle);
                return;
            }
        };
        let sequence = adopt_sequence(core, handle, sequence);

        let result = {
            let mut cx = DispatchContext::new(core, &self.stop);
            if name_response {
                callback.on_name_response(&mut cx, &wrapper, &sequence)
            } else {
                callback.on_data(&mut cx, &wrapper, &sequence)
            }
        };

        core.registry.sequences.unmap(handle);
        core.native.destroy_sequence(handle);
        self.settle(kind, channel, result);
    }

    fn channel_created<C>(&mut self, core: &mut EnvCore, callback: &mut C, kind: &str, channel: ChannelHandle, fd: Fd)
    where
        C: DispatchCallback + ?Sized,
    {
        let channel_kind = match core.native.channel_kind(channel) {
            Some(raw) => ChannelKind::from_raw(raw),
            None => Err(DispatchError::UnresolvedChannel(channel)),
        };
        match channel_kind {
            Ok(channel_kind) if !channel_kind.is_connection_oriented() => {
                tracing::debug!(
                    "{}",
                    CreationIgnored {
                        channel,
                        kind: channel_kind,
                    }
                );
                return;
            }
            Ok(_) => {}
            Err(error) => {
                self.drop_event(kind, &error);
                return;
            }
        }

        let wrapper = match core.resolve_channel(channel) {
            Ok(wrapper) => wrapper,
            Err(error) => {
                self.drop_event(kind, &error);
                return;
            }
        };
        let result = {
            let mut cx = DispatchContext::new(core, &self.stop);
            callback.on_channel_created(&mut cx, &wrapper, fd)
        };
        self.settle(kind, channel, result);
    }

    fn channel_destroyed<C>(&mut self, core: &mut EnvCore, callback: &mut C, kind: &str, channel: ChannelHandle, fd: Fd)
    where
        C: DispatchCallback + ?Sized,
    {
        let wrapper = match core.channel_or_transient(channel) {
            Ok(wrapper) => wrapper,
            Err(error) => {
                self.drop_event(kind, &error);
                return;
            }
        };
        let result = {
            let mut cx = DispatchContext::new(core, &self.stop);
            callback.on_channel_destroyed(&mut cx, &wrapper, fd)
        };
        core.registry.channels.unmap(channel);
        self.settle(kind, channel, result);
    }

    /// Run a tracker operation and fold its outcome and any consistency
    /// warnings it raised into the stats.
    fn tracked<F>(&mut self, core: &mut EnvCore, op: F)
    where
        F: FnOnce(&mut EnvCore) -> Delivery,
    {
        let warnings = core.groups.consistency_warnings();
        match op(core) {
            Delivery::Delivered => self.stats.events_delivered += 1,
            Delivery::NoCallback => {}
            Delivery::Dropped => self.stats.events_dropped += 1,
            Delivery::Failed => self.stats.handler_failures += 1,
        }
        self.stats.consistency_warnings += core.groups.consistency_warnings() - warnings;
    }

    fn housekeeping(&mut self, core: &mut EnvCore) {
        let now = Instant::now();
        core.name_service.expire(now);
        let warnings = core.groups.consistency_warnings();
        core.groups.check_activity(&mut core.registry, now);
        self.stats.consistency_warnings += core.groups.consistency_warnings() - warnings;
    }

    fn drop_event(&mut self, event: &str, reason: &DispatchError) {
        self.stats.events_dropped += 1;
        EventDropped { event, reason }.log();
    }

    fn settle(&mut self, event: &str, channel: ChannelHandle, result: anyhow::Result<()>) {
        match result {
            Ok(()) => self.stats.events_delivered += 1,
            Err(error) => {
                self.stats.handler_failures += 1;
                HandlerFailed {
                    event,
                    channel,
                    error: &error,
                }
                .log();
            }
        }
    }
}

/// The registry entry for an inbound sequence, mapping it if this is the
/// first time the handle is seen.
fn adopt_sequence(core: &mut EnvCore, handle: SequenceHandle, sequence: Sequence) -> Arc<Sequence> {
    match core.registry.sequences.find(handle) {
        Some(existing) => existing,
        None => {
            let sequence = Arc::new(sequence);
            core.registry.sequences.map(handle, sequence.clone());
            sequence
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_handle_transitions() {
        let handle = StopHandle::default();
        assert_eq!(handle.state(), DispatcherState::Idle);
        assert!(!handle.stop());

        assert!(handle.begin());
        assert!(!handle.begin());
        assert_eq!(handle.state(), DispatcherState::Running);

        let remote = handle.clone();
        assert!(remote.stop());
        assert!(!remote.stop());
        assert!(handle.is_stopping());

        handle.finish();
        assert_eq!(remote.state(), DispatcherState::Idle);
    }

    #[test]
    fn test_stats_serialize_as_flat_counters() {
        let stats = DispatchStats {
            ticks: 3,
            events_delivered: 2,
            ..DispatchStats::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["ticks"], 3);
        assert_eq!(json["events_delivered"], 2);
        assert_eq!(json["consistency_warnings"], 0);
    }
}
