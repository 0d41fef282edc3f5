// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The environment: every piece of state one dispatch loop works on.
//!
//! [`EnvCore`] owns the native layer, the object registry, the name-service
//! client, the service-group tracker and the caller table. Dispatch
//! callbacks reach it through [`crate::engine::DispatchContext`]; the
//! application reaches it through [`Environment`], which adds the
//! dispatcher and the configuration it was built from.

use crate::binding::{AdapterKey, CallbackBinding, CallerTable};
use crate::channel::{Channel, ChannelHandle, ChannelId, ChannelKind};
use crate::config::consts::{
    DEFAULT_NAME_SERVER_ADDRESS, DEFAULT_NAME_SERVER_PORT, OPT_DESTINATION_PORT,
    OPT_NAME_SERVER_ADDRESS, OPT_NAME_SERVER_OPTIONS, OPT_NAME_SERVER_PROTOCOL,
};
use crate::config::{EnvConfig, Options};
use crate::engine::{DispatchStats, Dispatcher, StopHandle};
use crate::errors::{ConfigError, DispatchError, NameServiceError};
use crate::name_service::{AppInfo, NameServiceClient, NameServiceIo, RequestId, Submission};
use crate::observability::messages::dispatch::WrapperConstructed;
use crate::registry::ObjectRegistry;
use crate::sequence::{Sequence, SequenceBuilder, SequenceHandle};
use crate::service_group::{GroupId, ServiceGroup, ServiceGroupTracker};
use crate::traits::{
    ChannelSpec, DispatchCallback, NameInfoCallback, NativeLayer, SendFlags, SendOutcome,
    ServiceCallback,
};
use std::sync::Arc;
use std::time::Duration;

/// Channel id given to the name-server connection.
const NAME_SERVER_CHANNEL_ID: ChannelId = 0;

pub struct EnvCore {
    pub(crate) native: Box<dyn NativeLayer>,
    pub(crate) registry: ObjectRegistry,
    pub(crate) name_service: NameServiceClient,
    pub(crate) groups: ServiceGroupTracker,
    pub(crate) callers: CallerTable,
}

impl EnvCore {
    fn new(config: &EnvConfig, native: Box<dyn NativeLayer>) -> Self {
        Self {
            native,
            registry: ObjectRegistry::new(),
            name_service: NameServiceClient::new(&config.name_service),
            groups: ServiceGroupTracker::new(config.service_groups.activity_timeout()),
            callers: CallerTable::new(),
        }
    }

    /// Open a channel and map its wrapper.
    pub fn create_channel(
        &mut self,
        name: &str,
        id: ChannelId,
        kind: ChannelKind,
        options: Options,
    ) -> Result<Arc<Channel>, DispatchError> {
        let spec = ChannelSpec {
            name: name.to_string(),
            id,
            kind,
            options,
        };
        let handle = self
            .native
            .create_channel(&spec)
            .map_err(|source| DispatchError::ChannelCreateFailed {
                name: name.to_string(),
                source,
            })?;

        let channel = Arc::new(Channel::new(handle, id, kind, Some(spec.name)));
        self.registry.channels.map(handle, channel.clone());
        tracing::debug!(
            "{}",
            WrapperConstructed {
                object: "channel",
                id: handle.0,
            }
        );
        Ok(channel)
    }

    /// Close a channel. The wrapper is unmapped before the native handle
    /// is released, so nothing can resolve a handle that is going away.
    pub fn destroy_channel(&mut self, channel: ChannelHandle) -> Result<(), DispatchError> {
        self.registry.channels.unmap(channel);
        if self.name_service.channel() == Some(channel) {
            self.name_service.disconnect();
        }
        self.native
            .destroy_channel(channel)
            .map_err(|source| DispatchError::ChannelDestroyFailed { channel, source })
    }

    /// Open the name-server connection described by the
    /// `name_server_options` sub-tree of `options` and route name traffic
    /// through it. Live subscriptions are sent again on the new channel.
    pub fn connect_name_service(&mut self, options: &Options) -> Result<Arc<Channel>, DispatchError> {
        let mut channel_options = options
            .find_sub_option(OPT_NAME_SERVER_OPTIONS)
            .cloned()
            .unwrap_or_default();
        if channel_options.find_text(OPT_NAME_SERVER_ADDRESS).is_none() {
            channel_options.append_text(OPT_NAME_SERVER_ADDRESS, DEFAULT_NAME_SERVER_ADDRESS);
        }
        if channel_options.find_text(OPT_DESTINATION_PORT).is_none() {
            channel_options.append_text(OPT_DESTINATION_PORT, &DEFAULT_NAME_SERVER_PORT.to_string());
        }
        let kind = match channel_options.find_text(OPT_NAME_SERVER_PROTOCOL) {
            Some(protocol) if protocol.eq_ignore_ascii_case("udp") => ChannelKind::UdpListener,
            _ => ChannelKind::TcpClient,
        };

        if let Some(previous) = self.name_service.channel() {
            self.destroy_channel(previous)?;
        }
        let channel = self.create_channel("name_server", NAME_SERVER_CHANNEL_ID, kind, channel_options)?;
        self.name_service.connect(channel.handle());

        if self.name_service.pending_count() > 0 {
            if let Err(error) = self.resubscribe() {
                tracing::warn!(channel = %channel.handle(), "Resubscribe after connect failed: {}", error);
            }
        }
        Ok(channel)
    }

    /// Build a local sequence and map it. The creator destroys it with
    /// [`EnvCore::destroy_sequence`].
    pub fn create_sequence(&mut self, builder: SequenceBuilder) -> Result<Arc<Sequence>, DispatchError> {
        let handle = self
            .native
            .create_sequence()
            .map_err(DispatchError::SequenceCreateFailed)?;
        let sequence = Arc::new(builder.build(handle));
        self.registry.sequences.map(handle, sequence.clone());
        Ok(sequence)
    }

    /// Unmap and release a locally created sequence. Returns false if the
    /// handle was not mapped.
    pub fn destroy_sequence(&mut self, handle: SequenceHandle) -> bool {
        if self.registry.sequences.unmap(handle).is_none() {
            return false;
        }
        self.native.destroy_sequence(handle);
        true
    }

    pub fn send(&mut self, channel: ChannelHandle, sequence: &Sequence) -> Result<SendOutcome, DispatchError> {
        self.native
            .send(channel, sequence, SendFlags::default())
            .map_err(|source| DispatchError::SendFailed { channel, source })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_name(
        &mut self,
        name: &str,
        linger_secs: u32,
        expiration_ms: u64,
        callback: Option<Box<dyn NameInfoCallback>>,
        app_info: Option<AppInfo>,
        options: &Options,
    ) -> Result<Submission, NameServiceError> {
        let (client, mut io) = self.name_io();
        client.register_name(&mut io, name, linger_secs, expiration_ms, callback, app_info, options)
    }

    pub fn request_name_info(
        &mut self,
        name: &str,
        expiration_ms: u64,
        callback: Box<dyn NameInfoCallback>,
        app_info: Option<AppInfo>,
        options: &Options,
    ) -> Result<Submission, NameServiceError> {
        let (client, mut io) = self.name_io();
        client.request_name_info(&mut io, name, expiration_ms, callback, app_info, options)
    }

    pub fn subscribe_to_name_info(
        &mut self,
        name: &str,
        callback: Box<dyn NameInfoCallback>,
        app_info: Option<AppInfo>,
        options: &Options,
    ) -> Result<Submission, NameServiceError> {
        let (client, mut io) = self.name_io();
        client.subscribe_to_name_info(&mut io, name, callback, app_info, options)
    }

    pub fn unsubscribe(&mut self, request_id: RequestId) -> bool {
        self.name_service.unsubscribe(request_id)
    }

    pub fn resubscribe(&mut self) -> Result<usize, NameServiceError> {
        let (client, mut io) = self.name_io();
        client.resubscribe(&mut io)
    }

    /// Register a service callback into `group_options`. Call this before
    /// handing the options to [`EnvCore::create_service_group`].
    pub fn add_service_callback(
        &mut self,
        group_options: &mut Options,
        callback: Box<dyn ServiceCallback>,
    ) -> AdapterKey {
        self.groups
            .add_service_callback(&self.callers, group_options, callback)
    }

    pub fn remove_service_callback(&mut self, group_options: &mut Options, key: AdapterKey) -> bool {
        self.groups.remove_service_callback(group_options, key)
    }

    pub fn create_service_group(&mut self, id: GroupId, name: &str, options: Options) -> Arc<ServiceGroup> {
        self.groups.create_group(&mut self.registry, id, name, options)
    }

    pub fn destroy_service_group(&mut self, id: GroupId) -> Option<Arc<ServiceGroup>> {
        self.groups.destroy_group(&mut self.registry, id)
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn name_service(&self) -> &NameServiceClient {
        &self.name_service
    }

    pub fn name_service_mut(&mut self) -> &mut NameServiceClient {
        &mut self.name_service
    }

    pub fn groups(&self) -> &ServiceGroupTracker {
        &self.groups
    }

    pub fn callers(&self) -> &CallerTable {
        &self.callers
    }

    pub fn native(&self) -> &dyn NativeLayer {
        &*self.native
    }

    pub fn native_mut(&mut self) -> &mut dyn NativeLayer {
        &mut *self.native
    }

    /// Find the wrapper for `handle`, constructing and mapping one from
    /// what the native layer reports if this is the first sighting.
    pub(crate) fn resolve_channel(&mut self, handle: ChannelHandle) -> Result<Arc<Channel>, DispatchError> {
        let native = &*self.native;
        let (channel, constructed) = self.registry.channels.find_or_map_with(handle, || {
            construct_channel(native, handle).map(Arc::new)
        })?;
        if constructed {
            tracing::debug!(
                "{}",
                WrapperConstructed {
                    object: "channel",
                    id: handle.0,
                }
            );
        }
        Ok(channel)
    }

    /// A wrapper for `handle` that is not mapped: the registry entry if
    /// one exists, otherwise a transient built from the native layer.
    pub(crate) fn channel_or_transient(&self, handle: ChannelHandle) -> Result<Arc<Channel>, DispatchError> {
        match self.registry.channels.find(handle) {
            Some(channel) => Ok(channel),
            None => construct_channel(&*self.native, handle).map(Arc::new),
        }
    }

    fn name_io(&mut self) -> (&mut NameServiceClient, NameServiceIo<'_>) {
        (
            &mut self.name_service,
            NameServiceIo {
                native: &mut *self.native,
                callers: &self.callers,
                sequences: &self.registry.sequences,
            },
        )
    }
}

fn construct_channel(native: &dyn NativeLayer, handle: ChannelHandle) -> Result<Channel, DispatchError> {
    let raw_kind = native
        .channel_kind(handle)
        .ok_or(DispatchError::UnresolvedChannel(handle))?;
    let id = native.channel_id(handle).unwrap_or_default();
    Channel::from_native(handle, id, raw_kind)
}

/// One switchboard environment: its state, its dispatcher, and the
/// configuration both were built from.
///
/// # Example
/// ```rust
/// use the_switchboard::backends::LoopbackNative;
/// use the_switchboard::channel::ChannelKind;
/// use the_switchboard::config::{EnvConfig, Options};
/// use the_switchboard::environment::Environment;
///
/// let mut env = Environment::new(EnvConfig::default(), Box::new(LoopbackNative::new()))?;
/// let channel = env.create_channel("listener", 1, ChannelKind::TcpServer, Options::new())?;
/// assert!(env.registry().channels.find(channel.handle()).is_some());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Environment {
    core: EnvCore,
    dispatcher: Dispatcher,
    options: Options,
    config: EnvConfig,
}

impl Environment {
    pub fn new(config: EnvConfig, native: Box<dyn NativeLayer>) -> Result<Self, ConfigError> {
        config.validate()?;
        let options = config.options()?;
        Ok(Self {
            core: EnvCore::new(&config, native),
            dispatcher: Dispatcher::new(&config.dispatcher),
            options,
            config,
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Top-level options seeded from the configuration's `options` tree.
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn default_expiration_ms(&self) -> u64 {
        self.config.name_service.default_expiration_ms
    }

    pub fn core(&self) -> &EnvCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut EnvCore {
        &mut self.core
    }

    pub fn create_channel(
        &mut self,
        name: &str,
        id: ChannelId,
        kind: ChannelKind,
        options: Options,
    ) -> Result<Arc<Channel>, DispatchError> {
        self.core.create_channel(name, id, kind, options)
    }

    pub fn destroy_channel(&mut self, channel: ChannelHandle) -> Result<(), DispatchError> {
        self.core.destroy_channel(channel)
    }

    /// Connect to the name server named by the environment's own options.
    pub fn connect_name_service(&mut self) -> Result<Arc<Channel>, DispatchError> {
        self.core.connect_name_service(&self.options)
    }

    pub fn create_sequence(&mut self, builder: SequenceBuilder) -> Result<Arc<Sequence>, DispatchError> {
        self.core.create_sequence(builder)
    }

    pub fn destroy_sequence(&mut self, handle: SequenceHandle) -> bool {
        self.core.destroy_sequence(handle)
    }

    pub fn send(&mut self, channel: ChannelHandle, sequence: &Sequence) -> Result<SendOutcome, DispatchError> {
        self.core.send(channel, sequence)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_name(
        &mut self,
        name: &str,
        linger_secs: u32,
        expiration_ms: u64,
        callback: Option<Box<dyn NameInfoCallback>>,
        app_info: Option<AppInfo>,
        options: &Options,
    ) -> Result<Submission, NameServiceError> {
        self.core
            .register_name(name, linger_secs, expiration_ms, callback, app_info, options)
    }

    pub fn request_name_info(
        &mut self,
        name: &str,
        expiration_ms: u64,
        callback: Box<dyn NameInfoCallback>,
        app_info: Option<AppInfo>,
        options: &Options,
    ) -> Result<Submission, NameServiceError> {
        self.core
            .request_name_info(name, expiration_ms, callback, app_info, options)
    }

    pub fn subscribe_to_name_info(
        &mut self,
        name: &str,
        callback: Box<dyn NameInfoCallback>,
        app_info: Option<AppInfo>,
        options: &Options,
    ) -> Result<Submission, NameServiceError> {
        self.core
            .subscribe_to_name_info(name, callback, app_info, options)
    }

    pub fn unsubscribe(&mut self, request_id: RequestId) -> bool {
        self.core.unsubscribe(request_id)
    }

    pub fn add_service_callback(
        &mut self,
        group_options: &mut Options,
        callback: Box<dyn ServiceCallback>,
    ) -> AdapterKey {
        self.core.add_service_callback(group_options, callback)
    }

    pub fn remove_service_callback(&mut self, group_options: &mut Options, key: AdapterKey) -> bool {
        self.core.remove_service_callback(group_options, key)
    }

    pub fn create_service_group(&mut self, id: GroupId, name: &str, options: Options) -> Arc<ServiceGroup> {
        self.core.create_service_group(id, name, options)
    }

    pub fn destroy_service_group(&mut self, id: GroupId) -> Option<Arc<ServiceGroup>> {
        self.core.destroy_service_group(id)
    }

    /// Run the dispatch loop on `channel` until stopped.
    pub async fn run_listening<C>(
        &mut self,
        channel: &Arc<Channel>,
        group: &str,
        binding: &mut CallbackBinding<C>,
    ) -> Result<DispatchStats, DispatchError>
    where
        C: DispatchCallback + ?Sized,
    {
        self.dispatcher
            .run_listening(&mut self.core, channel, group, binding)
            .await
    }

    /// One dispatch step bounded by `timeout`. Returns the number of
    /// native events handled.
    pub async fn run_client_timed<C>(
        &mut self,
        binding: &mut CallbackBinding<C>,
        timeout: Duration,
    ) -> Result<usize, DispatchError>
    where
        C: DispatchCallback + ?Sized,
    {
        self.dispatcher
            .run_client_timed(&mut self.core, binding, timeout)
            .await
    }

    /// A handle that can stop the dispatcher from another task or thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.dispatcher.stop_handle()
    }

    pub fn dispatch_stats(&self) -> &DispatchStats {
        self.dispatcher.stats()
    }

    pub fn registry(&self) -> &ObjectRegistry {
        self.core.registry()
    }

    pub fn name_service(&self) -> &NameServiceClient {
        self.core.name_service()
    }

    pub fn groups(&self) -> &ServiceGroupTracker {
        self.core.groups()
    }

    pub fn callers(&self) -> &CallerTable {
        self.core.callers()
    }

    pub fn native(&self) -> &dyn NativeLayer {
        self.core.native()
    }

    pub fn native_mut(&mut self) -> &mut dyn NativeLayer {
        self.core.native_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::LoopbackNative;
    use crate::errors::NativeError;

    fn env() -> Environment {
        Environment::new(EnvConfig::default(), Box::new(LoopbackNative::new())).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = EnvConfig::default();
        config.dispatcher.poll_interval_ms = 0;
        let result = Environment::new(config, Box::new(LoopbackNative::new()));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_create_channel_maps_one_wrapper() {
        let mut env = env();
        let channel = env
            .create_channel("listener", 4, ChannelKind::TcpServer, Options::new())
            .unwrap();

        let found = env.registry().channels.find(channel.handle()).unwrap();
        assert!(Arc::ptr_eq(&channel, &found));
        assert_eq!(channel.id(), 4);
        assert_eq!(channel.name(), Some("listener"));
    }

    #[test]
    fn test_destroy_channel_unmaps_first() {
        let mut env = env();
        let channel = env
            .create_channel("listener", 4, ChannelKind::TcpServer, Options::new())
            .unwrap();

        env.destroy_channel(channel.handle()).unwrap();
        assert!(env.registry().channels.find(channel.handle()).is_none());

        // Already gone natively; the registry stays clean either way.
        let again = env.destroy_channel(channel.handle());
        assert!(matches!(
            again,
            Err(DispatchError::ChannelDestroyFailed {
                source: NativeError::UnknownChannel(_),
                ..
            })
        ));
        assert!(env.registry().channels.is_empty());
    }

    #[test]
    fn test_create_channel_failure_maps_nothing() {
        let mut native = LoopbackNative::new();
        native.fail_next_create();
        let mut env = Environment::new(EnvConfig::default(), Box::new(native)).unwrap();

        let result = env.create_channel("listener", 1, ChannelKind::TcpServer, Options::new());
        assert!(matches!(result, Err(DispatchError::ChannelCreateFailed { .. })));
        assert!(env.registry().channels.is_empty());
    }

    #[test]
    fn test_local_sequence_lifecycle() {
        let mut env = env();
        let mut builder = Sequence::builder("payload", 9);
        builder.copy_bytes(&[1, 2, 3], 77);
        let sequence = env.create_sequence(builder).unwrap();

        assert!(env.registry().sequences.contains(sequence.handle()));
        assert!(env.destroy_sequence(sequence.handle()));
        assert!(!env.destroy_sequence(sequence.handle()));
        assert!(env.registry().sequences.is_empty());
    }

    #[test]
    fn test_connect_name_service_uses_defaults() {
        let mut env = env();
        let channel = env.connect_name_service().unwrap();

        assert_eq!(channel.kind(), ChannelKind::TcpClient);
        assert_eq!(env.name_service().channel(), Some(channel.handle()));

        env.destroy_channel(channel.handle()).unwrap();
        assert_eq!(env.name_service().channel(), None);
    }

    #[test]
    fn test_connect_name_service_over_udp() {
        let config = EnvConfig::from_yaml_str(
            r#"
options:
  name_server_options:
    name_server_data_flow_protocol: UDP
"#,
        )
        .unwrap();
        let mut env = Environment::new(config, Box::new(LoopbackNative::new())).unwrap();

        let channel = env.connect_name_service().unwrap();
        assert_eq!(channel.kind(), ChannelKind::UdpListener);
    }

    #[test]
    fn test_reconnect_replaces_name_server_channel() {
        let mut env = env();
        let first = env.connect_name_service().unwrap();
        let second = env.connect_name_service().unwrap();

        assert_ne!(first.handle(), second.handle());
        assert!(env.registry().channels.find(first.handle()).is_none());
        assert_eq!(env.name_service().channel(), Some(second.handle()));
    }
}
