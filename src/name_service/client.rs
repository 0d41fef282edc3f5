// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Client side of the name-service protocol.
//!
//! Every register/request/subscribe call becomes a pending entry keyed by
//! request id. Responses are matched against pending entries in
//! [`NameServiceClient::invoke`], and [`NameServiceClient::expire`] retires
//! entries whose window has elapsed. The three kinds differ only in how
//! they end:
//!
//! * a request is one-shot: removed on its first answer, otherwise it
//!   expires exactly once
//! * a registration hears about every acknowledgement and then expires
//! * a subscription never expires; it ends on [`NameServiceClient::unsubscribe`]

use crate::binding::{CallbackBinding, CallerKind, CallerTable};
use crate::channel::ChannelHandle;
use crate::config::consts::{
    OPT_CONNECT_ADDRESS, OPT_CONNECT_PORT, OPT_DESTINATION_ADDRESS, OPT_DESTINATION_PORT,
    OPT_DESTINATION_PROTOCOL, OPT_FT_STATE, OPT_GROUP_NAME, OPT_META_DATA_SEQUENCE,
};
use crate::config::{NameServiceConfig, Options};
use crate::errors::NameServiceError;
use crate::name_service::info::{AppInfo, FtState, NameEndpoint, NameInfo, NameInfoEvent, MAX_ENDPOINTS};
use crate::name_service::protocol::{
    decode_heartbeat, is_heartbeat_sequence, is_name_sequence, NameMessage, RequestId,
};
use crate::observability::messages::name_service::{
    NameCallbackFailed, NameInfoDelivered, NameRequestExpired, NameRequestSubmitted,
    NameRequestWouldBlock, NameResponseMalformed, NameServerExpired, Resubscribed,
};
use crate::observability::messages::StructuredLog;
use crate::registry::HandleRegistry;
use crate::sequence::{Sequence, SequenceHandle, SequenceType};
use crate::traits::{NameInfoCallback, NativeLayer, SendFlags, SendOutcome};
use serde::Serialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::Instant;

/// The collaborators a submission needs, borrowed from the environment.
pub struct NameServiceIo<'a> {
    pub native: &'a mut dyn NativeLayer,
    pub callers: &'a CallerTable,
    pub sequences: &'a HandleRegistry<SequenceHandle, Sequence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Registration,
    Request,
    Subscription,
}

impl RequestKind {
    fn wire_type(self) -> SequenceType {
        match self {
            RequestKind::Registration => SequenceType::Request,
            RequestKind::Request => SequenceType::Query,
            RequestKind::Subscription => SequenceType::Subscribe,
        }
    }

    /// Sequence type of the responses this kind listens for.
    fn response_type(self) -> SequenceType {
        match self {
            RequestKind::Registration => SequenceType::Request,
            RequestKind::Request | RequestKind::Subscription => SequenceType::Query,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Registration => "registration",
            RequestKind::Request => "request",
            RequestKind::Subscription => "subscription",
        }
    }
}

/// Outcome of a register/request/subscribe call that did not fail hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Sent(RequestId),
    /// The transport was full; nothing is pending and no callback will fire.
    WouldBlock,
}

/// Adapter data attached to each name-info binding.
#[derive(Debug)]
pub struct NameRequestAdapter {
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub app_info: Option<AppInfo>,
}

type NameBinding = CallbackBinding<dyn NameInfoCallback, NameRequestAdapter>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameServiceStats {
    pub sent: u64,
    pub would_block: u64,
    pub delivered: u64,
    pub expired: u64,
}

struct PendingRequest {
    kind: RequestKind,
    message: NameMessage,
    expires_at: Option<Instant>,
    binding: Option<NameBinding>,
}

impl PendingRequest {
    fn request_id(&self) -> RequestId {
        self.message.request_id.unwrap_or_default()
    }

    fn matches(&self, response: &NameMessage) -> bool {
        self.kind.response_type() == response.kind
            && self.message.request_id == response.request_id
            && self.message.name == response.name
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Info for a response, with a registration's own advertisement
    /// filling whatever the response leaves out.
    fn info_for(&self, response: &NameMessage) -> NameInfo {
        let mut endpoints = response.endpoints.clone();
        if self.kind == RequestKind::Registration && endpoints.len() < self.message.endpoints.len() {
            endpoints.extend_from_slice(&self.message.endpoints[endpoints.len()..]);
        }
        let ft_state = response
            .ft_state
            .or(self.message.ft_state)
            .unwrap_or_default();

        NameInfo::new(response.name.clone())
            .with_endpoints(endpoints)
            .with_ft_state(ft_state)
            .with_removed(response.removed)
            .with_meta_data(response.meta_data.clone())
    }

    fn expired_info(&self) -> NameInfo {
        NameInfo::new(self.message.name.clone())
            .with_endpoints(self.message.endpoints.clone())
            .with_ft_state(self.message.ft_state.unwrap_or_default())
    }

    fn fire(&mut self, info: &NameInfo, event: NameInfoEvent) {
        let request_id = self.request_id();
        let Some(binding) = self.binding.as_mut() else {
            return;
        };
        let (callback, adapter) = binding.split_mut();
        let app_info = adapter.and_then(|adapter| adapter.app_info.as_ref());
        if let Err(error) = callback.on_name_info(info, app_info, event) {
            NameCallbackFailed {
                name: info.name(),
                request_id,
                error: &error,
            }
            .log();
        }
    }

    fn close(&mut self) {
        if let Some(binding) = self.binding.as_mut() {
            binding.close();
        }
    }
}

/// Tracks outstanding name operations for one environment.
pub struct NameServiceClient {
    channel: Option<ChannelHandle>,
    default_group: Option<String>,
    pending: Vec<PendingRequest>,
    next_request_id: RequestId,
    servers: HashMap<u64, Instant>,
    server_activity_timeout: Duration,
    stats: NameServiceStats,
}

impl NameServiceClient {
    pub fn new(config: &NameServiceConfig) -> Self {
        Self {
            channel: None,
            default_group: config.group_name.clone(),
            pending: Vec::new(),
            next_request_id: 1,
            servers: HashMap::new(),
            server_activity_timeout: config.server_activity_timeout(),
            stats: NameServiceStats::default(),
        }
    }

    /// Route protocol traffic through `channel`.
    pub fn connect(&mut self, channel: ChannelHandle) {
        self.channel = Some(channel);
    }

    pub fn disconnect(&mut self) -> Option<ChannelHandle> {
        self.channel.take()
    }

    pub fn channel(&self) -> Option<ChannelHandle> {
        self.channel
    }

    /// Advertise `name`. Without a callback the registration is
    /// fire-and-forget; it still occupies a pending slot until it expires.
    ///
    /// At most [`MAX_ENDPOINTS`] `connect_*`/`destination_*` endpoints may be
    /// advertised. Elements of a `meta_data_sequence` must avoid the tags in
    /// [`RESERVED_TAGS`](crate::name_service::protocol::RESERVED_TAGS); the
    /// receiver reads those as protocol fields.
    #[allow(clippy::too_many_arguments)]
    pub fn register_name(
        &mut self,
        io: &mut NameServiceIo<'_>,
        name: &str,
        linger_secs: u32,
        expiration_ms: u64,
        callback: Option<Box<dyn NameInfoCallback>>,
        app_info: Option<AppInfo>,
        options: &Options,
    ) -> Result<Submission, NameServiceError> {
        let mut message = self.message(RequestKind::Registration, name, options)?;
        message.linger_secs = Some(linger_secs);
        message.endpoints = advertised_endpoints(options)?;
        message.ft_state = match options.find_text(OPT_FT_STATE) {
            Some(value) => Some(
                FtState::from_option(value)
                    .ok_or(NameServiceError::InvalidArgument("fault_tolerant_state"))?,
            ),
            None => None,
        };
        if let Some(handle) = options.find_sequence(OPT_META_DATA_SEQUENCE) {
            let meta = io
                .sequences
                .find(handle)
                .ok_or(NameServiceError::InvalidArgument("meta_data_sequence"))?;
            message.meta_data = meta.elements().to_vec();
        }

        let expiration = expiration(name, expiration_ms)?;
        self.submit(
            io,
            RequestKind::Registration,
            message,
            Some(expiration),
            callback,
            app_info,
        )
    }

    /// Look `name` up once. The callback fires exactly once more after
    /// this returns `Sent`: `Delivered` with the answer or `Expired`.
    pub fn request_name_info(
        &mut self,
        io: &mut NameServiceIo<'_>,
        name: &str,
        expiration_ms: u64,
        callback: Box<dyn NameInfoCallback>,
        app_info: Option<AppInfo>,
        options: &Options,
    ) -> Result<Submission, NameServiceError> {
        let message = self.message(RequestKind::Request, name, options)?;
        let expiration = expiration(name, expiration_ms)?;
        self.submit(
            io,
            RequestKind::Request,
            message,
            Some(expiration),
            Some(callback),
            app_info,
        )
    }

    /// Hear about every registration of `name` until unsubscribed.
    pub fn subscribe_to_name_info(
        &mut self,
        io: &mut NameServiceIo<'_>,
        name: &str,
        callback: Box<dyn NameInfoCallback>,
        app_info: Option<AppInfo>,
        options: &Options,
    ) -> Result<Submission, NameServiceError> {
        let message = self.message(RequestKind::Subscription, name, options)?;
        self.submit(
            io,
            RequestKind::Subscription,
            message,
            None,
            Some(callback),
            app_info,
        )
    }

    /// End a subscription, releasing its callback. Returns false for ids
    /// that are not live subscriptions.
    pub fn unsubscribe(&mut self, request_id: RequestId) -> bool {
        let position = self.pending.iter().position(|p| {
            p.kind == RequestKind::Subscription && p.request_id() == request_id
        });
        match position {
            Some(index) => {
                let mut entry = self.pending.remove(index);
                entry.close();
                true
            }
            None => false,
        }
    }

    /// Send every live subscription again, e.g. after reconnecting to a
    /// name server. Returns how many were sent.
    pub fn resubscribe(&mut self, io: &mut NameServiceIo<'_>) -> Result<usize, NameServiceError> {
        let channel = self.channel.ok_or(NameServiceError::NotConnected)?;
        let mut sent = 0;
        for entry in self.pending.iter().filter(|p| p.kind == RequestKind::Subscription) {
            match transmit(&mut *io.native, channel, &entry.message) {
                Ok(SendOutcome::Sent) => {
                    self.stats.sent += 1;
                    sent += 1;
                }
                Ok(SendOutcome::WouldBlock) => {
                    self.stats.would_block += 1;
                    NameRequestWouldBlock {
                        kind: RequestKind::Subscription.as_str(),
                        name: &entry.message.name,
                    }
                    .log();
                }
                Err(error) => return Err(error.with_name(&entry.message.name)),
            }
        }
        tracing::info!("{}", Resubscribed { count: sent });
        Ok(sent)
    }

    /// Match a name-service response against pending entries and fire the
    /// callbacks it answers. Heartbeats update name-server activity. Any
    /// other sequence is ignored. Returns how many callbacks fired.
    pub fn invoke(&mut self, sequence: &Sequence, now: Instant) -> usize {
        if is_heartbeat_sequence(sequence) {
            match decode_heartbeat(sequence) {
                Ok(server_id) => {
                    self.servers.insert(server_id, now);
                }
                Err(error) => tracing::warn!("{}", NameResponseMalformed { error: &error }),
            }
            return 0;
        }
        if !is_name_sequence(sequence) {
            return 0;
        }
        let response = match NameMessage::decode(sequence) {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!("{}", NameResponseMalformed { error: &error });
                return 0;
            }
        };
        if let Some(server_id) = response.server_id {
            self.servers.insert(server_id, now);
        }

        self.expire(now);

        let mut fired = 0;
        let mut index = 0;
        while index < self.pending.len() {
            let entry = &mut self.pending[index];
            if !entry.matches(&response) {
                index += 1;
                continue;
            }

            let info = entry.info_for(&response);
            tracing::debug!(
                "{}",
                NameInfoDelivered {
                    name: info.name(),
                    request_id: entry.request_id(),
                    endpoints: info.endpoints().len(),
                }
            );
            entry.fire(&info, NameInfoEvent::Delivered);
            fired += 1;
            self.stats.delivered += 1;

            if entry.kind == RequestKind::Request {
                let mut done = self.pending.remove(index);
                done.close();
            } else {
                index += 1;
            }
        }
        fired
    }

    /// Retire every entry whose expiration has passed, firing `Expired`
    /// exactly once for each, and forget silent name servers. Returns the
    /// number of entries retired.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        let mut index = 0;
        while index < self.pending.len() {
            if !self.pending[index].is_expired(now) {
                index += 1;
                continue;
            }
            let mut entry = self.pending.remove(index);
            NameRequestExpired {
                name: &entry.message.name,
                request_id: entry.request_id(),
            }
            .log();
            let info = entry.expired_info();
            entry.fire(&info, NameInfoEvent::Expired);
            entry.close();
            expired += 1;
        }
        self.stats.expired += expired as u64;

        let timeout = self.server_activity_timeout;
        self.servers.retain(|server_id, last_seen| {
            let silent_for = now.saturating_duration_since(*last_seen);
            if silent_for > timeout {
                NameServerExpired {
                    server_id: *server_id,
                    silent_for,
                }
                .log();
                false
            } else {
                true
            }
        });

        expired
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_of(&self, kind: RequestKind) -> usize {
        self.pending.iter().filter(|p| p.kind == kind).count()
    }

    /// Name servers heard from within the activity window.
    pub fn known_servers(&self) -> Vec<u64> {
        let mut servers: Vec<u64> = self.servers.keys().copied().collect();
        servers.sort_unstable();
        servers
    }

    pub fn stats(&self) -> &NameServiceStats {
        &self.stats
    }

    fn message(
        &mut self,
        kind: RequestKind,
        name: &str,
        options: &Options,
    ) -> Result<NameMessage, NameServiceError> {
        if name.is_empty() {
            return Err(NameServiceError::InvalidArgument("name must not be empty"));
        }
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let mut message = NameMessage::new(kind.wire_type(), name);
        message.request_id = Some(request_id);
        message.group_name = options
            .find_text(OPT_GROUP_NAME)
            .map(str::to_string)
            .or_else(|| self.default_group.clone());
        Ok(message)
    }

    /// Bind, attach the adapter, then send. The binding is released again
    /// if the message never makes it onto the transport.
    fn submit(
        &mut self,
        io: &mut NameServiceIo<'_>,
        kind: RequestKind,
        message: NameMessage,
        expiration: Option<Duration>,
        callback: Option<Box<dyn NameInfoCallback>>,
        app_info: Option<AppInfo>,
    ) -> Result<Submission, NameServiceError> {
        let channel = self.channel.ok_or(NameServiceError::NotConnected)?;
        let request_id = message.request_id.unwrap_or_default();

        let mut binding = callback.map(|callback| {
            let mut binding: NameBinding = CallbackBinding::new(callback);
            binding.bind(io.callers.register(CallerKind::NameService));
            binding.attach(NameRequestAdapter {
                request_id,
                kind,
                app_info,
            });
            binding
        });

        match transmit(&mut *io.native, channel, &message) {
            Ok(SendOutcome::Sent) => {
                self.stats.sent += 1;
                NameRequestSubmitted {
                    kind: kind.as_str(),
                    name: &message.name,
                    request_id,
                    expiration_ms: expiration.map(|e| e.as_millis() as u64),
                }
                .log();
                self.pending.push(PendingRequest {
                    kind,
                    message,
                    expires_at: expiration.map(|e| Instant::now() + e),
                    binding,
                });
                Ok(Submission::Sent(request_id))
            }
            Ok(SendOutcome::WouldBlock) => {
                self.stats.would_block += 1;
                NameRequestWouldBlock {
                    kind: kind.as_str(),
                    name: &message.name,
                }
                .log();
                if let Some(binding) = binding.as_mut() {
                    binding.close();
                }
                Ok(Submission::WouldBlock)
            }
            Err(error) => {
                if let Some(binding) = binding.as_mut() {
                    binding.close();
                }
                Err(error.with_name(&message.name))
            }
        }
    }
}

enum TransmitError {
    Create(crate::errors::NativeError),
    Send(crate::errors::NativeError),
}

impl TransmitError {
    fn with_name(self, name: &str) -> NameServiceError {
        match self {
            TransmitError::Create(source) => NameServiceError::SequenceCreateFailed(source),
            TransmitError::Send(source) => NameServiceError::SendFailed {
                name: name.to_string(),
                source,
            },
        }
    }
}

/// Build `message` into a fresh sequence, send it, and destroy the
/// sequence again; the creator owns it.
fn transmit(
    native: &mut dyn NativeLayer,
    channel: ChannelHandle,
    message: &NameMessage,
) -> Result<SendOutcome, TransmitError> {
    let handle = native.create_sequence().map_err(TransmitError::Create)?;
    let sequence = message.to_builder().build(handle);
    let outcome = native.send(channel, &sequence, SendFlags { nonblocking: true });
    native.destroy_sequence(handle);
    outcome.map_err(TransmitError::Send)
}

fn expiration(name: &str, expiration_ms: u64) -> Result<Duration, NameServiceError> {
    if expiration_ms == 0 {
        return Err(NameServiceError::InvalidExpiration {
            name: name.to_string(),
            expiration_ms,
        });
    }
    Ok(Duration::from_millis(expiration_ms))
}

/// Endpoints a registration advertises: `connect_*` pairs first, then
/// `destination_*` pairs with their protocols.
fn advertised_endpoints(options: &Options) -> Result<Vec<NameEndpoint>, NameServiceError> {
    let mut endpoints = Vec::new();

    let connect = options
        .find_all_text(OPT_CONNECT_ADDRESS)
        .zip(options.find_all_text(OPT_CONNECT_PORT));
    for (address, port) in connect {
        endpoints.push(parse_endpoint(address, port, None, OPT_CONNECT_ADDRESS)?);
    }

    let mut protocols = options.find_all_text(OPT_DESTINATION_PROTOCOL);
    let destination = options
        .find_all_text(OPT_DESTINATION_ADDRESS)
        .zip(options.find_all_text(OPT_DESTINATION_PORT));
    for (address, port) in destination {
        let protocol = protocols.next().map(str::to_string);
        endpoints.push(parse_endpoint(address, port, protocol, OPT_DESTINATION_ADDRESS)?);
    }

    if endpoints.len() > MAX_ENDPOINTS {
        return Err(NameServiceError::InvalidArgument("endpoints"));
    }
    Ok(endpoints)
}

fn parse_endpoint(
    address: &str,
    port: &str,
    protocol: Option<String>,
    field: &'static str,
) -> Result<NameEndpoint, NameServiceError> {
    let address: Ipv4Addr = address
        .parse()
        .map_err(|_| NameServiceError::InvalidArgument(field))?;
    let port: u16 = port
        .parse()
        .map_err(|_| NameServiceError::InvalidArgument(field))?;
    Ok(NameEndpoint {
        address,
        port,
        protocol,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelId, ChannelKind};
    use crate::errors::NativeError;
    use crate::traits::{ChannelSpec, NativeEvent};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Records every name message sent; optionally refuses sends.
    #[derive(Default)]
    struct RecordingNative {
        sent: Vec<NameMessage>,
        next_handle: u64,
        live_sequences: usize,
        would_block: bool,
        fail: bool,
    }

    #[async_trait]
    impl NativeLayer for RecordingNative {
        fn create_channel(&mut self, _spec: &ChannelSpec) -> Result<ChannelHandle, NativeError> {
            Ok(ChannelHandle(1))
        }

        fn destroy_channel(&mut self, _channel: ChannelHandle) -> Result<(), NativeError> {
            Ok(())
        }

        fn channel_id(&self, _channel: ChannelHandle) -> Option<ChannelId> {
            Some(1)
        }

        fn channel_kind(&self, _channel: ChannelHandle) -> Option<u16> {
            Some(ChannelKind::TcpClient.raw())
        }

        fn send(
            &mut self,
            channel: ChannelHandle,
            sequence: &Sequence,
            _flags: SendFlags,
        ) -> Result<SendOutcome, NativeError> {
            if self.fail {
                return Err(NativeError::SendFailed {
                    handle: channel,
                    reason: "connection reset".into(),
                });
            }
            if self.would_block {
                return Ok(SendOutcome::WouldBlock);
            }
            self.sent.push(NameMessage::decode(sequence).unwrap());
            Ok(SendOutcome::Sent)
        }

        fn create_sequence(&mut self) -> Result<SequenceHandle, NativeError> {
            self.next_handle += 1;
            self.live_sequences += 1;
            Ok(SequenceHandle(self.next_handle))
        }

        fn destroy_sequence(&mut self, _sequence: SequenceHandle) {
            self.live_sequences -= 1;
        }

        fn register(&mut self, _channel: ChannelHandle, _group: &str) -> Result<(), NativeError> {
            Ok(())
        }

        fn unregister(&mut self, _channel: ChannelHandle) -> Result<(), NativeError> {
            Ok(())
        }

        async fn poll(&mut self, _timeout: Duration) -> Vec<NativeEvent> {
            Vec::new()
        }
    }

    type Log = Arc<Mutex<Vec<(String, NameInfoEvent, usize, Option<AppInfo>)>>>;

    struct Recorder(Log);

    impl NameInfoCallback for Recorder {
        fn on_name_info(
            &mut self,
            info: &NameInfo,
            app_info: Option<&AppInfo>,
            event: NameInfoEvent,
        ) -> anyhow::Result<()> {
            self.0.lock().unwrap().push((
                info.name().to_string(),
                event,
                info.endpoints().len(),
                app_info.cloned(),
            ));
            Ok(())
        }
    }

    struct RemovalRecorder(Arc<Mutex<Vec<bool>>>);

    impl NameInfoCallback for RemovalRecorder {
        fn on_name_info(
            &mut self,
            info: &NameInfo,
            _app_info: Option<&AppInfo>,
            event: NameInfoEvent,
        ) -> anyhow::Result<()> {
            assert_eq!(event, NameInfoEvent::Delivered);
            self.0.lock().unwrap().push(info.is_removed());
            Ok(())
        }
    }

    struct Fixture {
        native: RecordingNative,
        callers: CallerTable,
        sequences: HandleRegistry<SequenceHandle, Sequence>,
        client: NameServiceClient,
    }

    impl Fixture {
        fn new() -> Self {
            let mut client = NameServiceClient::new(&NameServiceConfig::default());
            client.connect(ChannelHandle(1));
            Self {
                native: RecordingNative::default(),
                callers: CallerTable::new(),
                sequences: HandleRegistry::new(),
                client,
            }
        }

        fn io(&mut self) -> (&mut NameServiceClient, NameServiceIo<'_>) {
            (
                &mut self.client,
                NameServiceIo {
                    native: &mut self.native,
                    callers: &self.callers,
                    sequences: &self.sequences,
                },
            )
        }
    }

    fn recorder() -> (Log, Box<dyn NameInfoCallback>) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        (log.clone(), Box::new(Recorder(log)))
    }

    fn response(kind: SequenceType, request_id: RequestId, name: &str) -> Sequence {
        let mut message = NameMessage::new(kind, name);
        message.request_id = Some(request_id);
        message.endpoints = vec![NameEndpoint {
            address: Ipv4Addr::new(192, 168, 1, 20),
            port: 29312,
            protocol: None,
        }];
        message.to_builder().build(SequenceHandle(900))
    }

    #[test]
    fn test_request_is_sent_with_configured_group() {
        let mut fixture = Fixture::new();
        let (_log, callback) = recorder();
        let mut options = Options::new();
        options.append_text(OPT_GROUP_NAME, "blue");

        let (client, mut io) = fixture.io();
        let submission = client
            .request_name_info(&mut io, "telemetry", 1000, callback, None, &options)
            .unwrap();

        assert_eq!(submission, Submission::Sent(1));
        let sent = &fixture.native.sent[0];
        assert_eq!(sent.kind, SequenceType::Query);
        assert_eq!(sent.group_name.as_deref(), Some("blue"));
        assert_eq!(fixture.native.live_sequences, 0);
        assert_eq!(fixture.callers.active(), 1);
    }

    #[test]
    fn test_request_delivers_once_then_is_gone() {
        let mut fixture = Fixture::new();
        let (log, callback) = recorder();
        let (client, mut io) = fixture.io();
        client
            .request_name_info(&mut io, "svc", 1000, callback, Some(serde_json::json!({"tag": 7})), &Options::new())
            .unwrap();

        let now = Instant::now();
        let answer = response(SequenceType::Query, 1, "svc");
        assert_eq!(fixture.client.invoke(&answer, now), 1);
        assert_eq!(fixture.client.invoke(&answer, now), 0);
        assert_eq!(fixture.client.expire(now + Duration::from_secs(5)), 0);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, NameInfoEvent::Delivered);
        assert_eq!(log[0].3, Some(serde_json::json!({"tag": 7})));
        assert_eq!(fixture.callers.active(), 0);
    }

    #[test]
    fn test_request_without_answer_expires_exactly_once() {
        let mut fixture = Fixture::new();
        let (log, callback) = recorder();
        let (client, mut io) = fixture.io();
        client
            .request_name_info(&mut io, "nobody", 500, callback, None, &Options::new())
            .unwrap();

        let start = Instant::now();
        assert_eq!(fixture.client.expire(start + Duration::from_millis(100)), 0);
        assert_eq!(fixture.client.expire(start + Duration::from_secs(1)), 1);
        assert_eq!(fixture.client.expire(start + Duration::from_secs(2)), 0);

        let events: Vec<NameInfoEvent> = log.lock().unwrap().iter().map(|e| e.1).collect();
        assert_eq!(events, vec![NameInfoEvent::Expired]);
        assert_eq!(fixture.client.stats().expired, 1);
    }

    #[test]
    fn test_response_must_match_type_id_and_name() {
        let mut fixture = Fixture::new();
        let (log, callback) = recorder();
        let (client, mut io) = fixture.io();
        client
            .request_name_info(&mut io, "svc", 1000, callback, None, &Options::new())
            .unwrap();

        let now = Instant::now();
        assert_eq!(fixture.client.invoke(&response(SequenceType::Request, 1, "svc"), now), 0);
        assert_eq!(fixture.client.invoke(&response(SequenceType::Query, 2, "svc"), now), 0);
        assert_eq!(fixture.client.invoke(&response(SequenceType::Query, 1, "other"), now), 0);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(fixture.client.pending_count(), 1);
    }

    #[test]
    fn test_registration_hears_every_ack_then_expires() {
        let mut fixture = Fixture::new();
        let (log, callback) = recorder();
        let mut options = Options::new();
        options
            .append_text(OPT_CONNECT_ADDRESS, "10.1.1.1")
            .append_text(OPT_CONNECT_PORT, "7000")
            .append_text(OPT_FT_STATE, "active");

        let (client, mut io) = fixture.io();
        client
            .register_name(&mut io, "svc", 5, 1000, Some(callback), None, &options)
            .unwrap();
        let sent = fixture.native.sent[0].clone();
        assert_eq!(sent.kind, SequenceType::Request);
        assert_eq!(sent.linger_secs, Some(5));
        assert_eq!(sent.ft_state, Some(FtState::Active));
        assert_eq!(sent.endpoints.len(), 1);

        // Acks carry no endpoints; the advertisement fills them in.
        let mut ack = NameMessage::new(SequenceType::Request, "svc");
        ack.request_id = Some(1);
        let ack = ack.to_builder().build(SequenceHandle(901));

        let now = Instant::now();
        assert_eq!(fixture.client.invoke(&ack, now), 1);
        assert_eq!(fixture.client.invoke(&ack, now), 1);
        assert_eq!(fixture.client.expire(now + Duration::from_secs(2)), 1);

        let log = log.lock().unwrap();
        let events: Vec<NameInfoEvent> = log.iter().map(|e| e.1).collect();
        assert_eq!(
            events,
            vec![NameInfoEvent::Delivered, NameInfoEvent::Delivered, NameInfoEvent::Expired]
        );
        assert!(log.iter().all(|e| e.2 == 1));
    }

    #[test]
    fn test_subscription_ignores_confirmation_and_never_expires() {
        let mut fixture = Fixture::new();
        let (log, callback) = recorder();
        let (client, mut io) = fixture.io();
        let id = match client
            .subscribe_to_name_info(&mut io, "svc", callback, None, &Options::new())
            .unwrap()
        {
            Submission::Sent(id) => id,
            other => panic!("unexpected {:?}", other),
        };

        let now = Instant::now();
        assert_eq!(fixture.client.invoke(&response(SequenceType::Request, id, "svc"), now), 0);
        assert_eq!(fixture.client.invoke(&response(SequenceType::Query, id, "svc"), now), 1);
        assert_eq!(fixture.client.expire(now + Duration::from_secs(3600)), 0);
        assert_eq!(log.lock().unwrap().len(), 1);

        assert!(fixture.client.unsubscribe(id));
        assert!(!fixture.client.unsubscribe(id));
        assert_eq!(fixture.callers.active(), 0);
    }

    #[test]
    fn test_would_block_keeps_nothing_pending() {
        let mut fixture = Fixture::new();
        fixture.native.would_block = true;
        let (_log, callback) = recorder();
        let (client, mut io) = fixture.io();

        let submission = client
            .request_name_info(&mut io, "svc", 1000, callback, None, &Options::new())
            .unwrap();

        assert_eq!(submission, Submission::WouldBlock);
        assert_eq!(fixture.client.pending_count(), 0);
        assert_eq!(fixture.client.stats().would_block, 1);
        assert_eq!(fixture.callers.active(), 0);
        assert_eq!(fixture.native.live_sequences, 0);
    }

    #[test]
    fn test_hard_send_failure_releases_the_binding() {
        let mut fixture = Fixture::new();
        fixture.native.fail = true;
        let (_log, callback) = recorder();
        let (client, mut io) = fixture.io();

        let err = client
            .request_name_info(&mut io, "svc", 1000, callback, None, &Options::new())
            .unwrap_err();

        assert!(matches!(err, NameServiceError::SendFailed { ref name, .. } if name == "svc"));
        assert_eq!(fixture.callers.active(), 0);
        assert_eq!(fixture.callers.released(), 1);
    }

    #[test]
    fn test_argument_validation() {
        let mut fixture = Fixture::new();
        let (client, mut io) = fixture.io();

        let (_log, callback) = recorder();
        assert!(matches!(
            client.request_name_info(&mut io, "svc", 0, callback, None, &Options::new()),
            Err(NameServiceError::InvalidExpiration { expiration_ms: 0, .. })
        ));

        let (_log, callback) = recorder();
        assert!(matches!(
            client.request_name_info(&mut io, "", 100, callback, None, &Options::new()),
            Err(NameServiceError::InvalidArgument(_))
        ));

        let mut bad_port = Options::new();
        bad_port
            .append_text(OPT_CONNECT_ADDRESS, "10.0.0.1")
            .append_text(OPT_CONNECT_PORT, "not-a-port");
        assert!(matches!(
            client.register_name(&mut io, "svc", 0, 100, None, None, &bad_port),
            Err(NameServiceError::InvalidArgument(OPT_CONNECT_ADDRESS))
        ));
        assert!(fixture.native.sent.is_empty());
    }

    #[test]
    fn test_registration_rejects_more_than_five_endpoints() {
        let mut fixture = Fixture::new();
        let (client, mut io) = fixture.io();

        let mut options = Options::new();
        for port in 7000..7005 {
            options
                .append_text(OPT_CONNECT_ADDRESS, "10.0.0.1")
                .append_text(OPT_CONNECT_PORT, &port.to_string());
        }
        assert!(matches!(
            client.register_name(&mut io, "svc", 0, 100, None, None, &options),
            Ok(Submission::Sent(_))
        ));

        options
            .append_text(OPT_DESTINATION_ADDRESS, "10.0.0.2")
            .append_text(OPT_DESTINATION_PORT, "7100");
        assert!(matches!(
            client.register_name(&mut io, "svc", 0, 100, None, None, &options),
            Err(NameServiceError::InvalidArgument("endpoints"))
        ));

        assert_eq!(fixture.native.sent.len(), 1);
        assert_eq!(fixture.native.sent[0].endpoints.len(), MAX_ENDPOINTS);
    }

    #[test]
    fn test_removal_notice_reaches_subscription() {
        let mut fixture = Fixture::new();
        let removed = Arc::new(Mutex::new(Vec::new()));
        let (client, mut io) = fixture.io();
        let id = match client
            .subscribe_to_name_info(&mut io, "svc", Box::new(RemovalRecorder(removed.clone())), None, &Options::new())
            .unwrap()
        {
            Submission::Sent(id) => id,
            other => panic!("unexpected {:?}", other),
        };

        let now = Instant::now();
        let mut notice = NameMessage::new(SequenceType::Query, "svc");
        notice.request_id = Some(id);
        notice.removed = true;
        let notice = notice.to_builder().build(SequenceHandle(902));

        assert_eq!(fixture.client.invoke(&response(SequenceType::Query, id, "svc"), now), 1);
        assert_eq!(fixture.client.invoke(&notice, now), 1);
        assert_eq!(*removed.lock().unwrap(), vec![false, true]);
        assert_eq!(fixture.client.pending_count(), 1);
    }

    #[test]
    fn test_not_connected() {
        let mut fixture = Fixture::new();
        fixture.client.disconnect();
        let (client, mut io) = fixture.io();
        assert!(matches!(
            client.register_name(&mut io, "svc", 0, 100, None, None, &Options::new()),
            Err(NameServiceError::NotConnected)
        ));
    }

    #[test]
    fn test_resubscribe_resends_live_subscriptions_only() {
        let mut fixture = Fixture::new();
        let (client, mut io) = fixture.io();
        let (_a, first) = recorder();
        let (_b, second) = recorder();
        let (_c, request) = recorder();
        client.subscribe_to_name_info(&mut io, "a", first, None, &Options::new()).unwrap();
        client.subscribe_to_name_info(&mut io, "b", second, None, &Options::new()).unwrap();
        client.request_name_info(&mut io, "c", 1000, request, None, &Options::new()).unwrap();

        assert_eq!(client.resubscribe(&mut io).unwrap(), 2);
        let resent: Vec<&str> = fixture.native.sent[3..].iter().map(|m| m.name.as_str()).collect();
        assert_eq!(resent, vec!["a", "b"]);
        assert!(fixture.native.sent[3..].iter().all(|m| m.kind == SequenceType::Subscribe));
    }

    #[test]
    fn test_heartbeats_track_name_servers() {
        let mut fixture = Fixture::new();
        let start = Instant::now();
        let beat = crate::name_service::protocol::heartbeat(0x51).build(SequenceHandle(5));

        assert_eq!(fixture.client.invoke(&beat, start), 0);
        assert_eq!(fixture.client.known_servers(), vec![0x51]);

        fixture.client.expire(start + Duration::from_secs(4));
        assert_eq!(fixture.client.known_servers(), vec![0x51]);
        fixture.client.expire(start + Duration::from_secs(6));
        assert!(fixture.client.known_servers().is_empty());
    }

    #[test]
    fn test_non_name_sequences_are_ignored() {
        let mut fixture = Fixture::new();
        let mut builder = Sequence::builder("app data", 42);
        builder.copy_str("hello", 1);
        let seq = builder.build(SequenceHandle(6));
        assert_eq!(fixture.client.invoke(&seq, Instant::now()), 0);
    }
}
