// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-process name server.
//!
//! Keeps one store per group. Registrations are acknowledged to their
//! sender and pushed to every subscriber of the same name in the same
//! group. When a registrant's channel closes its names linger for the
//! registration's linger time before they disappear, and subscribers of a
//! vanished name are told it was removed.

use crate::channel::ChannelHandle;
use crate::name_service::protocol::{heartbeat, NameMessage, RequestId};
use crate::sequence::{SequenceBuilder, SequenceType};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// A reply the server wants delivered on `channel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub channel: ChannelHandle,
    pub message: NameMessage,
}

#[derive(Debug)]
struct NameRecord {
    registration: NameMessage,
    owner: Option<ChannelHandle>,
    linger: Duration,
    linger_until: Option<Instant>,
}

#[derive(Debug)]
struct Subscriber {
    name: String,
    request_id: Option<RequestId>,
    channel: ChannelHandle,
}

type GroupKey = Option<String>;

#[derive(Debug, Default)]
pub struct NameServer {
    id: u64,
    stores: HashMap<GroupKey, Vec<NameRecord>>,
    subscribers: HashMap<GroupKey, Vec<Subscriber>>,
}

impl NameServer {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handle one client message arriving on `from`.
    pub fn handle(&mut self, from: ChannelHandle, message: NameMessage) -> Vec<Outbound> {
        match message.kind {
            SequenceType::Request => self.register(from, message),
            SequenceType::Query => self.query(from, &message),
            SequenceType::Subscribe => self.subscribe(from, message),
            other => {
                tracing::warn!(
                    name = %message.name,
                    "Name server ignoring message of type {:?}",
                    other
                );
                Vec::new()
            }
        }
    }

    fn register(&mut self, from: ChannelHandle, message: NameMessage) -> Vec<Outbound> {
        let group = message.group_name.clone();
        let record = NameRecord {
            linger: Duration::from_secs(u64::from(message.linger_secs.unwrap_or_default())),
            registration: message,
            owner: Some(from),
            linger_until: None,
        };

        let mut outbound = vec![Outbound {
            channel: from,
            message: self.answer(SequenceType::Request, record.registration.request_id, &record),
        }];
        if let Some(subscribers) = self.subscribers.get(&group) {
            for subscriber in subscribers.iter().filter(|s| s.name == record.registration.name) {
                outbound.push(Outbound {
                    channel: subscriber.channel,
                    message: self.answer(SequenceType::Query, subscriber.request_id, &record),
                });
            }
        }

        let store = self.stores.entry(group).or_default();
        let existing = store.iter().position(|r| {
            r.registration.name == record.registration.name && r.owner == record.owner
        });
        match existing {
            Some(index) => store[index] = record,
            None => store.push(record),
        }
        outbound
    }

    fn query(&self, from: ChannelHandle, message: &NameMessage) -> Vec<Outbound> {
        self.stores
            .get(&message.group_name)
            .into_iter()
            .flatten()
            .filter(|record| record.registration.name == message.name)
            .map(|record| Outbound {
                channel: from,
                message: self.answer(SequenceType::Query, message.request_id, record),
            })
            .collect()
    }

    fn subscribe(&mut self, from: ChannelHandle, message: NameMessage) -> Vec<Outbound> {
        let mut confirmation = NameMessage::new(SequenceType::Request, message.name.clone());
        confirmation.request_id = message.request_id;
        confirmation.server_id = Some(self.id);

        let mut outbound = vec![Outbound {
            channel: from,
            message: confirmation,
        }];
        outbound.extend(self.query(from, &message));

        self.subscribers
            .entry(message.group_name)
            .or_default()
            .push(Subscriber {
                name: message.name,
                request_id: message.request_id,
                channel: from,
            });
        outbound
    }

    fn answer(&self, kind: SequenceType, request_id: Option<RequestId>, record: &NameRecord) -> NameMessage {
        let registration = &record.registration;
        let mut message = NameMessage::new(kind, registration.name.clone());
        message.request_id = request_id;
        message.endpoints = registration.endpoints.clone();
        message.ft_state = registration.ft_state;
        message.server_id = Some(self.id);
        message.meta_data = registration.meta_data.clone();
        message
    }

    /// A client connection went away: its subscriptions end and its names
    /// start lingering. Returns removal notices for names with no linger.
    pub fn channel_closed(&mut self, channel: ChannelHandle, now: Instant) -> Vec<Outbound> {
        for subscribers in self.subscribers.values_mut() {
            subscribers.retain(|s| s.channel != channel);
        }
        for store in self.stores.values_mut() {
            for record in store.iter_mut().filter(|r| r.owner == Some(channel)) {
                record.owner = None;
                record.linger_until = Some(now + record.linger);
            }
        }
        self.expire(now)
    }

    /// Drop names whose linger time has run out and return one removal
    /// notice per subscriber of each dropped name.
    pub fn expire(&mut self, now: Instant) -> Vec<Outbound> {
        let mut gone = Vec::new();
        for (group, store) in self.stores.iter_mut() {
            let (expired, kept): (Vec<NameRecord>, Vec<NameRecord>) = store
                .drain(..)
                .partition(|r| r.linger_until.is_some_and(|until| now >= until));
            *store = kept;
            gone.extend(expired.into_iter().map(|record| (group.clone(), record)));
        }

        let mut outbound = Vec::new();
        for (group, record) in &gone {
            tracing::debug!(name = %record.registration.name, "Name server dropped lingering name");
            for subscriber in self
                .subscribers
                .get(group)
                .into_iter()
                .flatten()
                .filter(|s| s.name == record.registration.name)
            {
                let mut message = self.answer(SequenceType::Query, subscriber.request_id, record);
                message.removed = true;
                outbound.push(Outbound {
                    channel: subscriber.channel,
                    message,
                });
            }
        }
        outbound
    }

    /// Names registered in `group` (`None` is the default store).
    pub fn names(&self, group: Option<&str>) -> Vec<String> {
        let key = group.map(str::to_string);
        let mut names: Vec<String> = self
            .stores
            .get(&key)
            .into_iter()
            .flatten()
            .map(|r| r.registration.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.values().map(Vec::len).sum()
    }

    pub fn heartbeat(&self) -> SequenceBuilder {
        heartbeat(self.id)
    }
}
