// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Service-group membership and health.
//!
//! Native membership events name groups and services by id. The tracker
//! resolves those ids through the object registry, constructing service
//! wrappers the first time a service is seen, and forwards each event to
//! the callback registered for the group. Events that cannot be resolved
//! are consistency warnings: logged, counted, and dropped.

use crate::binding::{AdapterKey, CallbackBinding, CallerKind, CallerTable};
use crate::config::consts::OPT_SERVICE_CALLBACKS;
use crate::config::{OptionValue, Options};
use crate::observability::messages::dispatch::WrapperConstructed;
use crate::observability::messages::service_group::{
    GroupUnresolved, ServiceCallbackFailed, ServicePlaceholder, ServiceTimedOut,
    ServiceUnresolved, SmartbeatDecodeFailed, UnexpectedTransition,
};
use crate::observability::messages::StructuredLog;
use crate::registry::ObjectRegistry;
use crate::service_group::service::{
    GroupId, MembershipState, Service, ServiceGroup, ServiceId, ServiceRef, ServiceState,
};
use crate::service_group::smartbeat::Smartbeat;
use crate::traits::ServiceCallback;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Adapter attached to a service-callback binding: the group it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGroupAdapter {
    pub key: AdapterKey,
    pub group: Option<GroupId>,
}

type ServiceBinding = CallbackBinding<dyn ServiceCallback, ServiceGroupAdapter>;

/// What happened to one membership event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// At least one callback ran and none failed.
    Delivered,
    /// The event was recorded but no callback is registered.
    NoCallback,
    /// The event could not be resolved and was discarded.
    Dropped,
    /// A callback ran and returned an error.
    Failed,
}

/// Health snapshot for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub state: Option<ServiceState>,
    pub checkpoint: u64,
    pub last_smartbeat: Option<Smartbeat>,
    #[serde(skip)]
    pub last_activity: Instant,
}

pub struct ServiceGroupTracker {
    adapters: HashMap<AdapterKey, ServiceBinding>,
    next_adapter: u64,
    members: HashMap<GroupId, BTreeMap<ServiceId, MembershipState>>,
    status: HashMap<ServiceId, ServiceStatus>,
    activity_timeout: Duration,
    warnings: u64,
}

impl ServiceGroupTracker {
    pub fn new(activity_timeout: Duration) -> Self {
        Self {
            adapters: HashMap::new(),
            next_adapter: 0,
            members: HashMap::new(),
            status: HashMap::new(),
            activity_timeout,
            warnings: 0,
        }
    }

    pub fn create_group(
        &mut self,
        registry: &mut ObjectRegistry,
        id: GroupId,
        name: &str,
        options: Options,
    ) -> Arc<ServiceGroup> {
        self.create_group_with(registry, ServiceGroup::new(id, name, options))
    }

    /// Map a fully configured group, replacing any group with the same id.
    pub fn create_group_with(
        &mut self,
        registry: &mut ObjectRegistry,
        group: ServiceGroup,
    ) -> Arc<ServiceGroup> {
        let id = group.id();
        if let Some(key) = group.options().find_adapter(OPT_SERVICE_CALLBACKS) {
            if let Some(binding) = self.adapters.get_mut(&key) {
                if let Some(adapter) = binding.detach() {
                    binding.attach(ServiceGroupAdapter {
                        group: Some(id),
                        ..adapter
                    });
                }
            }
        }
        let group = Arc::new(group);
        registry.groups.map(id, group.clone());
        self.members.entry(id).or_default();
        group
    }

    /// Unmap a group. Services that belong to no other group are unmapped
    /// with it.
    pub fn destroy_group(&mut self, registry: &mut ObjectRegistry, id: GroupId) -> Option<Arc<ServiceGroup>> {
        let group = registry.groups.unmap(id)?;
        if let Some(members) = self.members.remove(&id) {
            for service in members.keys() {
                if !self.members.values().any(|m| m.contains_key(service)) {
                    registry.services.unmap(*service);
                    self.status.remove(service);
                }
            }
        }
        Some(group)
    }

    /// Register `callback` for the group whose options are `group_options`.
    ///
    /// The callback is bound to a fresh caller, an adapter is attached, and
    /// the adapter key is folded into the options under
    /// `service_callbacks`. Any callback already registered there is
    /// replaced.
    pub fn add_service_callback(
        &mut self,
        callers: &CallerTable,
        group_options: &mut Options,
        callback: Box<dyn ServiceCallback>,
    ) -> AdapterKey {
        if let Some(previous) = group_options.find_adapter(OPT_SERVICE_CALLBACKS) {
            self.remove_service_callback(group_options, previous);
        }

        self.next_adapter += 1;
        let key = AdapterKey(self.next_adapter);
        let mut binding: ServiceBinding = CallbackBinding::new(callback);
        binding.bind(callers.register(CallerKind::ServiceGroup));
        binding.attach(ServiceGroupAdapter { key, group: None });
        self.adapters.insert(key, binding);

        group_options.update(OPT_SERVICE_CALLBACKS, OptionValue::Adapter(key));
        key
    }

    /// Detach the adapter, clear the option, and close the binding.
    pub fn remove_service_callback(&mut self, group_options: &mut Options, key: AdapterKey) -> bool {
        let Some(mut binding) = self.adapters.remove(&key) else {
            return false;
        };
        binding.detach();
        if group_options.find_adapter(OPT_SERVICE_CALLBACKS) == Some(key) {
            group_options.remove(OPT_SERVICE_CALLBACKS);
        }
        binding.close();
        true
    }

    pub fn added(
        &mut self,
        registry: &mut ObjectRegistry,
        group_id: GroupId,
        service_id: ServiceId,
        state: MembershipState,
        native: Option<ServiceRef>,
        now: Instant,
    ) -> Delivery {
        let Some(group) = registry.groups.find(group_id) else {
            self.warn(GroupUnresolved {
                event: "added",
                group: group_id,
                service: service_id,
            });
            return Delivery::Dropped;
        };

        let service = match registry.services.find(service_id) {
            Some(service) => service,
            None => {
                let service = match &native {
                    Some(native) => Arc::new(Service::from_native(native)),
                    None => {
                        self.warnings += 1;
                        tracing::warn!(
                            "{}",
                            ServicePlaceholder {
                                group: group_id,
                                service: service_id,
                            }
                        );
                        Arc::new(Service::placeholder(service_id))
                    }
                };
                tracing::debug!(
                    "{}",
                    WrapperConstructed {
                        object: "service",
                        id: service_id,
                    }
                );
                registry.services.map(service_id, service.clone());
                service
            }
        };

        self.members.entry(group_id).or_default().insert(service_id, state);
        let status = self.status.entry(service_id).or_insert_with(|| ServiceStatus {
            state: None,
            checkpoint: 0,
            last_smartbeat: None,
            last_activity: now,
        });
        status.last_activity = now;
        if let Some(native) = &native {
            status.state = Some(native.state);
        }

        self.deliver(&group, "added", service_id, |cb| cb.on_added(&group, &service, state))
    }

    pub fn removed(
        &mut self,
        registry: &mut ObjectRegistry,
        group_id: GroupId,
        service_id: ServiceId,
        state: MembershipState,
    ) -> Delivery {
        let Some((group, service)) = self.resolve_pair(registry, "removed", group_id, service_id) else {
            return Delivery::Dropped;
        };

        let delivery = self.deliver(&group, "removed", service_id, |cb| {
            cb.on_removed(&group, &service, state)
        });
        self.forget_membership(registry, group_id, service_id);
        delivery
    }

    /// Deliver a lifecycle change to the callbacks of every group the
    /// service belongs to.
    pub fn state_changed(
        &mut self,
        registry: &ObjectRegistry,
        service_id: ServiceId,
        old: ServiceState,
        new: ServiceState,
    ) -> Delivery {
        let Some(service) = registry.services.find(service_id) else {
            self.warn(ServiceUnresolved {
                event: "state_changed",
                group: None,
                service: service_id,
            });
            return Delivery::Dropped;
        };

        if !old.can_transition_to(new) {
            tracing::warn!(
                "{}",
                UnexpectedTransition {
                    service: service_id,
                    from: old,
                    to: new,
                }
            );
        }
        if let Some(status) = self.status.get_mut(&service_id) {
            status.state = Some(new);
        }

        let groups: Vec<Arc<ServiceGroup>> = self
            .members
            .iter()
            .filter(|(_, members)| members.contains_key(&service_id))
            .filter_map(|(group_id, _)| registry.groups.find(*group_id))
            .collect();

        let mut outcome = Delivery::NoCallback;
        for group in &groups {
            let delivery = self.deliver(group, "state_changed", service_id, |cb| {
                cb.on_state_changed(&service, old, new)
            });
            outcome = merge(outcome, delivery);
        }
        outcome
    }

    pub fn smartbeat(
        &mut self,
        registry: &ObjectRegistry,
        group_id: GroupId,
        service_id: ServiceId,
        payload: &[u8],
        now: Instant,
    ) -> Delivery {
        let Some((group, service)) = self.resolve_pair(registry, "smartbeat", group_id, service_id) else {
            return Delivery::Dropped;
        };

        let smartbeat = match Smartbeat::decode(payload) {
            Ok(smartbeat) => smartbeat,
            Err(error) => {
                tracing::warn!(
                    "{}",
                    SmartbeatDecodeFailed {
                        service: service_id,
                        error: &error,
                    }
                );
                return Delivery::Dropped;
            }
        };

        let status = self.status.entry(service_id).or_insert_with(|| ServiceStatus {
            state: None,
            checkpoint: 0,
            last_smartbeat: None,
            last_activity: now,
        });
        status.checkpoint = smartbeat.checkpoint;
        status.last_smartbeat = Some(smartbeat);
        status.last_activity = now;

        self.deliver(&group, "smartbeat", service_id, |cb| {
            cb.on_smartbeat(&group, &service, &smartbeat)
        })
    }

    /// Time out members that have been silent longer than their group's
    /// activity timeout: one `state_changed(old -> timed_out)` per service,
    /// then `removed` for each group it went silent in. Services already in
    /// a terminal state are only removed. Returns how many services timed out.
    pub fn check_activity(&mut self, registry: &mut ObjectRegistry, now: Instant) -> usize {
        let mut silent: BTreeMap<ServiceId, Vec<(GroupId, MembershipState, Duration)>> = BTreeMap::new();
        for (group_id, members) in &self.members {
            let timeout = registry
                .groups
                .find(*group_id)
                .and_then(|group| group.activity_timeout())
                .unwrap_or(self.activity_timeout);
            for (service_id, membership) in members {
                let Some(status) = self.status.get(service_id) else {
                    continue;
                };
                let silent_for = now.saturating_duration_since(status.last_activity);
                if silent_for > timeout {
                    silent
                        .entry(*service_id)
                        .or_default()
                        .push((*group_id, *membership, silent_for));
                }
            }
        }

        let timed_out = silent.len();
        for (service_id, mut groups) in silent {
            groups.sort_by_key(|(group_id, _, _)| *group_id);
            for (group_id, _, silent_for) in &groups {
                ServiceTimedOut {
                    group: *group_id,
                    service: service_id,
                    silent_for: *silent_for,
                }
                .log();
            }

            let old = self
                .status
                .get(&service_id)
                .and_then(|status| status.state)
                .unwrap_or(ServiceState::Running);
            if !old.is_terminal() {
                self.state_changed(registry, service_id, old, ServiceState::TimedOut);
            }
            for (group_id, membership, _) in groups {
                self.removed(registry, group_id, service_id, membership);
            }
        }
        timed_out
    }

    pub fn status(&self, service_id: ServiceId) -> Option<&ServiceStatus> {
        self.status.get(&service_id)
    }

    pub fn members(&self, group_id: GroupId) -> Vec<ServiceId> {
        self.members
            .get(&group_id)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn membership(&self, group_id: GroupId, service_id: ServiceId) -> Option<MembershipState> {
        self.members.get(&group_id)?.get(&service_id).copied()
    }

    /// Consistency warnings raised since the tracker was created.
    pub fn consistency_warnings(&self) -> u64 {
        self.warnings
    }

    pub fn callback_count(&self) -> usize {
        self.adapters.len()
    }

    fn resolve_pair(
        &mut self,
        registry: &ObjectRegistry,
        event: &'static str,
        group_id: GroupId,
        service_id: ServiceId,
    ) -> Option<(Arc<ServiceGroup>, Arc<Service>)> {
        let Some(group) = registry.groups.find(group_id) else {
            self.warn(GroupUnresolved {
                event,
                group: group_id,
                service: service_id,
            });
            return None;
        };
        let Some(service) = registry.services.find(service_id) else {
            self.warn(ServiceUnresolved {
                event,
                group: Some(group_id),
                service: service_id,
            });
            return None;
        };
        Some((group, service))
    }

    fn forget_membership(&mut self, registry: &mut ObjectRegistry, group_id: GroupId, service_id: ServiceId) {
        if let Some(members) = self.members.get_mut(&group_id) {
            members.remove(&service_id);
        }
        if !self.members.values().any(|m| m.contains_key(&service_id)) {
            registry.services.unmap(service_id);
            self.status.remove(&service_id);
        }
    }

    fn deliver<F>(&mut self, group: &ServiceGroup, event: &'static str, service_id: ServiceId, invoke: F) -> Delivery
    where
        F: FnOnce(&mut dyn ServiceCallback) -> anyhow::Result<()>,
    {
        let Some(key) = group.options().find_adapter(OPT_SERVICE_CALLBACKS) else {
            return Delivery::NoCallback;
        };
        let Some(binding) = self.adapters.get_mut(&key) else {
            return Delivery::NoCallback;
        };
        match invoke(binding.callback_mut()) {
            Ok(()) => Delivery::Delivered,
            Err(error) => {
                tracing::error!(
                    "{}",
                    ServiceCallbackFailed {
                        event,
                        service: service_id,
                        error: &error,
                    }
                );
                Delivery::Failed
            }
        }
    }

    fn warn(&mut self, message: impl StructuredLog) {
        self.warnings += 1;
        message.log();
    }
}

fn merge(current: Delivery, next: Delivery) -> Delivery {
    match (current, next) {
        (Delivery::Failed, _) | (_, Delivery::Failed) => Delivery::Failed,
        (Delivery::Delivered, _) | (_, Delivery::Delivered) => Delivery::Delivered,
        _ => current,
    }
}
