// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::{Channel, Fd};
use crate::engine::DispatchContext;
use crate::name_service::{AppInfo, NameInfo, NameInfoEvent};
use crate::sequence::Sequence;
use crate::service_group::{MembershipState, Service, ServiceGroup, ServiceState, Smartbeat};
use std::sync::Arc;

/// Application handlers for dispatcher events.
///
/// Only `on_data` is required. The default `on_name_response` hands the
/// response straight to the name-service client, which is what almost
/// every application wants.
pub trait DispatchCallback: Send {
    fn on_data(
        &mut self,
        cx: &mut DispatchContext<'_>,
        channel: &Arc<Channel>,
        sequence: &Arc<Sequence>,
    ) -> anyhow::Result<()>;

    fn on_name_response(
        &mut self,
        cx: &mut DispatchContext<'_>,
        _channel: &Arc<Channel>,
        sequence: &Arc<Sequence>,
    ) -> anyhow::Result<()> {
        cx.invoke_name_service(sequence);
        Ok(())
    }

    fn on_channel_created(
        &mut self,
        _cx: &mut DispatchContext<'_>,
        _channel: &Arc<Channel>,
        _fd: Fd,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_channel_destroyed(
        &mut self,
        _cx: &mut DispatchContext<'_>,
        _channel: &Arc<Channel>,
        _fd: Fd,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Receives name resolutions for one register/request/subscribe call.
pub trait NameInfoCallback: Send {
    fn on_name_info(
        &mut self,
        info: &NameInfo,
        app_info: Option<&AppInfo>,
        event: NameInfoEvent,
    ) -> anyhow::Result<()>;
}

/// Membership and health notifications for a service group.
pub trait ServiceCallback: Send {
    fn on_added(
        &mut self,
        _group: &Arc<ServiceGroup>,
        _service: &Arc<Service>,
        _state: MembershipState,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_removed(
        &mut self,
        _group: &Arc<ServiceGroup>,
        _service: &Arc<Service>,
        _state: MembershipState,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_state_changed(
        &mut self,
        _service: &Arc<Service>,
        _old: ServiceState,
        _new: ServiceState,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_smartbeat(
        &mut self,
        _group: &Arc<ServiceGroup>,
        _service: &Arc<Service>,
        _smartbeat: &Smartbeat,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
