// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// How long one dispatcher tick waits on the native layer (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
/// Idle sleep used by timed client steps when nothing is pending (milliseconds)
pub const DEFAULT_IDLE_TIME_MS: u64 = 100;
/// Expiration applied to name requests when the caller passes none (milliseconds)
pub const DEFAULT_EXPIRATION_MS: u64 = 1000;
/// Name servers silent for longer than this are forgotten (milliseconds)
pub const DEFAULT_SERVER_ACTIVITY_TIMEOUT_MS: u64 = 5000;
/// Services silent for longer than this are timed out (milliseconds)
pub const DEFAULT_ACTIVITY_TIMEOUT_MS: u64 = 1200;

/// Option key routing name operations to a named store
pub const OPT_GROUP_NAME: &str = "group_name";
pub const OPT_FT_STATE: &str = "fault_tolerant_state";
pub const OPT_CONNECT_ADDRESS: &str = "connect_address";
pub const OPT_CONNECT_PORT: &str = "connect_port";
pub const OPT_DESTINATION_ADDRESS: &str = "destination_address";
pub const OPT_DESTINATION_PORT: &str = "destination_port";
pub const OPT_DESTINATION_PROTOCOL: &str = "destination_protocol";
pub const OPT_META_DATA_SEQUENCE: &str = "meta_data_sequence";
/// Sub-option tree used when opening the name-server channel
pub const OPT_NAME_SERVER_OPTIONS: &str = "name_server_options";
pub const OPT_NAME_SERVER_ADDRESS: &str = "name_server_address";
/// `udp` opens the name-server channel as a UDP listener instead of a TCP client
pub const OPT_NAME_SERVER_PROTOCOL: &str = "name_server_data_flow_protocol";
pub const DEFAULT_NAME_SERVER_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_NAME_SERVER_PORT: u16 = 20002;
pub const OPT_FD_CREATED_CB: &str = "fd_created_cb";
pub const OPT_FD_DESTROYED_CB: &str = "fd_destroyed_cb";
/// Group option holding the service-callback adapter key
pub const OPT_SERVICE_CALLBACKS: &str = "service_callbacks";
