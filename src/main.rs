// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::sync::Arc;
use std::time::Duration;
use the_switchboard::backends::LoopbackNative;
use the_switchboard::binding::CallbackBinding;
use the_switchboard::channel::Channel;
use the_switchboard::config::consts::{OPT_CONNECT_ADDRESS, OPT_CONNECT_PORT};
use the_switchboard::config::{load_and_validate_config, EnvConfig, Options};
use the_switchboard::engine::DispatchContext;
use the_switchboard::environment::Environment;
use the_switchboard::name_service::{AppInfo, NameInfo, NameInfoEvent, NameServer};
use the_switchboard::sequence::{Sequence, ServiceType};
use the_switchboard::service_group::{
    MembershipState, Service, ServiceGroup, ServiceRef, ServiceState, Smartbeat,
};
use the_switchboard::traits::{DispatchCallback, NameInfoCallback, ServiceCallback};
use tracing_subscriber::EnvFilter;

const DEMO_NAME: &str = "demo-service";
const DEMO_GROUP: u64 = 1;
const DEMO_SERVICE: u64 = 100;
const PUMP_TICKS: usize = 5;

/// Prints every name resolution as one JSON document.
struct JsonPrinter {
    label: &'static str,
}

impl NameInfoCallback for JsonPrinter {
    fn on_name_info(
        &mut self,
        info: &NameInfo,
        app_info: Option<&AppInfo>,
        event: NameInfoEvent,
    ) -> anyhow::Result<()> {
        let report = serde_json::json!({
            "callback": self.label,
            "event": event,
            "info": info,
            "app_info": app_info,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

/// Prints group membership and smartbeats.
struct MembershipPrinter;

impl ServiceCallback for MembershipPrinter {
    fn on_added(
        &mut self,
        group: &Arc<ServiceGroup>,
        service: &Arc<Service>,
        state: MembershipState,
    ) -> anyhow::Result<()> {
        println!("group '{}': added {} ({:?})", group.name(), service, state);
        Ok(())
    }

    fn on_smartbeat(
        &mut self,
        group: &Arc<ServiceGroup>,
        service: &Arc<Service>,
        smartbeat: &Smartbeat,
    ) -> anyhow::Result<()> {
        println!(
            "group '{}': smartbeat from {} checkpoint {}",
            group.name(),
            service,
            smartbeat.checkpoint
        );
        Ok(())
    }
}

/// Application data handler; the demo sends no data, so this only logs.
struct DemoDispatch;

impl DispatchCallback for DemoDispatch {
    fn on_data(
        &mut self,
        _cx: &mut DispatchContext<'_>,
        channel: &Arc<Channel>,
        sequence: &Arc<Sequence>,
    ) -> anyhow::Result<()> {
        tracing::info!(channel = %channel, elements = sequence.count(), "Data received");
        Ok(())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("Usage: {} [config.yaml|config.toml]", args[0]);
        std::process::exit(1);
    }

    if let Err(e) = run(args.get(1).map(String::as_str)).await {
        eprintln!("❌ Switchboard demo failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config_path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => load_and_validate_config(path)?,
        None => EnvConfig::default(),
    };
    let poll_interval = config.dispatcher.poll_interval();
    let idle_time = config.dispatcher.idle_time();
    let expiration_ms = config.name_service.default_expiration_ms;

    let native = LoopbackNative::new().with_name_server(NameServer::new(1));
    let injector = native.injector();
    let probe = native.probe();
    let mut env = Environment::new(config, Box::new(native))?;

    println!("🔌 Switchboard loopback demo");
    println!("═══════════════════════════");

    let ns = env.connect_name_service()?;
    println!("Name server channel: {}", ns);

    env.subscribe_to_name_info(
        DEMO_NAME,
        Box::new(JsonPrinter {
            label: "subscription",
        }),
        Some(serde_json::json!({ "watcher": "demo" })),
        &Options::new(),
    )?;

    let mut advertised = Options::new();
    advertised
        .append_text(OPT_CONNECT_ADDRESS, "127.0.0.1")
        .append_text(OPT_CONNECT_PORT, "29090");
    env.register_name(DEMO_NAME, 5, expiration_ms, None, None, &advertised)?;

    env.request_name_info(
        DEMO_NAME,
        expiration_ms,
        Box::new(JsonPrinter { label: "request" }),
        None,
        &Options::new(),
    )?;
    env.request_name_info(
        "nobody-home",
        expiration_ms,
        Box::new(JsonPrinter { label: "request" }),
        None,
        &Options::new(),
    )?;

    let mut group_options = Options::new();
    env.add_service_callback(&mut group_options, Box::new(MembershipPrinter));
    env.create_service_group(DEMO_GROUP, "demo-workers", group_options);
    injector.service_added(
        DEMO_GROUP,
        DEMO_SERVICE,
        MembershipState::Joined,
        Some(ServiceRef {
            id: DEMO_SERVICE,
            name: "worker".to_string(),
            service_type: ServiceType::Data,
            state: ServiceState::Running,
        }),
    );

    let mut binding = CallbackBinding::from_callback(DemoDispatch);
    for tick in 0..PUMP_TICKS {
        injector.smartbeat(DEMO_GROUP, DEMO_SERVICE, &Smartbeat::now(tick as u64));
        if env.run_client_timed(&mut binding, poll_interval).await? == 0 {
            tokio::time::sleep(idle_time).await;
        }
    }
    // Let outstanding requests reach their expiration.
    env.run_client_timed(&mut binding, Duration::from_millis(expiration_ms))
        .await?;
    binding.close();

    let summary = serde_json::json!({
        "dispatch": env.dispatch_stats(),
        "name_service": env.name_service().stats(),
        "service_status": env.groups().status(DEMO_SERVICE),
        "loopback": {
            "polls": probe.polls(),
            "sends": probe.sends(),
            "sequences_destroyed": probe.sequences_destroyed(),
        },
    });
    println!("\n📊 Summary");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
