mod actuator;
mod channel;
mod command;
mod config;
mod diagnostics;
mod gate;
mod network;

use actuator::{LogDriver, PulseDriver, Servo, SysfsPwmDriver};
use anyhow::{anyhow, Context, Result};
use channel::{handle_broker_event, CommandChannel};
use command::CommandDispatcher;
use config::{DriverKind, GateSystemConfig};
use diagnostics::{memlog_layer, Diagnostics, InitPhase, MEMLOG_TARGET};
use gate::{GateController, GateSettings};
use gate_shared::{Lane, LinkOutcome};
use network::{ConnectivityManager, TcpProbeLink};
use std::sync::Arc;
use tokio::task::JoinHandle;

use tracing::{error, info};
use tracing_subscriber::{filter::filter_fn, fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            fmt::layer().with_filter(filter_fn(|meta| meta.target() != MEMLOG_TARGET)),
        )
        .with(memlog_layer(std::io::stdout))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("[INIT] Starting gate system...");

    let config = GateSystemConfig::load()?;
    let diagnostics = Arc::new(Diagnostics::from_procfs());

    // Network must be up before anything else can work
    diagnostics.snapshot(&InitPhase::Wifi.before());
    let mut link = TcpProbeLink::new(
        config.network.ssid.clone(),
        config.probe_addr(),
        config.network.attach_timeout(),
    );
    if let Some(interval) = config.network.watch_interval() {
        link = link.with_watch_interval(interval);
    }
    let connectivity = Arc::new(ConnectivityManager::new(
        Arc::new(link),
        config.network.max_attempts,
    ));

    match connectivity.start().await {
        LinkOutcome::Connected => {
            info!("[INFO] Connected to network {}", config.network.ssid);
        }
        LinkOutcome::Failed => {
            error!("[ERROR] Failed to connect to network {}", config.network.ssid);
            return Err(anyhow!(
                "Network {} unreachable after {} retries",
                config.network.ssid,
                connectivity.attempt_count().await
            ));
        }
    }
    diagnostics.snapshot(&InitPhase::Wifi.after());
    let _link_watch = watch_link(&connectivity);
    let _supervisor = connectivity.supervise();

    // Servos start closed
    diagnostics.snapshot(&InitPhase::Servo.before());
    info!("[INIT] Initializing servo motors...");
    let driver: Arc<dyn PulseDriver> = match config.servo.driver {
        DriverKind::Log => Arc::new(LogDriver),
        DriverKind::Sysfs => Arc::new(SysfsPwmDriver::new(config.servo.pwm_chip)),
    };
    let entry = build_gate(Lane::Entry, &config, driver.clone(), diagnostics.clone());
    let exit = build_gate(Lane::Exit, &config, driver, diagnostics.clone());
    for gate in [&entry, &exit] {
        gate.init(config.servo.period_us)
            .await
            .with_context(|| format!("{} servo init failed", gate.lane()))?;
    }
    diagnostics.snapshot(&InitPhase::Servo.after());

    let dispatcher = CommandDispatcher::new(config.broker.matcher(), entry, exit);

    diagnostics.snapshot(&InitPhase::Mqtt.before());
    info!("[INIT] Initializing MQTT client...");
    let mut channel = CommandChannel::connect(&config.broker);
    let subscriber = channel.subscriber();
    diagnostics.snapshot(&InitPhase::Mqtt.after());

    info!(
        "[INFO] Gate system READY (network {}).",
        if connectivity.is_ready() { "up" } else { "down" }
    );

    // Main event loop
    loop {
        tokio::select! {
            event = channel.recv() => match event {
                Some(event) => handle_broker_event(event, &subscriber, &dispatcher).await,
                None => {
                    error!("[MQTT] Broker event channel closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("[INFO] Shutting down");
                if let Err(e) = channel.disconnect().await {
                    error!("[MQTT] {}", e);
                }
                break;
            }
        }
    }

    Ok(())
}

/// Log every link status change after boot
fn watch_link(connectivity: &ConnectivityManager) -> JoinHandle<()> {
    let mut status_rx = connectivity.subscribe();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow_and_update();
            info!("[NET] Link status: {:?}", status);
        }
    })
}

fn build_gate(
    lane: Lane,
    config: &GateSystemConfig,
    driver: Arc<dyn PulseDriver>,
    diagnostics: Arc<Diagnostics>,
) -> GateController {
    let lane_config = config.gates.lane(lane);
    let servo = Servo::new(
        lane.label(),
        config.gates.channel(lane),
        config.servo.geometry(),
        driver,
    );
    let settings = GateSettings {
        open_angle: lane_config.open_angle,
        closed_angle: lane_config.closed_angle,
        dwell: config.gates.dwell(),
        retrigger: config.gates.retrigger,
    };
    GateController::new(lane, settings, servo, diagnostics)
}
