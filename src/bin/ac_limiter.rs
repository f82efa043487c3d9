//! AC-input current limiter daemon.
//!
//! Connects to the MQTT broker, follows the switch and the power station, and
//! keeps the station's AC charge power under the switch's current limit.
//!
//! # Usage
//!
//! ```bash
//! ac-limiter                          # reads config/ac-limiter.toml
//! ac-limiter /etc/ac-limiter.toml
//! AC_LIMITER__MQTT__HOST=broker.lan ac-limiter
//! RUST_LOG=ac_limiter=trace ac-limiter
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ac_limiter::config::Config;
use ac_limiter::services::{connect, pump_events, run, spawn_ticker, Runner, SystemClock};
use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configuration file used when none is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "config/ac-limiter.toml";

/// Queue depth between the input tasks and the control loop.
const EVENT_QUEUE_DEPTH: usize = 64;

/// How long queued unsubscribes get to reach the broker on exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn init_tracing(debug: bool) {
    let default = if debug {
        "info,ac_limiter=debug,rumqttc=warn"
    } else {
        "info,rumqttc=warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config =
        Config::load(&path).with_context(|| format!("loading configuration from {path}"))?;
    init_tracing(config.debug);

    info!(
        broker = %config.mqtt.host,
        port = config.mqtt.port,
        station = %config.station.topic_prefix,
        switch = %config.switch.topic_prefix,
        "starting ac-limiter"
    );

    // Wall-clock ids keep station command ids unique across restarts
    let first_id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(1);

    let (client, eventloop) = connect(&config.mqtt);
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    let pump = tokio::spawn(pump_events(eventloop, tx.clone()));
    let ticker = spawn_ticker(tx, config.control.tick_ms);

    let runner =
        Runner::new(config, client.clone(), SystemClock::new()).with_first_request_id(first_id);
    let runner = run(runner, rx, shutdown_signal()).await;
    drop(runner);

    ticker.abort();
    client.disconnect().await;
    if tokio::time::timeout(SHUTDOWN_GRACE, pump).await.is_err() {
        info!("broker did not confirm disconnect in time");
    }
    info!("stopped");
    Ok(())
}
