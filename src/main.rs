//! Bootstrap: configuration, store, engines, GPIO link and its two
//! consumers, signal-driven shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cremer_core::config::{CliArgs, Config};
use cremer_core::events::EventBus;
use cremer_core::gpio::autopause::AutoPauseConfig;
use cremer_core::gpio::{counter_ingest, GpioLink};
use cremer_core::locks::OrderLocks;
use cremer_core::store::Store;
use cremer_core::Engines;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = CliArgs::parse();
    let mut config = Config::from_env_with_override_file(cli.config.as_deref());
    config.apply_cli(&cli);

    info!(database_path = %config.database_path, "cremer-core starting");

    let store = Arc::new(Store::open(&config.database_path).context("opening store")?);
    let bus = Arc::new(EventBus::new());
    let locks = Arc::new(OrderLocks::new());
    let engines = Arc::new(Engines::new(store.clone(), bus.clone(), locks.clone()));

    let shutdown = CancellationToken::new();

    let gpio = GpioLink::spawn(
        config.gpio_host.clone(),
        config.gpio_port,
        Duration::from_secs(config.gpio_heartbeat_timeout_secs),
        Duration::from_secs(config.gpio_watchdog_interval_secs),
        shutdown.clone(),
    );

    counter_ingest::spawn(
        gpio.clone(),
        config.counter_pin,
        store.clone(),
        bus.clone(),
        locks.clone(),
        shutdown.clone(),
    );

    cremer_core::gpio::autopause::spawn(
        gpio.clone(),
        store.clone(),
        engines.pauses.clone(),
        AutoPauseConfig {
            ponderal_pin: config.ponderal_pin,
            etiqueta_pin: config.etiqueta_pin,
            t_open: Duration::from_secs(config.autopause_open_secs),
            t_close: Duration::from_secs(config.autopause_close_secs),
            t_cooldown: Duration::from_secs(config.autopause_cooldown_secs),
            reconcile_interval: Duration::from_secs(config.autopause_reconcile_interval_secs),
            rearm_watchdog_interval: Duration::from_secs(config.autopause_rearm_watchdog_interval_secs),
        },
        shutdown.clone(),
    );

    // Kept alive for the process lifetime; a request-handling surface that
    // would call into `engines.orders`/`.acumula` is out of scope here (see
    // SPEC_FULL.md §1 Non-goals).
    let _engines = engines;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received, stopping tasks");
    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(200)).await;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cremer_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
