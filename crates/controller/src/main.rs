use std::env;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::info;
use tracing_subscriber::EnvFilter;

use irrigation_controller::config;
use irrigation_controller::control::{ControlLoop, LoopSettings};
use irrigation_controller::display::LogDisplay;
use irrigation_controller::mqtt;
use irrigation_controller::relay::PumpRelay;
use irrigation_controller::remote;
use irrigation_controller::sensor::SensorPort;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "controller.toml".to_string());
    let cfg = config::load(&config_path)?;
    let settings = LoopSettings::from_config(&cfg)?;

    // ── Hardware ────────────────────────────────────────────────────
    let pump = PumpRelay::new(cfg.relay.gpio_pin, cfg.relay.active_low)?;
    let sensors = sensors(&cfg, &settings)?;

    // ── MQTT ────────────────────────────────────────────────────────
    let (commands, inbox) = remote::mailbox();
    let (telemetry, _session) = mqtt::spawn(&cfg.mqtt, commands);

    let mut control = ControlLoop::new(settings, sensors, pump, LogDisplay, telemetry, inbox);

    info!(
        threshold = %settings.default_threshold,
        period_ms = settings.period.as_millis() as u64,
        "controller running"
    );

    let mut ticker = interval(Duration::from_millis(cfg.control.scheduler_tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                control.tick(Instant::now());
            }
            res = &mut shutdown => {
                if let Err(e) = res {
                    tracing::error!("signal handler failed: {e}");
                }
                info!("shutdown requested");
                break;
            }
        }
    }

    control.shutdown();
    Ok(())
}

#[cfg(feature = "adc")]
fn sensors(cfg: &config::Config, settings: &LoopSettings) -> Result<impl SensorPort> {
    irrigation_controller::adc::BoardSensors::new(&cfg.adc, settings.soil, settings.gate)
}

#[cfg(not(feature = "adc"))]
fn sensors(_cfg: &config::Config, settings: &LoopSettings) -> Result<impl SensorPort> {
    use irrigation_controller::sim::{Scenario, SimSensors};

    let scenario = Scenario::from_str_lossy(&env::var("SIM_SCENARIO").unwrap_or_default());
    Ok(SimSensors::new(scenario, settings.soil, settings.gate))
}
