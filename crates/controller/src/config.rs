//! TOML configuration: loading, environment overrides and validation.
//!
//! Every field has a default, so the controller boots without a config file.
//! Values are read once at startup; nothing here changes afterwards.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub calibration: CalibrationConfig,
    pub reservoir: ReservoirConfig,
    pub control: ControlConfig,
    pub mqtt: MqttConfig,
    pub relay: RelayConfig,
    pub adc: AdcConfig,
}

/// Soil probe endpoints in raw ADC counts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationConfig {
    pub soil_raw_dry: i32,
    pub soil_raw_wet: i32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            soil_raw_dry: 4095,
            soil_raw_wet: 1200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReservoirConfig {
    /// Raw reading above which the reservoir counts as having water.
    pub threshold_raw: i32,
    /// Set for sensors that pull the line high when the tank is empty.
    pub invert: bool,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self {
            threshold_raw: 1000,
            invert: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    /// Boot-time moisture threshold, percent.
    pub default_threshold_pct: u8,
    pub sample_period_ms: u64,
    pub pump_min_on_ms: u64,
    /// How often the scheduler polls the control loop.
    pub scheduler_tick_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            default_threshold_pct: 30,
            sample_period_ms: 2000,
            pump_min_on_ms: 500,
            scheduler_tick_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub telemetry_topic: String,
    pub command_topic: String,
    pub keep_alive_s: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id: "irrigation-controller".to_string(),
            username: String::new(),
            password: String::new(),
            telemetry_topic: "smartgarden/data".to_string(),
            command_topic: "smartgarden/control".to_string(),
            keep_alive_s: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub gpio_pin: u8,
    pub active_low: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            gpio_pin: 25,
            active_low: false,
        }
    }
}

/// ADS1115 front-end and SHT3x environmental sensor on the I2C bus.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdcConfig {
    pub i2c_addr: u16,
    pub soil_channel: usize,
    pub water_channel: usize,
    pub env_addr: u16,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            i2c_addr: 0x48,
            soil_channel: 0,
            water_channel: 1,
            env_addr: 0x44,
        }
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM.
const VALID_GPIO_PINS: std::ops::RangeInclusive<u8> = 2..=27;

/// Maximum single-ended reading from the ADS1115 (15-bit unsigned).
pub const ADC_MAX: i32 = 32767;

/// Highest ADS1115 single-ended channel.
const MAX_ADC_CHANNEL: usize = 3;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate every section.  Returns `Ok(())` or an error listing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_calibration(&mut errors);
        self.validate_control(&mut errors);
        self.validate_mqtt(&mut errors);
        self.validate_hardware(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_calibration(&self, errors: &mut Vec<String>) {
        let c = &self.calibration;
        for (name, value) in [("soil_raw_dry", c.soil_raw_dry), ("soil_raw_wet", c.soil_raw_wet)] {
            if !(0..=ADC_MAX).contains(&value) {
                errors.push(format!(
                    "calibration: {name} {value} out of ADC range [0, {ADC_MAX}]"
                ));
            }
        }
        if c.soil_raw_dry == c.soil_raw_wet {
            errors.push(format!(
                "calibration: soil_raw_dry and soil_raw_wet are both {}; calibration range is zero",
                c.soil_raw_dry
            ));
        }

        let r = &self.reservoir;
        if !(0..=ADC_MAX).contains(&r.threshold_raw) {
            errors.push(format!(
                "reservoir: threshold_raw {} out of ADC range [0, {ADC_MAX}]",
                r.threshold_raw
            ));
        }
    }

    fn validate_control(&self, errors: &mut Vec<String>) {
        let c = &self.control;

        if c.default_threshold_pct == 0 || c.default_threshold_pct >= 100 {
            errors.push(format!(
                "control: default_threshold_pct {} must be between 1 and 99",
                c.default_threshold_pct
            ));
        }
        if c.sample_period_ms == 0 {
            errors.push("control: sample_period_ms must be positive".to_string());
        }
        if c.scheduler_tick_ms == 0 {
            errors.push("control: scheduler_tick_ms must be positive".to_string());
        } else if c.sample_period_ms > 0 && c.scheduler_tick_ms >= c.sample_period_ms {
            errors.push(format!(
                "control: scheduler_tick_ms ({}) must be shorter than sample_period_ms ({})",
                c.scheduler_tick_ms, c.sample_period_ms
            ));
        }
        if c.sample_period_ms > 0 && c.pump_min_on_ms >= c.sample_period_ms {
            errors.push(format!(
                "control: pump_min_on_ms ({}) must be shorter than sample_period_ms ({})",
                c.pump_min_on_ms, c.sample_period_ms
            ));
        }
    }

    fn validate_mqtt(&self, errors: &mut Vec<String>) {
        let m = &self.mqtt;

        if m.host.trim().is_empty() {
            errors.push("mqtt: host is empty".to_string());
        }
        if m.port == 0 {
            errors.push("mqtt: port must be non-zero".to_string());
        }
        if m.client_id.trim().is_empty() {
            errors.push("mqtt: client_id is empty".to_string());
        }
        for (name, topic) in [
            ("telemetry_topic", &m.telemetry_topic),
            ("command_topic", &m.command_topic),
        ] {
            if topic.trim().is_empty() {
                errors.push(format!("mqtt: {name} is empty"));
            } else if topic.contains(['+', '#']) {
                errors.push(format!("mqtt: {name} '{topic}' must not contain wildcards"));
            }
        }
        if !m.telemetry_topic.is_empty() && m.telemetry_topic == m.command_topic {
            errors.push("mqtt: telemetry_topic and command_topic must differ".to_string());
        }
        if m.keep_alive_s < 5 {
            errors.push(format!(
                "mqtt: keep_alive_s must be at least 5, got {}",
                m.keep_alive_s
            ));
        }
    }

    fn validate_hardware(&self, errors: &mut Vec<String>) {
        if !VALID_GPIO_PINS.contains(&self.relay.gpio_pin) {
            errors.push(format!(
                "relay: gpio_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.relay.gpio_pin
            ));
        }

        let a = &self.adc;
        for (name, ch) in [("soil_channel", a.soil_channel), ("water_channel", a.water_channel)] {
            if ch > MAX_ADC_CHANNEL {
                errors.push(format!(
                    "adc: {name} {ch} out of range (0-{MAX_ADC_CHANNEL})"
                ));
            }
        }
        if a.soil_channel == a.water_channel {
            errors.push(format!(
                "adc: soil_channel and water_channel are both {}",
                a.soil_channel
            ));
        }
        if a.i2c_addr == a.env_addr {
            errors.push(format!(
                "adc: i2c_addr and env_addr are both 0x{:02x}",
                a.i2c_addr
            ));
        }
    }

    /// Apply `MQTT_*` overrides.  `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            self.mqtt.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid MQTT_PORT: {port:?}"))?;
        }
        if let Some(user) = lookup("MQTT_USERNAME") {
            self.mqtt.username = user;
        }
        if let Some(pass) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = pass;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse a TOML document (no env overrides, no validation).
pub fn parse(contents: &str) -> Result<Config> {
    toml::from_str(contents).context("failed to parse config")
}

/// Read `path` if it exists (built-in defaults otherwise), apply environment
/// overrides and validate.
pub fn load(path: &str) -> Result<Config> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => parse(&contents).with_context(|| format!("in {path}"))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(path, "no config file; using built-in defaults");
            Config::default()
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read config: {path}")),
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;

    tracing::info!(
        period_ms = config.control.sample_period_ms,
        default_threshold = config.control.default_threshold_pct,
        broker = %format_args!("{}:{}", config.mqtt.host, config.mqtt.port),
        "config loaded"
    );
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn defaults_match_reference_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.calibration.soil_raw_dry, 4095);
        assert_eq!(cfg.calibration.soil_raw_wet, 1200);
        assert_eq!(cfg.reservoir.threshold_raw, 1000);
        assert!(!cfg.reservoir.invert);
        assert_eq!(cfg.control.default_threshold_pct, 30);
        assert_eq!(cfg.control.sample_period_ms, 2000);
        assert_eq!(cfg.control.pump_min_on_ms, 500);
        cfg.validate().unwrap();
    }

    #[test]
    fn parse_empty_config_gives_defaults() {
        assert_eq!(parse("").unwrap(), Config::default());
    }

    #[test]
    fn parse_partial_config_keeps_other_defaults() {
        let cfg = parse(
            r#"
[reservoir]
invert = true

[control]
default_threshold_pct = 45
"#,
        )
        .unwrap();
        assert!(cfg.reservoir.invert);
        assert_eq!(cfg.reservoir.threshold_raw, 1000);
        assert_eq!(cfg.control.default_threshold_pct, 45);
        assert_eq!(cfg.control.sample_period_ms, 2000);
        assert_eq!(cfg.mqtt, MqttConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let cfg = parse(
            r#"
[calibration]
soil_raw_dry = 26000
soil_raw_wet = 12000

[reservoir]
threshold_raw = 9000
invert = false

[control]
default_threshold_pct = 35
sample_period_ms = 5000
pump_min_on_ms = 1000
scheduler_tick_ms = 100

[mqtt]
host = "broker.local"
port = 8883
client_id = "bed-1"
username = "garden"
password = "secret"
telemetry_topic = "garden/bed-1/data"
command_topic = "garden/bed-1/threshold"
keep_alive_s = 60

[relay]
gpio_pin = 17
active_low = true

[adc]
i2c_addr = 0x49
soil_channel = 2
water_channel = 3
env_addr = 0x45
"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.calibration.soil_raw_dry, 26000);
        assert_eq!(cfg.mqtt.host, "broker.local");
        assert_eq!(cfg.relay.gpio_pin, 17);
        assert!(cfg.relay.active_low);
        assert_eq!(cfg.adc.i2c_addr, 0x49);
    }

    #[test]
    fn parse_rejects_unknown_keys() {
        assert!(parse("[control]\nperiod = 10\n").is_err());
    }

    #[test]
    fn parse_rejects_wrong_types() {
        assert!(parse("[control]\ndefault_threshold_pct = \"thirty\"\n").is_err());
        assert!(parse("[control]\ndefault_threshold_pct = 300\n").is_err());
    }

    // -- Validation ---------------------------------------------------------

    #[test]
    fn zero_default_threshold_rejected() {
        let mut cfg = Config::default();
        cfg.control.default_threshold_pct = 0;
        assert_validation_err(&cfg, "default_threshold_pct 0");
    }

    #[test]
    fn hundred_default_threshold_rejected() {
        let mut cfg = Config::default();
        cfg.control.default_threshold_pct = 100;
        assert_validation_err(&cfg, "default_threshold_pct 100");
    }

    #[test]
    fn equal_calibration_endpoints_rejected() {
        let mut cfg = Config::default();
        cfg.calibration.soil_raw_wet = cfg.calibration.soil_raw_dry;
        assert_validation_err(&cfg, "calibration range is zero");
    }

    #[test]
    fn reversed_calibration_endpoints_accepted() {
        let mut cfg = Config::default();
        cfg.calibration.soil_raw_dry = 1200;
        cfg.calibration.soil_raw_wet = 4095;
        cfg.validate().unwrap();
    }

    #[test]
    fn calibration_outside_adc_range_rejected() {
        let mut cfg = Config::default();
        cfg.calibration.soil_raw_dry = 40000;
        assert_validation_err(&cfg, "soil_raw_dry 40000 out of ADC range");
        cfg.calibration.soil_raw_dry = -1;
        assert_validation_err(&cfg, "soil_raw_dry -1 out of ADC range");
    }

    #[test]
    fn reservoir_threshold_outside_adc_range_rejected() {
        let mut cfg = Config::default();
        cfg.reservoir.threshold_raw = -10;
        assert_validation_err(&cfg, "threshold_raw -10");
    }

    #[test]
    fn zero_period_rejected() {
        let mut cfg = Config::default();
        cfg.control.sample_period_ms = 0;
        assert_validation_err(&cfg, "sample_period_ms must be positive");
    }

    #[test]
    fn min_on_not_shorter_than_period_rejected() {
        let mut cfg = Config::default();
        cfg.control.pump_min_on_ms = 2000;
        assert_validation_err(&cfg, "pump_min_on_ms (2000) must be shorter");
    }

    #[test]
    fn zero_min_on_accepted() {
        let mut cfg = Config::default();
        cfg.control.pump_min_on_ms = 0;
        cfg.validate().unwrap();
    }

    #[test]
    fn scheduler_tick_not_shorter_than_period_rejected() {
        let mut cfg = Config::default();
        cfg.control.scheduler_tick_ms = 2000;
        assert_validation_err(&cfg, "scheduler_tick_ms (2000) must be shorter");
    }

    #[test]
    fn empty_topic_rejected() {
        let mut cfg = Config::default();
        cfg.mqtt.command_topic = " ".into();
        assert_validation_err(&cfg, "command_topic is empty");
    }

    #[test]
    fn wildcard_topic_rejected() {
        let mut cfg = Config::default();
        cfg.mqtt.telemetry_topic = "garden/+/data".into();
        assert_validation_err(&cfg, "must not contain wildcards");
    }

    #[test]
    fn identical_topics_rejected() {
        let mut cfg = Config::default();
        cfg.mqtt.command_topic = cfg.mqtt.telemetry_topic.clone();
        assert_validation_err(&cfg, "must differ");
    }

    #[test]
    fn reserved_gpio_rejected() {
        let mut cfg = Config::default();
        cfg.relay.gpio_pin = 1;
        assert_validation_err(&cfg, "gpio_pin 1 is not a valid BCM GPIO pin");
    }

    #[test]
    fn adc_channel_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.adc.water_channel = 4;
        assert_validation_err(&cfg, "water_channel 4 out of range");
    }

    #[test]
    fn shared_adc_channel_rejected() {
        let mut cfg = Config::default();
        cfg.adc.water_channel = cfg.adc.soil_channel;
        assert_validation_err(&cfg, "soil_channel and water_channel are both 0");
    }

    #[test]
    fn multiple_errors_reported_together() {
        let mut cfg = Config::default();
        cfg.control.default_threshold_pct = 0;
        cfg.mqtt.host = String::new();
        cfg.relay.gpio_pin = 40;
        assert_validation_err(&cfg, "3 errors");
    }

    // -- Environment overrides ----------------------------------------------

    #[test]
    fn env_overrides_mqtt_settings() {
        let env: HashMap<&str, &str> = [
            ("MQTT_HOST", "10.0.0.5"),
            ("MQTT_PORT", "1884"),
            ("MQTT_USERNAME", "bed"),
            ("MQTT_PASSWORD", "hunter2"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.mqtt.host, "10.0.0.5");
        assert_eq!(cfg.mqtt.port, 1884);
        assert_eq!(cfg.mqtt.username, "bed");
        assert_eq!(cfg.mqtt.password, "hunter2");
    }

    #[test]
    fn env_override_with_bad_port_fails() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides(|k| (k == "MQTT_PORT").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(format!("{err:#}").contains("invalid MQTT_PORT"));
    }

    #[test]
    fn no_env_leaves_config_untouched() {
        let mut cfg = Config::default();
        cfg.apply_env_overrides(|_| None).unwrap();
        assert_eq!(cfg, Config::default());
    }

    // -- Load -----------------------------------------------------------------

    #[test]
    fn load_missing_file_uses_defaults() {
        let cfg = load("/nonexistent/irrigation-controller.toml").unwrap();
        assert_eq!(cfg.control, ControlConfig::default());
    }
}
