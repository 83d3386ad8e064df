#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the tank telemetry node.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Sections with sensible firmware defaults (`sampling`, `flow`, `link`,
//!   `logging`) may be omitted entirely; `network`, `broker`, `pins` and
//!   `tank` must be present because they are installation-specific.
use serde::Deserialize;

/// Wireless credentials handed to the transport capability.
#[derive(Debug, Deserialize, Clone)]
pub struct Network {
    pub ssid: String,
    pub password: String,
}

/// Broker endpoint and pub/sub identity.
#[derive(Debug, Deserialize, Clone)]
pub struct Broker {
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Telemetry topic; liveness announcements go to `<topic>/status`.
    #[serde(default = "default_topic")]
    pub topic: String,
    pub client_id: String,
}

fn default_broker_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "tank/level".to_owned()
}

/// BCM pin assignments; only consulted by the hardware backend.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Pins {
    pub trigger: u8,
    pub echo: u8,
    /// Flow sensor input; omit to build the node without flow integration.
    pub flow_pulse: Option<u8>,
}

/// Tank geometry, measured on the installed tank.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Tank {
    /// Usable interior height, floor to maximum water level (cm).
    pub height_cm: f32,
    pub capacity_liters: f32,
    /// Sensor face to maximum water level when full (cm).
    pub sensor_offset_cm: f32,
    /// Error band below the offset that still counts as a valid reading (cm).
    #[serde(default = "default_tolerance_cm")]
    pub tolerance_cm: f32,
}

fn default_tolerance_cm() -> f32 {
    2.0
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Sampling {
    /// Raw ranging attempts per read cycle.
    pub samples: usize,
    /// Pause between consecutive ranging attempts (ms).
    pub sample_delay_ms: u64,
    /// Interval between read-and-publish cycles (ms).
    pub read_interval_ms: u64,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            samples: 5,
            sample_delay_ms: 50,
            read_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Flow {
    /// Pulses per second per liter/minute (sensor datasheet constant).
    pub calibration_factor: f32,
    /// Integration window length (ms).
    pub window_ms: u64,
}

impl Default for Flow {
    fn default() -> Self {
        Self {
            calibration_factor: 7.5,
            window_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Link {
    /// Max wait for transport association at startup and on reconnect (ms).
    pub link_timeout_ms: u64,
    /// Pause before a session reconnect attempt is considered again (ms).
    pub reconnect_delay_ms: u64,
    /// Cooldown before exiting for a process-supervisor restart (ms).
    pub restart_cooldown_ms: u64,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            link_timeout_ms: 20_000,
            reconnect_delay_ms: 5_000,
            restart_cooldown_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub network: Network,
    pub broker: Broker,
    pub pins: Pins,
    pub tank: Tank,
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub flow: Flow,
    #[serde(default)]
    pub link: Link,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Network / broker identity
        if self.network.ssid.is_empty() {
            eyre::bail!("network.ssid must not be empty");
        }
        if self.broker.host.is_empty() {
            eyre::bail!("broker.host must not be empty");
        }
        if self.broker.port == 0 {
            eyre::bail!("broker.port must be > 0");
        }
        if self.broker.topic.is_empty() {
            eyre::bail!("broker.topic must not be empty");
        }
        if self.broker.client_id.is_empty() {
            eyre::bail!("broker.client_id must not be empty");
        }

        // Tank geometry
        if !self.tank.height_cm.is_finite() || self.tank.height_cm <= 0.0 {
            eyre::bail!("tank.height_cm must be > 0");
        }
        if !self.tank.capacity_liters.is_finite() || self.tank.capacity_liters <= 0.0 {
            eyre::bail!("tank.capacity_liters must be > 0");
        }
        if !self.tank.sensor_offset_cm.is_finite() || self.tank.sensor_offset_cm < 0.0 {
            eyre::bail!("tank.sensor_offset_cm must be >= 0");
        }
        if !self.tank.tolerance_cm.is_finite() || self.tank.tolerance_cm < 0.0 {
            eyre::bail!("tank.tolerance_cm must be >= 0");
        }
        if self.tank.tolerance_cm > self.tank.sensor_offset_cm {
            eyre::bail!("tank.tolerance_cm must not exceed tank.sensor_offset_cm");
        }

        // Sampling
        if self.sampling.samples == 0 {
            eyre::bail!("sampling.samples must be >= 1");
        }
        if self.sampling.read_interval_ms == 0 {
            eyre::bail!("sampling.read_interval_ms must be >= 1");
        }

        // Flow
        if !self.flow.calibration_factor.is_finite() || self.flow.calibration_factor <= 0.0 {
            eyre::bail!("flow.calibration_factor must be > 0");
        }
        if self.flow.window_ms == 0 {
            eyre::bail!("flow.window_ms must be >= 1");
        }
        if self.flow.window_ms > 60_000 {
            eyre::bail!("flow.window_ms is unreasonably large (>60s)");
        }

        // Link
        if self.link.link_timeout_ms == 0 {
            eyre::bail!("link.link_timeout_ms must be >= 1");
        }
        if self.link.restart_cooldown_ms == 0 {
            eyre::bail!("link.restart_cooldown_ms must be >= 1");
        }

        Ok(())
    }
}
