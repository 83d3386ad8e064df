//! From impls mapping the TOML config schema onto core types.

use crate::flow::FlowCfg;
use crate::level::TankGeometry;
use crate::link::LinkCfg;
use crate::sampler::SamplerCfg;

impl From<&tanklevel_config::Tank> for TankGeometry {
    fn from(t: &tanklevel_config::Tank) -> Self {
        Self {
            height_cm: t.height_cm,
            capacity_liters: t.capacity_liters,
            sensor_offset_cm: t.sensor_offset_cm,
            tolerance_cm: t.tolerance_cm,
        }
    }
}

impl From<&tanklevel_config::Sampling> for SamplerCfg {
    fn from(s: &tanklevel_config::Sampling) -> Self {
        Self {
            samples: s.samples,
            sample_delay_ms: s.sample_delay_ms,
        }
    }
}

impl From<&tanklevel_config::Flow> for FlowCfg {
    fn from(f: &tanklevel_config::Flow) -> Self {
        Self {
            calibration_factor: f.calibration_factor,
            window_ms: f.window_ms,
        }
    }
}

impl From<&tanklevel_config::Config> for LinkCfg {
    fn from(cfg: &tanklevel_config::Config) -> Self {
        Self {
            link_timeout_ms: cfg.link.link_timeout_ms,
            reconnect_delay_ms: cfg.link.reconnect_delay_ms,
            client_id: cfg.broker.client_id.clone(),
            username: cfg.broker.username.clone(),
            password: cfg.broker.password.clone(),
            topic: cfg.broker.topic.clone(),
        }
    }
}
