//! Windowed pulse-rate integration for the flow sensor.
//!
//! The pulse source is asynchronous with respect to the scheduler loop, so
//! the counter is only ever touched through the capability's atomic
//! read-and-reset. The integrator itself is driven by caller-supplied
//! milliseconds and acts once per elapsed window.

use crate::error::Result;
use crate::util::MILLIS_PER_SEC;
use eyre::WrapErr;
use tanklevel_traits::PulseCounter;

#[derive(Debug, Clone, Copy)]
pub struct FlowCfg {
    /// Pulses per second per liter/minute (sensor datasheet constant).
    pub calibration_factor: f32,
    /// Integration window length (ms).
    pub window_ms: u64,
}

impl Default for FlowCfg {
    fn default() -> Self {
        Self {
            calibration_factor: 7.5,
            window_ms: 1_000,
        }
    }
}

pub struct FlowIntegrator<P: PulseCounter> {
    counter: P,
    cfg: FlowCfg,
    window_started_ms: u64,
    last_rate_lpm: Option<f32>,
}

impl<P: PulseCounter> FlowIntegrator<P> {
    pub fn new(counter: P, cfg: FlowCfg) -> Self {
        Self {
            counter,
            cfg,
            window_started_ms: 0,
            last_rate_lpm: None,
        }
    }

    /// Reset the window anchor and drop pulses accumulated before start.
    pub fn begin(&mut self, now_ms: u64) -> Result<()> {
        self.window_started_ms = now_ms;
        self.last_rate_lpm = None;
        self.counter
            .read_and_reset()
            .map_err(|e| eyre::Report::new(crate::map_hw_error_dyn(&*e)))
            .wrap_err("drain pulse counter")?;
        Ok(())
    }

    /// Called every scheduler iteration. Integrates once per elapsed window;
    /// between windows the last computed rate is returned unchanged.
    ///
    /// Frequency uses the configured window length, not measured elapsed
    /// time, so a late tick cannot inflate the rate.
    pub fn tick(&mut self, now_ms: u64) -> Result<Option<f32>> {
        if now_ms.saturating_sub(self.window_started_ms) < self.cfg.window_ms {
            return Ok(self.last_rate_lpm);
        }
        self.window_started_ms = now_ms;

        let pulses = self
            .counter
            .read_and_reset()
            .map_err(|e| eyre::Report::new(crate::map_hw_error_dyn(&*e)))
            .wrap_err("read pulse counter")?;

        let window_s = self.cfg.window_ms as f32 / MILLIS_PER_SEC as f32;
        let frequency_hz = pulses as f32 / window_s;
        let rate = frequency_hz / self.cfg.calibration_factor;
        tracing::trace!(pulses, rate_lpm = rate, "flow window integrated");
        self.last_rate_lpm = Some(rate);
        Ok(self.last_rate_lpm)
    }

    /// Most recently computed rate, if any window has elapsed yet.
    pub fn last_rate_lpm(&self) -> Option<f32> {
        self.last_rate_lpm
    }
}
