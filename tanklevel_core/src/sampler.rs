//! Noise-robust distance sampling.
//!
//! One `sample()` call takes a batch of raw ranging attempts, discards
//! timeouts, and reduces the survivors to a single estimate. With three or
//! more valid readings the minimum and maximum are dropped before averaging,
//! which keeps one-off spurious echoes (acoustic reflections) out of the
//! result; smaller batches are averaged as-is.

use crate::error::Result;
use eyre::WrapErr;
use std::sync::Arc;
use std::time::Duration;
use tanklevel_traits::{Clock, Ranger};

/// Speed of sound at ambient temperature, cm per microsecond.
pub const SPEED_OF_SOUND_CM_PER_US: f32 = 0.0343;

/// Echo ceiling; ~500 cm one-way. Longer echoes are treated as timeouts.
pub const ECHO_TIMEOUT_US: u32 = 30_000;

#[derive(Debug, Clone, Copy)]
pub struct SamplerCfg {
    /// Raw ranging attempts per batch.
    pub samples: usize,
    /// Pause between consecutive attempts (ms).
    pub sample_delay_ms: u64,
}

impl Default for SamplerCfg {
    fn default() -> Self {
        Self {
            samples: 5,
            sample_delay_ms: 50,
        }
    }
}

pub struct DistanceSampler<R: Ranger> {
    ranger: R,
    cfg: SamplerCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<R: Ranger> DistanceSampler<R> {
    pub fn new(ranger: R, cfg: SamplerCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { ranger, cfg, clock }
    }

    /// Take one filtered distance in centimeters.
    ///
    /// `Ok(None)` means the whole batch was invalid: a hardware fault, not a
    /// tank-empty condition. A ranging `Err` (GPIO failure) propagates.
    pub fn sample(&mut self) -> Result<Option<f32>> {
        let mut valid: Vec<f32> = Vec::with_capacity(self.cfg.samples);
        for i in 0..self.cfg.samples {
            let echo_us = self
                .ranger
                .trigger_and_measure()
                .map_err(|e| eyre::Report::new(crate::map_hw_error_dyn(&*e)))
                .wrap_err("ranging attempt")?;
            match echo_to_cm(echo_us) {
                Some(cm) => valid.push(cm),
                None => tracing::trace!(echo_us, "discarding invalid echo"),
            }
            if i + 1 < self.cfg.samples {
                self.clock
                    .sleep(Duration::from_millis(self.cfg.sample_delay_ms));
            }
        }
        Ok(trimmed_mean(&mut valid))
    }
}

/// Convert one echo duration into a distance.
///
/// A zero duration means the echo timed out; durations past the ceiling are
/// treated the same way. The measured time covers the round trip, hence the
/// halving.
#[inline]
pub fn echo_to_cm(echo_us: u32) -> Option<f32> {
    if echo_us == 0 || echo_us > ECHO_TIMEOUT_US {
        return None;
    }
    Some(echo_us as f32 * SPEED_OF_SOUND_CM_PER_US / 2.0)
}

/// Mean after outlier trimming: for three or more readings the sorted
/// minimum and maximum are excluded; otherwise all readings count.
fn trimmed_mean(readings: &mut [f32]) -> Option<f32> {
    if readings.is_empty() {
        return None;
    }
    readings.sort_unstable_by(f32::total_cmp);
    let kept = if readings.len() >= 3 {
        &readings[1..readings.len() - 1]
    } else {
        &readings[..]
    };
    let sum: f32 = kept.iter().sum();
    Some(sum / kept.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tanklevel_traits::clock::MonotonicClock;

    struct SeqRanger {
        echoes: Vec<u32>,
        idx: usize,
    }

    impl SeqRanger {
        fn new(echoes: impl Into<Vec<u32>>) -> Self {
            Self {
                echoes: echoes.into(),
                idx: 0,
            }
        }
    }

    impl Ranger for SeqRanger {
        fn trigger_and_measure(&mut self) -> core::result::Result<u32, tanklevel_traits::BoxError> {
            let v = self.echoes.get(self.idx).copied().unwrap_or(0);
            self.idx += 1;
            Ok(v)
        }
    }

    fn sampler(echoes: Vec<u32>) -> DistanceSampler<SeqRanger> {
        let samples = echoes.len();
        DistanceSampler::new(
            SeqRanger::new(echoes),
            SamplerCfg {
                samples,
                sample_delay_ms: 0,
            },
            Arc::new(MonotonicClock::new()),
        )
    }

    #[test]
    fn trims_min_and_max_with_three_or_more() {
        let mut batch = [12.0, 13.0, 50.0, 14.0, 12.0];
        assert_eq!(trimmed_mean(&mut batch), Some(13.0));
    }

    #[test]
    fn small_batches_average_unmodified() {
        let mut two = [10.0, 20.0];
        assert_eq!(trimmed_mean(&mut two), Some(15.0));
        let mut one = [42.0];
        assert_eq!(trimmed_mean(&mut one), Some(42.0));
        let mut none: [f32; 0] = [];
        assert_eq!(trimmed_mean(&mut none), None);
    }

    #[test]
    fn zero_duration_is_invalid() {
        assert_eq!(echo_to_cm(0), None);
    }

    #[test]
    fn overlong_echo_is_invalid() {
        assert_eq!(echo_to_cm(ECHO_TIMEOUT_US + 1), None);
        assert!(echo_to_cm(ECHO_TIMEOUT_US).is_some());
    }

    #[test]
    fn conversion_halves_the_round_trip() {
        let cm = echo_to_cm(2_915).expect("valid echo");
        assert!((cm - 49.992).abs() < 0.01, "got {cm}");
    }

    #[test]
    fn all_invalid_batch_yields_none() {
        let mut s = sampler(vec![0, 0, 40_000, 0, 0]);
        assert_eq!(s.sample().expect("no hardware error"), None);
    }

    #[test]
    fn invalid_readings_do_not_skew_the_mean() {
        // Two timeouts plus two valid readings: plain average of the valid pair.
        let mut s = sampler(vec![0, 1_000, 0, 3_000]);
        let got = s.sample().expect("ok").expect("valid batch");
        let want = (echo_to_cm(1_000).unwrap() + echo_to_cm(3_000).unwrap()) / 2.0;
        assert_eq!(got, want);
    }
}
