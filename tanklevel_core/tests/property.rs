use proptest::prelude::*;
use std::sync::Arc;
use tanklevel_core::sampler::{DistanceSampler, ECHO_TIMEOUT_US, SamplerCfg};
use tanklevel_core::{LevelReading, TankGeometry, compute_level};
use tanklevel_traits::clock::MonotonicClock;
use tanklevel_traits::{BoxError, Ranger};

const GEOMETRY: TankGeometry = TankGeometry {
    height_cm: 100.0,
    capacity_liters: 1000.0,
    sensor_offset_cm: 5.0,
    tolerance_cm: 2.0,
};

struct SeqRanger {
    echoes: Vec<u32>,
    idx: usize,
}

impl Ranger for SeqRanger {
    fn trigger_and_measure(&mut self) -> Result<u32, BoxError> {
        let v = self.echoes.get(self.idx).copied().unwrap_or(0);
        self.idx += 1;
        Ok(v)
    }
}

fn sample_batch(echoes: Vec<u32>) -> Option<f32> {
    let samples = echoes.len();
    let mut sampler = DistanceSampler::new(
        SeqRanger { echoes, idx: 0 },
        SamplerCfg {
            samples,
            sample_delay_ms: 0,
        },
        Arc::new(MonotonicClock::new()),
    );
    sampler.sample().expect("no hardware error")
}

fn reading_bits(r: &LevelReading) -> Vec<u32> {
    match *r {
        LevelReading::InRange {
            distance_cm,
            water_level_cm,
            percentage,
            volume_liters,
        } => vec![
            distance_cm.to_bits(),
            water_level_cm.to_bits(),
            percentage.to_bits(),
            volume_liters.to_bits(),
        ],
        LevelReading::TooClose { distance_cm } => vec![u32::MAX, distance_cm.to_bits()],
    }
}

proptest! {
    #[test]
    fn percentage_and_volume_are_always_clamped(d in -1.0e6f32..1.0e6f32) {
        match compute_level(d, &GEOMETRY) {
            LevelReading::InRange { percentage, volume_liters, .. } => {
                prop_assert!((0.0..=100.0).contains(&percentage), "pct {percentage}");
                prop_assert!(
                    (0.0..=GEOMETRY.capacity_liters).contains(&volume_liters),
                    "vol {volume_liters}"
                );
            }
            LevelReading::TooClose { distance_cm } => {
                prop_assert!(distance_cm < GEOMETRY.min_valid_distance_cm());
            }
        }
    }

    #[test]
    fn compute_level_is_bit_identical(d in -1.0e6f32..1.0e6f32) {
        let a = compute_level(d, &GEOMETRY);
        let b = compute_level(d, &GEOMETRY);
        prop_assert_eq!(reading_bits(&a), reading_bits(&b));
    }

    /// Interleaving timeouts into a batch never changes the filtered result.
    #[test]
    fn invalid_readings_never_influence_the_mean(
        valid in prop::collection::vec(100u32..=ECHO_TIMEOUT_US, 1..8),
        invalid_positions in prop::collection::vec(any::<bool>(), 8),
    ) {
        let mut mixed = Vec::new();
        let mut vi = valid.iter();
        for &inject in &invalid_positions {
            if inject {
                mixed.push(0);
            }
            if let Some(&v) = vi.next() {
                mixed.push(v);
            }
        }
        mixed.extend(vi.copied());
        mixed.push(ECHO_TIMEOUT_US + 500);

        prop_assert_eq!(sample_batch(mixed), sample_batch(valid));
    }

    #[test]
    fn all_invalid_batches_are_a_sensor_fault(len in 1usize..10) {
        prop_assert_eq!(sample_batch(vec![0; len]), None);
    }
}
