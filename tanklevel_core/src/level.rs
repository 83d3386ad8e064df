//! Geometric conversion from a filtered distance to level, percentage and
//! volume.
//!
//! Strict-range policy: a reading closer than `sensor_offset - tolerance`
//! is reported as an out-of-range error, a reading beyond the tank floor
//! clamps to an empty tank. Percentage and volume are clamped to their
//! physical ranges as a final step regardless of which path produced them.
//! All arithmetic stays unrounded; rounding belongs to payload assembly.

/// Immutable tank geometry, set once at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TankGeometry {
    /// Usable interior height, floor to maximum water level (cm).
    pub height_cm: f32,
    pub capacity_liters: f32,
    /// Sensor face to maximum water level when full (cm).
    pub sensor_offset_cm: f32,
    /// Error band below the offset that still counts as valid (cm).
    pub tolerance_cm: f32,
}

impl TankGeometry {
    /// Closest distance that still counts as a real surface reading.
    #[inline]
    pub fn min_valid_distance_cm(&self) -> f32 {
        self.sensor_offset_cm - self.tolerance_cm
    }

    /// Distance from the sensor to the tank floor.
    #[inline]
    pub fn max_valid_distance_cm(&self) -> f32 {
        self.sensor_offset_cm + self.height_cm
    }
}

/// One derived reading; immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelReading {
    /// Valid reading mapped onto the tank.
    InRange {
        distance_cm: f32,
        water_level_cm: f32,
        /// Fill level, clamped to [0, 100].
        percentage: f32,
        /// Clamped to [0, capacity].
        volume_liters: f32,
    },
    /// Closer than the geometry allows; a sensor or installation problem,
    /// not a full tank.
    TooClose { distance_cm: f32 },
}

impl LevelReading {
    pub fn distance_cm(&self) -> f32 {
        match *self {
            Self::InRange { distance_cm, .. } | Self::TooClose { distance_cm } => distance_cm,
        }
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::TooClose { .. })
    }
}

/// Pure conversion; no side effects, no hidden state. Calling twice with the
/// same inputs yields bit-identical output.
pub fn compute_level(distance_cm: f32, geo: &TankGeometry) -> LevelReading {
    let min_valid = geo.min_valid_distance_cm();
    let max_valid = geo.max_valid_distance_cm();

    if distance_cm < min_valid {
        return LevelReading::TooClose { distance_cm };
    }

    // Beyond the floor reads as an empty tank, not an error.
    let working = distance_cm.min(max_valid);
    let water_level_cm = max_valid - working;
    let percentage = water_level_cm / geo.height_cm * 100.0;
    let volume_liters = percentage / 100.0 * geo.capacity_liters;

    LevelReading::InRange {
        distance_cm,
        water_level_cm,
        percentage: percentage.clamp(0.0, 100.0),
        volume_liters: volume_liters.clamp(0.0, geo.capacity_liters),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn geometry(tolerance_cm: f32) -> TankGeometry {
        TankGeometry {
            height_cm: 100.0,
            capacity_liters: 1000.0,
            sensor_offset_cm: 5.0,
            tolerance_cm,
        }
    }

    #[rstest]
    #[case::mid_tank(50.0, 55.0, 550.0)]
    #[case::full(5.0, 100.0, 1000.0)]
    #[case::at_the_floor(105.0, 0.0, 0.0)]
    #[case::beyond_the_floor_clamps_to_empty(200.0, 0.0, 0.0)]
    fn level_scenarios(#[case] distance_cm: f32, #[case] pct: f32, #[case] vol: f32) {
        let r = compute_level(distance_cm, &geometry(0.0));
        match r {
            LevelReading::InRange {
                percentage,
                volume_liters,
                ..
            } => {
                assert_eq!(percentage, pct);
                assert_eq!(volume_liters, vol);
            }
            other => panic!("unexpected reading: {other:?}"),
        }
    }

    #[test]
    fn mid_tank_water_level() {
        let r = compute_level(50.0, &geometry(0.0));
        match r {
            LevelReading::InRange { water_level_cm, .. } => assert_eq!(water_level_cm, 55.0),
            other => panic!("unexpected reading: {other:?}"),
        }
    }

    #[test]
    fn below_minimum_distance_is_an_error() {
        // min valid = 5 - 2 = 3; a 2 cm reading is out of range.
        let r = compute_level(2.0, &geometry(2.0));
        assert_eq!(r, LevelReading::TooClose { distance_cm: 2.0 });
        assert!(r.is_out_of_range());
    }

    #[test]
    fn inside_tolerance_band_clamps_to_full() {
        // Between min valid (3) and the offset (5): level exceeds the tank
        // height, so the defensive clamps cap percentage and volume.
        let r = compute_level(4.0, &geometry(2.0));
        match r {
            LevelReading::InRange {
                percentage,
                volume_liters,
                ..
            } => {
                assert_eq!(percentage, 100.0);
                assert_eq!(volume_liters, 1000.0);
            }
            other => panic!("unexpected reading: {other:?}"),
        }
    }

    #[test]
    fn idempotent_for_identical_inputs() {
        let geo = geometry(2.0);
        for d in [-5.0, 2.9, 3.0, 50.0, 104.99, 105.0, 400.0] {
            let a = compute_level(d, &geo);
            let b = compute_level(d, &geo);
            assert_eq!(a, b, "distance {d}");
        }
    }
}
