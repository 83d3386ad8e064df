//! Small numeric helpers shared across the core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Round to one decimal place. Presentation-time only; never feed the result
/// back into range or clamping decisions.
#[inline]
pub fn round_to_tenth(x: f32) -> f32 {
    (x * 10.0).round() / 10.0
}

/// Round to two decimal places. Presentation-time only.
#[inline]
pub fn round_to_hundredth(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}
