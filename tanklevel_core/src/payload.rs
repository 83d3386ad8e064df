//! Telemetry payload assembly and wire serialization.
//!
//! Two frame shapes share one struct: a normal reading carries volume and
//! percentage (plus flow when a flow sensor is built in), an out-of-range
//! report carries only the distance and the error marker. Rounding happens
//! here and nowhere upstream.

use crate::error::{Result, TankError};
use crate::level::LevelReading;
use crate::link::LinkSupervisor;
use crate::util::{round_to_hundredth, round_to_tenth};
use eyre::WrapErr;
use serde::Serialize;
use tanklevel_traits::NetworkLink;

/// Upper bound for one serialized frame on the wire.
pub const MAX_PAYLOAD_BYTES: usize = 256;

/// Wire vocabulary for out-of-range reports; existing dashboards key on the
/// Spanish value.
pub const ERROR_OUT_OF_RANGE: &str = "fuera_de_rango";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPayload {
    pub distance_cm: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_liters: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f32>,
    #[serde(rename = "flow_L_per_min", skip_serializing_if = "Option::is_none")]
    pub flow_l_per_min: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_quality: Option<i32>,
}

impl TelemetryPayload {
    /// Build the frame for one reading.
    ///
    /// Rounding: distance 0.1 cm, percentage 0.1 %, volume whole liters,
    /// flow 0.01 L/min.
    pub fn from_reading(
        reading: &LevelReading,
        flow_lpm: Option<f32>,
        link_quality: Option<i32>,
    ) -> Self {
        match *reading {
            LevelReading::InRange {
                distance_cm,
                percentage,
                volume_liters,
                ..
            } => Self {
                distance_cm: round_to_tenth(distance_cm),
                volume_liters: Some(volume_liters.round()),
                percentage: Some(round_to_tenth(percentage)),
                flow_l_per_min: flow_lpm.map(round_to_hundredth),
                error: None,
                error_msg: None,
                link_quality,
            },
            LevelReading::TooClose { distance_cm } => Self {
                distance_cm: round_to_tenth(distance_cm),
                volume_liters: None,
                percentage: None,
                flow_l_per_min: None,
                error: Some(true),
                error_msg: Some(ERROR_OUT_OF_RANGE),
                link_quality,
            },
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self).wrap_err("serialize payload")?;
        if bytes.len() > MAX_PAYLOAD_BYTES {
            return Err(eyre::Report::new(TankError::PayloadTooLarge(bytes.len())));
        }
        Ok(bytes)
    }
}

/// Serialize one reading and hand it to the link. Fire-and-forget: a refused
/// publish is reported to the caller and retried on the next cycle only.
pub fn publish_reading<N: NetworkLink>(
    supervisor: &mut LinkSupervisor<N>,
    reading: &LevelReading,
    flow_lpm: Option<f32>,
) -> Result<bool> {
    let payload =
        TelemetryPayload::from_reading(reading, flow_lpm, Some(supervisor.link_quality()));
    let bytes = payload.to_json()?;
    Ok(supervisor.publish(&bytes, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn keys(v: &Value) -> Vec<String> {
        v.as_object()
            .expect("object payload")
            .keys()
            .cloned()
            .collect()
    }

    fn in_range() -> LevelReading {
        LevelReading::InRange {
            distance_cm: 49.992_25,
            water_level_cm: 55.007_75,
            percentage: 55.007_75,
            volume_liters: 550.077_5,
        }
    }

    #[test]
    fn normal_frame_shape_and_rounding() {
        let p = TelemetryPayload::from_reading(&in_range(), Some(10.004), Some(-61));
        let v: Value = serde_json::from_slice(&p.to_json().unwrap()).unwrap();

        assert_eq!(v["distance_cm"], 50.0);
        assert_eq!(v["volume_liters"], 550.0);
        assert_eq!(v["percentage"], 55.0);
        assert_eq!(v["flow_L_per_min"], 10.0);
        assert_eq!(v["link_quality"], -61);
        assert!(v.get("error").is_none());
        assert!(v.get("error_msg").is_none());
    }

    #[test]
    fn flow_field_absent_without_a_flow_sensor() {
        let p = TelemetryPayload::from_reading(&in_range(), None, Some(-61));
        let v: Value = serde_json::from_slice(&p.to_json().unwrap()).unwrap();
        assert!(v.get("flow_L_per_min").is_none());
    }

    #[test]
    fn error_frame_omits_level_fields() {
        let reading = LevelReading::TooClose { distance_cm: 2.04 };
        let p = TelemetryPayload::from_reading(&reading, Some(3.0), Some(-70));
        let v: Value = serde_json::from_slice(&p.to_json().unwrap()).unwrap();

        assert_eq!(v["distance_cm"], 2.0);
        assert_eq!(v["error"], true);
        assert_eq!(v["error_msg"], ERROR_OUT_OF_RANGE);
        assert_eq!(v["link_quality"], -70);
        let mut k = keys(&v);
        k.sort();
        assert_eq!(k, ["distance_cm", "error", "error_msg", "link_quality"]);
    }

    #[test]
    fn frames_stay_within_the_wire_limit() {
        let p = TelemetryPayload::from_reading(&in_range(), Some(123.456), Some(-127));
        let bytes = p.to_json().unwrap();
        assert!(bytes.len() <= MAX_PAYLOAD_BYTES, "len {}", bytes.len());
    }
}
