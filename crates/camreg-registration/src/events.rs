//! Registration event taxonomy.
//!
//! Every event is published under the `registration.` namespace with one of
//! the payload structs below. Subscribers can decode a payload with
//! [`Event::payload_as`](camreg_core::Event::payload_as).

use serde::{Deserialize, Serialize};

use crate::point::{vec3_array, CalibrationPoint};

/// A calibration point was appended
pub const POINT_ADDED: &str = "registration.point_added";
/// A calibration point was removed
pub const POINT_REMOVED: &str = "registration.point_removed";
/// A transform was fitted
pub const COMPUTED: &str = "registration.computed";
/// A point addition triggered a successful fit
pub const AUTO_COMPUTED: &str = "registration.auto_computed";
/// All calibration points were cleared
pub const CLEARED: &str = "registration.cleared";
/// The manager returned to the empty state
pub const RESET: &str = "registration.reset";
/// One camera vector was mapped to machine coordinates
pub const POINT_TRANSFORMED: &str = "registration.point_transformed";
/// A batch of camera vectors was mapped
pub const BATCH_TRANSFORMED: &str = "registration.batch_transformed";
/// The registration error is within tolerance
pub const VALIDATION_PASSED: &str = "registration.validation_passed";
/// Validation failed; the payload carries the reason
pub const VALIDATION_FAILED: &str = "registration.validation_failed";
/// The registration was written to an archive
pub const SAVED: &str = "registration.saved";
/// The registration was replaced from an archive
pub const LOADED: &str = "registration.loaded";
/// A failure on a path that does not return an error
pub const ERROR: &str = "registration.error";

/// The three values of a calibration point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointValues {
    pub machine_pos: [f64; 3],
    pub camera_vec: [f64; 3],
    pub norm_pos: [f64; 2],
}

impl From<&CalibrationPoint> for PointValues {
    fn from(point: &CalibrationPoint) -> Self {
        let (machine_pos, camera_vec, norm_pos) = point.to_record();
        Self {
            machine_pos,
            camera_vec,
            norm_pos,
        }
    }
}

/// Payload of `registration.point_added`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointAdded {
    pub index: usize,
    pub total: usize,
    #[serde(flatten)]
    pub point: PointValues,
}

/// Payload of `registration.point_removed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRemoved {
    pub index: usize,
    pub total: usize,
    pub removed_point: PointValues,
}

/// Payload of `registration.computed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Computed {
    pub point_count: usize,
    pub error: f64,
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

/// Payload of `registration.auto_computed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoComputed {
    pub point_count: usize,
    pub error: f64,
}

/// Payload of `registration.cleared`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cleared {
    pub cleared_count: usize,
}

/// Payload of `registration.reset`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reset {
    pub cleared_count: usize,
    pub was_registered: bool,
}

/// Payload of `registration.point_transformed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTransformed {
    pub camera_vec: [f64; 3],
    pub machine_vec: [f64; 3],
}

/// Payload of `registration.batch_transformed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTransformed {
    pub count: usize,
    pub camera_vecs: Vec<[f64; 3]>,
    pub machine_vecs: Vec<[f64; 3]>,
}

/// Payload of `registration.validation_passed` and `registration.validation_failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    /// Current RMS error; `None` when unregistered
    pub error: Option<f64>,
    pub tolerance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload of `registration.saved` and `registration.loaded`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persisted {
    pub path: String,
    pub point_count: usize,
    pub error: f64,
}

/// Payload of `registration.error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

pub(crate) fn vec3_list(points: &[nalgebra::Vector3<f64>]) -> Vec<[f64; 3]> {
    points.iter().map(vec3_array).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Vector2, Vector3};
    use serde_json::json;

    #[test]
    fn test_point_added_payload_is_flat() {
        let point = CalibrationPoint::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector2::new(0.5, 0.5),
        );
        let payload = PointAdded {
            index: 0,
            total: 1,
            point: PointValues::from(&point),
        };
        assert_eq!(
            serde_json::to_value(&payload).expect("serialize"),
            json!({
                "index": 0,
                "total": 1,
                "machine_pos": [1.0, 2.0, 3.0],
                "camera_vec": [0.0, 0.0, 1.0],
                "norm_pos": [0.5, 0.5],
            })
        );
    }

    #[test]
    fn test_validation_reason_omitted_when_passed() {
        let payload = Validation {
            error: Some(0.1),
            tolerance: 0.5,
            reason: None,
        };
        let value = serde_json::to_value(&payload).expect("serialize");
        assert!(value.get("reason").is_none());
        let back: Validation = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, payload);
    }
}
