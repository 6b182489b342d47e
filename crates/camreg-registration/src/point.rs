//! Calibration point and registration state types.

use nalgebra::{Vector2, Vector3};

use crate::kabsch::{RigidTransform, MIN_POINTS};

/// Serialized form of a calibration point: `[machine_pos, camera_vec, norm_pos]`
pub type PointRecord = ([f64; 3], [f64; 3], [f64; 2]);

/// One operator-supplied correspondence between the camera and machine frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    /// Machine coordinates of the marker (e.g. GRBL work position)
    pub machine_position: Vector3<f64>,
    /// Camera-frame vector of the same marker
    pub camera_vector: Vector3<f64>,
    /// Marker position in the image, normalized to 0..1
    pub normalized_image_position: Vector2<f64>,
}

impl CalibrationPoint {
    /// Create a calibration point
    pub fn new(
        machine_position: Vector3<f64>,
        camera_vector: Vector3<f64>,
        normalized_image_position: Vector2<f64>,
    ) -> Self {
        Self {
            machine_position,
            camera_vector,
            normalized_image_position,
        }
    }

    /// Archive representation
    pub fn to_record(&self) -> PointRecord {
        (
            vec3_array(&self.machine_position),
            vec3_array(&self.camera_vector),
            [
                self.normalized_image_position.x,
                self.normalized_image_position.y,
            ],
        )
    }

    /// Rebuild from the archive representation
    pub fn from_record(record: &PointRecord) -> Self {
        let (machine, camera, norm) = record;
        Self::new(
            Vector3::from(*machine),
            Vector3::from(*camera),
            Vector2::from(*norm),
        )
    }

    /// Whether every coordinate is finite
    pub fn is_finite(&self) -> bool {
        self.machine_position.iter().all(|v| v.is_finite())
            && self.camera_vector.iter().all(|v| v.is_finite())
            && self.normalized_image_position.iter().all(|v| v.is_finite())
    }
}

/// A computed transform together with the RMS error it produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Registration {
    /// The fitted camera-to-machine transform
    pub transform: RigidTransform,
    /// RMS residual over the points it was fitted to
    pub error: f64,
}

/// Where the registration state machine currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationStatus {
    /// No calibration points
    Empty,
    /// Fewer than the minimum number of points
    Accumulating,
    /// Enough points but no valid transform
    Unregistered,
    /// A valid transform is held
    Registered,
}

impl RegistrationStatus {
    /// Derive the status from the point count and registration presence
    pub fn from_state(point_count: usize, registered: bool) -> Self {
        match (point_count, registered) {
            (0, _) => RegistrationStatus::Empty,
            (n, _) if n < MIN_POINTS => RegistrationStatus::Accumulating,
            (_, false) => RegistrationStatus::Unregistered,
            (_, true) => RegistrationStatus::Registered,
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationStatus::Empty => write!(f, "Empty"),
            RegistrationStatus::Accumulating => write!(f, "Accumulating"),
            RegistrationStatus::Unregistered => write!(f, "Unregistered"),
            RegistrationStatus::Registered => write!(f, "Registered"),
        }
    }
}

pub(crate) fn vec3_array(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

pub(crate) fn matrix_rows(m: &nalgebra::Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let point = CalibrationPoint::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.1, 0.2, 1.0),
            Vector2::new(0.25, 0.75),
        );
        let record = point.to_record();
        assert_eq!(record, ([1.0, 2.0, 3.0], [0.1, 0.2, 1.0], [0.25, 0.75]));
        assert_eq!(CalibrationPoint::from_record(&record), point);
    }

    #[test]
    fn test_status_from_state() {
        assert_eq!(RegistrationStatus::from_state(0, false), RegistrationStatus::Empty);
        assert_eq!(RegistrationStatus::from_state(2, false), RegistrationStatus::Accumulating);
        assert_eq!(RegistrationStatus::from_state(3, false), RegistrationStatus::Unregistered);
        assert_eq!(RegistrationStatus::from_state(3, true), RegistrationStatus::Registered);
    }

    #[test]
    fn test_matrix_rows_are_row_major() {
        let m = nalgebra::Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        assert_eq!(matrix_rows(&m)[0], [1.0, 2.0, 3.0]);
        assert_eq!(matrix_rows(&m)[2], [7.0, 8.0, 9.0]);
    }
}
