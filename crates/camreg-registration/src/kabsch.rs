//! Rigid-body least-squares fit between two paired 3D point sets.
//!
//! Given camera-frame points `a_i` and machine-frame points `b_i`, the fit
//! finds the proper rotation `R` and translation `t` minimising
//! `Σ ‖R·a_i + t − b_i‖²` (Kabsch algorithm):
//!
//! 1. subtract the centroids of both sets
//! 2. form the cross-covariance `H = Σ (a_i − ā)(b_i − b̄)ᵀ`
//! 3. decompose `H = U·Σ·Vᵀ` and take `R = V·Uᵀ`
//! 4. if `det(R) < 0`, negate the last row of `Vᵀ` and recompute `R`
//! 5. `t = b̄ − R·ā`

use camreg_core::ComputationError;
use nalgebra::{Matrix3, Vector3};

/// Minimum number of correspondences for a fit
pub const MIN_POINTS: usize = 3;

/// Default relative singular-value threshold for degeneracy
pub const DEFAULT_DEGENERACY_TOLERANCE: f64 = 1e-9;

/// Rotation plus translation mapping camera coordinates to machine
/// coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    /// Proper rotation (det = +1)
    pub rotation: Matrix3<f64>,
    /// Translation applied after the rotation
    pub translation: Vector3<f64>,
}

impl RigidTransform {
    /// Transform that leaves points unchanged
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Map a camera-frame point into the machine frame: `R·p + t`
    pub fn apply(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Map a machine-frame point back into the camera frame: `Rᵀ·(p − t)`
    pub fn apply_inverse(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.transpose() * (point - self.translation)
    }

    /// Distance between each predicted and actual machine point
    pub fn residuals(&self, camera: &[Vector3<f64>], machine: &[Vector3<f64>]) -> Vec<f64> {
        camera
            .iter()
            .zip(machine)
            .map(|(a, b)| (self.apply(a) - b).norm())
            .collect()
    }

    /// Root-mean-square residual distance over the paired points
    ///
    /// Returns 0 for empty input.
    pub fn rms_error(&self, camera: &[Vector3<f64>], machine: &[Vector3<f64>]) -> f64 {
        let n = camera.len().min(machine.len());
        if n == 0 {
            return 0.0;
        }
        let sum_sq: f64 = camera
            .iter()
            .zip(machine)
            .map(|(a, b)| (self.apply(a) - b).norm_squared())
            .sum();
        (sum_sq / n as f64).sqrt()
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Arithmetic mean of a point set; the origin for an empty set
pub fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p);
    sum / points.len() as f64
}

/// Fit the rigid transform taking `camera[i]` onto `machine[i]`
///
/// `degeneracy_tolerance` is relative to the largest singular value of the
/// cross-covariance; a second singular value at or below it means the
/// points are collinear (or coincident) and the rotation is not determined.
pub fn fit(
    camera: &[Vector3<f64>],
    machine: &[Vector3<f64>],
    degeneracy_tolerance: f64,
) -> Result<RigidTransform, ComputationError> {
    if camera.len() != machine.len() {
        return Err(ComputationError::DegenerateGeometry {
            reason: format!(
                "mismatched point sets ({} camera, {} machine)",
                camera.len(),
                machine.len()
            ),
        });
    }
    if camera.len() < MIN_POINTS {
        return Err(ComputationError::DegenerateGeometry {
            reason: format!("{} points cannot determine a rotation", camera.len()),
        });
    }
    if let Some(index) = camera
        .iter()
        .zip(machine)
        .position(|(a, b)| !(a.iter().all(|v| v.is_finite()) && b.iter().all(|v| v.is_finite())))
    {
        return Err(ComputationError::NonFinite { index });
    }

    let camera_centroid = centroid(camera);
    let machine_centroid = centroid(machine);

    let mut h = Matrix3::zeros();
    for (a, b) in camera.iter().zip(machine) {
        h += (a - camera_centroid) * (b - machine_centroid).transpose();
    }

    // Singular values come back sorted in descending order.
    let svd = h.svd(true, true);
    let sigma = svd.singular_values;
    if sigma[0] <= f64::EPSILON || sigma[1] <= degeneracy_tolerance * sigma[0] {
        return Err(ComputationError::DegenerateGeometry {
            reason: format!(
                "points are collinear or coincident (singular values {:.3e}, {:.3e}, {:.3e})",
                sigma[0], sigma[1], sigma[2]
            ),
        });
    }

    let u = svd.u.ok_or(ComputationError::SvdFailed)?;
    let mut v_t = svd.v_t.ok_or(ComputationError::SvdFailed)?;

    let mut rotation = v_t.transpose() * u.transpose();

    // Reflection case: flip the axis of the smallest singular value.
    if rotation.determinant() < 0.0 {
        for col in 0..3 {
            v_t[(2, col)] = -v_t[(2, col)];
        }
        rotation = v_t.transpose() * u.transpose();
    }

    let translation = machine_centroid - rotation * camera_centroid;

    Ok(RigidTransform {
        rotation,
        translation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Unit};

    fn camera_points() -> Vec<Vector3<f64>> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(0.0, 10.0, 0.0),
            Vector3::new(3.0, 4.0, 5.0),
            Vector3::new(-2.0, 7.0, 1.5),
        ]
    }

    fn known_transform() -> RigidTransform {
        let axis = Unit::new_normalize(Vector3::new(0.3, -0.5, 0.8));
        RigidTransform {
            rotation: Rotation3::from_axis_angle(&axis, 0.7).into_inner(),
            translation: Vector3::new(120.0, -35.5, 4.25),
        }
    }

    #[test]
    fn test_recovers_known_transform() {
        let expected = known_transform();
        let camera = camera_points();
        let machine: Vec<_> = camera.iter().map(|p| expected.apply(p)).collect();

        let fitted = fit(&camera, &machine, DEFAULT_DEGENERACY_TOLERANCE).expect("fit");
        assert!((fitted.rotation - expected.rotation).abs().max() < 1e-6);
        assert!((fitted.translation - expected.translation).abs().max() < 1e-6);
        assert!(fitted.rms_error(&camera, &machine) < 1e-9);
    }

    #[test]
    fn test_coplanar_points_fit_proper_rotation() {
        let expected = known_transform();
        let camera = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let machine: Vec<_> = camera.iter().map(|p| expected.apply(p)).collect();

        let fitted = fit(&camera, &machine, DEFAULT_DEGENERACY_TOLERANCE).expect("fit");
        assert!((fitted.rotation.determinant() - 1.0).abs() < 1e-9);
        assert!((fitted.rotation - expected.rotation).abs().max() < 1e-6);
    }

    #[test]
    fn test_mirrored_points_yield_proper_rotation() {
        let camera = camera_points();
        // Mirror through the YZ plane: the unconstrained optimum is a reflection.
        let machine: Vec<_> = camera
            .iter()
            .map(|p| Vector3::new(-p.x, p.y, p.z) + Vector3::new(5.0, 5.0, 5.0))
            .collect();

        let fitted = fit(&camera, &machine, DEFAULT_DEGENERACY_TOLERANCE).expect("fit");
        assert!((fitted.rotation.determinant() - 1.0).abs() < 1e-9);
        let orthogonality = fitted.rotation.transpose() * fitted.rotation - Matrix3::identity();
        assert!(orthogonality.abs().max() < 1e-9);
    }

    #[test]
    fn test_collinear_points_are_degenerate() {
        let camera = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(2.0, 2.0, 2.0),
        ];
        let machine = camera.clone();
        let err = fit(&camera, &machine, DEFAULT_DEGENERACY_TOLERANCE).unwrap_err();
        assert!(matches!(err, ComputationError::DegenerateGeometry { .. }));
    }

    #[test]
    fn test_coincident_points_are_degenerate() {
        let camera = vec![Vector3::new(1.0, 2.0, 3.0); 4];
        let machine = vec![Vector3::new(4.0, 5.0, 6.0); 4];
        assert!(fit(&camera, &machine, DEFAULT_DEGENERACY_TOLERANCE).is_err());
    }

    #[test]
    fn test_non_finite_input() {
        let mut camera = camera_points();
        camera[2].y = f64::NAN;
        let machine = camera_points();
        assert_eq!(
            fit(&camera, &machine, DEFAULT_DEGENERACY_TOLERANCE).unwrap_err(),
            ComputationError::NonFinite { index: 2 }
        );
    }

    #[test]
    fn test_inverse_round_trip() {
        let transform = known_transform();
        let p = Vector3::new(1.5, -2.0, 8.0);
        let back = transform.apply_inverse(&transform.apply(&p));
        assert!((back - p).norm() < 1e-9);
    }

    #[test]
    fn test_rms_error_of_offset_points() {
        let camera = vec![
            Vector3::zeros(),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let machine: Vec<_> = camera.iter().map(|p| p + Vector3::new(0.0, 0.0, 2.0)).collect();
        let identity = RigidTransform::identity();
        assert!((identity.rms_error(&camera, &machine) - 2.0).abs() < 1e-12);
        assert_eq!(identity.residuals(&camera, &machine), vec![2.0, 2.0, 2.0]);
    }
}
