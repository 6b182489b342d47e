//! Registration manager
//!
//! Owns the calibration-point store and the transform derived from it.
//! Every mutation publishes a `registration.*` event on the manager's
//! broker. The state lock is always released before publishing, so
//! subscribers may call back into the manager from their handlers.

use camreg_core::{ComputationError, EventAware, EventBroker, PreconditionError, Result};
use camreg_settings::RegistrationSettings;
use nalgebra::{Matrix3, Vector2, Vector3};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use crate::events::{
    self, vec3_list, AutoComputed, BatchTransformed, Cleared, Computed, ErrorMessage, Persisted,
    PointAdded, PointRemoved, PointTransformed, Reset, Validation,
};
use crate::kabsch::{self, RigidTransform, MIN_POINTS};
use crate::persistence::{self, RegistrationArchive};
use crate::point::{matrix_rows, vec3_array, CalibrationPoint, Registration, RegistrationStatus};

#[derive(Debug, Default)]
struct State {
    points: Vec<CalibrationPoint>,
    registration: Option<Registration>,
}

impl State {
    fn frames(&self) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>) {
        self.points
            .iter()
            .map(|p| (p.camera_vector, p.machine_position))
            .unzip()
    }
}

/// A freshly fitted registration and the point count it was fitted to
#[derive(Debug, Clone, Copy)]
struct Fitted {
    registration: Registration,
    point_count: usize,
}

/// Camera-to-machine registration engine
///
/// State machine:
///
/// ```text
/// Empty --add--> Accumulating --add (3rd point)--> Registered
///                                    |                 ^  |
///                                    |            compute  remove / failed fit
///                                    v                 |  v
///                                    +-----------> Unregistered
/// ```
///
/// `clear_calibration_points` and `reset` return to `Empty` from anywhere.
pub struct RegistrationManager {
    events: EventAware,
    settings: RegistrationSettings,
    state: Mutex<State>,
}

impl RegistrationManager {
    /// Create a manager publishing on `broker` with default settings
    pub fn new(broker: Arc<EventBroker>) -> Self {
        Self::with_settings(broker, RegistrationSettings::default())
    }

    /// Create a manager publishing on `broker`
    pub fn with_settings(broker: Arc<EventBroker>, settings: RegistrationSettings) -> Self {
        Self {
            events: EventAware::named("registration", broker),
            settings,
            state: Mutex::new(State::default()),
        }
    }

    /// The broker registration events are published on
    pub fn broker(&self) -> &Arc<EventBroker> {
        self.events.broker()
    }

    /// Settings this manager was created with
    pub fn settings(&self) -> &RegistrationSettings {
        &self.settings
    }

    /// Append a correspondence; returns its index
    ///
    /// Once at least three points exist and auto-compute is enabled the
    /// transform is refitted. A failed refit is reported through a
    /// `registration.error` event; the point is kept either way.
    pub fn add_calibration_point(
        &self,
        machine_position: Vector3<f64>,
        camera_vector: Vector3<f64>,
        normalized_image_position: Vector2<f64>,
    ) -> usize {
        let point =
            CalibrationPoint::new(machine_position, camera_vector, normalized_image_position);

        let (index, total) = {
            let mut state = self.state.lock();
            state.points.push(point);
            if !self.settings.auto_compute {
                state.registration = None;
            }
            (state.points.len() - 1, state.points.len())
        };

        tracing::debug!(index, total, "Calibration point added");
        self.events.emit(
            events::POINT_ADDED,
            PointAdded {
                index,
                total,
                point: (&point).into(),
            },
        );

        if total >= MIN_POINTS && self.settings.auto_compute {
            match self.fit_and_store(true) {
                Ok(Some(fitted)) => {
                    self.events.emit(
                        events::AUTO_COMPUTED,
                        AutoComputed {
                            point_count: fitted.point_count,
                            error: fitted.registration.error,
                        },
                    );
                }
                Ok(None) => {}
                Err(e) => self.emit_error(format!("Automatic registration failed: {e}")),
            }
        }

        index
    }

    /// Remove the point at `index`
    ///
    /// An out-of-range index is not an error: it returns `false` and
    /// publishes `registration.error`.
    pub fn remove_calibration_point(&self, index: usize) -> bool {
        let removed = {
            let mut state = self.state.lock();
            if index >= state.points.len() {
                Err(state.points.len())
            } else {
                let point = state.points.remove(index);
                let total = state.points.len();
                if total < MIN_POINTS || !self.settings.auto_compute {
                    state.registration = None;
                }
                Ok((point, total))
            }
        };

        let (point, total) = match removed {
            Ok(removed) => removed,
            Err(len) => {
                self.emit_error(format!(
                    "Cannot remove calibration point {index}: {len} points stored"
                ));
                return false;
            }
        };

        tracing::debug!(index, total, "Calibration point removed");
        self.events.emit(
            events::POINT_REMOVED,
            PointRemoved {
                index,
                total,
                removed_point: (&point).into(),
            },
        );

        if total >= MIN_POINTS && self.settings.auto_compute {
            if let Err(e) = self.fit_and_store(true) {
                self.emit_error(format!("Registration update after removal failed: {e}"));
            }
        }

        true
    }

    /// Remove every point and the transform; returns the number removed
    pub fn clear_calibration_points(&self) -> usize {
        let (cleared_count, _) = self.take_state();
        tracing::info!(cleared_count, "Calibration points cleared");
        self.events.emit(events::CLEARED, Cleared { cleared_count });
        cleared_count
    }

    /// Return to the empty state
    pub fn reset(&self) {
        let (cleared_count, was_registered) = self.take_state();
        tracing::info!(cleared_count, was_registered, "Registration reset");
        self.events.emit(
            events::RESET,
            Reset {
                cleared_count,
                was_registered,
            },
        );
    }

    /// Fit the transform to the stored points
    ///
    /// With `force == false` an existing registration is kept and `true`
    /// returned without refitting. A failed fit leaves the manager
    /// unregistered.
    pub fn compute_registration(&self, force: bool) -> Result<bool> {
        self.fit_and_store(force)?;
        Ok(true)
    }

    /// Map a camera-frame vector into machine coordinates
    pub fn transform_point(&self, camera_vector: &Vector3<f64>) -> Result<Vector3<f64>> {
        let transform = self.require_transform("transform_point")?;
        let machine = transform.apply(camera_vector);
        self.events.emit(
            events::POINT_TRANSFORMED,
            PointTransformed {
                camera_vec: vec3_array(camera_vector),
                machine_vec: vec3_array(&machine),
            },
        );
        Ok(machine)
    }

    /// Map several camera-frame vectors; publishes one summary event
    pub fn transform_points(&self, camera_vectors: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
        let transform = self.require_transform("transform_points")?;
        let machine: Vec<Vector3<f64>> =
            camera_vectors.iter().map(|v| transform.apply(v)).collect();
        self.events.emit(
            events::BATCH_TRANSFORMED,
            BatchTransformed {
                count: machine.len(),
                camera_vecs: vec3_list(camera_vectors),
                machine_vecs: vec3_list(&machine),
            },
        );
        Ok(machine)
    }

    /// Map a machine-frame position back into the camera frame
    pub fn inverse_transform_point(&self, machine_position: &Vector3<f64>) -> Result<Vector3<f64>> {
        let transform = self.require_transform("inverse_transform_point")?;
        Ok(transform.apply_inverse(machine_position))
    }

    /// RMS residual of the current transform over the stored points
    pub fn registration_error(&self) -> Option<f64> {
        self.state.lock().registration.map(|r| r.error)
    }

    /// Residual distance of each stored point under the current transform
    pub fn point_residuals(&self) -> Option<Vec<f64>> {
        let state = self.state.lock();
        let registration = state.registration?;
        let (camera, machine) = state.frames();
        Some(registration.transform.residuals(&camera, &machine))
    }

    /// Compare the registration error to `tolerance`
    ///
    /// Publishes `validation_passed` or `validation_failed`. An unregistered
    /// manager or a negative/non-finite tolerance fails validation.
    pub fn validate_registration(&self, tolerance: f64) -> bool {
        let error = self.registration_error();

        let reason = match error {
            _ if !(tolerance.is_finite() && tolerance >= 0.0) => {
                Some(format!("invalid tolerance {tolerance}"))
            }
            None => Some("no registration computed".to_string()),
            Some(error) if error > tolerance => Some(format!(
                "RMS error {error:.4} exceeds tolerance {tolerance:.4}"
            )),
            Some(_) => None,
        };

        let passed = reason.is_none();
        let event_type = if passed {
            events::VALIDATION_PASSED
        } else {
            events::VALIDATION_FAILED
        };
        tracing::info!(?error, tolerance, passed, "Registration validated");
        self.events.emit(
            event_type,
            Validation {
                error,
                tolerance,
                reason,
            },
        );
        passed
    }

    /// Validate against the configured tolerance
    pub fn validate(&self) -> bool {
        self.validate_registration(self.settings.validation_tolerance)
    }

    /// Write the registration and its points to an archive at `path`
    pub fn save_registration(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let archive = {
            let state = self.state.lock();
            let registration = state.registration.ok_or_else(|| PreconditionError::NotRegistered {
                operation: "save_registration".to_string(),
            })?;
            RegistrationArchive {
                rotation: matrix_rows(&registration.transform.rotation),
                translation: vec3_array(&registration.transform.translation),
                calibration_points: state.points.iter().map(CalibrationPoint::to_record).collect(),
                registration_error: Some(registration.error),
            }
        };

        persistence::write_archive(path, &archive)?;

        let point_count = archive.calibration_points.len();
        let error = archive.registration_error.unwrap_or_default();
        tracing::info!(path = %path.display(), point_count, error, "Registration saved");
        self.events.emit(
            events::SAVED,
            Persisted {
                path: path.display().to_string(),
                point_count,
                error,
            },
        );
        Ok(())
    }

    /// Replace all state with the archive at `path`
    ///
    /// Nothing changes unless the whole archive reads and validates.
    pub fn load_registration(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let archive = persistence::read_archive(path)?;

        let points: Vec<CalibrationPoint> = archive
            .calibration_points
            .iter()
            .map(CalibrationPoint::from_record)
            .collect();
        let transform = RigidTransform {
            rotation: archive.rotation_matrix(),
            translation: Vector3::from(archive.translation),
        };
        let error = match archive.registration_error {
            Some(error) => error,
            None => {
                let (camera, machine): (Vec<_>, Vec<_>) = points
                    .iter()
                    .map(|p| (p.camera_vector, p.machine_position))
                    .unzip();
                transform.rms_error(&camera, &machine)
            }
        };
        let point_count = points.len();

        {
            let mut state = self.state.lock();
            state.points = points;
            state.registration = Some(Registration { transform, error });
        }

        tracing::info!(path = %path.display(), point_count, error, "Registration loaded");
        self.events.emit(
            events::LOADED,
            Persisted {
                path: path.display().to_string(),
                point_count,
                error,
            },
        );
        Ok(())
    }

    /// Current state-machine position
    pub fn status(&self) -> RegistrationStatus {
        let state = self.state.lock();
        RegistrationStatus::from_state(state.points.len(), state.registration.is_some())
    }

    /// Whether a transform is held
    pub fn is_registered(&self) -> bool {
        self.state.lock().registration.is_some()
    }

    /// Number of stored calibration points
    pub fn point_count(&self) -> usize {
        self.state.lock().points.len()
    }

    /// Copy of the stored points in insertion order
    pub fn calibration_points(&self) -> Vec<CalibrationPoint> {
        self.state.lock().points.clone()
    }

    /// The point at `index`, if any
    pub fn calibration_point(&self, index: usize) -> Option<CalibrationPoint> {
        self.state.lock().points.get(index).copied()
    }

    /// The held camera-to-machine transform
    pub fn transform(&self) -> Option<RigidTransform> {
        self.state.lock().registration.map(|r| r.transform)
    }

    /// Rotation of the held transform
    pub fn rotation(&self) -> Option<Matrix3<f64>> {
        self.transform().map(|t| t.rotation)
    }

    /// Translation of the held transform
    pub fn translation(&self) -> Option<Vector3<f64>> {
        self.transform().map(|t| t.translation)
    }

    /// Fit under the lock, then publish `computed` once it is released
    ///
    /// Returns `None` when an existing registration was kept.
    fn fit_and_store(&self, force: bool) -> Result<Option<Fitted>> {
        let fitted = {
            let mut state = self.state.lock();
            let available = state.points.len();
            if available < MIN_POINTS {
                return Err(PreconditionError::InsufficientPoints {
                    required: MIN_POINTS,
                    available,
                }
                .into());
            }
            if !force && state.registration.is_some() {
                return Ok(None);
            }

            let (camera, machine) = state.frames();
            match kabsch::fit(&camera, &machine, self.settings.degeneracy_tolerance) {
                Ok(transform) => {
                    let registration = Registration {
                        error: transform.rms_error(&camera, &machine),
                        transform,
                    };
                    state.registration = Some(registration);
                    Fitted {
                        registration,
                        point_count: available,
                    }
                }
                Err(e) => {
                    state.registration = None;
                    return Err(Self::fit_failed(e));
                }
            }
        };

        let Fitted {
            registration,
            point_count,
        } = fitted;
        tracing::info!(point_count, error = registration.error, "Registration computed");
        self.events.emit(
            events::COMPUTED,
            Computed {
                point_count,
                error: registration.error,
                rotation: matrix_rows(&registration.transform.rotation),
                translation: vec3_array(&registration.transform.translation),
            },
        );
        Ok(Some(fitted))
    }

    fn fit_failed(error: ComputationError) -> camreg_core::Error {
        tracing::warn!(%error, "Registration fit failed");
        error.into()
    }

    fn require_transform(&self, operation: &str) -> Result<RigidTransform> {
        self.transform().ok_or_else(|| {
            PreconditionError::NotRegistered {
                operation: operation.to_string(),
            }
            .into()
        })
    }

    /// Empty the store; returns (points removed, whether a transform was held)
    fn take_state(&self) -> (usize, bool) {
        let old = std::mem::take(&mut *self.state.lock());
        (old.points.len(), old.registration.is_some())
    }

    fn emit_error(&self, message: String) {
        tracing::warn!(%message, "Registration error");
        self.events.emit(events::ERROR, ErrorMessage { message });
    }
}

impl std::fmt::Debug for RegistrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RegistrationManager")
            .field("points", &state.points.len())
            .field("registration", &state.registration)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camreg_core::{Event, HandlerResult, Priority};

    fn manager() -> (Arc<EventBroker>, RegistrationManager) {
        let broker = Arc::new(EventBroker::new());
        let manager = RegistrationManager::new(Arc::clone(&broker));
        (broker, manager)
    }

    fn add(manager: &RegistrationManager, camera: [f64; 3]) -> usize {
        let camera = Vector3::from(camera);
        manager.add_calibration_point(
            camera + Vector3::new(100.0, 50.0, 0.0),
            camera,
            Vector2::new(0.5, 0.5),
        )
    }

    #[test]
    fn test_status_progression() {
        let (_broker, manager) = manager();
        assert_eq!(manager.status(), RegistrationStatus::Empty);
        add(&manager, [0.0, 0.0, 0.0]);
        add(&manager, [1.0, 0.0, 0.0]);
        assert_eq!(manager.status(), RegistrationStatus::Accumulating);
        add(&manager, [0.0, 1.0, 0.0]);
        assert_eq!(manager.status(), RegistrationStatus::Registered);
        assert!(manager.registration_error().expect("error") < 1e-9);
    }

    #[test]
    fn test_compute_with_too_few_points() {
        let (_broker, manager) = manager();
        add(&manager, [0.0, 0.0, 0.0]);
        let err = manager.compute_registration(false).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_transform_requires_registration() {
        let (_broker, manager) = manager();
        assert!(manager.transform_point(&Vector3::zeros()).unwrap_err().is_precondition());
        assert!(manager.transform_points(&[]).unwrap_err().is_precondition());
        assert!(manager
            .inverse_transform_point(&Vector3::zeros())
            .unwrap_err()
            .is_precondition());
    }

    #[test]
    fn test_transform_and_inverse() {
        let (_broker, manager) = manager();
        add(&manager, [0.0, 0.0, 0.0]);
        add(&manager, [1.0, 0.0, 0.0]);
        add(&manager, [0.0, 1.0, 0.0]);

        let machine = manager
            .transform_point(&Vector3::new(2.0, 3.0, 4.0))
            .expect("transform");
        assert!((machine - Vector3::new(102.0, 53.0, 4.0)).norm() < 1e-9);

        let camera = manager.inverse_transform_point(&machine).expect("inverse");
        assert!((camera - Vector3::new(2.0, 3.0, 4.0)).norm() < 1e-9);
    }

    #[test]
    fn test_collinear_points_stay_unregistered() {
        let (broker, manager) = manager();
        let errors = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&errors);
        broker.subscribe(events::ERROR, Priority::Normal, move |event: &Event| -> HandlerResult {
            sink.lock().push(event.payload["message"].to_string());
            Ok(())
        });

        add(&manager, [0.0, 0.0, 0.0]);
        add(&manager, [1.0, 1.0, 1.0]);
        let index = add(&manager, [2.0, 2.0, 2.0]);

        assert_eq!(index, 2);
        assert_eq!(manager.point_count(), 3);
        assert_eq!(manager.status(), RegistrationStatus::Unregistered);
        assert_eq!(errors.lock().len(), 1);

        let err = manager.compute_registration(true).unwrap_err();
        assert!(err.is_computation());
        assert_eq!(errors.lock().len(), 1);
    }

    #[test]
    fn test_remove_out_of_range() {
        let (broker, manager) = manager();
        let errors = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&errors);
        broker.subscribe(events::ERROR, Priority::Normal, move |_: &Event| -> HandlerResult {
            *sink.lock() += 1;
            Ok(())
        });

        add(&manager, [0.0, 0.0, 0.0]);
        assert!(!manager.remove_calibration_point(5));
        assert_eq!(*errors.lock(), 1);
        assert_eq!(manager.point_count(), 1);
    }

    #[test]
    fn test_manual_mode_clears_stale_transform() {
        let broker = Arc::new(EventBroker::new());
        let manager = RegistrationManager::with_settings(
            broker,
            RegistrationSettings {
                auto_compute: false,
                ..Default::default()
            },
        );
        add(&manager, [0.0, 0.0, 0.0]);
        add(&manager, [1.0, 0.0, 0.0]);
        add(&manager, [0.0, 1.0, 0.0]);
        assert!(!manager.is_registered());

        assert!(manager.compute_registration(false).expect("compute"));
        assert!(manager.is_registered());

        add(&manager, [0.0, 0.0, 1.0]);
        assert_eq!(manager.status(), RegistrationStatus::Unregistered);
    }

    #[test]
    fn test_validation() {
        let (_broker, manager) = manager();
        assert!(!manager.validate_registration(1.0));

        add(&manager, [0.0, 0.0, 0.0]);
        add(&manager, [1.0, 0.0, 0.0]);
        add(&manager, [0.0, 1.0, 0.0]);
        assert!(manager.validate_registration(0.0));
        assert!(manager.validate());
        assert!(!manager.validate_registration(f64::NAN));
        assert!(!manager.validate_registration(-1.0));
    }

    #[test]
    fn test_clear_and_reset() {
        let (_broker, manager) = manager();
        add(&manager, [0.0, 0.0, 0.0]);
        add(&manager, [1.0, 0.0, 0.0]);
        assert_eq!(manager.clear_calibration_points(), 2);
        assert_eq!(manager.status(), RegistrationStatus::Empty);

        add(&manager, [0.0, 0.0, 0.0]);
        manager.reset();
        assert_eq!(manager.point_count(), 0);
        assert!(manager.rotation().is_none());
        assert!(manager.translation().is_none());
    }

    #[test]
    fn test_residuals() {
        let (_broker, manager) = manager();
        assert!(manager.point_residuals().is_none());
        add(&manager, [0.0, 0.0, 0.0]);
        add(&manager, [1.0, 0.0, 0.0]);
        add(&manager, [0.0, 1.0, 0.0]);
        let residuals = manager.point_residuals().expect("residuals");
        assert_eq!(residuals.len(), 3);
        assert!(residuals.iter().all(|r| *r < 1e-9));
    }
}
