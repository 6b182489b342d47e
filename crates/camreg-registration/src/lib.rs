//! # camreg Registration
//!
//! Camera-to-machine coordinate registration.
//!
//! Operators pair positions seen by the camera with the machine positions
//! of the same markers. [`RegistrationManager`] stores those pairs, fits a
//! rigid transform to them with the Kabsch algorithm and publishes every
//! change as a `registration.*` event (see [`events`]).
//!
//! ```rust,ignore
//! let manager = RegistrationManager::new(camreg_core::get_default());
//! manager.add_calibration_point(machine, camera, image_pos);
//! let target = manager.transform_point(&camera_vec)?;
//! ```

pub mod events;
pub mod kabsch;
pub mod manager;
pub mod persistence;
pub mod point;
pub mod tracker;

pub use kabsch::{fit, RigidTransform, DEFAULT_DEGENERACY_TOLERANCE, MIN_POINTS};
pub use manager::RegistrationManager;
pub use persistence::{read_archive, write_archive, RegistrationArchive};
pub use point::{CalibrationPoint, PointRecord, Registration, RegistrationStatus};
pub use tracker::{RegistrationSnapshot, RegistrationStatusTracker};
