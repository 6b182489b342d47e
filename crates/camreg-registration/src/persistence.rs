//! Registration archive
//!
//! A registration is saved as one zip file with four JSON entries:
//!
//! | entry                     | content                                   |
//! |---------------------------|-------------------------------------------|
//! | `rotation.json`           | 3 rows of 3 floats                        |
//! | `translation.json`        | 3 floats                                  |
//! | `calibration_points.json` | `[machine_pos, camera_vec, norm_pos]` list |
//! | `registration_error.json` | float (optional, recomputed when absent)  |
//!
//! [`read_archive`] validates the whole archive before returning, so a
//! caller can swap the result in without ever observing a partial load.

use camreg_core::PersistenceError;
use nalgebra::Matrix3;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::kabsch::MIN_POINTS;
use crate::point::{CalibrationPoint, PointRecord};

pub const ROTATION_ENTRY: &str = "rotation.json";
pub const TRANSLATION_ENTRY: &str = "translation.json";
pub const POINTS_ENTRY: &str = "calibration_points.json";
pub const ERROR_ENTRY: &str = "registration_error.json";

/// Tolerance on det(R) and RᵀR when accepting a stored rotation
const ROTATION_TOLERANCE: f64 = 1e-6;

/// In-memory form of a registration archive
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationArchive {
    /// Row-major rotation matrix
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
    pub calibration_points: Vec<PointRecord>,
    /// Absent in archives written by older versions
    pub registration_error: Option<f64>,
}

impl RegistrationArchive {
    /// Rotation as a matrix
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        let r = &self.rotation;
        Matrix3::new(
            r[0][0], r[0][1], r[0][2], r[1][0], r[1][1], r[1][2], r[2][0], r[2][1], r[2][2],
        )
    }
}

/// Write `archive` to `path`, replacing any existing file
///
/// The archive is written to a temporary file in the same directory and
/// renamed over `path`, so a failed write leaves the previous file intact.
pub fn write_archive(path: &Path, archive: &RegistrationArchive) -> Result<(), PersistenceError> {
    let io_error = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let staging = NamedTempFile::new_in(dir).map_err(io_error)?;
    let mut zip = ZipWriter::new(staging);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    write_entry(&mut zip, path, ROTATION_ENTRY, &archive.rotation, options)?;
    write_entry(&mut zip, path, TRANSLATION_ENTRY, &archive.translation, options)?;
    write_entry(&mut zip, path, POINTS_ENTRY, &archive.calibration_points, options)?;
    if let Some(error) = archive.registration_error {
        write_entry(&mut zip, path, ERROR_ENTRY, &error, options)?;
    }

    let staging = zip.finish().map_err(|e| zip_error(path, e))?;
    staging.persist(path).map_err(|e| io_error(e.error))?;
    tracing::debug!(
        path = %path.display(),
        points = archive.calibration_points.len(),
        "Archive written"
    );
    Ok(())
}

/// Read and validate the archive at `path`
pub fn read_archive(path: &Path) -> Result<RegistrationArchive, PersistenceError> {
    let file = File::open(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut zip = ZipArchive::new(file).map_err(|e| zip_error(path, e))?;

    let rotation: [[f64; 3]; 3] = read_entry(&mut zip, path, ROTATION_ENTRY)?
        .ok_or_else(|| missing(path, ROTATION_ENTRY))?;
    let translation: [f64; 3] = read_entry(&mut zip, path, TRANSLATION_ENTRY)?
        .ok_or_else(|| missing(path, TRANSLATION_ENTRY))?;
    let calibration_points: Vec<PointRecord> = read_entry(&mut zip, path, POINTS_ENTRY)?
        .ok_or_else(|| missing(path, POINTS_ENTRY))?;
    let registration_error: Option<f64> = read_entry(&mut zip, path, ERROR_ENTRY)?;

    let archive = RegistrationArchive {
        rotation,
        translation,
        calibration_points,
        registration_error,
    };
    validate(path, &archive)?;
    Ok(archive)
}

fn validate(path: &Path, archive: &RegistrationArchive) -> Result<(), PersistenceError> {
    let corrupt = |entry: &str, reason: String| PersistenceError::CorruptEntry {
        path: path.to_path_buf(),
        entry: entry.to_string(),
        reason,
    };

    if !archive.rotation.iter().flatten().all(|v| v.is_finite()) {
        return Err(corrupt(ROTATION_ENTRY, "non-finite value".into()));
    }
    let rotation = archive.rotation_matrix();
    let det = rotation.determinant();
    let orthogonality = (rotation.transpose() * rotation - Matrix3::identity()).abs().max();
    if (det - 1.0).abs() > ROTATION_TOLERANCE || orthogonality > ROTATION_TOLERANCE {
        return Err(corrupt(
            ROTATION_ENTRY,
            format!("not a proper rotation (det {det:.6})"),
        ));
    }

    if !archive.translation.iter().all(|v| v.is_finite()) {
        return Err(corrupt(TRANSLATION_ENTRY, "non-finite value".into()));
    }

    if archive.calibration_points.len() < MIN_POINTS {
        return Err(corrupt(
            POINTS_ENTRY,
            format!(
                "{} points stored, at least {} required",
                archive.calibration_points.len(),
                MIN_POINTS
            ),
        ));
    }
    if let Some(index) = archive
        .calibration_points
        .iter()
        .position(|record| !CalibrationPoint::from_record(record).is_finite())
    {
        return Err(corrupt(POINTS_ENTRY, format!("non-finite value in point {index}")));
    }

    if let Some(error) = archive.registration_error {
        if !(error.is_finite() && error >= 0.0) {
            return Err(corrupt(ERROR_ENTRY, format!("invalid error value {error}")));
        }
    }

    Ok(())
}

fn write_entry<W: Write + Seek, T: Serialize + ?Sized>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    entry: &str,
    value: &T,
    options: SimpleFileOptions,
) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| PersistenceError::CorruptEntry {
        path: path.to_path_buf(),
        entry: entry.to_string(),
        reason: e.to_string(),
    })?;
    zip.start_file(entry, options).map_err(|e| zip_error(path, e))?;
    zip.write_all(&bytes).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a JSON entry; `Ok(None)` when the entry does not exist
fn read_entry<T: DeserializeOwned>(
    zip: &mut ZipArchive<File>,
    path: &Path,
    entry: &str,
) -> Result<Option<T>, PersistenceError> {
    let mut file = match zip.by_name(entry) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(zip_error(path, e)),
    };

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| PersistenceError::CorruptEntry {
            path: path.to_path_buf(),
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| PersistenceError::CorruptEntry {
            path: path.to_path_buf(),
            entry: entry.to_string(),
            reason: e.to_string(),
        })
}

fn missing(path: &Path, entry: &str) -> PersistenceError {
    PersistenceError::MissingEntry {
        path: path.to_path_buf(),
        entry: entry.to_string(),
    }
}

fn zip_error(path: &Path, error: ZipError) -> PersistenceError {
    match error {
        ZipError::Io(source) => PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => PersistenceError::InvalidArchive {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}
