//! Core data types for nki-generator.

use std::path::PathBuf;

use axum::body::Bytes;
use uuid::Uuid;

/// A named byte stream supplied by the caller.
#[derive(Debug, Clone)]
pub struct UploadedSample {
    /// Original filename, used verbatim as the destination name.
    pub file_name: String,
    pub data: Bytes,
}

impl UploadedSample {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }
}

/// Input to a single packaging run.
#[derive(Debug, Clone)]
pub struct PackageRequest {
    pub root_note: String,
    pub instrument_name: String,
    /// Uploaded samples in request order.
    pub samples: Vec<UploadedSample>,
}

/// A finished archive on disk.
#[derive(Debug, Clone)]
pub struct Package {
    pub job_id: Uuid,
    /// Absolute or work-dir relative path of the zip.
    pub path: PathBuf,
    /// Download filename, `{instrument}_{root_note}_{job_id}.zip`.
    pub file_name: String,
}

/// Whether `name` is a single, ordinary path component.
///
/// Rejects empty names, `.` and `..`, and anything with a separator or NUL.
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
