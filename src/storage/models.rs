use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::metadata::{GpsCoordinates, MediaMetadata};

/// Three-state patch value for partial updates.
/// Unlike `Option<Option<T>>`, each variant says what it does.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    /// Field is not part of the update (no change).
    #[default]
    Absent,
    /// Field is cleared.
    Null,
    /// Field is set to a new value.
    Value(T),
}

impl<T: Clone> Patch<T> {
    /// A patch that makes the field equal `value`, clearing it on `None`.
    pub fn set(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    fn apply(&self, target: &mut Option<T>) {
        match self {
            Patch::Absent => {}
            Patch::Null => *target = None,
            Patch::Value(v) => *target = Some(v.clone()),
        }
    }
}

/// Classification of a cataloged file derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

/// Camera raw and HEIF formats that MIME tables do not reliably know about.
const RAW_IMAGE_EXTENSIONS: &[&str] = &[
    "arw", "cr2", "cr3", "dng", "heic", "heif", "nef", "orf", "raf", "rw2",
];

impl MediaType {
    /// Derive a media type from a MIME type string.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type.split('/').next().unwrap_or("") {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        let ext = extension.trim_start_matches('.').to_lowercase();
        if RAW_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return Some(MediaType::Image);
        }
        mime_guess::from_ext(&ext)
            .first_raw()
            .and_then(Self::from_mime)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            other => Err(format!("unknown media type {other:?}, expected image or video")),
        }
    }
}

/// Cross-catalog content identity. Two records describe the same content iff
/// all three fields match exactly; an edited capture time makes a new identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub content_hash: String,
    pub file_size: u64,
    pub capture_time: Option<NaiveDateTime>,
}

/// A cataloged media file stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Assigned by the catalog on insert; zero for records not yet stored.
    pub id: u64,

    // Identity
    pub content_hash: String,
    pub file_size: u64,
    pub capture_time: Option<NaiveDateTime>,

    // Location, relative to the catalog root
    pub relative_path: String,
    pub filename: String,
    /// Without the leading dot, case preserved
    pub extension: String,

    // Metadata (all optional)
    #[serde(default)]
    pub camera_make: Option<String>,
    #[serde(default)]
    pub camera_model: Option<String>,
    #[serde(default)]
    pub gps_latitude: Option<f64>,
    #[serde(default)]
    pub gps_longitude: Option<f64>,
    #[serde(default)]
    pub gps_altitude: Option<f64>,
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
    #[serde(default)]
    pub f_number: Option<f64>,
    #[serde(default)]
    pub exposure_time: Option<f64>,
    #[serde(default)]
    pub iso: Option<u32>,
    #[serde(default)]
    pub focal_length_in_35mm: Option<u32>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl MediaRecord {
    /// A record with identity and location only; metadata fields empty.
    pub fn new(
        content_hash: impl Into<String>,
        file_size: u64,
        capture_time: Option<NaiveDateTime>,
        relative_path: impl Into<String>,
    ) -> Self {
        let relative_path = relative_path.into();
        let (filename, extension) = split_file_name(&relative_path);
        Self {
            id: 0,
            content_hash: content_hash.into(),
            file_size,
            capture_time,
            relative_path,
            filename,
            extension,
            camera_make: None,
            camera_model: None,
            gps_latitude: None,
            gps_longitude: None,
            gps_altitude: None,
            image_width: None,
            image_height: None,
            f_number: None,
            exposure_time: None,
            iso: None,
            focal_length_in_35mm: None,
            duration: None,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            content_hash: self.content_hash.clone(),
            file_size: self.file_size,
            capture_time: self.capture_time,
        }
    }

    pub fn media_type(&self) -> Option<MediaType> {
        MediaType::from_extension(&self.extension)
    }

    pub fn gps(&self) -> GpsCoordinates {
        GpsCoordinates {
            latitude: self.gps_latitude,
            longitude: self.gps_longitude,
            altitude: self.gps_altitude,
        }
    }

    pub fn metadata(&self) -> MediaMetadata {
        MediaMetadata {
            capture_time: self.capture_time,
            camera_make: self.camera_make.clone(),
            camera_model: self.camera_model.clone(),
            gps: self.gps(),
            image_width: self.image_width,
            image_height: self.image_height,
            f_number: self.f_number,
            exposure_time: self.exposure_time,
            iso: self.iso,
            focal_length_in_35mm: self.focal_length_in_35mm,
            duration: self.duration,
        }
    }

    /// Overwrite capture time and every metadata field from `metadata`.
    pub fn set_metadata(&mut self, metadata: &MediaMetadata) {
        RecordPatch::metadata(metadata).apply_to(self);
    }
}

/// Split the last path component of a `/`-separated relative path into
/// filename and extension (without its dot).
pub(crate) fn split_file_name(relative_path: &str) -> (String, String) {
    let filename = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_string();
    let extension = Path::new(&filename)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    (filename, extension)
}

/// Partial update of a stored record. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub content_hash: Option<String>,
    pub file_size: Option<u64>,
    pub capture_time: Patch<NaiveDateTime>,
    pub relative_path: Option<String>,
    pub camera_make: Patch<String>,
    pub camera_model: Patch<String>,
    pub gps_latitude: Patch<f64>,
    pub gps_longitude: Patch<f64>,
    pub gps_altitude: Patch<f64>,
    pub image_width: Patch<u32>,
    pub image_height: Patch<u32>,
    pub f_number: Patch<f64>,
    pub exposure_time: Patch<f64>,
    pub iso: Patch<u32>,
    pub focal_length_in_35mm: Patch<u32>,
    pub duration: Patch<f64>,
}

impl RecordPatch {
    /// Patch for the fields an identity reload recomputes.
    pub fn identity(content_hash: String, file_size: u64, relative_path: String) -> Self {
        Self {
            content_hash: Some(content_hash),
            file_size: Some(file_size),
            relative_path: Some(relative_path),
            ..Default::default()
        }
    }

    /// Patch that replaces capture time and all metadata fields.
    pub fn metadata(metadata: &MediaMetadata) -> Self {
        Self {
            capture_time: Patch::set(metadata.capture_time),
            camera_make: Patch::set(metadata.camera_make.clone()),
            camera_model: Patch::set(metadata.camera_model.clone()),
            image_width: Patch::set(metadata.image_width),
            image_height: Patch::set(metadata.image_height),
            f_number: Patch::set(metadata.f_number),
            exposure_time: Patch::set(metadata.exposure_time),
            iso: Patch::set(metadata.iso),
            focal_length_in_35mm: Patch::set(metadata.focal_length_in_35mm),
            duration: Patch::set(metadata.duration),
            ..Self::gps(metadata.gps)
        }
    }

    /// Patch that touches exactly the three GPS fields.
    pub fn gps(gps: GpsCoordinates) -> Self {
        Self {
            gps_latitude: Patch::set(gps.latitude),
            gps_longitude: Patch::set(gps.longitude),
            gps_altitude: Patch::set(gps.altitude),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content_hash.is_none()
            && self.file_size.is_none()
            && self.capture_time.is_absent()
            && self.relative_path.is_none()
            && self.camera_make.is_absent()
            && self.camera_model.is_absent()
            && self.gps_latitude.is_absent()
            && self.gps_longitude.is_absent()
            && self.gps_altitude.is_absent()
            && self.image_width.is_absent()
            && self.image_height.is_absent()
            && self.f_number.is_absent()
            && self.exposure_time.is_absent()
            && self.iso.is_absent()
            && self.focal_length_in_35mm.is_absent()
            && self.duration.is_absent()
    }

    pub fn apply_to(&self, record: &mut MediaRecord) {
        if let Some(ref hash) = self.content_hash {
            record.content_hash = hash.clone();
        }
        if let Some(size) = self.file_size {
            record.file_size = size;
        }
        self.capture_time.apply(&mut record.capture_time);
        if let Some(ref path) = self.relative_path {
            let (filename, extension) = split_file_name(path);
            record.relative_path = path.clone();
            record.filename = filename;
            record.extension = extension;
        }
        self.camera_make.apply(&mut record.camera_make);
        self.camera_model.apply(&mut record.camera_model);
        self.gps_latitude.apply(&mut record.gps_latitude);
        self.gps_longitude.apply(&mut record.gps_longitude);
        self.gps_altitude.apply(&mut record.gps_altitude);
        self.image_width.apply(&mut record.image_width);
        self.image_height.apply(&mut record.image_height);
        self.f_number.apply(&mut record.f_number);
        self.exposure_time.apply(&mut record.exposure_time);
        self.iso.apply(&mut record.iso);
        self.focal_length_in_35mm
            .apply(&mut record.focal_length_in_35mm);
        self.duration.apply(&mut record.duration);
    }
}
