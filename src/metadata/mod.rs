//! Metadata extraction collaborator.
//!
//! The catalog only needs a structured bundle of capture time, camera, GPS,
//! dimension and exposure fields. Every field is optional and a file with no
//! readable metadata at all is still cataloged.

mod image;
mod video;

pub use self::image::ExifExtractor;

use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extracts capture-time, camera and location metadata from a media file.
pub trait MetadataExtractor: Send + Sync {
    /// Returns `Ok(None)` when the file carries no metadata this extractor
    /// understands.
    fn extract(&self, path: &Path) -> Result<Option<MediaMetadata>, MetadataError>;
}

/// Extractor that never finds anything; capture times fall back to the file
/// modification time.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataExtractor for NoMetadata {
    fn extract(&self, _path: &Path) -> Result<Option<MediaMetadata>, MetadataError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub capture_time: Option<NaiveDateTime>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub gps: GpsCoordinates,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub f_number: Option<f64>,
    /// Seconds
    pub exposure_time: Option<f64>,
    pub iso: Option<u32>,
    pub focal_length_in_35mm: Option<u32>,
    /// Seconds, videos only
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum GpsParseError {
    #[error("expected latitude,longitude,altitude but got {0} component(s)")]
    ComponentCount(usize),
    #[error("invalid GPS component {0:?}")]
    InvalidNumber(String),
}

impl GpsCoordinates {
    pub fn is_empty(&self) -> bool {
        self.latitude.is_none() && self.longitude.is_none() && self.altitude.is_none()
    }
}

impl FromStr for GpsCoordinates {
    type Err = GpsParseError;

    /// Parse `"lat,lon,alt"` or `"lat lon alt"`. Components are separated by
    /// a comma or a run of whitespace, so `"1,2 3"` is accepted too. An empty
    /// component between commas means the field is absent, so `"31.2,121.5,"`
    /// has no altitude.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<&str> = Vec::new();
        for piece in s.split(',').map(str::trim) {
            if piece.is_empty() {
                parts.push(piece);
            } else {
                parts.extend(piece.split_whitespace());
            }
        }

        if parts.len() != 3 {
            return Err(GpsParseError::ComponentCount(parts.len()));
        }

        let parse = |raw: &str| -> Result<Option<f64>, GpsParseError> {
            if raw.is_empty() {
                return Ok(None);
            }
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| GpsParseError::InvalidNumber(raw.to_string()))
        };

        Ok(Self {
            latitude: parse(parts[0])?,
            longitude: parse(parts[1])?,
            altitude: parse(parts[2])?,
        })
    }
}
