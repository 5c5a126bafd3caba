use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ::exif::{Exif, In, Reader, Tag, Value};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use super::{video, GpsCoordinates, MediaMetadata, MetadataError, MetadataExtractor};
use crate::storage::models::MediaType;

/// Reads EXIF tags from images and track headers from MP4/QuickTime videos.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifExtractor;

impl MetadataExtractor for ExifExtractor {
    fn extract(&self, path: &Path) -> Result<Option<MediaMetadata>, MetadataError> {
        match MediaType::from_path(path) {
            Some(MediaType::Image) => read_image(path),
            Some(MediaType::Video) => video::read_video(path),
            None => Ok(None),
        }
    }
}

fn read_image(path: &Path) -> Result<Option<MediaMetadata>, MetadataError> {
    let mut reader = BufReader::new(File::open(path)?);
    let exif = match Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No readable EXIF data");
            return Ok(None);
        }
    };

    let metadata = metadata_from_exif(&exif);
    debug!(path = %path.display(), ?metadata, "Extracted EXIF metadata");
    Ok(Some(metadata))
}

fn metadata_from_exif(exif: &Exif) -> MediaMetadata {
    let capture_time = datetime(exif, Tag::DateTimeOriginal)
        .or_else(|| datetime(exif, Tag::DateTimeDigitized))
        .or_else(|| datetime(exif, Tag::DateTime));

    let below_sea_level = uint(exif, Tag::GPSAltitudeRef) == Some(1);
    let gps = GpsCoordinates {
        latitude: coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef),
        longitude: coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef),
        altitude: rational(exif, Tag::GPSAltitude).map(|alt| {
            if below_sea_level {
                -alt
            } else {
                alt
            }
        }),
    };

    MediaMetadata {
        capture_time,
        camera_make: ascii(exif, Tag::Make),
        camera_model: ascii(exif, Tag::Model),
        gps,
        image_width: uint(exif, Tag::PixelXDimension).or_else(|| uint(exif, Tag::ImageWidth)),
        image_height: uint(exif, Tag::PixelYDimension)
            .or_else(|| uint(exif, Tag::ImageLength)),
        f_number: rational(exif, Tag::FNumber),
        exposure_time: rational(exif, Tag::ExposureTime),
        iso: uint(exif, Tag::PhotographicSensitivity),
        focal_length_in_35mm: uint(exif, Tag::FocalLengthIn35mmFilm),
        duration: None,
    }
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(ref parts) => parts
            .first()
            .map(|raw| {
                String::from_utf8_lossy(raw)
                    .trim_end_matches('\0')
                    .trim()
                    .to_string()
            })
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn uint(exif: &Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY)?.value.get_uint(0)
}

fn rational(exif: &Exif, tag: Tag) -> Option<f64> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(ref values) => values
            .first()
            .map(|r| r.to_f64())
            .filter(|v| v.is_finite()),
        _ => None,
    }
}

fn datetime(exif: &Exif, tag: Tag) -> Option<NaiveDateTime> {
    let Value::Ascii(ref parts) = exif.get_field(tag, In::PRIMARY)?.value else {
        return None;
    };
    let dt = ::exif::DateTime::from_ascii(parts.first()?).ok()?;
    NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?.and_hms_opt(
        dt.hour.into(),
        dt.minute.into(),
        dt.second.into(),
    )
}

/// Degrees/minutes/seconds to signed decimal degrees.
fn coordinate(exif: &Exif, tag: Tag, reference: Tag) -> Option<f64> {
    let Value::Rational(ref dms) = exif.get_field(tag, In::PRIMARY)?.value else {
        return None;
    };
    if dms.len() < 3 {
        return None;
    }

    let degrees = dms[0].to_f64() + dms[1].to_f64() / 60.0 + dms[2].to_f64() / 3600.0;
    let signed = match ascii(exif, reference).as_deref() {
        Some("S") | Some("W") => -degrees,
        _ => degrees,
    };
    Some(signed).filter(|v| v.is_finite())
}
