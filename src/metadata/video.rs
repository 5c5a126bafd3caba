use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use mp4parse::{read_mp4, TrackType};
use tracing::debug;

use super::{MediaMetadata, MetadataError};

/// Containers mp4parse understands.
const ISO_BMFF_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "3gp", "3g2"];

pub(super) fn read_video(path: &Path) -> Result<Option<MediaMetadata>, MetadataError> {
    let is_bmff = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| ISO_BMFF_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false);
    if !is_bmff {
        return Ok(None);
    }

    let mut reader = BufReader::new(File::open(path)?);
    let context = match read_mp4(&mut reader) {
        Ok(context) => context,
        Err(e) => {
            debug!(path = %path.display(), error = ?e, "Failed to parse video container");
            return Ok(None);
        }
    };

    let mut duration: Option<f64> = None;
    let mut dimensions: Option<(u32, u32)> = None;

    for track in &context.tracks {
        if let (Some(scaled), Some(timescale)) = (track.duration, track.timescale) {
            if timescale.0 > 0 {
                let seconds = scaled.0 as f64 / timescale.0 as f64;
                duration = Some(duration.map_or(seconds, |longest| longest.max(seconds)));
            }
        }

        if track.track_type == TrackType::Video && dimensions.is_none() {
            // tkhd stores 16.16 fixed point
            dimensions = track
                .tkhd
                .as_ref()
                .map(|tkhd| (tkhd.width >> 16, tkhd.height >> 16));
        }
    }

    if duration.is_none() && dimensions.is_none() {
        return Ok(None);
    }

    Ok(Some(MediaMetadata {
        duration,
        image_width: dimensions.map(|(w, _)| w),
        image_height: dimensions.map(|(_, h)| h),
        ..Default::default()
    }))
}
