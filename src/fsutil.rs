//! Filesystem collaborators: path normalization, timestamp-preserving copy
//! and file modification time.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use filetime::FileTime;

/// Canonical absolute form of `path` for comparisons.
///
/// Existing paths are canonicalized (symlinks resolved); paths that do not
/// exist yet are made absolute and cleaned lexically.
pub fn normalize(path: &Path) -> io::Result<PathBuf> {
    if path.exists() {
        return dunce::canonicalize(path);
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    Ok(clean)
}

/// Copy file bytes from `src` to `dst` and carry over access and modification
/// times. Returns the number of bytes copied.
pub fn copy_preserving_times(src: &Path, dst: &Path) -> io::Result<u64> {
    let bytes = fs::copy(src, dst)?;
    let meta = fs::metadata(src)?;
    filetime::set_file_times(
        dst,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )?;
    Ok(bytes)
}

/// Modification time of `path` as local wall-clock time, the same form EXIF
/// capture times take.
pub fn file_time(path: &Path) -> io::Result<NaiveDateTime> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).naive_local())
}
