use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use media_catalog::metadata::{GpsCoordinates, MediaMetadata, MetadataError, MetadataExtractor};
use media_catalog::scan;
use media_catalog::storage::{Catalog, CatalogOptions, Field, Predicate};
use media_catalog::sync::{self, DiffOptions, DirectionCounts, MergeOptions, MergeSummary};
use media_catalog::update::{self, UpdateOp};

/// Capture time derived from the file name: `20200501-a.jpg` was taken at
/// midnight on 2020-05-01.
struct TimeFromName;

impl MetadataExtractor for TimeFromName {
    fn extract(&self, path: &Path) -> Result<Option<MediaMetadata>, MetadataError> {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        let capture_time = name
            .get(..8)
            .and_then(|day| NaiveDateTime::parse_from_str(&format!("{day}000000"), "%Y%m%d%H%M%S").ok());
        Ok(capture_time.map(|t| MediaMetadata {
            capture_time: Some(t),
            ..Default::default()
        }))
    }
}

fn test_options() -> CatalogOptions {
    CatalogOptions::default().with_extractor(Arc::new(TimeFromName))
}

fn write(root: &Path, relative: &str, data: &[u8]) -> PathBuf {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, data).unwrap();
    path
}

/// A tree with three photos, one of them in a nested directory.
fn sample_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "20200501-a.jpg", &[1u8; 100]);
    write(dir.path(), "20200501-b.jpg", &[2u8; 200]);
    write(dir.path(), "trip/20211224-c.mov", &[3u8; 300]);
    dir
}

fn built(root: &Path) -> Catalog {
    let mut catalog = Catalog::create(root, &test_options()).unwrap();
    scan::build(&mut catalog).unwrap();
    catalog
}

#[test]
fn test_merge_into_empty_tree() {
    let a_dir = sample_tree();
    let b_dir = tempfile::tempdir().unwrap();
    let a = built(a_dir.path());
    let mut b = built(b_dir.path());

    let summary = sync::merge(&a, &mut b, MergeOptions::default()).unwrap();
    assert_eq!(
        summary,
        MergeSummary {
            scanned: 3,
            common: 0,
            copied: 3,
            registered: 0,
            conflicted: 0,
            failed: 0,
        }
    );

    for expected in [
        "2020/202005/20200501/jpg/20200501-a.jpg",
        "2020/202005/20200501/jpg/20200501-b.jpg",
        "2021/202112/20211224/mov/20211224-c.mov",
    ] {
        assert!(b_dir.path().join(expected).is_file(), "missing {expected}");
        let by_path = Predicate::all().equals(Field::RelativePath, expected);
        assert!(b.get(&by_path).unwrap().is_some(), "unregistered {expected}");
    }

    let report = sync::diff(&a, &b, DiffOptions::default()).unwrap();
    let all_common = DirectionCounts {
        common: 3,
        exclusive: 0,
    };
    assert_eq!(report.left, Some(all_common));
    assert_eq!(report.right, Some(all_common));
}

#[test]
fn test_rescanning_merged_tree_finds_nothing_new() {
    let a_dir = sample_tree();
    let b_dir = tempfile::tempdir().unwrap();
    let a = built(a_dir.path());
    let mut b = built(b_dir.path());
    sync::merge(&a, &mut b, MergeOptions::default()).unwrap();
    drop(b);

    // A fresh scan of the destination tree yields the same identities
    let mut b = Catalog::open(b_dir.path(), &test_options()).unwrap();
    let rescan = scan::build(&mut b).unwrap();
    assert_eq!(rescan.added, 0);
    assert_eq!(rescan.skipped, 3);
}

#[test]
fn test_second_merge_is_a_noop() {
    let a_dir = sample_tree();
    let b_dir = tempfile::tempdir().unwrap();
    let a = built(a_dir.path());
    let mut b = built(b_dir.path());

    sync::merge(&a, &mut b, MergeOptions::default()).unwrap();
    let second = sync::merge(&a, &mut b, MergeOptions::default()).unwrap();

    assert_eq!(second.common, 3);
    assert_eq!(second.copied + second.registered, 0);
    assert_eq!(b.len().unwrap(), 3);
}

#[test]
fn test_interrupted_merge_recovers_without_copying() {
    let a_dir = sample_tree();
    let b_dir = tempfile::tempdir().unwrap();
    let a = built(a_dir.path());

    // First run copies everything but never commits
    {
        let mut b = built(b_dir.path());
        for record in a.all_records().unwrap() {
            let time = record.capture_time.unwrap();
            let relative = sync::destination_relpath(&record, time);
            write(
                b_dir.path(),
                &relative,
                &std::fs::read(a.abspath(&record.relative_path)).unwrap(),
            );
        }
        assert!(b.is_empty().unwrap());
    }

    let mut b = Catalog::open(b_dir.path(), &test_options()).unwrap();
    let summary = sync::merge(&a, &mut b, MergeOptions::default()).unwrap();
    assert_eq!(summary.copied, 0);
    assert_eq!(summary.registered, 3);
    assert_eq!(b.len().unwrap(), 3);

    let report = sync::diff(&a, &b, DiffOptions::default()).unwrap();
    assert_eq!(report.left.unwrap().exclusive, 0);
}

#[test]
fn test_diff_directions_are_independent() {
    let a_dir = sample_tree();
    let b_dir = tempfile::tempdir().unwrap();
    write(b_dir.path(), "20200501-a.jpg", &[1u8; 100]);
    write(b_dir.path(), "20230101-z.jpg", &[9u8; 50]);
    let a = built(a_dir.path());
    let b = built(b_dir.path());

    let report = sync::diff(&a, &b, DiffOptions::default()).unwrap();
    assert_eq!(
        report.left,
        Some(DirectionCounts {
            common: 1,
            exclusive: 2
        })
    );
    assert_eq!(
        report.right,
        Some(DirectionCounts {
            common: 1,
            exclusive: 1
        })
    );

    let only_right = sync::diff(
        &a,
        &b,
        DiffOptions {
            left: false,
            right: true,
        },
    )
    .unwrap();
    assert_eq!(only_right.left, None);
}

#[test]
fn test_set_gps_dry_run_then_live() {
    let a_dir = sample_tree();
    let mut a = built(a_dir.path());
    let gps: GpsCoordinates = "31.2,121.5,".parse().unwrap();
    let jpgs = Predicate::all().equals(Field::Extension, "jpg");

    let planned = update::run(&mut a, UpdateOp::SetGps(gps), &jpgs, true).unwrap();
    assert_eq!(planned.found, 2);
    assert_eq!(planned.updated, 2);
    let with_gps = Predicate::all().with(
        Field::GpsLatitude,
        media_catalog::storage::Constraint::IsNotNull,
    );
    assert_eq!(a.iter(&with_gps).count(), 0);

    let actual = update::run(&mut a, UpdateOp::SetGps(gps), &jpgs, false).unwrap();
    assert_eq!(planned, actual);
    assert_eq!(a.iter(&with_gps).count(), 2);

    let again = update::run(&mut a, UpdateOp::SetGps(gps), &jpgs, false).unwrap();
    assert_eq!(again.updated, 0);
}
