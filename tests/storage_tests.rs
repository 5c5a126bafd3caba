use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;
use media_catalog::metadata::{GpsCoordinates, MediaMetadata, MetadataError, MetadataExtractor};
use media_catalog::storage::models::{MediaRecord, MediaType, RecordPatch};
use media_catalog::storage::{Catalog, CatalogOptions, Constraint, DatabaseError, Field, Predicate};

/// Every file was captured at the same instant.
struct FixedTime(NaiveDateTime);

impl MetadataExtractor for FixedTime {
    fn extract(&self, _path: &Path) -> Result<Option<MediaMetadata>, MetadataError> {
        Ok(Some(MediaMetadata {
            capture_time: Some(self.0),
            camera_make: Some("Canon".to_string()),
            ..Default::default()
        }))
    }
}

fn time(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn test_options() -> CatalogOptions {
    CatalogOptions::default().with_extractor(Arc::new(FixedTime(time("2020-05-01 12:00:00"))))
}

fn test_db() -> (tempfile::TempDir, Catalog) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::create(dir.path(), &test_options()).unwrap();
    (dir, catalog)
}

fn sample_record(hash: &str, relative_path: &str) -> MediaRecord {
    let mut record = MediaRecord::new(hash, 1024, Some(time("2020-05-01 12:00:00")), relative_path);
    record.camera_make = Some("Canon".to_string());
    record.image_width = Some(4000);
    record.image_height = Some(3000);
    record
}

fn sample_record_with_gps(hash: &str, relative_path: &str) -> MediaRecord {
    let mut record = sample_record(hash, relative_path);
    record.gps_latitude = Some(31.2304);
    record.gps_longitude = Some(121.4737);
    record.gps_altitude = Some(4.5);
    record
}

#[test]
fn test_insert_and_get_record() {
    let (_dir, mut catalog) = test_db();
    let id = catalog.insert(&sample_record("h1", "2020/a.jpg")).unwrap();

    let retrieved = catalog.get_by_id(id).unwrap().expect("record should exist");
    assert_eq!(retrieved.id, id);
    assert_eq!(retrieved.relative_path, "2020/a.jpg");
    assert_eq!(retrieved.filename, "a.jpg");
    assert_eq!(retrieved.extension, "jpg");
    assert_eq!(retrieved.camera_make, Some("Canon".to_string()));
    assert_eq!(retrieved.image_width, Some(4000));
    assert_eq!(retrieved.gps_latitude, None);
    assert_eq!(retrieved.media_type(), Some(MediaType::Image));
}

#[test]
fn test_get_record_not_found() {
    let (_dir, catalog) = test_db();
    assert!(catalog.get_by_id(42).unwrap().is_none());
    assert!(catalog
        .get(&Predicate::all().equals(Field::RelativePath, "no/such/file.jpg"))
        .unwrap()
        .is_none());
}

#[test]
fn test_records_survive_reopen_after_commit() {
    let (dir, mut catalog) = test_db();
    catalog.insert(&sample_record("h1", "a.jpg")).unwrap();
    catalog.insert(&sample_record_with_gps("h2", "b.jpg")).unwrap();
    catalog.commit().unwrap();
    drop(catalog);

    let catalog = Catalog::open(dir.path(), &test_options()).unwrap();
    let records = catalog.all_records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].gps_altitude, Some(4.5));
}

#[test]
fn test_uncommitted_session_is_not_durable() {
    let (dir, mut catalog) = test_db();
    catalog.insert(&sample_record("h1", "a.jpg")).unwrap();
    assert_eq!(catalog.len().unwrap(), 1);
    drop(catalog);

    let catalog = Catalog::open(dir.path(), &test_options()).unwrap();
    assert_eq!(catalog.len().unwrap(), 0);
}

#[test]
fn test_duplicate_content_hash_is_rejected_not_overwritten() {
    let (_dir, mut catalog) = test_db();
    let first = catalog.insert(&sample_record("same", "a.jpg")).unwrap();

    match catalog.insert(&sample_record("same", "b.jpg")) {
        Err(DatabaseError::DuplicateIdentity {
            content_hash,
            existing_id,
        }) => {
            assert_eq!(content_hash, "same");
            assert_eq!(existing_id, first);
        }
        other => panic!("expected DuplicateIdentity, got {other:?}"),
    }
    assert_eq!(catalog.len().unwrap(), 1);
    assert_eq!(
        catalog.get_by_id(first).unwrap().unwrap().relative_path,
        "a.jpg"
    );
}

#[test]
fn test_add_two_files_with_identical_windows_keeps_one() {
    let (dir, mut catalog) = test_db();
    std::fs::write(dir.path().join("a.jpg"), b"identical bytes").unwrap();
    std::fs::create_dir(dir.path().join("copy")).unwrap();
    std::fs::write(dir.path().join("copy").join("a.jpg"), b"identical bytes").unwrap();

    assert!(catalog.add(&dir.path().join("a.jpg")).unwrap().is_some());
    assert!(catalog.add(&dir.path().join("copy").join("a.jpg")).unwrap().is_none());
    assert_eq!(catalog.len().unwrap(), 1);
}

#[test]
fn test_add_outside_root_is_rejected() {
    let (_dir, mut catalog) = test_db();
    let elsewhere = tempfile::tempdir().unwrap();
    let path = elsewhere.path().join("x.jpg");
    std::fs::write(&path, b"x").unwrap();

    assert!(matches!(
        catalog.add(&path),
        Err(DatabaseError::OutsideRoot { .. })
    ));
}

#[test]
fn test_query_by_constraints() {
    let (_dir, mut catalog) = test_db();
    catalog.insert(&sample_record("h1", "a.jpg")).unwrap();
    catalog.insert(&sample_record_with_gps("h2", "b.jpg")).unwrap();
    let mut video = sample_record("h3", "clip.mp4");
    video.capture_time = None;
    catalog.insert(&video).unwrap();

    let with_gps = Predicate::all().with(Field::GpsLatitude, Constraint::IsNotNull);
    let found: Vec<MediaRecord> = catalog.iter(&with_gps).collect::<Result<_, _>>().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].relative_path, "b.jpg");

    let untimed = Predicate::all().with(Field::CaptureTime, Constraint::IsNull);
    assert_eq!(catalog.iter(&untimed).count(), 1);

    let videos = Predicate::all().equals(Field::MediaType, MediaType::Video);
    assert_eq!(
        catalog.get(&videos).unwrap().unwrap().relative_path,
        "clip.mp4"
    );

    let exact = Predicate::all().gps(GpsCoordinates {
        latitude: Some(31.2304),
        longitude: Some(121.4737),
        altitude: Some(4.5),
    });
    assert_eq!(catalog.iter(&exact).count(), 1);

    // An absent component must be null in the record
    let no_altitude = Predicate::all().gps(GpsCoordinates {
        latitude: Some(31.2304),
        longitude: Some(121.4737),
        altitude: None,
    });
    assert_eq!(catalog.iter(&no_altitude).count(), 0);
}

#[test]
fn test_iteration_is_restartable_and_ordered() {
    let (_dir, mut catalog) = test_db();
    for (hash, path) in [("h1", "z.jpg"), ("h2", "m.jpg"), ("h3", "a.jpg")] {
        catalog.insert(&sample_record(hash, path)).unwrap();
    }
    catalog.commit().unwrap();

    let all = Predicate::all();
    let first: Vec<String> = catalog
        .iter(&all)
        .map(|r| r.unwrap().relative_path)
        .collect();
    let second: Vec<String> = catalog
        .iter(&all)
        .map(|r| r.unwrap().relative_path)
        .collect();
    assert_eq!(first, vec!["z.jpg", "m.jpg", "a.jpg"]);
    assert_eq!(first, second);
}

#[test]
fn test_get_with_two_matches_is_ambiguous() {
    let (_dir, mut catalog) = test_db();
    catalog.insert(&sample_record("h1", "a.jpg")).unwrap();
    catalog.insert(&sample_record("h2", "b.jpg")).unwrap();

    let by_make = Predicate::all().equals(Field::CameraMake, "Canon");
    assert!(matches!(
        catalog.get(&by_make),
        Err(DatabaseError::AmbiguousQuery { .. })
    ));
}

#[test]
fn test_update_patch_and_full_replace() {
    let (_dir, mut catalog) = test_db();
    let id = catalog.insert(&sample_record_with_gps("h1", "a.jpg")).unwrap();

    let patch = RecordPatch::gps(GpsCoordinates::default());
    assert!(catalog.update(id, &patch).unwrap());
    let cleared = catalog.get_by_id(id).unwrap().unwrap();
    assert!(cleared.gps().is_empty());
    assert_eq!(cleared.camera_make, Some("Canon".to_string()));

    let replacement = sample_record("h9", "moved/b.mov");
    assert!(catalog.update_full(id, &replacement).unwrap());
    let replaced = catalog.get_by_id(id).unwrap().unwrap();
    assert_eq!(replaced.id, id);
    assert_eq!(replaced.content_hash, "h9");
    assert_eq!(replaced.filename, "b.mov");
    assert_eq!(replaced.media_type(), Some(MediaType::Video));
    assert_eq!(catalog.len().unwrap(), 1);
}

#[test]
fn test_update_conflicting_hash_leaves_both_records() {
    let (_dir, mut catalog) = test_db();
    let a = catalog.insert(&sample_record("h1", "a.jpg")).unwrap();
    let b = catalog.insert(&sample_record("h2", "b.jpg")).unwrap();

    let patch = RecordPatch {
        content_hash: Some("h2".to_string()),
        ..Default::default()
    };
    let err = catalog.update(a, &patch).unwrap_err();
    assert!(matches!(err, DatabaseError::DuplicateIdentity { existing_id, .. } if existing_id == b));
    assert_eq!(catalog.get_by_id(a).unwrap().unwrap().content_hash, "h1");
}

#[test]
fn test_duplicate_relative_path_is_rejected() {
    let (_dir, mut catalog) = test_db();
    catalog.insert(&sample_record("h1", "a.jpg")).unwrap();
    let b = catalog.insert(&sample_record("h2", "b.jpg")).unwrap();

    let patch = RecordPatch {
        relative_path: Some("a.jpg".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        catalog.update(b, &patch),
        Err(DatabaseError::DuplicatePath { .. })
    ));
}

#[test]
fn test_catalog_reattaches_under_moved_root() {
    let (dir, mut catalog) = test_db();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub").join("a.jpg"), b"alpha").unwrap();
    catalog.add(&dir.path().join("sub").join("a.jpg")).unwrap().unwrap();
    catalog.commit().unwrap();
    drop(catalog);

    let moved = tempfile::tempdir().unwrap();
    let new_root = moved.path().join("relocated");
    std::fs::rename(dir.path(), &new_root).unwrap();

    let catalog = Catalog::open(&new_root, &test_options()).unwrap();
    let record = catalog.all_records().unwrap().remove(0);
    assert_eq!(record.relative_path, "sub/a.jpg");
    assert!(catalog.abspath(&record.relative_path).is_file());
}
