//! Record predicates.
//!
//! A [`Predicate`] is an explicit list of field constraints. A field that is
//! not mentioned is unconstrained. The catalog treats an empty predicate as
//! "every record"; whether an empty user query should select anything is a
//! decision for the calling layer.

use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime};

use super::models::{Identity, MediaRecord, MediaType};
use crate::metadata::GpsCoordinates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    ContentHash,
    FileSize,
    CaptureTime,
    /// Calendar day of the capture time
    CaptureDate,
    RelativePath,
    Filename,
    Extension,
    /// Derived from the extension
    MediaType,
    CameraMake,
    CameraModel,
    GpsLatitude,
    GpsLongitude,
    GpsAltitude,
    ImageWidth,
    ImageHeight,
    Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(u64),
    Float(f64),
    Text(String),
    Time(NaiveDateTime),
    Date(NaiveDate),
}

impl FieldValue {
    /// Ordering between values of the same kind; `None` across kinds.
    fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Time(a), FieldValue::Time(b)) => Some(a.cmp(b)),
            (FieldValue::Date(a), FieldValue::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(v: NaiveDateTime) -> Self {
        FieldValue::Time(v)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(v: NaiveDate) -> Self {
        FieldValue::Date(v)
    }
}

impl From<MediaType> for FieldValue {
    fn from(v: MediaType) -> Self {
        FieldValue::Text(v.as_str().to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Equals(FieldValue),
    IsNotNull,
    IsNull,
    /// No filtering on this field
    Unconstrained,
    /// Field is present and `>=` the value
    AtLeast(FieldValue),
    /// Field is present and `<=` the value
    AtMost(FieldValue),
}

impl Constraint {
    /// `Equals` for a present value, `IsNull` for an absent one.
    pub fn equals_or_null<V: Into<FieldValue>>(value: Option<V>) -> Self {
        match value {
            Some(v) => Constraint::Equals(v.into()),
            None => Constraint::IsNull,
        }
    }

    fn accepts(&self, value: Option<&FieldValue>) -> bool {
        match (self, value) {
            (Constraint::Unconstrained, _) => true,
            (Constraint::IsNull, v) => v.is_none(),
            (Constraint::IsNotNull, v) => v.is_some(),
            (Constraint::Equals(expected), Some(v)) => v == expected,
            (Constraint::AtLeast(bound), Some(v)) => {
                matches!(v.compare(bound), Some(Ordering::Greater | Ordering::Equal))
            }
            (Constraint::AtMost(bound), Some(v)) => {
                matches!(v.compare(bound), Some(Ordering::Less | Ordering::Equal))
            }
            (_, None) => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    constraints: Vec<(Field, Constraint)>,
}

impl Predicate {
    /// A predicate with no constraints.
    pub fn all() -> Self {
        Self::default()
    }

    /// Records whose identity triple matches exactly. An absent capture time
    /// only matches an absent capture time.
    pub fn identity(identity: &Identity) -> Self {
        Self::all()
            .equals(Field::ContentHash, identity.content_hash.as_str())
            .equals(Field::FileSize, identity.file_size)
            .with(
                Field::CaptureTime,
                Constraint::equals_or_null(identity.capture_time),
            )
    }

    /// Equality on the three GPS fields; absent components must be null.
    pub fn gps(self, gps: GpsCoordinates) -> Self {
        self.with(Field::GpsLatitude, Constraint::equals_or_null(gps.latitude))
            .with(Field::GpsLongitude, Constraint::equals_or_null(gps.longitude))
            .with(Field::GpsAltitude, Constraint::equals_or_null(gps.altitude))
    }

    pub fn with(mut self, field: Field, constraint: Constraint) -> Self {
        if constraint != Constraint::Unconstrained {
            self.constraints.push((field, constraint));
        }
        self
    }

    pub fn equals(self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, Constraint::Equals(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn constraints(&self) -> &[(Field, Constraint)] {
        &self.constraints
    }

    pub fn matches(&self, record: &MediaRecord) -> bool {
        self.constraints
            .iter()
            .all(|(field, constraint)| constraint.accepts(record.field(*field).as_ref()))
    }

    /// Content hash pinned by an `Equals` constraint, used to answer through
    /// the hash index instead of a scan.
    pub(crate) fn pinned_content_hash(&self) -> Option<&str> {
        self.constraints.iter().find_map(|(field, c)| match (field, c) {
            (Field::ContentHash, Constraint::Equals(FieldValue::Text(hash))) => {
                Some(hash.as_str())
            }
            _ => None,
        })
    }

    /// Id pinned by an `Equals` constraint.
    pub(crate) fn pinned_id(&self) -> Option<u64> {
        self.constraints.iter().find_map(|(field, c)| match (field, c) {
            (Field::Id, Constraint::Equals(FieldValue::Int(id))) => Some(*id),
            _ => None,
        })
    }
}

impl MediaRecord {
    /// Value of `field` for this record, `None` when the field is null.
    pub fn field(&self, field: Field) -> Option<FieldValue> {
        match field {
            Field::Id => Some(self.id.into()),
            Field::ContentHash => Some(self.content_hash.clone().into()),
            Field::FileSize => Some(self.file_size.into()),
            Field::CaptureTime => self.capture_time.map(Into::into),
            Field::CaptureDate => self.capture_time.map(|t| t.date().into()),
            Field::RelativePath => Some(self.relative_path.clone().into()),
            Field::Filename => Some(self.filename.clone().into()),
            Field::Extension => Some(self.extension.clone().into()),
            Field::MediaType => self.media_type().map(Into::into),
            Field::CameraMake => self.camera_make.clone().map(Into::into),
            Field::CameraModel => self.camera_model.clone().map(Into::into),
            Field::GpsLatitude => self.gps_latitude.map(Into::into),
            Field::GpsLongitude => self.gps_longitude.map(Into::into),
            Field::GpsAltitude => self.gps_altitude.map(Into::into),
            Field::ImageWidth => self.image_width.map(Into::into),
            Field::ImageHeight => self.image_height.map(Into::into),
            Field::Duration => self.duration.map(Into::into),
        }
    }
}
