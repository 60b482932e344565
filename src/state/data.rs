/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the remote store, the local cache and the presentation layer.
/// Decoding is lenient: the remote spreadsheet and old cache
/// payloads may carry nulls, numeric strings or missing fields.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Prefix for client-generated record ids
pub const ID_PREFIX: &str = "obra-";

/// Length of the random base-36 suffix of generated ids
const ID_SUFFIX_LEN: usize = 6;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// One image attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    /// Embeddable image string (`data:` URL) or remote URL
    #[serde(default, deserialize_with = "lenient_string")]
    pub src: String,
    /// Caption, may be empty
    #[serde(default, deserialize_with = "lenient_string")]
    pub alt: String,
    /// Capture time. Raw payloads may omit it; normalization fills it in,
    /// so every photo in the canonical list carries one.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub taken_at: Option<DateTime<Utc>>,
}

impl Photo {
    pub fn new(src: impl Into<String>, alt: impl Into<String>, taken_at: DateTime<Utc>) -> Self {
        Self {
            src: src.into(),
            alt: alt.into(),
            taken_at: Some(taken_at),
        }
    }
}

/// One construction project ("obra")
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub engineer: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: String,
    /// ISO 8601 calendar date, kept verbatim
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_date: String,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<String>,
    /// Open enumeration ("Em andamento", "Concluída", ...), round-tripped as-is
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    /// Always within 0..=100
    #[serde(default, deserialize_with = "lenient_completion")]
    pub completion: u8,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover: Option<String>,
    #[serde(default, deserialize_with = "lenient_photos")]
    pub photos: Vec<Photo>,
}

impl Record {
    /// The 4-digit year of `start_date`, if it parses as a date
    pub fn start_year(&self) -> Option<i32> {
        use chrono::Datelike;
        parse_timestamp(&self.start_date).map(|ts| ts.year())
    }

    /// Text the free-text query is matched against (lowercased)
    pub fn search_text(&self) -> String {
        format!("{} {} {}", self.title, self.engineer, self.location).to_lowercase()
    }

    /// Fill in remote-side gaps: photos without a caption take the record title
    pub fn ingest_remote(mut self) -> Self {
        for photo in &mut self.photos {
            if photo.alt.is_empty() {
                photo.alt = self.title.clone();
            }
        }
        self
    }

    /// Shallow merge: fields present in the patch win, absent fields keep old values
    pub fn merge(&mut self, patch: RecordPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(engineer) = patch.engineer {
            self.engineer = engineer;
        }
        if let Some(location) = patch.location {
            self.location = location;
        }
        if let Some(start_date) = patch.start_date {
            self.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            self.end_date = non_empty(end_date);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(completion) = patch.completion {
            self.completion = completion.min(100);
        }
        if let Some(cover) = patch.cover {
            self.cover = non_empty(cover);
        }
        if let Some(photos) = patch.photos {
            self.photos = photos;
        }
    }
}

/// A candidate edit. `None` means "not supplied", never "erase".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub id: String,
    pub title: Option<String>,
    pub engineer: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    /// An empty string clears the end date
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub completion: Option<u8>,
    /// An empty string clears the cover
    pub cover: Option<String>,
    pub photos: Option<Vec<Photo>>,
}

impl RecordPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Build a fresh record from the patch, defaulting whatever is absent
    pub fn into_record(self) -> Record {
        let mut record = Record {
            id: self.id.clone(),
            ..Default::default()
        };
        record.merge(self);
        record
    }
}

impl From<Record> for RecordPatch {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            title: Some(record.title),
            engineer: Some(record.engineer),
            location: Some(record.location),
            start_date: Some(record.start_date),
            end_date: Some(record.end_date.unwrap_or_default()),
            status: Some(record.status),
            completion: Some(record.completion),
            cover: Some(record.cover.unwrap_or_default()),
            photos: Some(record.photos),
        }
    }
}

/// Storage-bounded projection of a record for the local cache
///
/// Photos are truncated and only self-contained `data:` images survive;
/// bare references become empty strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub engineer: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_date: String,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_completion")]
    pub completion: u8,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cover: String,
    #[serde(default, deserialize_with = "lenient_photos")]
    pub photos: Vec<Photo>,
}

impl CachedRecord {
    pub fn project(record: &Record, max_photos: usize, now: DateTime<Utc>) -> Self {
        let photos = record
            .photos
            .iter()
            .take(max_photos)
            .map(|photo| Photo {
                src: embeddable_or_empty(&photo.src),
                alt: photo.alt.clone(),
                taken_at: photo.taken_at.or(Some(now)),
            })
            .collect();

        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            engineer: record.engineer.clone(),
            location: record.location.clone(),
            start_date: record.start_date.clone(),
            end_date: record.end_date.clone(),
            status: record.status.clone(),
            completion: record.completion,
            cover: record.cover.as_deref().map(embeddable_or_empty).unwrap_or_default(),
            photos,
        }
    }

    /// Metadata-only variant used when the full projection does not fit
    pub fn without_media(mut self) -> Self {
        self.cover.clear();
        self.photos.clear();
        self
    }
}

impl From<CachedRecord> for Record {
    fn from(cached: CachedRecord) -> Self {
        Self {
            id: cached.id,
            title: cached.title,
            engineer: cached.engineer,
            location: cached.location,
            start_date: cached.start_date,
            end_date: cached.end_date,
            status: cached.status,
            completion: cached.completion,
            cover: non_empty(cached.cover),
            photos: cached.photos,
        }
    }
}

/// Whether a string is a self-contained embeddable image
pub fn is_embeddable(src: &str) -> bool {
    src.starts_with("data:")
}

fn embeddable_or_empty(src: &str) -> String {
    if is_embeddable(src) {
        src.to_string()
    } else {
        String::new()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Generate a client-side id: `obra-` followed by 6 base-36 characters
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("{ID_PREFIX}{suffix}")
}

/// Clamp a completion value to 0..=100. Non-numeric input maps to 0.
pub fn clamp_completion(value: &Value) -> u8 {
    match value {
        Value::Number(n) => n.as_f64().map(clamp_completion_f64).unwrap_or(0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(clamp_completion_f64)
            .unwrap_or(0),
        Value::Bool(b) => u8::from(*b),
        _ => 0,
    }
}

pub fn clamp_completion_f64(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` or a bare date (midnight UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    lenient_string(deserializer).map(non_empty)
}

fn lenient_completion<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    Ok(clamp_completion(&Value::deserialize(deserializer)?))
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => parse_timestamp(&s),
        // Epoch milliseconds
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}

/// Anything but a list (empty cell, null, stray string) means no photos;
/// list entries that are not photo objects are skipped
fn lenient_photos<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Photo>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<Photo>(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn completion_clamps_and_defaults() {
        assert_eq!(clamp_completion(&json!(-5)), 0);
        assert_eq!(clamp_completion(&json!(150)), 100);
        assert_eq!(clamp_completion(&json!("abc")), 0);
        assert_eq!(clamp_completion(&Value::Null), 0);
        assert_eq!(clamp_completion(&json!("42")), 42);
        assert_eq!(clamp_completion(&json!(67.6)), 68);
    }

    #[test]
    fn decodes_sparse_remote_payload() {
        let record: Record = serde_json::from_value(json!({
            "id": "obra-abc123",
            "title": "Ponte",
            "engineer": null,
            "completion": "250",
            "cover": "",
            "photos": [{ "src": "https://drive/x", "takenAt": "not a date" }]
        }))
        .unwrap();

        assert_eq!(record.engineer, "");
        assert_eq!(record.completion, 100);
        assert_eq!(record.cover, None);
        assert_eq!(record.end_date, None);
        assert_eq!(record.photos[0].taken_at, None);
    }

    #[test]
    fn generated_ids_have_expected_shape() {
        let id = generate_id();
        assert!(id.starts_with(ID_PREFIX));
        let suffix = &id[ID_PREFIX.len()..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn merge_keeps_fields_absent_from_patch() {
        let mut record = Record {
            id: "obra-1".into(),
            title: "Ponte".into(),
            engineer: "Ana".into(),
            completion: 40,
            cover: Some("data:image/jpeg;base64,AAA".into()),
            ..Default::default()
        };
        let mut patch = RecordPatch::new("obra-1");
        patch.completion = Some(90);
        patch.title = Some("Ponte Nova".into());
        record.merge(patch);

        assert_eq!(record.title, "Ponte Nova");
        assert_eq!(record.engineer, "Ana");
        assert_eq!(record.completion, 90);
        assert!(record.cover.is_some());
    }

    #[test]
    fn projection_drops_references_and_truncates() {
        let now = Utc::now();
        let photos = (0..15)
            .map(|i| {
                let src = if i % 2 == 0 {
                    format!("data:image/jpeg;base64,{i}")
                } else {
                    format!("https://drive.example/{i}")
                };
                Photo::new(src, "", now)
            })
            .collect();
        let record = Record {
            id: "obra-1".into(),
            cover: Some("https://drive.example/cover".into()),
            photos,
            ..Default::default()
        };

        let cached = CachedRecord::project(&record, 12, now);
        assert_eq!(cached.photos.len(), 12);
        assert_eq!(cached.cover, "");
        assert_eq!(cached.photos[0].src, "data:image/jpeg;base64,0");
        assert_eq!(cached.photos[1].src, "");
    }

    #[test]
    fn start_year_accepts_dates_and_timestamps() {
        let mut record = Record {
            start_date: "2023-01-01".into(),
            ..Default::default()
        };
        assert_eq!(record.start_year(), Some(2023));
        record.start_date = "2024-05-01T03:00:00.000Z".into();
        assert_eq!(record.start_year(), Some(2024));
        record.start_date = "soon".into();
        assert_eq!(record.start_year(), None);
    }

    #[test]
    fn photos_fall_back_to_empty_for_non_lists() {
        for photos in [json!(""), json!(0), json!("x"), json!({ "src": "a" })] {
            let record: Record =
                serde_json::from_value(json!({ "id": "obra-1", "photos": photos })).unwrap();
            assert!(record.photos.is_empty());
        }

        let record: Record = serde_json::from_value(json!({
            "id": "obra-1",
            "photos": ["stray", { "src": "https://drive/1" }]
        }))
        .unwrap();
        assert_eq!(record.photos.len(), 1);
        assert_eq!(record.photos[0].src, "https://drive/1");
    }

    #[test]
    fn numeric_taken_at_is_epoch_millis() {
        let photo: Photo =
            serde_json::from_value(json!({ "src": "a", "takenAt": 1_700_000_000_000_i64 })).unwrap();
        assert_eq!(
            photo.taken_at,
            DateTime::from_timestamp_millis(1_700_000_000_000)
        );

        let photo: Photo = serde_json::from_value(json!({ "src": "a", "takenAt": true })).unwrap();
        assert_eq!(photo.taken_at, None);
    }
}
