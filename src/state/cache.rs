use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::data::{CachedRecord, Record};
use crate::error::CacheWriteError;

/// Default slot name for the record list
pub const DEFAULT_SLOT: &str = "portal_obras_items_v2";

/// Default byte quota, matching typical browser local-storage limits
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Photos retained per record in the cache projection
pub const MAX_LOCAL_PHOTOS: usize = 12;

/// A named-slot durable store with a hard byte quota.
///
/// Writes larger than the quota must fail with `CacheWriteError::QuotaExceeded`
/// and leave the previous payload untouched.
pub trait SlotStore: Send {
    fn read(&self, slot: &str) -> Result<Option<String>, CacheWriteError>;
    fn write(&mut self, slot: &str, payload: &str) -> Result<(), CacheWriteError>;
}

/// SQLite-backed slot store.
///
/// The database file is created in the user's data directory:
/// - Linux: ~/.local/share/portal-obras/cache.db
/// - macOS: ~/Library/Application Support/portal-obras/cache.db
/// - Windows: %APPDATA%\portal-obras\cache.db
pub struct SqliteSlots {
    conn: Connection,
    db_path: PathBuf,
    quota_bytes: usize,
}

impl SqliteSlots {
    pub fn open(db_path: &Path, quota_bytes: usize) -> Result<Self, CacheWriteError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheWriteError::Storage(format!("create data dir: {e}")))?;
        }

        let conn = Connection::open(db_path)?;
        let slots = Self {
            conn,
            db_path: db_path.to_path_buf(),
            quota_bytes,
        };
        slots.init_schema()?;

        debug!("📁 Cache slots initialized at: {}", db_path.display());
        Ok(slots)
    }

    /// Open the store at the default location
    pub fn open_default(quota_bytes: usize) -> Result<Self, CacheWriteError> {
        let path = Self::default_db_path()
            .ok_or_else(|| CacheWriteError::Storage("no user data directory".to_string()))?;
        Self::open(&path, quota_bytes)
    }

    pub fn default_db_path() -> Option<PathBuf> {
        let mut path = dirs::data_dir().or_else(dirs::home_dir)?;
        path.push("portal-obras");
        path.push("cache.db");
        Some(path)
    }

    fn init_schema(&self) -> Result<(), CacheWriteError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS slots (
                name            TEXT PRIMARY KEY,
                payload         TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Bytes used by every slot except `slot`
    fn used_by_others(&self, slot: &str) -> Result<usize, CacheWriteError> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(payload AS BLOB))), 0) FROM slots WHERE name != ?1",
            [slot],
            |row| row.get(0),
        )?;
        Ok(used.max(0) as usize)
    }
}

impl SlotStore for SqliteSlots {
    fn read(&self, slot: &str) -> Result<Option<String>, CacheWriteError> {
        let payload = self
            .conn
            .query_row("SELECT payload FROM slots WHERE name = ?1", [slot], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(payload)
    }

    fn write(&mut self, slot: &str, payload: &str) -> Result<(), CacheWriteError> {
        let needed = self.used_by_others(slot)? + payload.len();
        if needed > self.quota_bytes {
            return Err(CacheWriteError::QuotaExceeded {
                needed,
                quota: self.quota_bytes,
            });
        }

        self.conn.execute(
            "INSERT INTO slots (name, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            rusqlite::params![slot, payload, Utc::now().timestamp()],
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSlots")
            .field("db_path", &self.db_path)
            .field("quota_bytes", &self.quota_bytes)
            .finish()
    }
}

/// In-memory slot store with the same quota semantics (tests, `--offline` runs without a data dir)
#[derive(Debug, Default)]
pub struct MemorySlots {
    slots: HashMap<String, String>,
    quota_bytes: usize,
}

impl MemorySlots {
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            slots: HashMap::new(),
            quota_bytes,
        }
    }
}

impl SlotStore for MemorySlots {
    fn read(&self, slot: &str) -> Result<Option<String>, CacheWriteError> {
        Ok(self.slots.get(slot).cloned())
    }

    fn write(&mut self, slot: &str, payload: &str) -> Result<(), CacheWriteError> {
        let others: usize = self
            .slots
            .iter()
            .filter(|(name, _)| name.as_str() != slot)
            .map(|(_, value)| value.len())
            .sum();
        let needed = others + payload.len();
        if needed > self.quota_bytes {
            return Err(CacheWriteError::QuotaExceeded {
                needed,
                quota: self.quota_bytes,
            });
        }
        self.slots.insert(slot.to_string(), payload.to_string());
        Ok(())
    }
}

/// What a cache save actually managed to persist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Full bounded projection written
    Full,
    /// Quota hit; covers and photos stripped on every record
    MetadataOnly,
    /// Both attempts failed; previous payload left in place
    Abandoned,
}

/// The local cache of the record list.
///
/// Saving is best-effort and never fails to the caller; loading never fails either.
pub struct CacheStore {
    slots: Box<dyn SlotStore>,
    slot: String,
    max_photos: usize,
}

impl CacheStore {
    pub fn new(slots: Box<dyn SlotStore>, slot: impl Into<String>, max_photos: usize) -> Self {
        Self {
            slots,
            slot: slot.into(),
            max_photos,
        }
    }

    /// Ephemeral in-memory cache with default settings
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemorySlots::new(DEFAULT_QUOTA_BYTES)),
            DEFAULT_SLOT,
            MAX_LOCAL_PHOTOS,
        )
    }

    /// Persist the bounded projection of `records`
    pub fn save(&mut self, records: &[Record]) -> CacheOutcome {
        let now = Utc::now();
        let projection: Vec<CachedRecord> = records
            .iter()
            .map(|record| CachedRecord::project(record, self.max_photos, now))
            .collect();

        let err = match self.write_projection(&projection) {
            Ok(()) => return CacheOutcome::Full,
            Err(err) => err,
        };
        warn!("⚠️  Local cache full; saving metadata only: {err}");

        let minimal: Vec<CachedRecord> = projection
            .into_iter()
            .map(CachedRecord::without_media)
            .collect();
        match self.write_projection(&minimal) {
            Ok(()) => CacheOutcome::MetadataOnly,
            Err(err) => {
                warn!("⚠️  Local cache write abandoned: {err}");
                CacheOutcome::Abandoned
            }
        }
    }

    fn write_projection(&mut self, projection: &[CachedRecord]) -> Result<(), CacheWriteError> {
        let payload = serde_json::to_string(projection)?;
        self.slots.write(&self.slot, &payload)
    }

    /// Last persisted list, or empty if absent or unreadable
    pub fn load(&self) -> Vec<Record> {
        let payload = match self.slots.read(&self.slot) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!("Local cache read failed: {err}");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<CachedRecord>>(&payload) {
            Ok(cached) => cached.into_iter().map(Record::from).collect(),
            Err(err) => {
                warn!("Local cache payload is corrupt, ignoring: {err}");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("slot", &self.slot)
            .field("max_photos", &self.max_photos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::Photo;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn record_with_media(id: &str, photo_count: usize) -> Record {
        let now = Utc::now();
        Record {
            id: id.to_string(),
            title: format!("Obra {id}"),
            engineer: "Eng. Ana".into(),
            location: "Recife".into(),
            start_date: "2023-01-01".into(),
            status: "Em andamento".into(),
            completion: 55,
            cover: Some(format!("data:image/jpeg;base64,{}", "A".repeat(2_000))),
            photos: (0..photo_count)
                .map(|i| Photo::new(format!("data:image/jpeg;base64,{i}"), "", now))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn save_then_load_round_trips_projection() {
        let mut cache = CacheStore::in_memory();
        let mut record = record_with_media("obra-1", 14);
        record.photos[1].src = "https://drive.example/1".into();

        assert_eq!(cache.save(&[record.clone()]), CacheOutcome::Full);
        let loaded = cache.load();

        assert_eq!(loaded.len(), 1);
        let got = &loaded[0];
        assert_eq!(got.id, record.id);
        assert_eq!(got.title, record.title);
        assert_eq!(got.engineer, record.engineer);
        assert_eq!(got.location, record.location);
        assert_eq!(got.start_date, record.start_date);
        assert_eq!(got.status, record.status);
        assert_eq!(got.completion, record.completion);
        assert_eq!(got.cover, record.cover);
        assert_eq!(got.photos.len(), MAX_LOCAL_PHOTOS);
        assert_eq!(got.photos[0], record.photos[0]);
        assert_eq!(got.photos[1].src, "");
    }

    #[test]
    fn over_quota_degrades_to_metadata_only() {
        let slots = MemorySlots::new(4_096);
        let mut cache = CacheStore::new(Box::new(slots), DEFAULT_SLOT, MAX_LOCAL_PHOTOS);
        let records = vec![record_with_media("obra-1", 3), record_with_media("obra-2", 3)];

        assert_eq!(cache.save(&records), CacheOutcome::MetadataOnly);
        let loaded = cache.load();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|r| r.cover.is_none() && r.photos.is_empty()));
        assert_eq!(loaded[1].title, "Obra obra-2");
    }

    #[test]
    fn hopeless_quota_abandons_without_clobbering() {
        let mut cache = CacheStore::new(Box::new(MemorySlots::new(16)), DEFAULT_SLOT, 12);
        assert_eq!(cache.save(&[record_with_media("obra-1", 1)]), CacheOutcome::Abandoned);
        assert!(cache.load().is_empty());
    }

    #[test]
    fn corrupt_payload_loads_as_empty() {
        let mut slots = MemorySlots::new(DEFAULT_QUOTA_BYTES);
        slots.write(DEFAULT_SLOT, "{not json").unwrap();
        let cache = CacheStore::new(Box::new(slots), DEFAULT_SLOT, MAX_LOCAL_PHOTOS);
        assert!(cache.load().is_empty());
    }

    #[test]
    fn sqlite_slots_persist_and_enforce_quota() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("nested").join("cache.db");

        {
            let slots = SqliteSlots::open(&db, 64 * 1024).unwrap();
            let mut cache = CacheStore::new(Box::new(slots), DEFAULT_SLOT, MAX_LOCAL_PHOTOS);
            assert_eq!(cache.save(&[record_with_media("obra-1", 2)]), CacheOutcome::Full);
        }

        let mut slots = SqliteSlots::open(&db, 64 * 1024).unwrap();
        assert!(slots.read(DEFAULT_SLOT).unwrap().is_some());
        let oversized = "x".repeat(64 * 1024 + 1);
        assert!(matches!(
            slots.write(DEFAULT_SLOT, &oversized),
            Err(CacheWriteError::QuotaExceeded { .. })
        ));

        let cache = CacheStore::new(Box::new(slots), DEFAULT_SLOT, MAX_LOCAL_PHOTOS);
        assert_eq!(cache.load()[0].id, "obra-1");
    }
}
