use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use tracing::{info, warn};

use super::cache::{CacheOutcome, CacheStore};
use super::data::{generate_id, Photo, Record, RecordPatch};
use super::filter::{FilterState, LightboxState};
use crate::error::RemoteError;
use crate::remote::RemoteGateway;

/// Stamp ordering remote list applications.
///
/// Issued from a monotonically increasing counter; a ticket older than the
/// last applied one is rejected so stale payloads never overwrite newer ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SyncTicket(u64);

/// Where the canonical list came from on bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapSource {
    Remote,
    Cache,
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: String,
    pub created: bool,
    pub cache: CacheOutcome,
}

/// Owner of the canonical record list and the view state derived from it
#[derive(Debug)]
pub struct Reconciler {
    records: Vec<Record>,
    cache: CacheStore,
    filter: FilterState,
    /// Positions into `records`, in canonical order
    filtered: Vec<usize>,
    lightbox: LightboxState,
    years: Vec<i32>,
    issued: u64,
    applied: u64,
}

impl Reconciler {
    pub fn new(cache: CacheStore) -> Self {
        Self {
            records: Vec::new(),
            cache,
            filter: FilterState::default(),
            filtered: Vec::new(),
            lightbox: LightboxState::Closed,
            years: Vec::new(),
            issued: 0,
            applied: 0,
        }
    }

    /// The canonical list, normalized
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn find(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Load from remote, falling back to the local cache on any failure
    pub async fn bootstrap<G: RemoteGateway + ?Sized>(&mut self, gateway: &G) -> BootstrapSource {
        let ticket = self.begin_sync();
        match gateway.fetch_list().await {
            Ok(items) => {
                self.apply_remote(ticket, items);
                BootstrapSource::Remote
            }
            Err(err) => {
                warn!("Remote list unavailable, using local cache: {err}");
                self.restore_from_cache();
                BootstrapSource::Cache
            }
        }
    }

    /// Read-after-write refresh. On failure the optimistic local state stays.
    pub async fn refresh<G: RemoteGateway + ?Sized>(&mut self, gateway: &G) -> Result<bool, RemoteError> {
        let ticket = self.begin_sync();
        match gateway.fetch_list().await {
            Ok(items) => Ok(self.apply_remote(ticket, items)),
            Err(err) => {
                warn!("Remote refresh after submit failed: {err}");
                Err(err)
            }
        }
    }

    /// Reserve a ticket before fetching a remote list
    pub fn begin_sync(&mut self) -> SyncTicket {
        self.issued += 1;
        SyncTicket(self.issued)
    }

    /// Replace the canonical list with a fetched one, unless a newer fetch already landed
    pub fn apply_remote(&mut self, ticket: SyncTicket, items: Vec<Record>) -> bool {
        if ticket.0 <= self.applied {
            warn!(
                "Discarding stale remote list (ticket {}, applied {})",
                ticket.0, self.applied
            );
            return false;
        }
        self.applied = ticket.0;
        self.records = items;
        normalize(&mut self.records, Utc::now());
        self.cache.save(&self.records);
        self.rebuild_views();
        info!("☁️  Loaded {} records from remote", self.records.len());
        true
    }

    /// Replace the canonical list with whatever the cache holds
    pub fn restore_from_cache(&mut self) {
        self.records = self.cache.load();
        normalize(&mut self.records, Utc::now());
        self.rebuild_views();
        info!("💾 Loaded {} records from local cache", self.records.len());
    }

    /// Merge a candidate by id (new values win) or append it, then persist
    pub fn upsert(&mut self, mut patch: RecordPatch) -> UpsertOutcome {
        if patch.id.is_empty() {
            patch.id = generate_id();
        }
        let id = patch.id.clone();

        let created = match self.records.iter_mut().find(|r| r.id == id) {
            Some(existing) => {
                existing.merge(patch);
                false
            }
            None => {
                self.records.push(patch.into_record());
                true
            }
        };

        normalize(&mut self.records, Utc::now());
        let cache = self.cache.save(&self.records);
        self.rebuild_views();
        UpsertOutcome { id, created, cache }
    }

    /// Set the filters and return the filtered view
    pub fn apply_filters(&mut self, filter: FilterState) -> Vec<&Record> {
        self.filter = filter;
        self.refilter();
        self.filtered()
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// The current filtered view; album positions refer to this, not to the canonical list
    pub fn filtered(&self) -> Vec<&Record> {
        self.filtered.iter().map(|&i| &self.records[i]).collect()
    }

    pub fn filtered_record(&self, position: usize) -> Option<&Record> {
        self.filtered.get(position).map(|&i| &self.records[i])
    }

    /// Distinct start years, newest first
    pub fn year_options(&self) -> &[i32] {
        &self.years
    }

    pub fn lightbox(&self) -> LightboxState {
        self.lightbox
    }

    /// Open the album of the record at `position` in the filtered view
    pub fn open_album(&mut self, position: usize) -> bool {
        match self.filtered_record(position) {
            Some(record) if !record.photos.is_empty() => {
                self.lightbox = LightboxState::Open {
                    album: position,
                    photo: 0,
                };
                true
            }
            _ => false,
        }
    }

    /// Step through the open album, wrapping at both ends
    pub fn navigate(&mut self, delta: i64) -> Option<&Photo> {
        let LightboxState::Open { album, photo } = self.lightbox else {
            return None;
        };
        let count = self.filtered_record(album)?.photos.len() as i64;
        if count == 0 {
            return None;
        }
        let next = (photo as i64 + delta).rem_euclid(count) as usize;
        self.lightbox = LightboxState::Open { album, photo: next };
        self.current_photo().map(|(_, photo)| photo)
    }

    pub fn select_photo(&mut self, index: usize) -> Option<&Photo> {
        let LightboxState::Open { album, .. } = self.lightbox else {
            return None;
        };
        if index >= self.filtered_record(album)?.photos.len() {
            return None;
        }
        self.lightbox = LightboxState::Open { album, photo: index };
        self.current_photo().map(|(_, photo)| photo)
    }

    pub fn current_photo(&self) -> Option<(&Record, &Photo)> {
        let LightboxState::Open { album, photo } = self.lightbox else {
            return None;
        };
        let record = self.filtered_record(album)?;
        record.photos.get(photo).map(|p| (record, p))
    }

    pub fn close_album(&mut self) {
        self.lightbox = LightboxState::Closed;
    }

    fn rebuild_views(&mut self) {
        let mut years: Vec<i32> = self.records.iter().filter_map(Record::start_year).collect();
        years.sort_unstable_by(|a, b| b.cmp(a));
        years.dedup();
        self.years = years;
        self.refilter();
    }

    fn refilter(&mut self) {
        self.filtered = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| self.filter.matches(record))
            .map(|(i, _)| i)
            .collect();
        // Positions may have shifted under an open album
        self.lightbox = LightboxState::Closed;
    }
}

/// Default missing capture times to `now`, then stable-sort photos (newest first)
/// and records (highest completion first). Idempotent.
pub fn normalize(records: &mut [Record], now: DateTime<Utc>) {
    for record in records.iter_mut() {
        for photo in &mut record.photos {
            photo.taken_at.get_or_insert(now);
        }
        record.photos.sort_by_key(|photo| Reverse(photo.taken_at));
    }
    records.sort_by_key(|record| Reverse(record.completion));
}
