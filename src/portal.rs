//! The application-state context handed to the presentation layer.
//!
//! One `Portal` owns the reconciler, the gateway and the thumbnail policy.
//! Tests build isolated instances; nothing here is global.

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{CacheConfig, PortalConfig};
use crate::error::FormError;
use crate::media::{thumbnail_async, ImageFile, ThumbnailOptions};
use crate::remote::{HttpGateway, RemoteGateway, Submission, UploadOutcome, UploadStrategy};
use crate::state::cache::{CacheOutcome, CacheStore, MemorySlots, SqliteSlots};
use crate::state::data::{clamp_completion, generate_id, Photo, Record, RecordPatch};
use crate::state::filter::FilterState;
use crate::state::reconciler::{BootstrapSource, Reconciler, UpsertOutcome};

/// Raw values captured by the record form
#[derive(Debug, Clone, Default)]
pub struct FormInput {
    /// Set when editing an existing record
    pub editing_id: Option<String>,
    pub title: String,
    pub engineer: String,
    pub location: String,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    /// As typed; clamped to 0..=100, non-numeric becomes 0
    pub completion: String,
    /// Mandatory when creating
    pub cover_file: Option<ImageFile>,
    pub extra_files: Vec<ImageFile>,
}

/// What happened to a saved form
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub id: String,
    pub created: bool,
    pub cache: CacheOutcome,
    pub upload: UploadOutcome,
    /// The read-after-write fetch replaced local data with the remote list
    pub refreshed: bool,
}

/// Result of [`Portal::submit`]
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReport {
    pub upload: UploadOutcome,
    pub refreshed: bool,
}

impl SaveReport {
    /// "saved locally, could not sync"
    pub fn should_warn_user(&self) -> bool {
        self.upload.should_warn_user()
    }
}

pub struct Portal<G: RemoteGateway> {
    reconciler: Reconciler,
    gateway: G,
    thumbnails: ThumbnailOptions,
}

impl Portal<HttpGateway> {
    /// Wire up the HTTP gateway and the on-disk cache from configuration
    pub fn from_config(config: &PortalConfig) -> Self {
        Portal::new(
            HttpGateway::new(config.endpoint.clone()),
            open_cache(&config.cache),
            config.thumbnail,
        )
    }
}

impl<G: RemoteGateway> Portal<G> {
    pub fn new(gateway: G, cache: CacheStore, thumbnails: ThumbnailOptions) -> Self {
        Self {
            reconciler: Reconciler::new(cache),
            gateway,
            thumbnails,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut Reconciler {
        &mut self.reconciler
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub async fn bootstrap(&mut self) -> BootstrapSource {
        self.reconciler.bootstrap(&self.gateway).await
    }

    pub fn upsert(&mut self, patch: RecordPatch) -> UpsertOutcome {
        self.reconciler.upsert(patch)
    }

    pub fn apply_filters(&mut self, year: &str, status: &str, query: &str) -> Vec<&Record> {
        self.reconciler
            .apply_filters(FilterState::new(year, status, query))
    }

    /// Run the upload strategy; on success, re-fetch so remote links replace local data
    pub async fn submit(
        &mut self,
        record: &Record,
        cover: Option<&ImageFile>,
        extras: &[ImageFile],
    ) -> SubmitReport {
        let submission = Submission::new(record, cover, extras);
        let upload = UploadStrategy::new(&self.gateway).run(&submission).await;

        let mut refreshed = false;
        if upload.ok() {
            // A failed refresh keeps the optimistic state
            refreshed = matches!(self.reconciler.refresh(&self.gateway).await, Ok(true));
        } else if upload.should_warn_user() {
            warn!(
                "Record {} saved locally, could not sync: {}",
                record.id,
                upload.error().unwrap_or("unknown error")
            );
        }
        SubmitReport { upload, refreshed }
    }

    /// Full create/edit flow: build the candidate, thumbnail files, save optimistically, upload
    pub async fn save_form(&mut self, form: FormInput) -> Result<SaveReport, FormError> {
        let now = Utc::now();
        let editing = form.editing_id.clone().filter(|id| !id.is_empty());
        let title = form.title.trim().to_string();

        let mut patch = RecordPatch {
            id: editing.clone().unwrap_or_else(generate_id),
            title: Some(title.clone()),
            engineer: Some(form.engineer.trim().to_string()),
            location: Some(form.location.trim().to_string()),
            start_date: Some(form.start_date.trim().to_string()),
            end_date: Some(form.end_date.trim().to_string()),
            status: Some(form.status.trim().to_string()),
            completion: Some(clamp_completion(&Value::String(form.completion.clone()))),
            cover: None,
            photos: None,
        };

        let mut photos = Vec::new();
        match &editing {
            None => {
                let cover = form.cover_file.as_ref().ok_or(FormError::MissingCover)?;
                // A non-image file yields no preview, which counts as no cover
                let preview = thumbnail_async(cover.clone(), self.thumbnails)
                    .await?
                    .ok_or(FormError::MissingCover)?;
                photos.push(Photo::new(preview.clone(), format!("{title} (capa)"), now));
                patch.cover = Some(preview);
            }
            Some(id) => {
                if let Some(existing) = self.reconciler.find(id) {
                    patch.cover = Some(existing.cover.clone().unwrap_or_default());
                    photos = existing.photos.clone();
                }
            }
        }

        for file in &form.extra_files {
            let preview = match thumbnail_async(file.clone(), self.thumbnails).await {
                Ok(preview) => preview.unwrap_or_default(),
                Err(err) => {
                    warn!("Extra photo {:?} has no preview: {err}", file.name);
                    String::new()
                }
            };
            photos.push(Photo::new(preview, title.clone(), now));
        }
        patch.photos = Some(photos);

        let upserted = self.reconciler.upsert(patch);
        info!(
            "📝 {} record {} locally",
            if upserted.created { "Created" } else { "Updated" },
            upserted.id
        );

        let record = self
            .reconciler
            .find(&upserted.id)
            .cloned()
            .unwrap_or_else(|| Record {
                id: upserted.id.clone(),
                ..Default::default()
            });
        let submitted = self
            .submit(&record, form.cover_file.as_ref(), &form.extra_files)
            .await;

        Ok(SaveReport {
            id: upserted.id,
            created: upserted.created,
            cache: upserted.cache,
            upload: submitted.upload,
            refreshed: submitted.refreshed,
        })
    }
}

/// SQLite cache at the configured (or default) path; in-memory if that cannot be opened
pub fn open_cache(config: &CacheConfig) -> CacheStore {
    let opened = match &config.path {
        Some(path) => SqliteSlots::open(path, config.quota_bytes),
        None => SqliteSlots::open_default(config.quota_bytes),
    };
    match opened {
        Ok(slots) => CacheStore::new(Box::new(slots), config.slot.clone(), config.max_photos),
        Err(err) => {
            warn!("⚠️  Local cache unavailable, keeping records in memory only: {err}");
            CacheStore::new(
                Box::new(MemorySlots::new(config.quota_bytes)),
                config.slot.clone(),
                config.max_photos,
            )
        }
    }
}
