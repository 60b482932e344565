//! Offline-first reconciliation and upload engine for construction-project ("obra") galleries.
//!
//! Records come from a remote spreadsheet-backed endpoint, are mirrored into a
//! quota-bounded local cache, and new or edited records are pushed back with a
//! multipart upload that falls back to inlined `data:` URLs.

pub mod config;
pub mod error;
pub mod media;
pub mod portal;
pub mod remote;
pub mod state;

pub use config::PortalConfig;
pub use error::{CacheWriteError, ConfigError, DecodeError, FormError, RemoteError};
pub use portal::{FormInput, Portal, SaveReport, SubmitReport};
pub use state::data::{CachedRecord, Photo, Record, RecordPatch};
