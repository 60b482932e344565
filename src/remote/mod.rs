/// Remote document store module
///
/// This module handles:
/// - List and submit calls against the web-app endpoint (gateway.rs)
/// - The multipart-then-inline upload state machine (upload.rs)

pub mod gateway;
pub mod upload;

pub use gateway::{HttpGateway, RemoteGateway, RemoteResponse, Submission};
pub use upload::{Transfer, UploadOutcome, UploadState, UploadStrategy};
