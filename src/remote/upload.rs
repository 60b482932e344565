//! Upload strategy: multipart first, inline (`data:` URL) fallback second.
//!
//! ```text
//! Idle -> AttemptingMultipart -> Answered | PartialSuccess | FailedMultipart
//! PartialSuccess | FailedMultipart -> AttemptingInline   (files supplied)
//! FailedMultipart                  -> Done "no files to retry" (no files)
//! AttemptingInline -> Answered | FailedInline -> Done
//! ```
//!
//! Steps run strictly one after another and the inline attempt happens at most once.
//! `run` never fails: every path ends in an `UploadOutcome`.

use tracing::{debug, info, warn};

use super::gateway::{RemoteGateway, RemoteResponse, Submission};

pub const NO_FILES_TO_RETRY: &str = "no files to retry";

/// Which transfer produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Multipart,
    Inline,
}

/// Terminal result of an upload
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The backend replied; `response.ok` says whether it accepted the record
    Answered {
        via: Transfer,
        response: RemoteResponse,
    },
    /// The last attempt failed in transport, status or decoding
    Failed { via: Transfer, error: String },
    /// Multipart failed and there were no files for the fallback to improve on
    NoFilesToRetry { error: String },
    /// No endpoint configured; nothing was sent
    Skipped,
}

impl UploadOutcome {
    pub fn ok(&self) -> bool {
        matches!(self, UploadOutcome::Answered { response, .. } if response.ok)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, UploadOutcome::Skipped)
    }

    /// "saved locally, could not sync"
    pub fn should_warn_user(&self) -> bool {
        !self.ok() && !self.is_skipped()
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            UploadOutcome::NoFilesToRetry { .. } => Some(NO_FILES_TO_RETRY),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            UploadOutcome::Answered { response, .. } => response.error.as_deref(),
            UploadOutcome::Failed { error, .. } | UploadOutcome::NoFilesToRetry { error } => {
                Some(error)
            }
            UploadOutcome::Skipped => None,
        }
    }
}

/// Named states of a single upload
#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    AttemptingMultipart,
    Answered {
        via: Transfer,
        response: RemoteResponse,
    },
    /// Metadata accepted, binary parts silently dropped
    PartialSuccess(RemoteResponse),
    FailedMultipart(String),
    AttemptingInline,
    FailedInline(String),
    Done(UploadOutcome),
}

pub struct UploadStrategy<'g, G: RemoteGateway + ?Sized> {
    gateway: &'g G,
}

impl<'g, G: RemoteGateway + ?Sized> UploadStrategy<'g, G> {
    pub fn new(gateway: &'g G) -> Self {
        Self { gateway }
    }

    /// Drive the state machine to `Done`
    pub async fn run(&self, submission: &Submission<'_>) -> UploadOutcome {
        let mut state = UploadState::Idle;
        loop {
            state = match self.step(state, submission).await {
                UploadState::Done(outcome) => {
                    info!(
                        "📤 Upload of {} finished: ok={}",
                        submission.record.id,
                        outcome.ok()
                    );
                    return outcome;
                }
                next => {
                    debug!("upload {} -> {:?}", submission.record.id, StateName(&next));
                    next
                }
            };
        }
    }

    /// One transition
    pub async fn step(&self, state: UploadState, submission: &Submission<'_>) -> UploadState {
        let files = submission.file_count();
        match state {
            UploadState::Idle => {
                if self.gateway.is_configured() {
                    UploadState::AttemptingMultipart
                } else {
                    UploadState::Done(UploadOutcome::Skipped)
                }
            }
            UploadState::AttemptingMultipart => {
                match self.gateway.submit_multipart(submission).await {
                    Ok(response) if files > 0 && response.files.is_empty() => {
                        if response.ok {
                            warn!("⚠️  Backend answered ok without files; falling back to inline");
                            UploadState::PartialSuccess(response)
                        } else {
                            UploadState::FailedMultipart(
                                response
                                    .error
                                    .unwrap_or_else(|| "backend rejected upload".to_string()),
                            )
                        }
                    }
                    Ok(response) => UploadState::Answered {
                        via: Transfer::Multipart,
                        response,
                    },
                    Err(err) => {
                        warn!("⚠️  Multipart upload failed: {err}");
                        UploadState::FailedMultipart(err.to_string())
                    }
                }
            }
            UploadState::PartialSuccess(_) => UploadState::AttemptingInline,
            UploadState::FailedMultipart(error) => {
                if files == 0 {
                    UploadState::Done(UploadOutcome::NoFilesToRetry { error })
                } else {
                    UploadState::AttemptingInline
                }
            }
            UploadState::AttemptingInline => match self.gateway.submit_inline(submission).await {
                Ok(response) => UploadState::Answered {
                    via: Transfer::Inline,
                    response,
                },
                Err(err) => {
                    warn!("⚠️  Inline upload failed: {err}");
                    UploadState::FailedInline(err.to_string())
                }
            },
            UploadState::Answered { via, response } => {
                UploadState::Done(UploadOutcome::Answered { via, response })
            }
            UploadState::FailedInline(error) => UploadState::Done(UploadOutcome::Failed {
                via: Transfer::Inline,
                error,
            }),
            done @ UploadState::Done(_) => done,
        }
    }
}

/// Short state names for logs, without dumping response bodies
struct StateName<'a>(&'a UploadState);

impl std::fmt::Debug for StateName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            UploadState::Idle => "Idle",
            UploadState::AttemptingMultipart => "AttemptingMultipart",
            UploadState::Answered { .. } => "Answered",
            UploadState::PartialSuccess(_) => "PartialSuccess",
            UploadState::FailedMultipart(_) => "FailedMultipart",
            UploadState::AttemptingInline => "AttemptingInline",
            UploadState::FailedInline(_) => "FailedInline",
            UploadState::Done(_) => "Done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::media::ImageFile;
    use crate::state::data::Record;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Reply = Result<RemoteResponse, RemoteError>;

    /// Scripted gateway counting calls per transfer
    struct ScriptedGateway {
        multipart: Mutex<Option<Reply>>,
        inline: Mutex<Option<Reply>>,
        multipart_calls: AtomicUsize,
        inline_calls: AtomicUsize,
        configured: bool,
    }

    impl ScriptedGateway {
        fn new(multipart: Reply, inline: Reply) -> Self {
            Self {
                multipart: Mutex::new(Some(multipart)),
                inline: Mutex::new(Some(inline)),
                multipart_calls: AtomicUsize::new(0),
                inline_calls: AtomicUsize::new(0),
                configured: true,
            }
        }
    }

    #[async_trait]
    impl RemoteGateway for ScriptedGateway {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn fetch_list(&self) -> Result<Vec<Record>, RemoteError> {
            Ok(Vec::new())
        }

        async fn submit_multipart(&self, _: &Submission<'_>) -> Reply {
            self.multipart_calls.fetch_add(1, Ordering::SeqCst);
            self.multipart.lock().unwrap().take().expect("one multipart call")
        }

        async fn submit_inline(&self, _: &Submission<'_>) -> Reply {
            self.inline_calls.fetch_add(1, Ordering::SeqCst);
            self.inline.lock().unwrap().take().expect("one inline call")
        }
    }

    fn response(body: serde_json::Value) -> Reply {
        RemoteResponse::from_value(body)
    }

    fn jpeg(name: &str) -> ImageFile {
        ImageFile::new(Some(name.into()), "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xD9])
    }

    fn record() -> Record {
        Record {
            id: "obra-abc123".into(),
            title: "Ponte".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn transport_failure_falls_back_to_inline_once() {
        let gateway = ScriptedGateway::new(
            Err(RemoteError::Transport("connection reset".into())),
            response(json!({ "ok": true, "files": ["https://drive/1", "https://drive/2"] })),
        );
        let record = record();
        let cover = jpeg("capa.jpg");
        let extras = vec![jpeg("a.jpg")];
        let submission = Submission::new(&record, Some(&cover), &extras);

        let outcome = UploadStrategy::new(&gateway).run(&submission).await;

        assert!(outcome.ok());
        assert!(matches!(outcome, UploadOutcome::Answered { via: Transfer::Inline, .. }));
        assert_eq!(gateway.multipart_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.inline_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inline_failure_is_reported_not_raised() {
        let gateway = ScriptedGateway::new(
            Err(RemoteError::Timeout),
            Err(RemoteError::Status(502)),
        );
        let record = record();
        let cover = jpeg("capa.jpg");
        let submission = Submission::new(&record, Some(&cover), &[]);

        let outcome = UploadStrategy::new(&gateway).run(&submission).await;

        assert!(!outcome.ok());
        assert!(outcome.should_warn_user());
        assert_eq!(outcome.error(), Some("HTTP 502"));
        assert_eq!(gateway.inline_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ok_without_files_is_partial_success() {
        let gateway = ScriptedGateway::new(
            response(json!({ "ok": true, "files": [] })),
            response(json!({ "ok": true, "files": ["https://drive/1"] })),
        );
        let record = record();
        let extras = vec![jpeg("a.jpg")];
        let submission = Submission::new(&record, None, &extras);

        let strategy = UploadStrategy::new(&gateway);
        let after_multipart = strategy
            .step(UploadState::AttemptingMultipart, &submission)
            .await;
        assert!(matches!(after_multipart, UploadState::PartialSuccess(_)));
        assert_eq!(
            strategy.step(after_multipart, &submission).await,
            UploadState::AttemptingInline
        );
        assert_eq!(gateway.inline_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn partial_success_runs_fallback() {
        let gateway = ScriptedGateway::new(
            response(json!({ "ok": true, "files": [] })),
            response(json!({ "ok": true, "files": ["https://drive/1"] })),
        );
        let record = record();
        let extras = vec![jpeg("a.jpg")];
        let outcome = UploadStrategy::new(&gateway)
            .run(&Submission::new(&record, None, &extras))
            .await;

        assert!(matches!(outcome, UploadOutcome::Answered { via: Transfer::Inline, .. }));
        assert_eq!(gateway.inline_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_without_files_does_not_retry() {
        let gateway = ScriptedGateway::new(
            Err(RemoteError::Transport("offline".into())),
            response(json!({ "ok": true })),
        );
        let record = record();
        let outcome = UploadStrategy::new(&gateway)
            .run(&Submission::new(&record, None, &[]))
            .await;

        assert!(!outcome.ok());
        assert_eq!(outcome.reason(), Some(NO_FILES_TO_RETRY));
        assert_eq!(gateway.inline_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn metadata_only_success_needs_no_fallback() {
        let gateway = ScriptedGateway::new(
            response(json!({ "ok": true })),
            response(json!({ "ok": true })),
        );
        let record = record();
        let outcome = UploadStrategy::new(&gateway)
            .run(&Submission::new(&record, None, &[]))
            .await;

        assert!(matches!(outcome, UploadOutcome::Answered { via: Transfer::Multipart, .. }));
        assert_eq!(gateway.inline_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unconfigured_gateway_is_skipped() {
        let mut gateway = ScriptedGateway::new(response(json!({})), response(json!({})));
        gateway.configured = false;
        let record = record();
        let outcome = UploadStrategy::new(&gateway)
            .run(&Submission::new(&record, None, &[]))
            .await;

        assert_eq!(outcome, UploadOutcome::Skipped);
        assert!(!outcome.should_warn_user());
        assert_eq!(gateway.multipart_calls.load(Ordering::SeqCst), 0);
    }
}
