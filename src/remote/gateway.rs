use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CACHE_CONTROL;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::EndpointConfig;
use crate::error::RemoteError;
use crate::media::ImageFile;
use crate::state::data::Record;

/// Default upload filename for the cover part
pub const COVER_FILENAME: &str = "capa.jpg";

/// A record plus the files that go with it on submit
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub record: &'a Record,
    pub cover: Option<&'a ImageFile>,
    pub extras: &'a [ImageFile],
}

impl<'a> Submission<'a> {
    pub fn new(record: &'a Record, cover: Option<&'a ImageFile>, extras: &'a [ImageFile]) -> Self {
        Self {
            record,
            cover,
            extras,
        }
    }

    pub fn file_count(&self) -> usize {
        usize::from(self.cover.is_some()) + self.extras.len()
    }
}

/// Parsed reply of a submit call: `{ ok, files?, error? }`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteResponse {
    pub ok: bool,
    /// Links of the files the backend says it stored
    pub files: Vec<String>,
    pub error: Option<String>,
    /// Full body as returned, for diagnostics
    pub body: Value,
}

impl RemoteResponse {
    pub fn from_value(body: Value) -> Result<Self, RemoteError> {
        let obj = body
            .as_object()
            .ok_or_else(|| RemoteError::Malformed("expected a JSON object".to_string()))?;

        let ok = obj.get("ok").map(truthy).unwrap_or(false);
        let files = match obj.get("files") {
            Some(Value::Array(files)) => files
                .iter()
                .map(|f| match f {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };
        let error = error_message(obj.get("error"));

        Ok(Self {
            ok,
            files,
            error,
            body,
        })
    }
}

/// The remote document store
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Whether an endpoint and secret are set at all
    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch_list(&self) -> Result<Vec<Record>, RemoteError>;

    /// Scalar fields plus binary file parts
    async fn submit_multipart(&self, submission: &Submission<'_>)
        -> Result<RemoteResponse, RemoteError>;

    /// Scalar fields plus files inlined as `data:` URLs under `<field>_b64`
    async fn submit_inline(&self, submission: &Submission<'_>)
        -> Result<RemoteResponse, RemoteError>;
}

/// `reqwest` implementation talking to the Apps Script style endpoint
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: EndpointConfig,
}

impl HttpGateway {
    pub fn new(endpoint: EndpointConfig) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    /// List URL with `action`, `secret` and a cache-busting `t`, replacing any existing values
    pub fn list_url(&self) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.endpoint.url)
            .map_err(|e| RemoteError::Transport(format!("invalid endpoint url: {e}")))?;
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !matches!(k.as_ref(), "action" | "secret" | "t"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("action", "list")
            .append_pair("secret", &self.endpoint.secret)
            .append_pair("t", &Utc::now().timestamp_millis().to_string());
        Ok(url)
    }

    fn base_form(&self, record: &Record) -> Form {
        scalar_fields(record)
            .into_iter()
            .fold(Form::new().text("secret", self.endpoint.secret.clone()), |form, (k, v)| {
                form.text(k, v)
            })
    }

    async fn post(&self, form: Form, timeout: Duration) -> Result<RemoteResponse, RemoteError> {
        let resp = self
            .client
            .post(&self.endpoint.url)
            .multipart(form)
            .timeout(timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }
        let body: Value = resp.json().await?;
        RemoteResponse::from_value(body)
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    fn is_configured(&self) -> bool {
        self.endpoint.is_configured()
    }

    #[instrument(name = "remote_fetch_list", skip(self))]
    async fn fetch_list(&self) -> Result<Vec<Record>, RemoteError> {
        if !self.is_configured() {
            return Err(RemoteError::NotConfigured);
        }
        let url = self.list_url()?;
        debug!("GET {} (action=list)", self.endpoint.url);

        let resp = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-store")
            .timeout(self.endpoint.list_timeout())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }
        let body: Value = resp.json().await?;
        parse_list_body(body)
    }

    #[instrument(name = "remote_submit_multipart", skip_all, fields(id = %submission.record.id, files = submission.file_count()))]
    async fn submit_multipart(
        &self,
        submission: &Submission<'_>,
    ) -> Result<RemoteResponse, RemoteError> {
        if !self.is_configured() {
            return Err(RemoteError::NotConfigured);
        }
        let mut form = self.base_form(submission.record);
        if let Some(cover) = submission.cover {
            form = form.part("cover", file_part(cover, COVER_FILENAME));
        }
        for (i, file) in submission.extras.iter().enumerate() {
            form = form.part(format!("extra{i}"), file_part(file, &extra_filename(i)));
        }
        self.post(form, self.endpoint.multipart_timeout()).await
    }

    #[instrument(name = "remote_submit_inline", skip_all, fields(id = %submission.record.id, files = submission.file_count()))]
    async fn submit_inline(
        &self,
        submission: &Submission<'_>,
    ) -> Result<RemoteResponse, RemoteError> {
        if !self.is_configured() {
            return Err(RemoteError::NotConfigured);
        }
        let mut form = self.base_form(submission.record);
        if let Some(cover) = submission.cover {
            form = form.text("cover_b64", cover.to_data_url());
        }
        for (i, file) in submission.extras.iter().enumerate() {
            form = form.text(format!("extra{i}_b64"), file.to_data_url());
        }
        self.post(form, self.endpoint.inline_timeout()).await
    }
}

/// Validate a list reply and decode its items
pub fn parse_list_body(body: Value) -> Result<Vec<Record>, RemoteError> {
    let obj = body
        .as_object()
        .ok_or_else(|| RemoteError::Malformed("expected a JSON object".to_string()))?;

    if !obj.get("ok").map(truthy).unwrap_or(false) {
        let message = error_message(obj.get("error")).unwrap_or_else(|| "backend_error".to_string());
        return Err(RemoteError::Backend(message));
    }

    match obj.get("items") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                serde_json::from_value::<Record>(item.clone())
                    .map(Record::ingest_remote)
                    .map_err(|e| RemoteError::Malformed(format!("bad item: {e}")))
            })
            .collect(),
        Some(_) => Err(RemoteError::Malformed("`items` is not a list".to_string())),
    }
}

/// The scalar form fields shared by both submit strategies
pub fn scalar_fields(record: &Record) -> Vec<(&'static str, String)> {
    vec![
        ("id", record.id.clone()),
        ("title", record.title.clone()),
        ("engineer", record.engineer.clone()),
        ("location", record.location.clone()),
        ("startDate", record.start_date.clone()),
        ("endDate", record.end_date.clone().unwrap_or_default()),
        ("status", record.status.clone()),
        ("completion", record.completion.to_string()),
    ]
}

/// `foto_01.jpg`, `foto_02.jpg`, ... for extras without a name
pub fn extra_filename(index: usize) -> String {
    format!("foto_{:02}.jpg", index + 1)
}

fn file_part(file: &ImageFile, default_name: &str) -> Part {
    let name = file
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_name.to_string());
    match Part::bytes(file.bytes.clone())
        .file_name(name.clone())
        .mime_str(&file.media_type)
    {
        Ok(part) => part,
        Err(_) => Part::bytes(file.bytes.clone()).file_name(name),
    }
}

fn error_message(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// JavaScript-style truthiness of a JSON value
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
