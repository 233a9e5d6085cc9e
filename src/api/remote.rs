//! Purpose: HTTP/JSON transport for the ledger batch endpoint.
//! Exports: `HttpTransport`, `BATCH_PATH`.
//! Role: Blocking `Transport` implementation used by the CLI and integration tests.
//! Invariants: One POST per batch; the response is consumed as a single completed unit.
//! Invariants: Non-2xx responses become one aggregate error decoded from the error envelope.
#![allow(clippy::result_large_err)]

use super::client::{ApiResult, Transport};
use crate::core::error::{Error, ErrorKind};
use crate::core::outcome::RawOutcome;
use serde::Deserialize;
use serde_json::Value;
use std::io::{BufReader, Read};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const BATCH_PATH: [&str; 2] = ["v1", "batch"];

#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<HttpTransportInner>,
}

struct HttpTransportInner {
    base_url: Url,
    token: Option<String>,
    timeout: Option<Duration>,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    kind: String,
    message: Option<String>,
    hint: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(HttpTransportInner {
                base_url,
                token: None,
                timeout: None,
                agent,
            }),
        })
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        let token = Some(token.into());
        self.rebuild(|inner| inner.token = token)
    }

    /// Whole-request timeout; expiry surfaces as a `Transport` error.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        self.rebuild(|inner| {
            inner.timeout = Some(timeout);
            inner.agent = agent;
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    fn rebuild(mut self, update: impl FnOnce(&mut HttpTransportInner)) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            update(inner);
        } else {
            let mut inner = HttpTransportInner {
                base_url: self.inner.base_url.clone(),
                token: self.inner.token.clone(),
                timeout: self.inner.timeout,
                agent: self.inner.agent.clone(),
            };
            update(&mut inner);
            self.inner = Arc::new(inner);
        }
        self
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let mut request = self.inner.agent.request(method, url.as_str());
        if let Some(token) = &self.inner.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
    }
}

impl Transport for HttpTransport {
    fn submit_batch(&self, payloads: &[Value]) -> ApiResult<Vec<RawOutcome>> {
        let url = build_url(&self.inner.base_url, &BATCH_PATH)?;
        let body = serde_json::to_string(payloads).map_err(|err| {
            Error::new(ErrorKind::Encode)
                .with_message("failed to encode batch request json")
                .with_source(err)
        })?;
        debug!(url = %url, items = payloads.len(), "posting batch");
        let response = self
            .request("POST", &url)
            .set("Accept", "application/json")
            .set("Content-Type", "application/json")
            .send_string(&body);

        match response {
            Ok(resp) => read_outcomes(resp),
            Err(ureq::Error::Status(code, resp)) => {
                warn!(status = code, "batch request failed");
                Err(parse_error_response(code, resp))
            }
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transport)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid ledger base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("ledger base url must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(
            Error::new(ErrorKind::Usage).with_message("ledger base url must not include a path")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("ledger base url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

// Streams the body; batch responses may exceed ureq's `into_string` cap.
fn read_outcomes(response: ureq::Response) -> ApiResult<Vec<RawOutcome>> {
    decode_outcomes(response.into_reader())
}

fn decode_outcomes(reader: impl Read) -> ApiResult<Vec<RawOutcome>> {
    serde_json::from_reader(BufReader::new(reader)).map_err(|err| {
        if err.is_io() {
            return Error::new(ErrorKind::Transport)
                .with_message("failed to read response body")
                .with_source(err);
        }
        Error::new(ErrorKind::Protocol)
            .with_message("malformed batch response")
            .with_hint("Expected a JSON array of {\"status\": \"ok\"|\"error\", ...} records.")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    parse_error_body(status, &body)
}

fn parse_error_body(status: u16, body: &str) -> Error {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return error_from_remote(envelope.error);
    }
    let kind = error_kind_from_status(status);
    Error::new(kind).with_message(format!("ledger error status {status}"))
}

fn error_from_remote(remote: RemoteError) -> Error {
    let kind = parse_error_kind(&remote.kind);
    let mut err = Error::new(kind);
    if let Some(message) = remote.message {
        err = err.with_message(message);
    }
    if let Some(hint) = remote.hint {
        err = err.with_hint(hint);
    }
    err
}

fn parse_error_kind(kind: &str) -> ErrorKind {
    match kind {
        "Internal" => ErrorKind::Internal,
        "Usage" => ErrorKind::Usage,
        "Encode" => ErrorKind::Encode,
        "Protocol" => ErrorKind::Protocol,
        "Transport" => ErrorKind::Transport,
        "Rejected" => ErrorKind::Rejected,
        "Permission" => ErrorKind::Permission,
        "OutOfRange" => ErrorKind::OutOfRange,
        "NotFound" => ErrorKind::NotFound,
        _ => ErrorKind::Internal,
    }
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 422 => ErrorKind::Usage,
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        500..=599 => ErrorKind::Internal,
        _ => ErrorKind::Transport,
    }
}
