//! Request dispatch: the single choke point for every network call.
//!
//! # Design
//! Facades talk to a `RequestHandler`, never to HTTP directly. `Dispatcher`
//! is the real handler: it turns an `ApiRequest` into an `HttpRequest`
//! (URL, auth, content negotiation, body encoding), runs it through a
//! `Transport`, retries while the server signals throttling, and classifies
//! whatever comes back into either an `ApiResponse` or an `Error`.
//!
//! Time is read and spent through a `Clock` so the throttle loop can be
//! driven without real sleeps.

use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{debug, warn};
use ureq::unversioned::multipart::{Form, Part};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, ErrorCode, RequestContext, Result};
use crate::http::{HttpRequest, HttpResponse, Transport, MULTIPART_CONTENT_TYPE};
use crate::request::{ApiRequest, ApiResponse, TargetHost, UploadFile};
use crate::transport::UreqTransport;

/// Headers that carry a throttle delay, in order of preference.
pub const THROTTLE_HEADERS: [&str; 2] = ["Retry-After", "X-Throttle-Wait-Seconds"];

/// Sends one `ApiRequest` and returns its outcome.
///
/// This is the seam facades depend on; tests substitute their own handler.
pub trait RequestHandler: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Source of monotonic time and of blocking waits.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct Dispatcher {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(&config));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Encode `request` for the wire.
    pub fn build_request(&self, request: &ApiRequest) -> Result<HttpRequest> {
        let method = request.resolved_method();
        let host = match &request.host {
            None => None,
            Some(TargetHost::Upload) => Some(self.config.upload_host.as_str()),
            Some(TargetHost::Custom(host)) => Some(host.as_str()),
        };
        let base = self.config.base_url(host);
        let mut url = Url::parse(&format!("{base}{}", request.path)).map_err(|e| {
            Error::new(
                ErrorCode::InvalidConfig,
                format!("cannot build a URL from {base}{}: {e}", request.path),
            )
        })?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        let accept = if request.raw_response {
            "*/*"
        } else {
            "application/json"
        };
        let mut headers = vec![
            (
                "Authorization".to_string(),
                format!("Token {}", self.config.api_key),
            ),
            ("Accept".to_string(), accept.to_string()),
            ("User-Agent".to_string(), self.config.user_agent.clone()),
        ];

        let body = if let Some(file) = &request.file {
            let (content_type, encoded) = multipart_body(&request.params, file)?;
            headers.push(("Content-Type".to_string(), content_type));
            Some(encoded)
        } else if !request.params.is_empty() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
            let encoded = serde_json::to_vec(&request.params).map_err(|e| {
                Error::new(
                    ErrorCode::BadRequest,
                    format!("request params could not be encoded: {e}"),
                )
            })?;
            Some(encoded)
        } else {
            None
        };

        Ok(HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        })
    }

    /// Send `http`, sleeping and resending while the server asks for it.
    fn execute(&self, http: &HttpRequest, timeout: Duration) -> Result<HttpResponse> {
        let started = self.clock.now();
        let mut attempt: u32 = 1;

        loop {
            debug!(method = %http.method, url = %http.url, attempt, "sending request");
            let response = self.transport.execute(http).map_err(|e| {
                Error::new(ErrorCode::Transport, format!("transport error: {e}"))
                    .with_context(RequestContext::new(http, None))
            })?;

            let Some(delay) = throttle_delay(&response) else {
                return Ok(response);
            };

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= timeout {
                warn!(
                    url = %http.url,
                    attempt,
                    elapsed_secs = elapsed.as_secs(),
                    timeout_secs = timeout.as_secs(),
                    "throttled past the absolute timeout"
                );
                return Err(Error::new(
                    ErrorCode::RequestTimeout,
                    format!("Request timed out after {} seconds", elapsed.as_secs()),
                )
                .with_context(RequestContext::new(http, Some(&response))));
            }

            if elapsed.saturating_add(delay) > timeout {
                warn!(
                    url = %http.url,
                    attempt,
                    delay_secs = delay.as_secs(),
                    timeout_secs = timeout.as_secs(),
                    "throttle delay would overrun the absolute timeout"
                );
                return Err(Error::new(
                    ErrorCode::RequestTimeout,
                    format!(
                        "Request timed out: server asked to wait {} seconds with {} of {} seconds left",
                        delay.as_secs(),
                        timeout.saturating_sub(elapsed).as_secs(),
                        timeout.as_secs()
                    ),
                )
                .with_context(RequestContext::new(http, Some(&response))));
            }

            warn!(
                url = %http.url,
                status = response.status,
                attempt,
                delay_secs = delay.as_secs(),
                elapsed_secs = elapsed.as_secs(),
                "request throttled, retrying"
            );
            self.clock.sleep(delay);
            attempt += 1;
        }
    }
}

impl RequestHandler for Dispatcher {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let http = self.build_request(request)?;
        let timeout = request.timeout.unwrap_or(self.config.absolute_timeout);
        let response = self.execute(&http, timeout)?;

        if response.is_error() {
            return Err(http_failure(&http, &response));
        }
        if request.raw_response {
            return Ok(ApiResponse::Raw(response.body));
        }

        let value = decode_json(&http, &response)?;
        if let Some(message) = embedded_error(&value) {
            debug!(url = %http.url, %message, "error envelope in successful response");
            return Err(Error::new(ErrorCode::ServerError, message)
                .with_context(RequestContext::new(&http, Some(&response))));
        }
        Ok(ApiResponse::Json(value))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The delay requested by a throttle header, if any. Only a positive whole
/// number of seconds counts; `Retry-After` is preferred when both are valid.
pub fn throttle_delay(response: &HttpResponse) -> Option<Duration> {
    THROTTLE_HEADERS
        .iter()
        .filter_map(|name| response.header(name))
        .filter_map(|value| value.trim().parse::<u64>().ok())
        .find(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// `{"status"|"type": "error", "error_message"|"message": ...}`
pub fn embedded_error(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    let flagged = ["status", "type"]
        .iter()
        .any(|key| object.get(*key).and_then(Value::as_str) == Some("error"));
    if !flagged {
        return None;
    }
    let message = ["error_message", "message"]
        .iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())?;
    Some(match message {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    })
}

fn http_failure(http: &HttpRequest, response: &HttpResponse) -> Error {
    let code = ErrorCode::from_status(response.status);
    let message = serde_json::from_slice::<Value>(&response.body)
        .ok()
        .and_then(|value| embedded_error(&value))
        .unwrap_or_else(|| format!("Server error: HTTP {}", response.status));
    debug!(url = %http.url, status = response.status, %code, "request failed");
    Error::new(code, message).with_context(RequestContext::new(http, Some(response)))
}

fn decode_json(http: &HttpRequest, response: &HttpResponse) -> Result<Value> {
    let invalid = || {
        Error::new(ErrorCode::InvalidJson, "Server response is not valid JSON")
            .with_context(RequestContext::new(http, Some(response)))
    };
    match serde_json::from_slice::<Value>(&response.body) {
        Ok(Value::Null) | Ok(Value::Bool(false)) | Err(_) => Err(invalid()),
        Ok(value) => Ok(value),
    }
}

/// Encode `params` as text fields followed by `file` under the `file` field.
/// Returns the `Content-Type` header value and the body.
fn multipart_body(params: &Map<String, Value>, file: &UploadFile) -> Result<(String, Vec<u8>)> {
    let fields: Vec<(&str, String)> = params
        .iter()
        .map(|(key, value)| (key.as_str(), form_value(value)))
        .collect();
    let file_name = disposition_safe(&file.file_name);
    let part = Part::bytes(&file.bytes)
        .file_name(&file_name)
        .mime_str(&file.content_type)
        .map_err(|e| {
            Error::new(
                ErrorCode::InvalidFile,
                format!("{}: unusable content type {:?}: {e}", file.file_name, file.content_type),
            )
        })?;

    let mut form = fields
        .iter()
        .fold(Form::new(), |form, (key, value)| form.text(key, value))
        .part("file", part);
    let content_type = format!("{MULTIPART_CONTENT_TYPE}; boundary={}", form.boundary());
    let mut body = Vec::with_capacity(file.bytes.len() + 512);
    form.read_to_end(&mut body).map_err(|e| {
        Error::new(
            ErrorCode::InvalidFile,
            format!("{}: could not encode upload: {e}", file.file_name),
        )
    })?;
    Ok((content_type, body))
}

/// File names are written inside a quoted disposition parameter.
fn disposition_safe(file_name: &str) -> String {
    file_name
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .replace('"', "%22")
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
