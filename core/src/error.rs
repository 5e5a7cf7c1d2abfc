//! Error type for the viewing API client.
//!
//! # Design
//! Every failure, whether it comes from the transport, the dispatcher or a
//! facade, surfaces as a single `Error` carrying a machine-readable
//! `ErrorCode`. Callers branch on the code; the message and the optional
//! `RequestContext` are meant for logs.

use std::fmt;

use thiserror::Error;

use crate::http::{HttpRequest, HttpResponse, MULTIPART_CONTENT_TYPE};

/// Bodies longer than this are cut before they are rendered into a message.
const MAX_BODY_BYTES: usize = 4096;

/// Machine-readable classification of an `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// HTTP 400.
    BadRequest,
    /// HTTP 401, usually a wrong API key.
    Unauthorized,
    /// HTTP 404.
    NotFound,
    /// HTTP 405.
    MethodNotAllowed,
    /// HTTP 415.
    UnsupportedMediaType,
    /// HTTP 429 without a usable retry signal.
    TooManyRequests,
    /// HTTP 5xx, or an error envelope embedded in a successful response.
    ServerError,
    /// Connection-level failure, or an HTTP status with no dedicated code.
    Transport,
    /// The response body was expected to be JSON and was not.
    InvalidJson,
    /// The throttle retry loop ran past the absolute timeout.
    RequestTimeout,
    /// An upload source could not be read.
    InvalidFile,
    /// A decoded response did not have the expected shape.
    InvalidResponse,
    /// A date-like input could not be parsed.
    InvalidDate,
    /// Client configuration is missing or malformed.
    InvalidConfig,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::NotFound => "not_found",
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::UnsupportedMediaType => "unsupported_media_type",
            ErrorCode::TooManyRequests => "too_many_requests",
            ErrorCode::ServerError => "server_error",
            ErrorCode::Transport => "transport_error",
            ErrorCode::InvalidJson => "server_response_not_valid_json",
            ErrorCode::RequestTimeout => "request_timeout",
            ErrorCode::InvalidFile => "invalid_file",
            ErrorCode::InvalidResponse => "invalid_response",
            ErrorCode::InvalidDate => "invalid_date",
            ErrorCode::InvalidConfig => "invalid_config",
        }
    }

    /// Classify a failed HTTP status. Statuses without a dedicated code fall
    /// back to `Transport`.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorCode::BadRequest,
            401 => ErrorCode::Unauthorized,
            404 => ErrorCode::NotFound,
            405 => ErrorCode::MethodNotAllowed,
            415 => ErrorCode::UnsupportedMediaType,
            429 => ErrorCode::TooManyRequests,
            500..=599 => ErrorCode::ServerError,
            _ => ErrorCode::Transport,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one error type returned by this crate.
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}{}", ContextDisplay(.context))]
pub struct Error {
    code: ErrorCode,
    message: String,
    context: Option<Box<RequestContext>>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(Box::new(context));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&RequestContext> {
        self.context.as_deref()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Snapshot of the exchange that produced an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub method: String,
    pub url: String,
    /// Request headers, with the `Authorization` value redacted.
    pub headers: Vec<(String, String)>,
    pub request_body: Option<String>,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
}

impl RequestContext {
    pub fn new(request: &HttpRequest, response: Option<&HttpResponse>) -> Self {
        let headers = request
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.clone(), redact(value))
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect();

        let request_body = request.body.as_deref().map(|body| {
            let multipart = request
                .header("content-type")
                .is_some_and(|ct| ct.starts_with(MULTIPART_CONTENT_TYPE));
            if multipart {
                format!("<{} bytes of {MULTIPART_CONTENT_TYPE}>", body.len())
            } else {
                render_body(body)
            }
        });

        Self {
            method: request.method.to_string(),
            url: request.url.clone(),
            headers,
            request_body,
            response_status: response.map(|r| r.status),
            response_body: response.map(|r| render_body(&r.body)),
        }
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Method: {}", self.method)?;
        writeln!(f, "URL: {}", self.url)?;
        let headers: Vec<String> = self
            .headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect();
        writeln!(f, "Headers: {}", headers.join(", "))?;
        if let Some(body) = &self.request_body {
            writeln!(f, "Request Body: {body}")?;
        }
        if let Some(status) = self.response_status {
            writeln!(f)?;
            writeln!(f, "Response Status: {status}")?;
        }
        if let Some(body) = &self.response_body {
            writeln!(f, "Response Body: {body}")?;
        }
        Ok(())
    }
}

struct ContextDisplay<'a>(&'a Option<Box<RequestContext>>);

impl fmt::Display for ContextDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(context) => write!(f, "{context}"),
            None => Ok(()),
        }
    }
}

/// Keep the scheme word (`Token`, `Bearer`) and hide the credential.
fn redact(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, _)) => format!("{scheme} [redacted]"),
        None => "[redacted]".to_string(),
    }
}

fn render_body(body: &[u8]) -> String {
    if body.len() <= MAX_BODY_BYTES {
        return String::from_utf8_lossy(body).into_owned();
    }
    format!(
        "{}... ({} bytes total)",
        String::from_utf8_lossy(&body[..MAX_BODY_BYTES]),
        body.len()
    )
}
