//! The request descriptor handed to a `RequestHandler` and the outcome it
//! hands back.
//!
//! # Design
//! `ApiRequest` is built fresh for every call and says *what* to ask for:
//! a path relative to the versioned base path, query pairs, body params, an
//! optional file, and the options that change how the call is made. Turning
//! it into bytes on the wire is the dispatcher's job.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, ErrorCode, Result};
use crate::http::HttpMethod;

const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// A file to send as the `file` part of a multipart upload.
///
/// The content is held in memory so a throttled upload can be resent
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: DEFAULT_FILE_CONTENT_TYPE.to_string(),
            bytes,
        }
    }

    /// Drain `reader` into memory. Any read failure is `invalid_file`.
    pub fn from_reader<R: Read>(file_name: &str, mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|e| {
            Error::new(
                ErrorCode::InvalidFile,
                format!("{file_name} is not a readable stream: {e}"),
            )
        })?;
        Ok(Self::from_bytes(file_name, bytes))
    }

    /// Open a regular file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let invalid = |reason: String| {
            Error::new(
                ErrorCode::InvalidFile,
                format!("{} is not a valid file: {reason}", path.display()),
            )
        };

        let metadata = fs::metadata(path).map_err(|e| invalid(e.to_string()))?;
        if !metadata.is_file() {
            return Err(invalid("not a regular file".to_string()));
        }
        let file = fs::File::open(path).map_err(|e| invalid(e.to_string()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Self::from_reader(&file_name, file)
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }
}

/// Which host a request goes to when it should not use the default API host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetHost {
    /// The configured file upload host.
    Upload,
    Custom(String),
}

/// One call against the API.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiRequest {
    /// Appended to the versioned base path, e.g. `/documents/abc`.
    pub path: String,
    pub query: Vec<(String, String)>,
    /// JSON body params; sent alongside the file as form fields on uploads.
    pub params: Map<String, Value>,
    pub file: Option<UploadFile>,
    /// Overrides the default API host.
    pub host: Option<TargetHost>,
    /// Overrides the method that would otherwise be chosen.
    pub method: Option<HttpMethod>,
    /// Return the body bytes instead of decoded JSON.
    pub raw_response: bool,
    /// Overrides the configured absolute timeout for the throttle loop.
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_file(mut self, file: UploadFile) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(TargetHost::Custom(host.to_string()));
        self
    }

    pub fn on_upload_host(mut self) -> Self {
        self.host = Some(TargetHost::Upload);
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn raw(mut self) -> Self {
        self.raw_response = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// File uploads are POST, non-empty params are POST, everything else is
    /// GET. An explicit method always wins.
    pub fn resolved_method(&self) -> HttpMethod {
        if let Some(method) = self.method {
            return method;
        }
        if self.file.is_some() || !self.params.is_empty() {
            HttpMethod::Post
        } else {
            HttpMethod::Get
        }
    }
}

/// What a successful call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Raw(Vec<u8>),
    Json(Value),
}

impl ApiResponse {
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            ApiResponse::Raw(bytes) => Ok(bytes),
            ApiResponse::Json(_) => Err(Error::new(
                ErrorCode::InvalidResponse,
                "expected a raw response, got decoded JSON",
            )),
        }
    }

    pub fn into_json(self) -> Result<Value> {
        match self {
            ApiResponse::Json(value) => Ok(value),
            ApiResponse::Raw(_) => Err(Error::new(
                ErrorCode::InvalidResponse,
                "expected a JSON response, got raw bytes",
            )),
        }
    }

    /// Decode the JSON payload into a typed value. Unknown fields are ignored.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        let value = self.into_json()?;
        serde_json::from_value(value).map_err(|e| {
            Error::new(
                ErrorCode::InvalidResponse,
                format!("response is not in a valid format: {e}"),
            )
        })
    }
}
