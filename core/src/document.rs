//! Document facade: upload, look up, list, rename, delete, download.
//!
//! A `Document` is a local view of a server-side document. Its `id` is
//! assigned by the server and never changes; `name` changes only through
//! `update`; `status` and `created_at` are whatever the server last said.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::client::Client;
use crate::dates;
use crate::error::{Error, ErrorCode, Result};
use crate::http::HttpMethod;
use crate::request::{ApiRequest, UploadFile};
use crate::session::Session;
use crate::types::{
    DocumentListPayload, DocumentPayload, DocumentStatus, FindParams, SessionParams, UpdateFields,
    UploadParams,
};

pub const PATH: &str = "/documents";

/// Fields requested by `Document::get`.
pub const METADATA_FIELDS: [&str; 4] = ["id", "created_at", "name", "status"];

/// Where an uploaded document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// A publicly reachable URL the server fetches itself.
    Url(String),
    File(UploadFile),
}

#[derive(Clone)]
pub struct Document {
    client: Client,
    id: String,
    name: Option<String>,
    status: Option<DocumentStatus>,
    created_at: Option<DateTime<Utc>>,
}

impl Document {
    pub(crate) fn from_payload(client: &Client, payload: DocumentPayload) -> Result<Self> {
        let id = payload
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::new(ErrorCode::InvalidResponse, "document payload has no id"))?;
        let mut document = Self {
            client: client.clone(),
            id,
            name: None,
            status: None,
            created_at: None,
        };
        document.merge(payload)?;
        Ok(document)
    }

    /// Overwrite the fields present in `payload`; the id is left alone.
    fn merge(&mut self, payload: DocumentPayload) -> Result<()> {
        if let Some(created_at) = payload.created_at {
            self.created_at = Some(dates::parse(&created_at)?);
        }
        if let Some(name) = payload.name {
            self.name = Some(name);
        }
        if let Some(status) = payload.status {
            self.status = Some(status);
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn status(&self) -> Option<DocumentStatus> {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn path(&self) -> String {
        format!("{PATH}/{}", self.id)
    }

    /// Fetch a document's metadata by id.
    pub fn get(client: &Client, id: &str) -> Result<Self> {
        let request =
            ApiRequest::new(format!("{PATH}/{id}")).with_query("fields", METADATA_FIELDS.join(","));
        let payload: DocumentPayload = client.send(&request)?.decode()?;
        Self::from_payload(client, payload)
    }

    /// List documents, newest first as the server orders them.
    pub fn find(client: &Client, params: &FindParams) -> Result<Vec<Self>> {
        let mut request = ApiRequest::new(PATH);
        if let Some(limit) = params.limit.filter(|limit| *limit > 0) {
            request = request.with_query("limit", limit);
        }
        if let Some(before) = &params.created_before {
            request = request.with_query("created_before", dates::format(&before.to_utc()?));
        }
        if let Some(after) = &params.created_after {
            request = request.with_query("created_after", dates::format(&after.to_utc()?));
        }

        let listing: DocumentListPayload = client.send(&request)?.decode()?;
        let entries = listing
            .document_collection
            .and_then(|collection| collection.entries)
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::InvalidResponse,
                    "response has no document_collection entries",
                )
            })?;

        entries
            .into_iter()
            .map(|payload| Self::from_payload(client, payload))
            .collect()
    }

    pub fn upload(client: &Client, source: UploadSource, params: &UploadParams) -> Result<Self> {
        let mut request = ApiRequest::new(PATH);
        if let Some(name) = params.name.as_deref().filter(|name| !name.is_empty()) {
            request = request.with_param("name", name);
        }
        if let Some(thumbnails) = params.thumbnails.as_ref().filter(|t| !t.is_empty()) {
            request = request.with_param("thumbnails", thumbnails.to_param());
        }
        if params.non_svg == Some(true) {
            request = request.with_param("non_svg", true);
        }

        request = match source {
            UploadSource::Url(url) => request.with_param("url", url),
            UploadSource::File(file) => request.with_file(file).on_upload_host(),
        };

        let payload: DocumentPayload = client.send(&request)?.decode()?;
        let document = Self::from_payload(client, payload)?;
        debug!(document_id = %document.id, "document uploaded");
        Ok(document)
    }

    pub fn upload_url(client: &Client, url: &str, params: &UploadParams) -> Result<Self> {
        Self::upload(client, UploadSource::Url(url.to_string()), params)
    }

    pub fn upload_file(client: &Client, file: UploadFile, params: &UploadParams) -> Result<Self> {
        Self::upload(client, UploadSource::File(file), params)
    }

    /// Read `path` and upload it. The file is validated before anything is
    /// sent.
    pub fn upload_path(
        client: &Client,
        path: impl AsRef<Path>,
        params: &UploadParams,
    ) -> Result<Self> {
        let file = UploadFile::open(path)?;
        Self::upload_file(client, file, params)
    }

    /// Drain `reader` and upload it under `file_name`.
    pub fn upload_reader<R: std::io::Read>(
        client: &Client,
        file_name: &str,
        reader: R,
        params: &UploadParams,
    ) -> Result<Self> {
        let file = UploadFile::from_reader(file_name, reader)?;
        Self::upload_file(client, file, params)
    }

    /// Rename the document and refresh local fields from the response.
    pub fn update(&mut self, fields: &UpdateFields) -> Result<bool> {
        let mut request = ApiRequest::new(self.path()).with_method(HttpMethod::Put);
        if let Some(name) = &fields.name {
            request = request.with_param("name", name.as_str());
        }
        let payload: DocumentPayload = self.client.send(&request)?.decode()?;
        self.merge(payload)?;
        Ok(true)
    }

    /// Delete the document. The server answers a successful delete with an
    /// empty body.
    pub fn delete(&self) -> Result<bool> {
        let request = ApiRequest::new(self.path())
            .with_method(HttpMethod::Delete)
            .raw();
        let body = self.client.send(&request)?.into_bytes()?;
        debug!(document_id = %self.id, "document deleted");
        Ok(body.is_empty())
    }

    /// Download the converted document. `extension` picks an output format
    /// such as `pdf` or `zip`; `None` returns the original format.
    pub fn download(&self, extension: Option<&str>) -> Result<Vec<u8>> {
        let suffix = extension
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{}", ext.trim_start_matches('.')))
            .unwrap_or_default();
        let request = ApiRequest::new(format!("{}/content{suffix}", self.path())).raw();
        self.client.send(&request)?.into_bytes()
    }

    /// Download a thumbnail image of the first page.
    pub fn thumbnail(&self, width: u32, height: u32) -> Result<Vec<u8>> {
        let request = ApiRequest::new(format!("{}/thumbnail", self.path()))
            .with_query("height", height)
            .with_query("width", width)
            .raw();
        self.client.send(&request)?.into_bytes()
    }

    pub fn create_session(&self, params: &SessionParams) -> Result<Session> {
        Session::create(&self.client, &self.id, params)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Two documents are equal when they hold the same data, whichever client
/// they were loaded through.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.status == other.status
            && self.created_at == other.created_at
    }
}
