//! Session facade: time-limited viewing grants for a document.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::client::Client;
use crate::dates;
use crate::document::Document;
use crate::error::{Error, ErrorCode, Result};
use crate::http::HttpMethod;
use crate::request::ApiRequest;
use crate::types::{SessionParams, SessionPayload, SessionUrls};

pub const PATH: &str = "/sessions";

#[derive(Clone)]
pub struct Session {
    client: Client,
    id: String,
    /// The document as the server described it when the session was made.
    /// Deleting the session leaves the document alone.
    document: Option<Document>,
    expires_at: Option<DateTime<Utc>>,
    urls: SessionUrls,
}

impl Session {
    pub(crate) fn from_payload(client: &Client, payload: SessionPayload) -> Result<Self> {
        let id = payload
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::new(ErrorCode::InvalidResponse, "session payload has no id"))?;
        let document = payload
            .document
            .map(|document| Document::from_payload(client, document))
            .transpose()?;
        let expires_at = payload
            .expires_at
            .as_deref()
            .map(dates::parse)
            .transpose()?;

        Ok(Self {
            client: client.clone(),
            id,
            document,
            expires_at,
            urls: payload.urls.unwrap_or_default(),
        })
    }

    /// Create a session for the document with `document_id`.
    pub fn create(client: &Client, document_id: &str, params: &SessionParams) -> Result<Self> {
        let mut request = ApiRequest::new(PATH).with_param("document_id", document_id);
        if let Some(duration) = params.duration {
            request = request.with_param("duration", duration);
        }
        if let Some(expires_at) = &params.expires_at {
            request = request.with_param("expires_at", dates::format(&expires_at.to_utc()?));
        }
        if let Some(downloadable) = params.is_downloadable {
            request = request.with_param("is_downloadable", downloadable);
        }
        if let Some(selectable) = params.is_text_selectable {
            request = request.with_param("is_text_selectable", selectable);
        }

        let payload: SessionPayload = client.send(&request)?.decode()?;
        let session = Self::from_payload(client, payload)?;
        debug!(session_id = %session.id, document_id, "session created");
        Ok(session)
    }

    /// End the session before it expires on its own.
    pub fn delete(&self) -> Result<bool> {
        let request = ApiRequest::new(format!("{PATH}/{}", self.id))
            .with_method(HttpMethod::Delete)
            .raw();
        let body = self.client.send(&request)?.into_bytes()?;
        debug!(session_id = %self.id, "session deleted");
        Ok(body.is_empty())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn urls(&self) -> &SessionUrls {
        &self.urls
    }

    pub fn view_url(&self) -> Option<&str> {
        self.urls.view.as_deref()
    }

    pub fn assets_url(&self) -> Option<&str> {
        self.urls.assets.as_deref()
    }

    pub fn realtime_url(&self) -> Option<&str> {
        self.urls.realtime.as_deref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("document", &self.document)
            .field("expires_at", &self.expires_at)
            .field("urls", &self.urls)
            .finish()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.document == other.document
            && self.expires_at == other.expires_at
            && self.urls == other.urls
    }
}
