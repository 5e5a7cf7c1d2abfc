//! Wire payloads and typed call parameters.
//!
//! # Design
//! Responses decode into explicit field sets. Every field except the
//! server-assigned `id` is optional so partial payloads (an update response,
//! a document embedded in a session) merge into existing values instead of
//! erasing them. Unknown fields are ignored.
//!
//! Parameter structs are plain data with `Option` fields; facades translate
//! them to the API's snake_case names and only send what is set.

use serde::{Deserialize, Serialize};

use crate::dates::DateInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Done => "done",
            DocumentStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DocumentPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// `{"document_collection": {"total_count": n, "entries": [...]}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentListPayload {
    #[serde(default)]
    pub document_collection: Option<DocumentCollection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentCollection {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub entries: Option<Vec<DocumentPayload>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUrls {
    #[serde(default)]
    pub view: Option<String>,
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub realtime: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SessionPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub document: Option<DocumentPayload>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub urls: Option<SessionUrls>,
}

/// Requested thumbnail sizes, each `WIDTHxHEIGHT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnails {
    Sizes(Vec<String>),
    /// Already comma-joined.
    Joined(String),
}

impl Thumbnails {
    pub fn to_param(&self) -> String {
        match self {
            Thumbnails::Sizes(sizes) => sizes.join(","),
            Thumbnails::Joined(joined) => joined.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Thumbnails::Sizes(sizes) => sizes.is_empty(),
            Thumbnails::Joined(joined) => joined.is_empty(),
        }
    }
}

impl From<&str> for Thumbnails {
    fn from(value: &str) -> Self {
        Thumbnails::Joined(value.to_string())
    }
}

impl From<String> for Thumbnails {
    fn from(value: String) -> Self {
        Thumbnails::Joined(value)
    }
}

impl From<Vec<String>> for Thumbnails {
    fn from(value: Vec<String>) -> Self {
        Thumbnails::Sizes(value)
    }
}

impl From<&[&str]> for Thumbnails {
    fn from(value: &[&str]) -> Self {
        Thumbnails::Sizes(value.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Thumbnails {
    fn from(value: [&str; N]) -> Self {
        Thumbnails::Sizes(value.iter().map(|s| s.to_string()).collect())
    }
}

/// Options for uploading a document by URL or from a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadParams {
    /// Overrides the file name the server would otherwise use.
    pub name: Option<String>,
    pub thumbnails: Option<Thumbnails>,
    /// Also render a version without SVG.
    pub non_svg: Option<bool>,
}

impl UploadParams {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn thumbnails(mut self, thumbnails: impl Into<Thumbnails>) -> Self {
        self.thumbnails = Some(thumbnails.into());
        self
    }

    pub fn non_svg(mut self, non_svg: bool) -> Self {
        self.non_svg = Some(non_svg);
        self
    }
}

/// Filters for listing documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindParams {
    pub limit: Option<u32>,
    pub created_before: Option<DateInput>,
    pub created_after: Option<DateInput>,
}

impl FindParams {
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn created_before(mut self, date: impl Into<DateInput>) -> Self {
        self.created_before = Some(date.into());
        self
    }

    pub fn created_after(mut self, date: impl Into<DateInput>) -> Self {
        self.created_after = Some(date.into());
        self
    }
}

/// The document fields a client may change. Only `name` is writable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateFields {
    pub name: Option<String>,
}

impl UpdateFields {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

/// Options for creating a viewing session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParams {
    /// Minutes until the session expires.
    pub duration: Option<u32>,
    pub expires_at: Option<DateInput>,
    pub is_downloadable: Option<bool>,
    pub is_text_selectable: Option<bool>,
}

impl SessionParams {
    pub fn duration(mut self, minutes: u32) -> Self {
        self.duration = Some(minutes);
        self
    }

    pub fn expires_at(mut self, date: impl Into<DateInput>) -> Self {
        self.expires_at = Some(date.into());
        self
    }

    pub fn is_downloadable(mut self, downloadable: bool) -> Self {
        self.is_downloadable = Some(downloadable);
        self
    }

    pub fn is_text_selectable(mut self, selectable: bool) -> Self {
        self.is_text_selectable = Some(selectable);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_payload_ignores_extra_fields() {
        let payload: DocumentPayload = serde_json::from_str(
            r#"{"type":"document","id":"abc","status":"processing","name":"Sample","created_at":"2015-02-02T09:13:20Z"}"#,
        )
        .unwrap();
        assert_eq!(payload.id.as_deref(), Some("abc"));
        assert_eq!(payload.status, Some(DocumentStatus::Processing));
        assert_eq!(payload.created_at.as_deref(), Some("2015-02-02T09:13:20Z"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result: Result<DocumentPayload, _> =
            serde_json::from_str(r#"{"id":"abc","status":"exploded"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn session_payload_embeds_a_document() {
        let payload: SessionPayload = serde_json::from_str(
            r#"{"type":"session","id":"s1","document":{"id":"d1"},"expires_at":"2015-02-02T10:16:39.876Z","urls":{"view":"v"}}"#,
        )
        .unwrap();
        assert_eq!(payload.document.unwrap().id.as_deref(), Some("d1"));
        let urls = payload.urls.unwrap();
        assert_eq!(urls.view.as_deref(), Some("v"));
        assert!(urls.assets.is_none());
    }

    #[test]
    fn thumbnail_lists_are_comma_joined() {
        assert_eq!(Thumbnails::from(["100x100", "200x150"]).to_param(), "100x100,200x150");
        assert_eq!(Thumbnails::from("100x100,200x150").to_param(), "100x100,200x150");
        assert!(Thumbnails::Sizes(Vec::new()).is_empty());
    }

    #[test]
    fn status_names_match_the_wire() {
        for status in [
            DocumentStatus::Queued,
            DocumentStatus::Processing,
            DocumentStatus::Done,
            DocumentStatus::Error,
        ] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, status.as_str());
        }
    }
}
