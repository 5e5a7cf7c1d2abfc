//! Entry point for API callers.
//!
//! # Design
//! A `Client` owns exactly one `RequestHandler` behind an `Arc`, so cloning
//! is cheap and every `Document` / `Session` it produces can hold its own
//! handle. Each client carries its own key; nothing is process-wide.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, RequestHandler};
use crate::document::{Document, UploadSource};
use crate::error::Result;
use crate::http::Transport;
use crate::request::{ApiRequest, ApiResponse, UploadFile};
use crate::session::Session;
use crate::types::{FindParams, SessionParams, UploadParams};

#[derive(Clone)]
pub struct Client {
    handler: Arc<dyn RequestHandler>,
}

impl Client {
    /// A client for the public API using `api_key` and default settings.
    pub fn new(api_key: &str) -> Self {
        Self::from_config(ClientConfig::new(api_key))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self::with_handler(Arc::new(Dispatcher::new(config)))
    }

    /// Configuration from `BOX_VIEW_*` environment variables.
    pub fn from_env() -> Result<Self> {
        ClientConfig::from_env().map(Self::from_config)
    }

    /// Use a custom HTTP collaborator under the standard dispatcher.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_handler(Arc::new(Dispatcher::with_transport(config, transport)))
    }

    /// Replace the dispatcher entirely.
    pub fn with_handler(handler: Arc<dyn RequestHandler>) -> Self {
        Self { handler }
    }

    pub fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.handler.send(request)
    }

    pub fn find_documents(&self, params: &FindParams) -> Result<Vec<Document>> {
        Document::find(self, params)
    }

    pub fn get_document(&self, id: &str) -> Result<Document> {
        Document::get(self, id)
    }

    pub fn upload(&self, source: UploadSource, params: &UploadParams) -> Result<Document> {
        Document::upload(self, source, params)
    }

    pub fn upload_url(&self, url: &str, params: &UploadParams) -> Result<Document> {
        Document::upload_url(self, url, params)
    }

    pub fn upload_file(&self, file: UploadFile, params: &UploadParams) -> Result<Document> {
        Document::upload_file(self, file, params)
    }

    pub fn upload_path(&self, path: impl AsRef<Path>, params: &UploadParams) -> Result<Document> {
        Document::upload_path(self, path, params)
    }

    pub fn create_session(&self, document_id: &str, params: &SessionParams) -> Result<Session> {
        Session::create(self, document_id, params)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}
