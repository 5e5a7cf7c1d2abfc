//! Synchronous client for the document viewing API.
//!
//! # Overview
//! Upload documents by URL or file, read and rename them, download converted
//! output and thumbnails, and create time-limited viewing sessions.
//!
//! # Design
//! - Every call funnels through one `RequestHandler::send`. The real handler,
//!   `Dispatcher`, owns authentication, URL assembly, method selection,
//!   content negotiation, the throttle retry loop, and error classification.
//! - The network is behind the `Transport` trait (`UreqTransport` by
//!   default); facades never see HTTP.
//! - `Document` and `Session` decode typed payloads and translate typed
//!   parameters into request descriptors.
//! - One `Error` type with a machine-readable `ErrorCode` covers every
//!   failure.
//!
//! ```no_run
//! use boxview_core::{Client, SessionParams, UploadParams};
//!
//! # fn main() -> boxview_core::Result<()> {
//! let client = Client::new("your-api-key");
//! let document = client.upload_url(
//!     "https://example.com/report.pdf",
//!     &UploadParams::default().name("Quarterly report"),
//! )?;
//! let session = document.create_session(&SessionParams::default().duration(30))?;
//! println!("{:?}", session.view_url());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dates;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod http;
pub mod request;
pub mod session;
pub mod transport;
pub mod types;

pub use client::Client;
pub use crate::config::ClientConfig;
pub use dates::DateInput;
pub use dispatcher::{Clock, Dispatcher, RequestHandler, SystemClock};
pub use document::{Document, UploadSource};
pub use error::{Error, ErrorCode, RequestContext, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use request::{ApiRequest, ApiResponse, TargetHost, UploadFile};
pub use session::Session;
pub use transport::UreqTransport;
pub use types::{
    DocumentStatus, FindParams, SessionParams, SessionUrls, Thumbnails, UpdateFields, UploadParams,
};
