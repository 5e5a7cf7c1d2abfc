//! Test doubles shared by the integration test binaries.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use boxview_core::{
    ApiRequest, ApiResponse, Client, Clock, Error, HttpRequest, HttpResponse, RequestHandler,
    Result, Transport, TransportError,
};
use serde_json::Value;

/// Records every request and answers from a script, in order.
#[derive(Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<ApiRequest>>,
    replies: Mutex<VecDeque<Result<ApiResponse>>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply_json(&self, value: Value) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(ApiResponse::Json(value)));
    }

    pub fn reply_raw(&self, bytes: &[u8]) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(ApiResponse::Raw(bytes.to_vec())));
    }

    pub fn reply_error(&self, error: Error) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> ApiRequest {
        self.calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

impl RequestHandler for RecordingHandler {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.calls.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("handler ran out of scripted replies")
    }
}

/// A client wired to `handler`.
pub fn client_with(handler: &Arc<RecordingHandler>) -> Client {
    Client::with_handler(handler.clone())
}

/// Serves scripted `HttpResponse`s and keeps every request it saw.
#[derive(Default)]
pub struct ScriptedTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<std::result::Result<HttpResponse, TransportError>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: u16, headers: &[(&str, &str)], body: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response(status, headers, body)));
    }

    pub fn fail(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError(message.to_string())));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport ran out of scripted responses")
    }
}

pub fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> HttpResponse {
    HttpResponse {
        status,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: body.to_vec(),
    }
}

/// A clock that only moves when slept on.
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}
