//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::http::{HttpRequest, HttpResponse, Transport, TransportError};

type Responder = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// Records every request and answers it with a responder closure.
pub(crate) struct RecordingTransport {
    responder: Responder,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingTransport {
    pub(crate) fn new(responder: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answer requests with `responses` in order; panics when they run out.
    pub(crate) fn replying(responses: Vec<HttpResponse>) -> Arc<Self> {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |request| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted response for {} {}", request.method, request.url))
        })
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok((self.responder)(request))
    }
}

pub(crate) fn text_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        status_message: String::new(),
        headers: Vec::new(),
        body: body.to_string(),
    }
}

pub(crate) fn json_response(status: u16, body: Value) -> HttpResponse {
    text_response(status, &body.to_string())
}
