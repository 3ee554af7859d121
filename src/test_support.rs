//! Scriptable transport for unit tests.

use std::sync::Mutex;

use reqwest::StatusCode;

use crate::transport::{Transport, TransportError, UpstreamRequest, UpstreamResponse};

type Handler = dyn Fn(&UpstreamRequest, usize) -> Result<UpstreamResponse, TransportError>
    + Send
    + Sync;

/// Answers every request through `handler` and records what was sent.
///
/// The handler receives the request and its zero-based position in the
/// call sequence.
pub(crate) struct StubTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<UpstreamRequest>>,
}

impl StubTransport {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&UpstreamRequest, usize) -> Result<UpstreamResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Plays `script` in order, then keeps answering 500.
    pub(crate) fn scripted(script: Vec<Result<UpstreamResponse, TransportError>>) -> Self {
        Self::new(move |_, n| {
            script
                .get(n)
                .cloned()
                .unwrap_or_else(|| Ok(UpstreamResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "")))
        })
    }

    pub(crate) fn calls(&self) -> Vec<UpstreamRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Transport for StubTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len() - 1
        };
        (self.handler)(&request, n)
    }
}

pub(crate) fn json_response(status: StatusCode, body: serde_json::Value) -> UpstreamResponse {
    UpstreamResponse::new(status, body.to_string())
}
