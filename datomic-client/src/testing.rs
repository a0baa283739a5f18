//! Test support: a scripted in-memory transport.

use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use datomic_protocol::{marshal, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// A transport that replays a scripted sequence of outcomes and records
/// every submitted request.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    submitted: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> ScriptedTransport {
        ScriptedTransport::default()
    }

    /// Queues a 200 response with a transit+msgpack body.
    pub fn push_ok(&self, body: &Value) {
        self.push_response(msgpack_response(200, body));
    }

    /// Queues a response with the given status and transit+msgpack body.
    pub fn push_status(&self, status: u16, body: &Value) {
        self.push_response(msgpack_response(status, body));
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.script.lock().push_back(Ok(response));
    }

    pub fn push_error(&self, error: TransportError) {
        self.script.lock().push_back(Err(error));
    }

    /// Every request submitted so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.submitted.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.submitted.lock().len()
    }
}

/// Builds a transit+msgpack response for scripting.
pub fn msgpack_response(status: u16, body: &Value) -> HttpResponse {
    let m = marshal(body).expect("scripted body must marshal");
    HttpResponse {
        status,
        content_type: Some("application/transit+msgpack".into()),
        body: m.bytes.slice(..m.len),
    }
}

/// A body carrying a busy anomaly.
pub fn busy_body() -> Value {
    Value::map(vec![(
        Value::keyword("cognitect.anomalies/category"),
        Value::keyword("cognitect.anomalies/busy"),
    )])
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit(
        &self,
        request: HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        self.submitted.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::ConnectFailed("script exhausted".into())))
    }
}
