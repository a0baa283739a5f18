//! Chunked response driver.
//!
//! Re-enters the dispatcher with `next` ops while the server reports more
//! data. The output channel has capacity 1 so the consumer's pace bounds
//! chunk fetching; an anomaly is pushed and the stream ends.

use crate::connection::ConnectionImpl;
use crate::dispatch::{submit_request, ApiRequest};
use datomic_protocol::{Anomaly, Op, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A terminated stream of chunk results.
pub type ChunkReceiver = mpsc::Receiver<Result<Value, Anomaly>>;

/// Issues `request` and streams its chunks, extracting `extract` from
/// each response body.
pub fn stream(conn: Arc<ConnectionImpl>, request: ApiRequest, extract: &'static str) -> ChunkReceiver {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(drive(conn, request, extract, tx));
    rx
}

/// A stream that yields one anomaly and closes. Used when a chunked
/// operation fails before anything is dispatched.
pub fn failed(anomaly: Anomaly) -> ChunkReceiver {
    let (tx, rx) = mpsc::channel(1);
    // capacity 1 and nothing queued: this cannot fail
    let _ = tx.try_send(Err(anomaly));
    rx
}

async fn drive(
    conn: Arc<ConnectionImpl>,
    request: ApiRequest,
    extract: &'static str,
    tx: mpsc::Sender<Result<Value, Anomaly>>,
) {
    let chunk_size = request.body.kget("chunk").cloned();
    let timeout_ms = request.timeout_ms;
    let mut response = submit_request(&conn, request).await;
    loop {
        match response {
            Err(anomaly) => {
                let _ = tx.send(Err(anomaly)).await;
                return;
            }
            Ok(body) => {
                let next_offset = body.kget("next-offset").cloned();
                let next_token = body
                    .kget("next-token")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let chunk = body.kget(extract).cloned().unwrap_or(body);
                if tx.send(Ok(chunk)).await.is_err() {
                    tracing::debug!("chunk consumer dropped, abandoning stream");
                    return;
                }
                // last chunk: no continuation offset
                let Some(offset) = next_offset else { return };

                let mut next_body =
                    Value::map(vec![(Value::keyword("next-offset"), offset)]);
                if let Some(size) = &chunk_size {
                    next_body = next_body.assoc(Value::keyword("chunk"), size.clone());
                }
                let next_request = ApiRequest::new(Op::Next, next_body)
                    .with_timeout(timeout_ms)
                    .with_next_token(next_token);
                response = submit_request(&conn, next_request).await;
            }
        }
    }
}
