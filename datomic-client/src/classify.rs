//! Response classification.
//!
//! Applied in order, first non-null wins: a body that itself carries an
//! anomaly, then the transport error mapping, then the HTTP status
//! mapping; otherwise the decoded body is the result and any watermark it
//! carries is folded into the connection state.

use crate::connection::{Watermark, WatermarkCell};
use crate::transport::{HttpResponse, TransportError};
use datomic_protocol::{decode_body, Anomaly, Category, Value};

/// Classifies one transport outcome into the result delivered to callers.
pub fn classify(
    outcome: Result<HttpResponse, TransportError>,
    state: &WatermarkCell,
) -> Result<Value, Anomaly> {
    let response = outcome.map_err(anomaly_from_transport)?;

    let decoded = if response.body.is_empty() {
        None
    } else {
        Some(match &response.content_type {
            Some(ct) => decode_body(ct, &response.body),
            None => Err(Anomaly::fault("response carries no content-type")),
        })
    };

    // A body-level anomaly outranks the status line.
    if let Some(Ok(body)) = &decoded {
        if let Some(anomaly) = Anomaly::from_value(body) {
            return Err(anomaly);
        }
    }

    if !(200..300).contains(&response.status) {
        return Err(status_anomaly(
            response.status,
            decoded.and_then(Result::ok),
        ));
    }

    let body = match decoded {
        Some(result) => result?,
        None => Value::Nil,
    };
    advance_watermark(&body, state);
    Ok(body)
}

fn anomaly_from_transport(err: TransportError) -> Anomaly {
    let category = match &err {
        TransportError::Timeout => Category::Interrupted,
        TransportError::Throttled => Category::Busy,
        TransportError::ConnectFailed(_) => Category::Unavailable,
        TransportError::ResolveFailed(_) => Category::NotFound,
        TransportError::Other(_) => Category::Fault,
    };
    Anomaly::new(category).with_message(err.to_string())
}

fn status_anomaly(status: u16, body: Option<Value>) -> Anomaly {
    let category = match status {
        403 => Category::Forbidden,
        503 => Category::Busy,
        504 => Category::Unavailable,
        400..=499 => Category::Incorrect,
        _ => Category::Fault,
    };
    Anomaly::new(category)
        .with_message(format!("HTTP error status {status}"))
        .with_http_result(status, body)
}

/// Folds a `dbs` watermark out of a successful body into the connection
/// state. Older points lose silently.
fn advance_watermark(body: &Value, state: &WatermarkCell) {
    let Some(first) = body
        .kget("dbs")
        .and_then(Value::as_list)
        .and_then(<[Value]>::first)
    else {
        return;
    };
    let (Some(t), Some(next_t)) = (
        first.kget("t").and_then(Value::as_int),
        first.kget("next-t").and_then(Value::as_int),
    ) else {
        return;
    };
    if t >= 0 && next_t >= 0 {
        state.advance(Watermark {
            t: t as u64,
            next_t: next_t as u64,
        });
    }
}
