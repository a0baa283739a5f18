//! The request dispatcher: marshal, sign, submit, classify.

use crate::classify::classify;
use crate::connection::ConnectionImpl;
use crate::request::build_request;
use crate::retry;
use crate::sign::{self, Credentials};
use datomic_protocol::{marshal, Anomaly, Marshalled, Op, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Backoff parameters for busy responses: initial attempt, then retries
/// after 100 and 200 ms.
pub const RETRY_START_MS: u64 = 100;
pub const RETRY_MAX_MS: u64 = 200;
pub const RETRY_FACTOR: u64 = 2;

/// A logical request. The body is marshalled as-is; op, timeout and
/// continuation token ride alongside it, not inside it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub op: Op,
    pub body: Value,
    pub timeout_ms: Option<u64>,
    pub next_token: Option<String>,
}

impl ApiRequest {
    pub fn new(op: Op, body: Value) -> ApiRequest {
        ApiRequest {
            op,
            body,
            timeout_ms: None,
            next_token: None,
        }
    }

    pub fn with_timeout(mut self, ms: Option<u64>) -> ApiRequest {
        self.timeout_ms = ms;
        self
    }

    pub fn with_next_token(mut self, token: Option<String>) -> ApiRequest {
        self.next_token = token;
        self
    }
}

/// Dispatches a request on a background task and returns the single-shot
/// channel its classified result arrives on.
pub fn queue_request(
    conn: &Arc<ConnectionImpl>,
    request: ApiRequest,
) -> oneshot::Receiver<Result<Value, Anomaly>> {
    let (tx, rx) = oneshot::channel();
    let conn = conn.clone();
    tokio::spawn(async move {
        let result = dispatch(&conn, request).await;
        // the caller may have lost interest; that cancels quietly
        let _ = tx.send(result);
    });
    rx
}

/// Queues a request and awaits its result.
pub async fn submit_request(
    conn: &Arc<ConnectionImpl>,
    request: ApiRequest,
) -> Result<Value, Anomaly> {
    match queue_request(conn, request).await {
        Ok(result) => result,
        Err(_) => Err(Anomaly::fault("request task dropped before responding")),
    }
}

async fn dispatch(conn: &Arc<ConnectionImpl>, request: ApiRequest) -> Result<Value, Anomaly> {
    let timeout = Duration::from_millis(request.timeout_ms.unwrap_or_else(|| conn.timeout_ms()));
    let marshalled = marshal(&request.body).map_err(|e| Anomaly::fault(e.to_string()))?;
    tracing::debug!(op = %request.op, len = marshalled.len, "dispatching request");

    let backoff = retry::backoff(
        RETRY_START_MS,
        RETRY_MAX_MS,
        RETRY_FACTOR,
        |response: &Result<Value, Anomaly>| matches!(response, Err(a) if a.is_busy()),
    );
    retry::with_retry(
        || {
            let conn = conn.clone();
            let op = request.op;
            let next_token = request.next_token.clone();
            let marshalled = marshalled.clone();
            async move { attempt(&conn, op, next_token.as_deref(), &marshalled, timeout).await }
        },
        backoff,
    )
    .await
}

/// One attempt: build, sign, submit, classify. Every attempt is signed
/// afresh so the date headers stay current across backoff sleeps.
async fn attempt(
    conn: &ConnectionImpl,
    op: Op,
    next_token: Option<&str>,
    marshalled: &Marshalled,
    timeout: Duration,
) -> Result<Value, Anomaly> {
    let mut http = build_request(
        &conn.endpoint,
        op,
        conn.database_id.as_deref(),
        marshalled,
        next_token,
    )?;
    let credentials = credentials_for(conn)?;
    sign::sign(&mut http, &credentials, chrono::Utc::now());
    let outcome = conn.transport.submit(http, timeout).await;
    classify(outcome, &conn.state)
}

fn credentials_for(conn: &ConnectionImpl) -> Result<Credentials<'_>, Anomaly> {
    match (
        conn.config.access_key.as_deref(),
        conn.config.secret.as_deref(),
        conn.config.service.as_deref(),
        conn.config.region.as_deref(),
    ) {
        (Some(access_key), Some(secret), Some(service), Some(region)) => Ok(Credentials {
            access_key,
            secret,
            service,
            region,
        }),
        _ => Err(Anomaly::fault("connection config lost its credentials")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::connection::Watermark;
    use crate::endpoint::parse_endpoint;
    use crate::testing::{busy_body, ScriptedTransport};
    use datomic_protocol::{unmarshal, Category, Format};

    fn conn_impl(transport: Arc<ScriptedTransport>) -> Arc<ConnectionImpl> {
        let config = ClientConfig::new()
            .with_account_id("a")
            .with_access_key("k")
            .with_secret("s")
            .with_endpoint("db.example.com:8998")
            .with_service("peer-server")
            .with_region("none")
            .with_db_name("movies");
        let endpoint = parse_endpoint("db.example.com:8998").unwrap();
        Arc::new(ConnectionImpl::new(config, endpoint, transport).with_database_id("db-1"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_retries_then_surfaces() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..5 {
            transport.push_status(503, &busy_body());
        }
        let conn = conn_impl(transport.clone());
        let request = ApiRequest::new(Op::Status, Value::map(vec![]));

        let result = submit_request(&conn, request).await;
        assert_eq!(result.unwrap_err().category, Category::Busy);
        // initial attempt plus retries after 100ms and 200ms
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_then_success_advances_watermark() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(503, &busy_body());
        let success = Value::map(vec![
            (
                Value::keyword("dbs"),
                Value::list(vec![Value::map(vec![
                    (Value::keyword("t"), Value::Int(7)),
                    (Value::keyword("next-t"), Value::Int(8)),
                ])]),
            ),
            (Value::keyword("result"), Value::string("ok")),
        ]);
        transport.push_ok(&success);
        let conn = conn_impl(transport.clone());

        let body = submit_request(&conn, ApiRequest::new(Op::Status, Value::map(vec![])))
            .await
            .unwrap();
        assert_eq!(body.kget("result"), Some(&Value::string("ok")));
        assert_eq!(conn.state.load(), Watermark { t: 7, next_t: 8 });
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_busy_anomalies_are_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_error(crate::transport::TransportError::Timeout);
        let conn = conn_impl(transport.clone());

        let err = submit_request(&conn, ApiRequest::new(Op::Status, Value::map(vec![])))
            .await
            .unwrap_err();
        assert_eq!(err.category, Category::Interrupted);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_signed_and_marshalled() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(&Value::map(vec![]));
        let conn = conn_impl(transport.clone());

        let body = Value::map(vec![(Value::keyword("db-name"), Value::string("movies"))]);
        submit_request(&conn, ApiRequest::new(Op::Status, body.clone()))
            .await
            .unwrap();

        let requests = transport.requests();
        let sent = &requests[0];
        assert!(sent.header("authorization").unwrap().starts_with("AWS4-HMAC-SHA256"));
        assert!(sent.header("x-amz-date").is_some());
        assert_eq!(sent.header("host"), Some("db.example.com:8998"));
        // the marshalled body carries exactly the request map
        assert_eq!(unmarshal(&sent.body, Format::Msgpack).unwrap(), body);
    }
}
