//! HTTP request construction.

use crate::endpoint::Endpoint;
use crate::transport::HttpRequest;
use datomic_protocol::{Anomaly, Marshalled, Op};

pub const CONTENT_TYPE_TRANSIT_MSGPACK: &str = "application/transit+msgpack";

/// Builds the unsigned POST for a logical operation.
///
/// Header invariants: every request carries `host`, `content-type`,
/// `accept` and `x-nano-op`; non-catalog ops additionally carry
/// `x-nano-target` with the database id; `x-nano-next` appears iff a
/// continuation token rides along.
pub fn build_request(
    endpoint: &Endpoint,
    op: Op,
    database_id: Option<&str>,
    marshalled: &Marshalled,
    next_token: Option<&str>,
) -> Result<HttpRequest, Anomaly> {
    let mut headers: Vec<(String, String)> = vec![
        ("host".into(), endpoint.host_header()),
        ("content-type".into(), CONTENT_TYPE_TRANSIT_MSGPACK.into()),
        ("accept".into(), CONTENT_TYPE_TRANSIT_MSGPACK.into()),
        ("x-nano-op".into(), op.qualified().into()),
    ];
    if !op.is_catalog() {
        let target = database_id
            .ok_or_else(|| Anomaly::fault(format!("no database-id for {}", op.qualified())))?;
        headers.push(("x-nano-target".into(), target.into()));
    }
    if let Some(token) = next_token {
        headers.push(("x-nano-next".into(), token.into()));
    }
    Ok(HttpRequest {
        host: endpoint.host.clone(),
        port: endpoint.port,
        path: "/".into(),
        headers,
        body: marshalled.bytes.slice(..marshalled.len),
    })
}
