//! The client facade: connect, reads, queries, transactions and the
//! administrative operations.

use crate::cache::ConnectionCache;
use crate::chunk::{self, ChunkReceiver};
use crate::config::{resolve, validate, ClientConfig, DEFAULT_TIMEOUT_MS};
use crate::connection::{Connection, ConnectionImpl, Watermark};
use crate::db::{
    bind_components, Db, DatomsParams, IndexRangeParams, PullParams, QueryParams, TransactParams,
    TxRangeParams, TxResult, DEFAULT_CHUNK, DEFAULT_LIMIT, DEFAULT_OFFSET, MAX_CHUNK,
};
use crate::dispatch::{submit_request, ApiRequest};
use crate::endpoint::parse_endpoint;
use crate::transport::{self, Transport};
use datomic_protocol::{Anomaly, Op, Value};
use std::sync::Arc;

/// Opens (or reuses) the connection for the resolved configuration.
pub async fn connect(args: ClientConfig) -> Result<Connection, Anomaly> {
    connect_with(args, transport::shared()).await
}

/// As [`connect`], over an explicit transport.
pub async fn connect_with(
    args: ClientConfig,
    transport: Arc<dyn Transport>,
) -> Result<Connection, Anomaly> {
    let config = validate(resolve(args))?;
    let cache = ConnectionCache::global();
    if let Some(conn) = cache.lookup_by_config(&config) {
        tracing::debug!(database_id = conn.database_id(), "connect hit the cache");
        return Ok(conn);
    }

    let endpoint = parse_endpoint(config.endpoint.as_deref().unwrap_or_default())?;
    let db_name = config
        .db_name
        .clone()
        .ok_or_else(|| Anomaly::incorrect("connect requires a db-name"))?;

    let resolver = Arc::new(ConnectionImpl::new(
        config.clone(),
        endpoint.clone(),
        transport.clone(),
    ));
    let resolve_body = Value::map(vec![(Value::keyword("db-name"), Value::string(db_name))]);
    let resolved = submit_request(&resolver, ApiRequest::new(Op::ResolveDb, resolve_body)).await?;
    let database_id = resolved
        .kget("database-id")
        .and_then(Value::as_str)
        .ok_or_else(|| Anomaly::fault("resolve-db response is missing database-id"))?
        .to_string();

    // fresh watermark cell together with the resolved id
    let conn_impl = Arc::new(
        ConnectionImpl::new(config.clone(), endpoint, transport)
            .with_database_id(database_id.clone()),
    );
    let status_body = Value::map(vec![(
        Value::keyword("database-id"),
        Value::string(database_id.clone()),
    )]);
    let status = submit_request(&conn_impl, ApiRequest::new(Op::Status, status_body)).await?;
    if let (Some(t), Some(next_t)) = (
        status.kget("t").and_then(Value::as_int),
        status.kget("next-t").and_then(Value::as_int),
    ) {
        if t >= 0 && next_t >= 0 {
            conn_impl.state.advance(Watermark {
                t: t as u64,
                next_t: next_t as u64,
            });
        }
    }

    let conn = Connection::new(conn_impl, database_id.clone());
    tracing::debug!(database_id = %database_id, "interning new connection");
    Ok(cache.put(config, database_id, conn))
}

impl Connection {
    /// A snapshot descriptor of the most recently observed database point.
    /// Local; never touches the network.
    pub fn db(&self) -> Db {
        let state = self.state();
        Db::snapshot(self.database_id(), state.t, state.next_t)
    }

    /// Handle for reading the transaction log.
    pub fn log(&self) -> Value {
        Value::map(vec![(
            Value::keyword("log"),
            Value::string(self.database_id()),
        )])
    }

    /// Removes this connection from the process-wide cache. No network
    /// call; in-memory state stays readable.
    pub fn shutdown(&self) {
        tracing::debug!(database_id = self.database_id(), "shutting down connection");
        ConnectionCache::global().forget_conn(self);
    }

    /// Submits transaction data. A fresh tx-id is generated per call.
    pub async fn transact(&self, params: TransactParams) -> Result<TxResult, Anomaly> {
        let body = Value::map(vec![
            (Value::keyword("tx-data"), params.tx_data),
            (
                Value::keyword("tx-id"),
                Value::string(uuid::Uuid::new_v4().to_string()),
            ),
        ]);
        let request = ApiRequest::new(Op::Transact, body).with_timeout(params.timeout_ms);
        let body = submit_request(self.conn_impl(), request).await?;
        TxResult::from_body(&body, self.database_id())
    }

    /// A database value usable with [`Db::with`].
    pub async fn with_db(&self) -> Result<Db, Anomaly> {
        let request = ApiRequest::new(Op::WithDb, Value::map(vec![]));
        let body = submit_request(self.conn_impl(), request).await?;
        let db = Db::from_value(&body, self.database_id())?;
        if db.next_token.is_none() {
            return Err(Anomaly::fault("with-db response is missing next-token"));
        }
        Ok(db)
    }

    /// Runs a query, streaming result chunks.
    pub fn q(&self, params: QueryParams) -> ChunkReceiver {
        let body = page(
            Value::map(vec![
                (Value::keyword("query"), params.query),
                (Value::keyword("args"), Value::List(params.args)),
            ]),
            params.offset,
            params.limit,
            params.chunk,
        );
        let request = ApiRequest::new(Op::Q, body)
            .with_timeout(Some(params.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)));
        chunk::stream(self.conn_impl().clone(), request, "data")
    }

    /// Streams transactions from the log.
    pub fn tx_range(&self, params: TxRangeParams) -> ChunkReceiver {
        let mut entries = Vec::new();
        if let Some(start) = params.start {
            entries.push((Value::keyword("start"), Value::Int(start)));
        }
        if let Some(end) = params.end {
            entries.push((Value::keyword("end"), Value::Int(end)));
        }
        let body = page(Value::Map(entries), params.offset, params.limit, params.chunk);
        let request = ApiRequest::new(Op::TxRange, body).with_timeout(params.timeout_ms);
        chunk::stream(self.conn_impl().clone(), request, "data")
    }
}

impl Db {
    /// The live connection this descriptor's database id maps to.
    fn connection(&self) -> Result<Connection, Anomaly> {
        ConnectionCache::global()
            .lookup_by_database_id(&self.database_id)
            .ok_or_else(|| {
                Anomaly::not_found(format!(
                    "no live connection for database-id {}",
                    self.database_id
                ))
            })
    }

    /// Streams datoms from the chosen index.
    pub fn datoms(&self, params: DatomsParams) -> ChunkReceiver {
        let conn = match self.connection() {
            Ok(conn) => conn,
            Err(anomaly) => return chunk::failed(anomaly),
        };
        let components = match bind_components(params.index, &params.components) {
            Ok(components) => components,
            Err(anomaly) => return chunk::failed(anomaly),
        };
        let mut entries = vec![
            (Value::keyword("db"), self.to_value()),
            (
                Value::keyword("index"),
                Value::keyword(params.index.as_keyword()),
            ),
        ];
        entries.extend(components);
        let body = page(
            Value::Map(entries),
            params.offset,
            params.limit,
            params.chunk,
        );
        let request = ApiRequest::new(Op::Datoms, body).with_timeout(params.timeout_ms);
        chunk::stream(conn.conn_impl().clone(), request, "data")
    }

    /// Streams the distinct values of an attribute's index range.
    pub fn index_range(&self, params: IndexRangeParams) -> ChunkReceiver {
        let conn = match self.connection() {
            Ok(conn) => conn,
            Err(anomaly) => return chunk::failed(anomaly),
        };
        let mut entries = vec![
            (Value::keyword("db"), self.to_value()),
            (Value::keyword("attrid"), params.attrid),
        ];
        if let Some(start) = params.start {
            entries.push((Value::keyword("start"), start));
        }
        if let Some(end) = params.end {
            entries.push((Value::keyword("end"), end));
        }
        let body = page(
            Value::Map(entries),
            params.offset,
            params.limit,
            params.chunk,
        );
        let request = ApiRequest::new(Op::IndexRange, body).with_timeout(params.timeout_ms);
        chunk::stream(conn.conn_impl().clone(), request, "data")
    }

    /// Pulls a selector over one entity.
    pub async fn pull(&self, params: PullParams) -> Result<Value, Anomaly> {
        let conn = self.connection()?;
        let body = Value::map(vec![
            (Value::keyword("db"), self.to_value()),
            (Value::keyword("selector"), params.selector),
            (Value::keyword("eid"), params.eid),
        ]);
        let request = ApiRequest::new(Op::Pull, body).with_timeout(params.timeout_ms);
        let body = submit_request(conn.conn_impl(), request).await?;
        Ok(body
            .kget("result")
            .cloned()
            .unwrap_or_else(|| Value::map(vec![])))
    }

    /// Aggregate statistics about the database.
    pub async fn db_stats(&self) -> Result<Value, Anomaly> {
        let conn = self.connection()?;
        let body = Value::map(vec![(Value::keyword("db"), self.to_value())]);
        let request = ApiRequest::new(Op::DbStats, body);
        let body = submit_request(conn.conn_impl(), request).await?;
        Ok(body.kget("result").cloned().unwrap_or(Value::Nil))
    }

    /// Applies transaction data against a `with-db` value without
    /// durably transacting it.
    pub async fn with(&self, params: TransactParams) -> Result<TxResult, Anomaly> {
        let token = self.next_token.clone().ok_or_else(|| {
            Anomaly::incorrect("with requires a with-db database (missing next-token)")
        })?;
        let conn = self.connection()?;
        let body = Value::map(vec![
            (Value::keyword("tx-data"), params.tx_data),
            (
                Value::keyword("tx-id"),
                Value::string(uuid::Uuid::new_v4().to_string()),
            ),
        ]);
        let request = ApiRequest::new(Op::With, body)
            .with_timeout(params.timeout_ms)
            .with_next_token(Some(token));
        let body = submit_request(conn.conn_impl(), request).await?;
        TxResult::from_body(&body, self.database_id.as_str())
    }
}

/// Creates a database.
pub async fn create_database(args: ClientConfig) -> Result<(), Anomaly> {
    create_database_with(args, transport::shared()).await
}

pub async fn create_database_with(
    args: ClientConfig,
    transport: Arc<dyn Transport>,
) -> Result<(), Anomaly> {
    let config = validate(resolve(args))?;
    let db_name = required_db_name(&config)?;
    catalog_request(&config, transport, Op::CreateDb, db_name_body(&db_name)).await?;
    Ok(())
}

/// Deletes a database, forgetting any cached connection first.
pub async fn delete_database(args: ClientConfig) -> Result<(), Anomaly> {
    delete_database_with(args, transport::shared()).await
}

pub async fn delete_database_with(
    args: ClientConfig,
    transport: Arc<dyn Transport>,
) -> Result<(), Anomaly> {
    let config = validate(resolve(args))?;
    let db_name = required_db_name(&config)?;
    ConnectionCache::global().forget_config(&config);
    catalog_request(&config, transport, Op::DeleteDb, db_name_body(&db_name)).await?;
    Ok(())
}

/// Lists the databases in the catalog.
pub async fn list_databases(args: ClientConfig) -> Result<Vec<String>, Anomaly> {
    list_databases_with(args, transport::shared()).await
}

pub async fn list_databases_with(
    args: ClientConfig,
    transport: Arc<dyn Transport>,
) -> Result<Vec<String>, Anomaly> {
    let config = validate(resolve(args))?;
    let body = catalog_request(&config, transport, Op::ListDbs, Value::map(vec![])).await?;
    let names = body
        .kget("result")
        .and_then(Value::as_list)
        .or_else(|| body.as_list())
        .ok_or_else(|| Anomaly::fault("list-dbs response is not a list"))?;
    Ok(names
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}

/// One catalog exchange on a throwaway connection-impl. Catalog ops
/// address the catalog itself, so the impl is not bound to a database.
async fn catalog_request(
    config: &ClientConfig,
    transport: Arc<dyn Transport>,
    op: Op,
    body: Value,
) -> Result<Value, Anomaly> {
    let endpoint = parse_endpoint(config.endpoint.as_deref().unwrap_or_default())?;
    let impl_config = ClientConfig {
        db_name: None,
        ..config.clone()
    };
    let conn_impl = Arc::new(ConnectionImpl::new(impl_config, endpoint, transport));
    submit_request(&conn_impl, ApiRequest::new(op, body)).await
}

fn required_db_name(config: &ClientConfig) -> Result<String, Anomaly> {
    config
        .db_name
        .clone()
        .ok_or_else(|| Anomaly::incorrect("a db-name is required"))
}

fn db_name_body(db_name: &str) -> Value {
    Value::map(vec![(Value::keyword("db-name"), Value::string(db_name))])
}

/// Applies the paging defaults: offset 0, limit 1000 (-1 for unbounded),
/// chunk 1000 capped at 10000.
fn page(body: Value, offset: Option<i64>, limit: Option<i64>, chunk: Option<i64>) -> Value {
    body.assoc(
        Value::keyword("offset"),
        Value::Int(offset.unwrap_or(DEFAULT_OFFSET)),
    )
    .assoc(
        Value::keyword("limit"),
        Value::Int(limit.unwrap_or(DEFAULT_LIMIT)),
    )
    .assoc(
        Value::keyword("chunk"),
        Value::Int(chunk.unwrap_or(DEFAULT_CHUNK).min(MAX_CHUNK)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Index;
    use crate::testing::ScriptedTransport;
    use datomic_protocol::{unmarshal, Category, Datom, Format};

    fn config(db_name: &str) -> ClientConfig {
        ClientConfig::new()
            .with_account_id("a")
            .with_access_key("k")
            .with_secret("s")
            .with_endpoint("db.example.com:8998")
            .with_service("peer-server")
            .with_region("none")
            .with_db_name(db_name)
    }

    /// resolve-db and status answered by one shape, so interleaved
    /// connects cannot confuse the script.
    fn connect_body(database_id: &str) -> Value {
        Value::map(vec![
            (
                Value::keyword("database-id"),
                Value::string(database_id),
            ),
            (Value::keyword("t"), Value::Int(7)),
            (Value::keyword("next-t"), Value::Int(8)),
        ])
    }

    fn scripted_connect(transport: &ScriptedTransport, database_id: &str, exchanges: usize) {
        for _ in 0..exchanges {
            transport.push_ok(&connect_body(database_id));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_resolves_and_interns() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-connect", 2);

        let conn = connect_with(config("movies-connect"), transport.clone())
            .await
            .unwrap();
        assert_eq!(conn.database_id(), "db-connect");
        assert_eq!(conn.state().t, 7);
        assert_eq!(conn.state().next_t, 8);
        assert_eq!(conn.db_name(), Some("movies-connect"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].header("x-nano-op"),
            Some("datomic.catalog/resolve-db")
        );
        assert_eq!(requests[0].header("x-nano-target"), None);
        assert_eq!(
            requests[1].header("x-nano-op"),
            Some("datomic.client.protocol/status")
        );
        assert_eq!(requests[1].header("x-nano-target"), Some("db-connect"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_reuses_cached_connection() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-cached", 2);

        let first = connect_with(config("movies-cached"), transport.clone())
            .await
            .unwrap();
        let second = connect_with(config("movies-cached"), transport.clone())
            .await
            .unwrap();
        assert_eq!(first.token(), second.token());
        // the second connect never touched the network
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connects_intern_one_connection() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-race", 4);

        let (a, b) = tokio::join!(
            connect_with(config("movies-race"), transport.clone()),
            connect_with(config("movies-race"), transport.clone()),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.token(), b.token());
        let canonical = ConnectionCache::global()
            .lookup_by_database_id("db-race")
            .unwrap();
        assert_eq!(canonical.token(), a.token());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_requires_db_name() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut cfg = config("unused");
        cfg.db_name = None;
        let err = connect_with(cfg, transport).await.unwrap_err();
        assert_eq!(err.category, Category::Incorrect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_propagates_invalid_config() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut cfg = config("movies-invalid");
        cfg.secret = Some(String::new());
        let err = connect_with(cfg, transport.clone()).await.unwrap_err();
        assert_eq!(err.category, Category::Incorrect);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_keeps_local_state_but_drops_cache() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-shutdown", 2);
        let conn = connect_with(config("movies-shutdown"), transport.clone())
            .await
            .unwrap();

        conn.shutdown();
        // local inspection still works
        let db = conn.db();
        assert_eq!(db.t, 7);
        // network ops need the cache mapping, which is gone
        let err = db
            .pull(PullParams::new(Value::keyword("*"), Value::Int(1)))
            .await
            .unwrap_err();
        assert_eq!(err.category, Category::NotFound);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_datoms_binds_components_positionally() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-datoms", 2);
        let conn = connect_with(config("movies-datoms"), transport.clone())
            .await
            .unwrap();
        transport.push_ok(&Value::map(vec![(
            Value::keyword("data"),
            Value::list(vec![]),
        )]));

        let params = DatomsParams::new(Index::Eavt)
            .with_components(vec![Value::Int(42), Value::keyword("person/name")]);
        let mut rx = conn.db().datoms(params);
        assert!(rx.recv().await.unwrap().is_ok());
        assert!(rx.recv().await.is_none());

        let requests = transport.requests();
        let sent = &requests[2];
        assert_eq!(sent.header("x-nano-op"), Some("datomic.client.protocol/datoms"));
        assert_eq!(sent.header("x-nano-target"), Some("db-datoms"));
        let body = unmarshal(&sent.body, Format::Msgpack).unwrap();
        assert_eq!(body.kget("index"), Some(&Value::keyword("eavt")));
        assert_eq!(body.kget("e"), Some(&Value::Int(42)));
        assert_eq!(body.kget("a"), Some(&Value::keyword("person/name")));
        assert_eq!(body.kget("v"), None);
        assert_eq!(body.kget("t"), None);
        assert_eq!(body.kget("offset"), Some(&Value::Int(0)));
        assert_eq!(body.kget("limit"), Some(&Value::Int(1000)));
        assert_eq!(body.kget("chunk"), Some(&Value::Int(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_datoms_rejects_too_many_components() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-datoms-bad", 2);
        let conn = connect_with(config("movies-datoms-bad"), transport.clone())
            .await
            .unwrap();

        let params = DatomsParams::new(Index::Eavt).with_components(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(4),
        ]);
        let mut rx = conn.db().datoms(params);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.unwrap_err().category, Category::Incorrect);
        assert!(rx.recv().await.is_none());
        assert_eq!(transport.request_count(), 2);
    }

    fn tx_result_body() -> Value {
        Value::map(vec![
            (
                Value::keyword("db-before"),
                Value::map(vec![
                    (Value::keyword("t"), Value::Int(7)),
                    (Value::keyword("next-t"), Value::Int(8)),
                ]),
            ),
            (
                Value::keyword("db-after"),
                Value::map(vec![
                    (Value::keyword("t"), Value::Int(8)),
                    (Value::keyword("next-t"), Value::Int(9)),
                ]),
            ),
            (
                Value::keyword("tx-data"),
                Value::list(vec![Value::Datom(Box::new(Datom::new(
                    Value::Int(1),
                    Value::keyword("person/name"),
                    Value::string("Ada"),
                    8,
                    true,
                )))]),
            ),
            (Value::keyword("tempids"), Value::map(vec![])),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn test_transact_generates_tx_id_and_parses_result() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-transact", 2);
        let conn = connect_with(config("movies-transact"), transport.clone())
            .await
            .unwrap();
        transport.push_ok(&tx_result_body());

        let tx_data = Value::list(vec![Value::map(vec![(
            Value::keyword("person/name"),
            Value::string("Ada"),
        )])]);
        let result = conn
            .transact(TransactParams::new(tx_data.clone()))
            .await
            .unwrap();
        assert_eq!(result.db_before.t, 7);
        assert_eq!(result.db_after.t, 8);
        assert_eq!(result.tx_data.len(), 1);

        let requests = transport.requests();
        let sent = &requests[2];
        let body = unmarshal(&sent.body, Format::Msgpack).unwrap();
        assert_eq!(body.kget("tx-data"), Some(&tx_data));
        let tx_id = body.kget("tx-id").and_then(Value::as_str).unwrap();
        assert_eq!(tx_id.len(), 36); // uuid
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_db_then_with_carries_token() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-with", 2);
        let conn = connect_with(config("movies-with"), transport.clone())
            .await
            .unwrap();

        transport.push_ok(&Value::map(vec![
            (Value::keyword("database-id"), Value::string("db-with")),
            (Value::keyword("t"), Value::Int(7)),
            (Value::keyword("next-t"), Value::Int(8)),
            (Value::keyword("next-token"), Value::string("tok-with")),
        ]));
        let with_db = conn.with_db().await.unwrap();
        assert_eq!(with_db.next_token.as_deref(), Some("tok-with"));

        transport.push_ok(&tx_result_body());
        let result = with_db
            .with(TransactParams::new(Value::list(vec![])))
            .await
            .unwrap();
        assert_eq!(result.db_after.next_t, 9);

        let requests = transport.requests();
        let sent = &requests[3];
        assert_eq!(sent.header("x-nano-op"), Some("datomic.client.protocol/with"));
        assert_eq!(sent.header("x-nano-next"), Some("tok-with"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_requires_next_token() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-with-plain", 2);
        let conn = connect_with(config("movies-with-plain"), transport.clone())
            .await
            .unwrap();

        let err = conn
            .db()
            .with(TransactParams::new(Value::list(vec![])))
            .await
            .unwrap_err();
        assert_eq!(err.category, Category::Incorrect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_defaults_to_empty_map() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-pull", 2);
        let conn = connect_with(config("movies-pull"), transport.clone())
            .await
            .unwrap();
        transport.push_ok(&Value::map(vec![]));

        let pulled = conn
            .db()
            .pull(PullParams::new(Value::keyword("*"), Value::Int(17)))
            .await
            .unwrap();
        assert_eq!(pulled, Value::map(vec![]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_is_local() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-log", 2);
        let conn = connect_with(config("movies-log"), transport.clone())
            .await
            .unwrap();
        let log = conn.log();
        assert_eq!(log.kget("log"), Some(&Value::string("db-log")));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_database_issues_catalog_op() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(&Value::Bool(true));
        create_database_with(config("movies-create"), transport.clone())
            .await
            .unwrap();

        let requests = transport.requests();
        let sent = &requests[0];
        assert_eq!(sent.header("x-nano-op"), Some("datomic.catalog/create-db"));
        assert_eq!(sent.header("x-nano-target"), None);
        let body = unmarshal(&sent.body, Format::Msgpack).unwrap();
        assert_eq!(body.kget("db-name"), Some(&Value::string("movies-create")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_database_forgets_cached_connection() {
        let transport = Arc::new(ScriptedTransport::new());
        scripted_connect(&transport, "db-delete", 2);
        let cfg = config("movies-delete");
        connect_with(cfg.clone(), transport.clone()).await.unwrap();

        transport.push_ok(&Value::Bool(true));
        delete_database_with(cfg.clone(), transport.clone())
            .await
            .unwrap();

        let resolved = validate(resolve(cfg)).unwrap();
        assert!(ConnectionCache::global().lookup_by_config(&resolved).is_none());
        let requests = transport.requests();
        let sent = &requests[2];
        assert_eq!(sent.header("x-nano-op"), Some("datomic.catalog/delete-db"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_databases_parses_names() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(&Value::map(vec![(
            Value::keyword("result"),
            Value::list(vec![Value::string("movies"), Value::string("inventory")]),
        )]));
        let names = list_databases_with(config("unused-list"), transport)
            .await
            .unwrap();
        assert_eq!(names, vec!["movies".to_string(), "inventory".to_string()]);
    }

    #[test]
    fn test_page_defaults() {
        let body = page(Value::map(vec![]), None, None, None);
        assert_eq!(body.kget("offset"), Some(&Value::Int(0)));
        assert_eq!(body.kget("limit"), Some(&Value::Int(1000)));
        assert_eq!(body.kget("chunk"), Some(&Value::Int(1000)));
    }

    #[test]
    fn test_page_caps_chunk() {
        let body = page(Value::map(vec![]), Some(10), Some(-1), Some(50_000));
        assert_eq!(body.kget("offset"), Some(&Value::Int(10)));
        assert_eq!(body.kget("limit"), Some(&Value::Int(-1)));
        assert_eq!(body.kget("chunk"), Some(&Value::Int(10_000)));
    }
}
