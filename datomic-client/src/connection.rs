//! Connections and their watermark state.

use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::transport::Transport;
use datomic_protocol::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The `(t, next-t)` pair tracking the most recently observed database
/// point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    pub t: u64,
    pub next_t: u64,
}

/// Shared mutable watermark. Advances are monotonic: a candidate replaces
/// the current value iff its `t` is strictly greater, so losers of a
/// concurrent race see a no-op.
#[derive(Debug, Default)]
pub struct WatermarkCell {
    cell: Mutex<Watermark>,
}

impl WatermarkCell {
    pub fn new() -> WatermarkCell {
        WatermarkCell::default()
    }

    pub fn load(&self) -> Watermark {
        *self.cell.lock()
    }

    /// Returns true iff the candidate advanced the state.
    pub fn advance(&self, candidate: Watermark) -> bool {
        let mut current = self.cell.lock();
        if candidate.t > current.t {
            *current = candidate;
            true
        } else {
            false
        }
    }
}

static NEXT_CONN_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Everything a dispatched request needs: validated configuration, parsed
/// endpoint, transport handle, watermark state and (once resolved) the
/// database id.
pub struct ConnectionImpl {
    pub config: ClientConfig,
    pub endpoint: Endpoint,
    pub transport: Arc<dyn Transport>,
    pub database_id: Option<String>,
    pub state: WatermarkCell,
    token: u64,
}

impl ConnectionImpl {
    pub fn new(
        config: ClientConfig,
        endpoint: Endpoint,
        transport: Arc<dyn Transport>,
    ) -> ConnectionImpl {
        ConnectionImpl {
            config,
            endpoint,
            transport,
            database_id: None,
            state: WatermarkCell::new(),
            token: NEXT_CONN_TOKEN.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn with_database_id(mut self, database_id: impl Into<String>) -> ConnectionImpl {
        self.database_id = Some(database_id.into());
        self
    }

    pub fn timeout_ms(&self) -> u64 {
        self.config.timeout_ms()
    }
}

impl fmt::Debug for ConnectionImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionImpl")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .field("database_id", &self.database_id)
            .field("state", &self.state.load())
            .finish()
    }
}

/// A live logical connection to one database. Cheap to clone; all clones
/// share the impl and its watermark.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionImpl>,
    database_id: String,
}

impl Connection {
    pub(crate) fn new(inner: Arc<ConnectionImpl>, database_id: String) -> Connection {
        Connection { inner, database_id }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn account_id(&self) -> Option<&str> {
        self.inner.config.account_id.as_deref()
    }

    pub fn db_name(&self) -> Option<&str> {
        self.inner.config.db_name.as_deref()
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    pub fn state(&self) -> Watermark {
        self.inner.state.load()
    }

    pub(crate) fn conn_impl(&self) -> &Arc<ConnectionImpl> {
        &self.inner
    }

    pub(crate) fn token(&self) -> u64 {
        self.inner.token
    }

    /// Inspection view of the handle.
    pub fn to_value(&self) -> Value {
        let state = self.state();
        let mut entries = vec![(
            Value::keyword("database-id"),
            Value::string(self.database_id.clone()),
        )];
        if let Some(account_id) = self.account_id() {
            entries.push((Value::keyword("account-id"), Value::string(account_id)));
        }
        if let Some(db_name) = self.db_name() {
            entries.push((Value::keyword("db-name"), Value::string(db_name)));
        }
        entries.push((Value::keyword("t"), Value::Int(state.t as i64)));
        entries.push((Value::keyword("next-t"), Value::Int(state.next_t as i64)));
        Value::Map(entries)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("database_id", &self.database_id)
            .field("db_name", &self.db_name())
            .field("state", &self.state())
            .finish()
    }
}
