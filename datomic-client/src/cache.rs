//! Process-wide connection cache.
//!
//! Three mutually consistent maps guarded by one mutex: configuration to
//! database id, database id to connection, connection to configuration.
//! Lookups run in both directions in O(1); no lock is held across I/O.

use crate::config::ClientConfig;
use crate::connection::Connection;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Default)]
struct CacheInner {
    id_by_config: HashMap<ClientConfig, String>,
    conn_by_id: HashMap<String, Connection>,
    config_by_token: HashMap<u64, ClientConfig>,
}

/// The cache. One instance per process; see [`ConnectionCache::global`].
#[derive(Default)]
pub struct ConnectionCache {
    inner: Mutex<CacheInner>,
}

impl ConnectionCache {
    pub fn new() -> ConnectionCache {
        ConnectionCache::default()
    }

    pub fn global() -> &'static ConnectionCache {
        static CACHE: OnceLock<ConnectionCache> = OnceLock::new();
        CACHE.get_or_init(ConnectionCache::new)
    }

    /// Installs all three directions, or returns the connection already
    /// interned for this configuration. First install wins; racers get
    /// the canonical instance back.
    pub fn put(
        &self,
        config: ClientConfig,
        database_id: String,
        conn: Connection,
    ) -> Connection {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .id_by_config
            .get(&config)
            .and_then(|id| inner.conn_by_id.get(id))
        {
            return existing.clone();
        }
        inner.config_by_token.insert(conn.token(), config.clone());
        inner.id_by_config.insert(config, database_id.clone());
        inner.conn_by_id.insert(database_id, conn.clone());
        conn
    }

    pub fn lookup_by_config(&self, config: &ClientConfig) -> Option<Connection> {
        let inner = self.inner.lock();
        inner
            .id_by_config
            .get(config)
            .and_then(|id| inner.conn_by_id.get(id))
            .cloned()
    }

    pub fn lookup_by_database_id(&self, database_id: &str) -> Option<Connection> {
        self.inner.lock().conn_by_id.get(database_id).cloned()
    }

    /// Removes the connection's three entries. A missing link anywhere
    /// makes this a no-op.
    pub fn forget_conn(&self, conn: &Connection) {
        let mut inner = self.inner.lock();
        let Some(config) = inner.config_by_token.get(&conn.token()).cloned() else {
            return;
        };
        let Some(database_id) = inner.id_by_config.get(&config).cloned() else {
            return;
        };
        inner.config_by_token.remove(&conn.token());
        inner.id_by_config.remove(&config);
        inner.conn_by_id.remove(&database_id);
    }

    /// Symmetric removal keyed by configuration.
    pub fn forget_config(&self, config: &ClientConfig) {
        let mut inner = self.inner.lock();
        let Some(database_id) = inner.id_by_config.get(config).cloned() else {
            return;
        };
        let Some(token) = inner.conn_by_id.get(&database_id).map(|c| c.token()) else {
            return;
        };
        inner.id_by_config.remove(config);
        inner.conn_by_id.remove(&database_id);
        inner.config_by_token.remove(&token);
    }

    #[cfg(test)]
    fn is_bijective(&self) -> bool {
        let inner = self.inner.lock();
        if inner.id_by_config.len() != inner.conn_by_id.len()
            || inner.conn_by_id.len() != inner.config_by_token.len()
        {
            return false;
        }
        inner.id_by_config.iter().all(|(config, id)| {
            inner
                .conn_by_id
                .get(id)
                .and_then(|conn| inner.config_by_token.get(&conn.token()))
                .is_some_and(|c| c == config)
        })
    }
}
