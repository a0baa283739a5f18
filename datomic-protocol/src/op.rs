//! The closed set of wire operations.

use std::fmt;

/// Protocol and catalog operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // datomic.client.protocol
    Status,
    Datoms,
    IndexRange,
    Pull,
    Q,
    TxRange,
    Transact,
    WithDb,
    With,
    DbStats,
    Next,

    // datomic.catalog
    ResolveDb,
    CreateDb,
    DeleteDb,
    ListDbs,
}

impl Op {
    /// Catalog ops address the catalog itself rather than a database.
    pub fn is_catalog(&self) -> bool {
        matches!(
            self,
            Op::ResolveDb | Op::CreateDb | Op::DeleteDb | Op::ListDbs
        )
    }

    /// The qualified string placed in the `x-nano-op` header.
    pub fn qualified(&self) -> &'static str {
        match self {
            Op::Status => "datomic.client.protocol/status",
            Op::Datoms => "datomic.client.protocol/datoms",
            Op::IndexRange => "datomic.client.protocol/index-range",
            Op::Pull => "datomic.client.protocol/pull",
            Op::Q => "datomic.client.protocol/q",
            Op::TxRange => "datomic.client.protocol/tx-range",
            Op::Transact => "datomic.client.protocol/transact",
            Op::WithDb => "datomic.client.protocol/with-db",
            Op::With => "datomic.client.protocol/with",
            Op::DbStats => "datomic.client.protocol/db-stats",
            Op::Next => "datomic.client.protocol/next",
            Op::ResolveDb => "datomic.catalog/resolve-db",
            Op::CreateDb => "datomic.catalog/create-db",
            Op::DeleteDb => "datomic.catalog/delete-db",
            Op::ListDbs => "datomic.catalog/list-dbs",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qualified())
    }
}
