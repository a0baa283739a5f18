//! Database descriptors and the typed shapes of read and write requests.

use datomic_protocol::{Anomaly, Datom, Value};

/// An immutable value identifying a database at a point, range or full
/// history. Produced by `Connection::db` and the modifier methods; passed
/// by value to read operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Db {
    pub database_id: String,
    pub t: u64,
    pub next_t: u64,
    pub as_of: Option<u64>,
    pub since: Option<u64>,
    pub history: bool,
    /// Present only on databases returned by `with-db`.
    pub next_token: Option<String>,
}

impl Db {
    pub(crate) fn snapshot(database_id: impl Into<String>, t: u64, next_t: u64) -> Db {
        Db {
            database_id: database_id.into(),
            t,
            next_t,
            as_of: None,
            since: None,
            history: false,
            next_token: None,
        }
    }

    /// The database as of point `t`.
    pub fn as_of(&self, t: u64) -> Db {
        Db {
            as_of: Some(t),
            ..self.clone()
        }
    }

    /// The changes since point `t`.
    pub fn since(&self, t: u64) -> Db {
        Db {
            since: Some(t),
            ..self.clone()
        }
    }

    /// The database across all of time.
    pub fn history(&self) -> Db {
        Db {
            history: true,
            ..self.clone()
        }
    }

    /// Wire rendering of the descriptor.
    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            (
                Value::keyword("database-id"),
                Value::string(self.database_id.clone()),
            ),
            (Value::keyword("t"), Value::Int(self.t as i64)),
            (Value::keyword("next-t"), Value::Int(self.next_t as i64)),
        ];
        if let Some(t) = self.as_of {
            entries.push((Value::keyword("as-of"), Value::Int(t as i64)));
        }
        if let Some(t) = self.since {
            entries.push((Value::keyword("since"), Value::Int(t as i64)));
        }
        if self.history {
            entries.push((Value::keyword("history"), Value::Bool(true)));
        }
        if let Some(token) = &self.next_token {
            entries.push((Value::keyword("next-token"), Value::string(token.clone())));
        }
        Value::Map(entries)
    }

    /// Reads a descriptor out of a response map, falling back to
    /// `default_id` when the map omits the database id.
    pub fn from_value(value: &Value, default_id: &str) -> Result<Db, Anomaly> {
        let database_id = value
            .kget("database-id")
            .and_then(Value::as_str)
            .unwrap_or(default_id)
            .to_string();
        let t = watermark_field(value, "t")?;
        let next_t = watermark_field(value, "next-t")?;
        Ok(Db {
            database_id,
            t,
            next_t,
            as_of: value.kget("as-of").and_then(Value::as_int).map(|t| t as u64),
            since: value.kget("since").and_then(Value::as_int).map(|t| t as u64),
            history: value
                .kget("history")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            next_token: value
                .kget("next-token")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

fn watermark_field(value: &Value, field: &str) -> Result<u64, Anomaly> {
    value
        .kget(field)
        .and_then(Value::as_int)
        .filter(|t| *t >= 0)
        .map(|t| t as u64)
        .ok_or_else(|| Anomaly::fault(format!("db map in response is missing {field}")))
}

/// Index orderings over the positional component vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    Eavt,
    Aevt,
    Avet,
    Vaet,
}

impl Index {
    /// Keys for positional components in this index's order.
    pub fn component_keys(&self) -> [&'static str; 4] {
        match self {
            Index::Eavt => ["e", "a", "v", "t"],
            Index::Aevt => ["a", "e", "v", "t"],
            Index::Avet => ["a", "v", "e", "t"],
            Index::Vaet => ["v", "a", "e", "t"],
        }
    }

    pub fn as_keyword(&self) -> &'static str {
        match self {
            Index::Eavt => "eavt",
            Index::Aevt => "aevt",
            Index::Avet => "avet",
            Index::Vaet => "vaet",
        }
    }
}

/// Binds positional components to this index's keys. At most three
/// components; the fourth slot belongs to the db snapshot.
pub(crate) fn bind_components(
    index: Index,
    components: &[Value],
) -> Result<Vec<(Value, Value)>, Anomaly> {
    if components.len() > 3 {
        return Err(Anomaly::incorrect(
            "components must be a vector of length <= 3",
        ));
    }
    let keys = index.component_keys();
    Ok(components
        .iter()
        .enumerate()
        .map(|(i, component)| (Value::keyword(keys[i]), component.clone()))
        .collect())
}

/// Paging defaults shared by the chunked reads.
pub(crate) const DEFAULT_OFFSET: i64 = 0;
pub(crate) const DEFAULT_LIMIT: i64 = 1000;
pub(crate) const DEFAULT_CHUNK: i64 = 1000;
pub(crate) const MAX_CHUNK: i64 = 10_000;

/// Parameters for `datoms`.
#[derive(Debug, Clone)]
pub struct DatomsParams {
    pub index: Index,
    pub components: Vec<Value>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub chunk: Option<i64>,
    pub timeout_ms: Option<u64>,
}

impl DatomsParams {
    pub fn new(index: Index) -> DatomsParams {
        DatomsParams {
            index,
            components: Vec::new(),
            offset: None,
            limit: None,
            chunk: None,
            timeout_ms: None,
        }
    }

    pub fn with_components(mut self, components: Vec<Value>) -> DatomsParams {
        self.components = components;
        self
    }
}

/// Parameters for `index-range`.
#[derive(Debug, Clone)]
pub struct IndexRangeParams {
    pub attrid: Value,
    pub start: Option<Value>,
    pub end: Option<Value>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub chunk: Option<i64>,
    pub timeout_ms: Option<u64>,
}

impl IndexRangeParams {
    pub fn new(attrid: Value) -> IndexRangeParams {
        IndexRangeParams {
            attrid,
            start: None,
            end: None,
            offset: None,
            limit: None,
            chunk: None,
            timeout_ms: None,
        }
    }
}

/// Parameters for `pull`.
#[derive(Debug, Clone)]
pub struct PullParams {
    pub selector: Value,
    pub eid: Value,
    pub timeout_ms: Option<u64>,
}

impl PullParams {
    pub fn new(selector: Value, eid: Value) -> PullParams {
        PullParams {
            selector,
            eid,
            timeout_ms: None,
        }
    }
}

/// Parameters for `q`.
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub query: Value,
    pub args: Vec<Value>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub chunk: Option<i64>,
    pub timeout_ms: Option<u64>,
}

impl QueryParams {
    pub fn new(query: Value, args: Vec<Value>) -> QueryParams {
        QueryParams {
            query,
            args,
            offset: None,
            limit: None,
            chunk: None,
            timeout_ms: None,
        }
    }
}

/// Parameters for `tx-range`.
#[derive(Debug, Clone, Default)]
pub struct TxRangeParams {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub chunk: Option<i64>,
    pub timeout_ms: Option<u64>,
}

impl TxRangeParams {
    pub fn new() -> TxRangeParams {
        TxRangeParams::default()
    }
}

/// Parameters for `transact` and `with`.
#[derive(Debug, Clone)]
pub struct TransactParams {
    /// The transaction data list.
    pub tx_data: Value,
    pub timeout_ms: Option<u64>,
}

impl TransactParams {
    pub fn new(tx_data: Value) -> TransactParams {
        TransactParams {
            tx_data,
            timeout_ms: None,
        }
    }
}

/// Result of `transact` and `with`.
#[derive(Debug, Clone, PartialEq)]
pub struct TxResult {
    pub db_before: Db,
    pub db_after: Db,
    pub tx_data: Vec<Datom>,
    pub tempids: Value,
}

impl TxResult {
    pub(crate) fn from_body(body: &Value, default_id: &str) -> Result<TxResult, Anomaly> {
        let db_before = body
            .kget("db-before")
            .map(|v| Db::from_value(v, default_id))
            .transpose()?
            .ok_or_else(|| Anomaly::fault("transaction result is missing db-before"))?;
        let db_after = body
            .kget("db-after")
            .map(|v| Db::from_value(v, default_id))
            .transpose()?
            .ok_or_else(|| Anomaly::fault("transaction result is missing db-after"))?;
        let tx_data = body
            .kget("tx-data")
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.as_datom().cloned())
            .collect();
        let tempids = body.kget("tempids").cloned().unwrap_or(Value::Nil);
        Ok(TxResult {
            db_before,
            db_after,
            tx_data,
            tempids,
        })
    }
}
