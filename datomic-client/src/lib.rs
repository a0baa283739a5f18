//! # datomic-client
//!
//! Async client for a remote transactional database over authenticated
//! HTTP.
//!
//! This crate provides:
//! - Connection management with a process-wide cache (one live connection
//!   per validated configuration)
//! - The request pipeline: transit marshalling, HMAC signing, submission
//!   with per-request timeouts, anomaly classification
//! - Transparent retry of busy responses with exponential backoff
//! - Chunked streaming of large results with consumer backpressure
//!
//! Failures are [`Anomaly`] values carried in `Result`, never panics.

pub mod cache;
pub mod chunk;
pub mod classify;
pub mod client;
pub mod config;
pub mod connection;
pub mod db;
pub mod dispatch;
pub mod endpoint;
pub mod request;
pub mod retry;
pub mod sign;
pub mod testing;
pub mod transport;

pub use cache::ConnectionCache;
pub use chunk::ChunkReceiver;
pub use client::{
    connect, connect_with, create_database, create_database_with, delete_database,
    delete_database_with, list_databases, list_databases_with,
};
pub use config::{resolve, validate, ClientConfig, DEFAULT_TIMEOUT_MS, PRO_ACCOUNT, PRO_REGION};
pub use connection::{Connection, Watermark};
pub use db::{
    DatomsParams, Db, Index, IndexRangeParams, PullParams, QueryParams, TransactParams,
    TxRangeParams, TxResult,
};
pub use dispatch::{queue_request, ApiRequest};
pub use endpoint::{parse_endpoint, Endpoint};
pub use transport::{HttpRequest, HttpResponse, Transport, TransportError};

pub use datomic_protocol::{is_anomaly, Anomaly, Category, Datom, Op, Value};
