//! # datomic-protocol
//!
//! Wire-level building blocks for the Datomic client:
//! - Dynamic [`Value`] space and the [`Datom`] fact tuple
//! - [`Anomaly`] failure values with their closed category set
//! - Transit-style marshal/unmarshal over msgpack, JSON and EDN
//! - The qualified [`Op`] set split between protocol and catalog

pub mod anomaly;
pub mod codec;
pub mod op;
pub mod value;

pub use anomaly::{is_anomaly, Anomaly, Category, HttpResult};
pub use codec::{decode_body, marshal, unmarshal, CodecError, Format, Marshalled};
pub use op::Op;
pub use value::{Datom, Value};
