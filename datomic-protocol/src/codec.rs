//! Marshal/unmarshal between [`Value`] and the wire formats.
//!
//! The binary format is transit-style tagging over msgpack: keywords ride
//! as `~:` strings, symbols as `~$` strings, literal tildes are escaped by
//! prefixing one more, and fact tuples are `["~#datom", [e a v t added]]`
//! tagged arrays. The JSON leg applies the same conventions to a JSON
//! tree. EDN is a textual fallback some endpoints emit; the reader lives
//! in the nested [`edn`] module.

use crate::anomaly::Anomaly;
use crate::value::{Datom, Value};
use bytes::Bytes;
use std::io::Cursor;
use thiserror::Error;

/// Codec-level errors. Converted to fault anomalies at the pipeline edge.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("msgpack encode error: {0}")]
    MsgpackEncode(#[from] rmpv::encode::Error),

    #[error("msgpack decode error: {0}")]
    MsgpackDecode(#[from] rmpv::decode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("unsupported value in payload: {0}")]
    Unsupported(&'static str),

    #[error("malformed datom in payload")]
    MalformedDatom,

    #[error("integer out of i64 range")]
    IntRange,

    #[error("EDN parse error: {0}")]
    Edn(String),
}

/// Wire formats the unmarshal side understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Msgpack,
    Json,
}

/// A marshalled payload. `len` is the number of meaningful bytes; the
/// request body is built from exactly that many.
#[derive(Debug, Clone)]
pub struct Marshalled {
    pub bytes: Bytes,
    pub len: usize,
}

/// Encodes a value as a sized msgpack buffer.
pub fn marshal(value: &Value) -> Result<Marshalled, CodecError> {
    let mut buf = Vec::with_capacity(256);
    rmpv::encode::write_value(&mut buf, &to_rmpv(value))?;
    let len = buf.len();
    Ok(Marshalled {
        bytes: Bytes::from(buf),
        len,
    })
}

/// Decodes a payload of the given format.
pub fn unmarshal(bytes: &[u8], format: Format) -> Result<Value, CodecError> {
    match format {
        Format::Msgpack => {
            let raw = rmpv::decode::read_value(&mut Cursor::new(bytes))?;
            from_rmpv(raw)
        }
        Format::Json => {
            let raw: serde_json::Value = serde_json::from_slice(bytes)?;
            from_json(raw)
        }
    }
}

/// Content-type dispatch for response bodies.
pub fn decode_body(content_type: &str, bytes: &[u8]) -> Result<Value, Anomaly> {
    let ct = content_type.split(';').next().unwrap_or("").trim();
    match ct {
        "application/transit+msgpack" => {
            unmarshal(bytes, Format::Msgpack).map_err(|e| Anomaly::fault(e.to_string()))
        }
        "application/transit+json" => {
            unmarshal(bytes, Format::Json).map_err(|e| Anomaly::fault(e.to_string()))
        }
        "application/edn" => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| Anomaly::fault("invalid UTF-8 in EDN body"))?;
            edn::read_str(text).map_err(|e| Anomaly::fault(e.to_string()))
        }
        "text/plain" => Ok(Value::Str(String::from_utf8_lossy(bytes).into_owned())),
        other => Err(Anomaly::fault(format!(
            "Cannot unmarshal content-type {other}"
        ))),
    }
}

const DATOM_TAG: &str = "~#datom";

fn escape_str(s: &str) -> String {
    if s.starts_with('~') {
        format!("~{s}")
    } else {
        s.to_string()
    }
}

fn unescape_str(s: String) -> Value {
    if let Some(rest) = s.strip_prefix("~:") {
        Value::Keyword(rest.to_string())
    } else if let Some(rest) = s.strip_prefix("~$") {
        Value::Symbol(rest.to_string())
    } else if s.starts_with("~~") {
        Value::Str(s[1..].to_string())
    } else {
        Value::Str(s)
    }
}

fn to_rmpv(value: &Value) -> rmpv::Value {
    match value {
        Value::Nil => rmpv::Value::Nil,
        Value::Bool(b) => rmpv::Value::from(*b),
        Value::Int(i) => rmpv::Value::from(*i),
        Value::Float(f) => rmpv::Value::from(*f),
        Value::Str(s) => rmpv::Value::String(escape_str(s).into()),
        Value::Keyword(k) => rmpv::Value::String(format!("~:{k}").into()),
        Value::Symbol(s) => rmpv::Value::String(format!("~${s}").into()),
        Value::List(items) => rmpv::Value::Array(items.iter().map(to_rmpv).collect()),
        Value::Map(entries) => rmpv::Value::Map(
            entries
                .iter()
                .map(|(k, v)| (to_rmpv(k), to_rmpv(v)))
                .collect(),
        ),
        Value::Datom(d) => rmpv::Value::Array(vec![
            rmpv::Value::String(DATOM_TAG.into()),
            rmpv::Value::Array(d.to_seq().iter().map(to_rmpv).collect()),
        ]),
    }
}

fn from_rmpv(value: rmpv::Value) -> Result<Value, CodecError> {
    match value {
        rmpv::Value::Nil => Ok(Value::Nil),
        rmpv::Value::Boolean(b) => Ok(Value::Bool(b)),
        rmpv::Value::Integer(i) => i.as_i64().map(Value::Int).ok_or(CodecError::IntRange),
        rmpv::Value::F32(f) => Ok(Value::Float(f as f64)),
        rmpv::Value::F64(f) => Ok(Value::Float(f)),
        rmpv::Value::String(s) => {
            let s = s.into_str().ok_or(CodecError::InvalidUtf8)?;
            Ok(unescape_str(s))
        }
        rmpv::Value::Array(items) => {
            let is_datom = items.len() == 2
                && matches!(&items[0], rmpv::Value::String(s) if s.as_str() == Some(DATOM_TAG));
            let decoded = items
                .into_iter()
                .map(from_rmpv)
                .collect::<Result<Vec<_>, _>>()?;
            finish_array(decoded, is_datom)
        }
        rmpv::Value::Map(entries) => {
            let decoded = entries
                .into_iter()
                .map(|(k, v)| Ok((from_rmpv(k)?, from_rmpv(v)?)))
                .collect::<Result<Vec<_>, CodecError>>()?;
            Ok(Value::Map(decoded))
        }
        rmpv::Value::Binary(_) => Err(CodecError::Unsupported("binary")),
        rmpv::Value::Ext(..) => Err(CodecError::Unsupported("ext")),
    }
}

fn from_json(value: serde_json::Value) -> Result<Value, CodecError> {
    match value {
        serde_json::Value::Null => Ok(Value::Nil),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if n.as_u64().is_some() {
                Err(CodecError::IntRange)
            } else {
                n.as_f64().map(Value::Float).ok_or(CodecError::IntRange)
            }
        }
        serde_json::Value::String(s) => Ok(unescape_str(s)),
        serde_json::Value::Array(items) => {
            let is_datom = items.len() == 2
                && matches!(&items[0], serde_json::Value::String(s) if s == DATOM_TAG);
            let decoded = items
                .into_iter()
                .map(from_json)
                .collect::<Result<Vec<_>, _>>()?;
            finish_array(decoded, is_datom)
        }
        serde_json::Value::Object(entries) => {
            let decoded = entries
                .into_iter()
                .map(|(k, v)| Ok((unescape_str(k), from_json(v)?)))
                .collect::<Result<Vec<_>, CodecError>>()?;
            Ok(Value::Map(decoded))
        }
    }
}

/// A decoded 2-element `["~#datom", [...]]` array becomes a fact tuple;
/// other tagged arrays pass through in their list form.
fn finish_array(mut decoded: Vec<Value>, is_datom: bool) -> Result<Value, CodecError> {
    if is_datom {
        if let Some(Value::List(fields)) = decoded.pop() {
            return Datom::from_seq(fields)
                .map(|d| Value::Datom(Box::new(d)))
                .ok_or(CodecError::MalformedDatom);
        }
        return Err(CodecError::MalformedDatom);
    }
    Ok(Value::List(decoded))
}

/// Minimal EDN reader for the textual fallback bodies.
pub mod edn {
    use super::CodecError;
    use crate::value::{Datom, Value};

    /// Parses one EDN value from `text`; trailing content is ignored.
    pub fn read_str(text: &str) -> Result<Value, CodecError> {
        let chars: Vec<char> = text.chars().collect();
        let mut reader = Reader { chars, pos: 0 };
        reader.read_value()
    }

    struct Reader {
        chars: Vec<char>,
        pos: usize,
    }

    impl Reader {
        fn peek(&self) -> Option<char> {
            self.chars.get(self.pos).copied()
        }

        fn bump(&mut self) -> Option<char> {
            let c = self.peek();
            if c.is_some() {
                self.pos += 1;
            }
            c
        }

        fn err(&self, msg: impl Into<String>) -> CodecError {
            CodecError::Edn(format!("{} at position {}", msg.into(), self.pos))
        }

        fn skip_ws(&mut self) {
            while let Some(c) = self.peek() {
                if c.is_whitespace() || c == ',' {
                    self.pos += 1;
                } else if c == ';' {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                } else {
                    break;
                }
            }
        }

        fn read_value(&mut self) -> Result<Value, CodecError> {
            self.skip_ws();
            match self.peek() {
                None => Err(self.err("unexpected end of input")),
                Some('(') | Some('[') => self.read_list(),
                Some('{') => self.read_map(),
                Some('"') => self.read_string(),
                Some(':') => {
                    self.pos += 1;
                    Ok(Value::Keyword(self.read_token()))
                }
                Some('#') => self.read_dispatch(),
                Some(c) if c.is_ascii_digit() => self.read_number(),
                Some(c) if (c == '-' || c == '+') && self.next_is_digit() => self.read_number(),
                Some(_) => {
                    let token = self.read_token();
                    Ok(match token.as_str() {
                        "nil" => Value::Nil,
                        "true" => Value::Bool(true),
                        "false" => Value::Bool(false),
                        _ => Value::Symbol(token),
                    })
                }
            }
        }

        fn next_is_digit(&self) -> bool {
            self.chars
                .get(self.pos + 1)
                .is_some_and(|c| c.is_ascii_digit())
        }

        fn read_list(&mut self) -> Result<Value, CodecError> {
            let open = self.bump();
            let close = if open == Some('(') { ')' } else { ']' };
            let mut items = Vec::new();
            loop {
                self.skip_ws();
                match self.peek() {
                    None => return Err(self.err("unterminated collection")),
                    Some(c) if c == close => {
                        self.pos += 1;
                        return Ok(Value::List(items));
                    }
                    Some(_) => items.push(self.read_value()?),
                }
            }
        }

        fn read_map(&mut self) -> Result<Value, CodecError> {
            self.pos += 1;
            let mut entries = Vec::new();
            loop {
                self.skip_ws();
                match self.peek() {
                    None => return Err(self.err("unterminated map")),
                    Some('}') => {
                        self.pos += 1;
                        return Ok(Value::Map(entries));
                    }
                    Some(_) => {
                        let k = self.read_value()?;
                        let v = self.read_value()?;
                        entries.push((k, v));
                    }
                }
            }
        }

        fn read_string(&mut self) -> Result<Value, CodecError> {
            self.pos += 1;
            let mut out = String::new();
            loop {
                match self.bump() {
                    None => return Err(self.err("unterminated string")),
                    Some('"') => return Ok(Value::Str(out)),
                    Some('\\') => match self.bump() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some('r') => out.push('\r'),
                        Some('"') => out.push('"'),
                        Some('\\') => out.push('\\'),
                        other => {
                            return Err(self.err(format!("bad string escape {other:?}")));
                        }
                    },
                    Some(c) => out.push(c),
                }
            }
        }

        fn read_dispatch(&mut self) -> Result<Value, CodecError> {
            self.pos += 1;
            match self.peek() {
                // set literal: surfaced as a list, the client has no set type
                Some('{') => self.read_map_as_set(),
                Some('_') => {
                    self.pos += 1;
                    self.read_value()?;
                    self.read_value()
                }
                Some(_) => {
                    let tag = self.read_token();
                    let value = self.read_value()?;
                    if tag == "datom" {
                        if let Value::List(fields) = value {
                            return Datom::from_seq(fields)
                                .map(|d| Value::Datom(Box::new(d)))
                                .ok_or_else(|| self.err("malformed #datom"));
                        }
                        return Err(self.err("malformed #datom"));
                    }
                    Ok(value)
                }
                None => Err(self.err("unexpected end after #")),
            }
        }

        fn read_map_as_set(&mut self) -> Result<Value, CodecError> {
            self.pos += 1;
            let mut items = Vec::new();
            loop {
                self.skip_ws();
                match self.peek() {
                    None => return Err(self.err("unterminated set")),
                    Some('}') => {
                        self.pos += 1;
                        return Ok(Value::List(items));
                    }
                    Some(_) => items.push(self.read_value()?),
                }
            }
        }

        fn read_number(&mut self) -> Result<Value, CodecError> {
            let token = self.read_token();
            // N (bigint) and M (bigdec) suffixes are accepted and dropped.
            let body = token.trim_end_matches(['N', 'M']);
            if body.contains(['.', 'e', 'E']) {
                body.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| self.err(format!("bad number {token:?}")))
            } else {
                body.parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| self.err(format!("bad number {token:?}")))
            }
        }

        fn read_token(&mut self) -> String {
            let mut out = String::new();
            while let Some(c) = self.peek() {
                if c.is_whitespace() || matches!(c, ',' | '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';') {
                    break;
                }
                out.push(c);
                self.pos += 1;
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) -> Value {
        let m = marshal(&value).unwrap();
        unmarshal(&m.bytes[..m.len], Format::Msgpack).unwrap()
    }

    #[test]
    fn test_round_trip_scalars() {
        for v in [
            Value::Nil,
            Value::Bool(true),
            Value::Int(-42),
            Value::Float(2.5),
            Value::string("plain"),
            Value::string("~tilde"),
            Value::keyword("db/id"),
            Value::symbol("?e"),
        ] {
            assert_eq!(round_trip(v.clone()), v);
        }
    }

    #[test]
    fn test_round_trip_nested() {
        let value = Value::map(vec![
            (
                Value::keyword("dbs"),
                Value::list(vec![Value::map(vec![
                    (Value::keyword("t"), Value::Int(7)),
                    (Value::keyword("next-t"), Value::Int(8)),
                ])]),
            ),
            (
                Value::keyword("data"),
                Value::list(vec![Value::Datom(Box::new(Datom::new(
                    Value::Int(42),
                    Value::keyword("person/name"),
                    Value::string("Ada"),
                    100,
                    true,
                )))]),
            ),
        ]);
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_datom_tag_reconstruction() {
        let datom = Datom::new(
            Value::Int(1),
            Value::keyword("a"),
            Value::Float(1.5),
            9,
            false,
        );
        let m = marshal(&Value::Datom(Box::new(datom.clone()))).unwrap();
        match unmarshal(&m.bytes[..m.len], Format::Msgpack).unwrap() {
            Value::Datom(d) => assert_eq!(*d, datom),
            other => panic!("expected datom, got {other}"),
        }
    }

    #[test]
    fn test_unknown_tag_passes_through_as_list() {
        let tagged = Value::list(vec![Value::string("~#point"), Value::Int(3)]);
        // The tag string survives the escape round trip.
        assert_eq!(round_trip(tagged.clone()), tagged);
    }

    #[test]
    fn test_json_decode_with_tags() {
        let json = br#"{"~:dbs":[{"~:t":7,"~:next-t":8}],"~:data":[["~#datom",[1,"~:a",5,10,true]]]}"#;
        let value = unmarshal(json, Format::Json).unwrap();
        let dbs = value.kget("dbs").and_then(|v| v.as_list()).unwrap();
        assert_eq!(dbs[0].kget("t"), Some(&Value::Int(7)));
        let data = value.kget("data").and_then(|v| v.as_list()).unwrap();
        match &data[0] {
            Value::Datom(d) => assert_eq!(d[3], Value::Int(10)),
            other => panic!("expected datom, got {other}"),
        }
    }

    #[test]
    fn test_decode_body_dispatch() {
        let m = marshal(&Value::map(vec![(Value::keyword("t"), Value::Int(1))])).unwrap();
        assert!(decode_body("application/transit+msgpack", &m.bytes[..m.len]).is_ok());
        assert!(decode_body("application/transit+msgpack; charset=utf-8", &m.bytes[..m.len]).is_ok());
        assert_eq!(
            decode_body("text/plain", b"oops"),
            Ok(Value::string("oops"))
        );

        let err = decode_body("application/octet-stream", b"").unwrap_err();
        assert!(err
            .message
            .as_deref()
            .unwrap()
            .contains("Cannot unmarshal content-type application/octet-stream"));
    }

    #[test]
    fn test_edn_scalars_and_collections() {
        assert_eq!(edn::read_str("nil").unwrap(), Value::Nil);
        assert_eq!(edn::read_str("true").unwrap(), Value::Bool(true));
        assert_eq!(edn::read_str("-17").unwrap(), Value::Int(-17));
        assert_eq!(edn::read_str("2.5").unwrap(), Value::Float(2.5));
        assert_eq!(edn::read_str(":db/id").unwrap(), Value::keyword("db/id"));
        assert_eq!(
            edn::read_str("\"a \\\"b\\\"\"").unwrap(),
            Value::string("a \"b\"")
        );
        assert_eq!(
            edn::read_str("[1 2, 3]").unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(
            edn::read_str("{:t 7, :next-t 8}").unwrap(),
            Value::map(vec![
                (Value::keyword("t"), Value::Int(7)),
                (Value::keyword("next-t"), Value::Int(8)),
            ])
        );
    }

    #[test]
    fn test_edn_comments_and_discard() {
        let text = "; header\n{:t 7 #_ :ignored :ok true}";
        let value = edn::read_str(text).unwrap();
        assert_eq!(value.kget("t"), Some(&Value::Int(7)));
        assert_eq!(value.kget("ok"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_edn_datom_reader_tag() {
        let value = edn::read_str("#datom[42 :person/name \"Ada\" 100 true]").unwrap();
        match value {
            Value::Datom(d) => {
                assert_eq!(d[0], Value::Int(42));
                assert_eq!(d[4], Value::Bool(true));
            }
            other => panic!("expected datom, got {other}"),
        }
    }

    #[test]
    fn test_edn_errors() {
        assert!(edn::read_str("").is_err());
        assert!(edn::read_str("[1 2").is_err());
        assert!(edn::read_str("\"open").is_err());
    }
}
