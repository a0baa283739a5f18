//! Dynamic value space shared by requests, responses and fact tuples.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Index;

/// A value in the client's data space.
///
/// Covers everything the service reads or writes: scalars, keywords,
/// symbols, ordered collections and fact tuples. Maps preserve insertion
/// order so a marshal/unmarshal round trip is the identity.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Keyword(String),
    Symbol(String),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Datom(Box<Datom>),
}

impl Value {
    pub fn keyword(name: impl Into<String>) -> Value {
        Value::Keyword(name.into())
    }

    pub fn symbol(name: impl Into<String>) -> Value {
        Value::Symbol(name.into())
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(items)
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Value {
        Value::Map(entries)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Value::Keyword(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_datom(&self) -> Option<&Datom> {
        match self {
            Value::Datom(d) => Some(d),
            _ => None,
        }
    }

    /// Map lookup by key equality.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Map lookup by keyword name, accepting a plain string key as well
    /// (peers are not consistent about which they send).
    pub fn kget(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries
                .iter()
                .find(|(k, _)| match k {
                    Value::Keyword(k) => k == name,
                    Value::Str(k) => k == name,
                    _ => false,
                })
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Returns an updated map with `key` bound to `val`, replacing an
    /// existing binding. A non-map receiver becomes a one-entry map.
    pub fn assoc(self, key: Value, val: Value) -> Value {
        let mut entries = match self {
            Value::Map(entries) => entries,
            _ => Vec::new(),
        };
        if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = val;
        } else {
            entries.push((key, val));
        }
        Value::Map(entries)
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Nil => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::Keyword(_) => 4,
            Value::Symbol(_) => 5,
            Value::List(_) => 6,
            Value::Map(_) => 7,
            Value::Datom(_) => 8,
        }
    }

    /// Total order over the whole value space. Ints and floats occupy one
    /// numeric rank and compare by magnitude, so `2` and `2.0` are equal.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Nil, Nil) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Str(a), Str(b)) => a.cmp(b),
            (Keyword(a), Keyword(b)) => a.cmp(b),
            (Symbol(a), Symbol(b)) => a.cmp(b),
            (List(a), List(b)) => cmp_seq(a.iter(), b.iter()),
            (Map(a), Map(b)) => cmp_seq(
                a.iter().flat_map(|(k, v)| [k, v]),
                b.iter().flat_map(|(k, v)| [k, v]),
            ),
            (Datom(a), Datom(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn hash_number<H: Hasher>(f: f64, state: &mut H) {
        // Integral floats hash like the equal int so the hash agrees with
        // the normalized equality.
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
            (f as i64).hash(state);
        } else {
            f.to_bits().hash(state);
        }
    }
}

fn cmp_seq<'a>(
    a: impl Iterator<Item = &'a Value>,
    b: impl Iterator<Item = &'a Value>,
) -> Ordering {
    let mut a = a;
    let mut b = b;
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match x.total_cmp(y) {
                Ordering::Equal => continue,
                ord => return ord,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        Some(self.total_cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Value) -> Ordering {
        self.total_cmp(other)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Nil => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => Value::hash_number(*f, state),
            Value::Str(s) | Value::Keyword(s) | Value::Symbol(s) => s.hash(state),
            Value::List(items) => {
                for item in items {
                    item.hash(state);
                }
            }
            Value::Map(entries) => {
                for (k, v) in entries {
                    k.hash(state);
                    v.hash(state);
                }
            }
            Value::Datom(d) => d.hash(state),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<Datom> for Value {
    fn from(d: Datom) -> Value {
        Value::Datom(Box::new(d))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Keyword(k) => write!(f, ":{k}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} {v}")?;
                }
                write!(f, "}}")
            }
            Value::Datom(d) => write!(f, "{d}"),
        }
    }
}

/// The (e, a, v, t, added) fact tuple, the service's unit of data.
///
/// Fields are addressable by position 0..4 and by accessor. Equality is
/// field-wise with `v` compared under the numeric-normalizing total order.
/// The hash skips `t` on purpose: `t` is what separates otherwise-identical
/// facts across time.
#[derive(Debug, Clone)]
pub struct Datom {
    e: Value,
    a: Value,
    v: Value,
    t: Value,
    added: Value,
}

impl Datom {
    pub fn new(e: Value, a: Value, v: Value, t: i64, added: bool) -> Datom {
        Datom {
            e,
            a,
            v,
            t: Value::Int(t),
            added: Value::Bool(added),
        }
    }

    /// Rebuilds a datom from a decoded 5-element sequence.
    pub fn from_seq(mut fields: Vec<Value>) -> Option<Datom> {
        if fields.len() != 5 {
            return None;
        }
        let added = fields.pop()?.as_bool()?;
        let t = fields.pop()?.as_int()?;
        let v = fields.pop()?;
        let a = fields.pop()?;
        let e = fields.pop()?;
        Some(Datom::new(e, a, v, t, added))
    }

    pub fn e(&self) -> &Value {
        &self.e
    }

    pub fn a(&self) -> &Value {
        &self.a
    }

    pub fn v(&self) -> &Value {
        &self.v
    }

    pub fn t(&self) -> &Value {
        &self.t
    }

    pub fn added(&self) -> &Value {
        &self.added
    }

    pub fn is_added(&self) -> bool {
        matches!(self.added, Value::Bool(true))
    }

    /// Checked positional access.
    pub fn get(&self, index: usize) -> Option<&Value> {
        match index {
            0 => Some(&self.e),
            1 => Some(&self.a),
            2 => Some(&self.v),
            3 => Some(&self.t),
            4 => Some(&self.added),
            _ => None,
        }
    }

    pub fn to_seq(&self) -> Vec<Value> {
        vec![
            self.e.clone(),
            self.a.clone(),
            self.v.clone(),
            self.t.clone(),
            self.added.clone(),
        ]
    }

    fn total_cmp(&self, other: &Datom) -> Ordering {
        self.e
            .total_cmp(&other.e)
            .then_with(|| self.a.total_cmp(&other.a))
            .then_with(|| self.v.total_cmp(&other.v))
            .then_with(|| self.t.total_cmp(&other.t))
            .then_with(|| self.added.total_cmp(&other.added))
    }
}

impl Index<usize> for Datom {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        match self.get(index) {
            Some(v) => v,
            None => panic!("datom index out of bounds: {index}"),
        }
    }
}

impl PartialEq for Datom {
    fn eq(&self, other: &Datom) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for Datom {}

impl Hash for Datom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // t intentionally excluded.
        self.e.hash(state);
        self.a.hash(state);
        self.v.hash(state);
        self.added.hash(state);
    }
}

impl fmt::Display for Datom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#datom[{} {} {} {} {}]",
            self.e, self.a, self.v, self.t, self.added
        )
    }
}
