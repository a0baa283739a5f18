//! Anomaly values: failures carried as data, never thrown.

use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// Closed set of anomaly categories.
///
/// These tags are part of the protocol contract and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Client-side mistake (4xx).
    Incorrect,
    /// Authorization rejected (403).
    Forbidden,
    /// Server overloaded or throttled (503); the only retryable category.
    Busy,
    /// Server unreachable or gateway timeout (504).
    Unavailable,
    /// Name resolution failed.
    NotFound,
    /// Deadline expired.
    Interrupted,
    /// Everything else: 5xx, decode failures, unclassified transport errors.
    Fault,
}

impl Category {
    /// The namespaced keyword used on the wire.
    pub fn as_keyword(&self) -> &'static str {
        match self {
            Category::Incorrect => "cognitect.anomalies/incorrect",
            Category::Forbidden => "cognitect.anomalies/forbidden",
            Category::Busy => "cognitect.anomalies/busy",
            Category::Unavailable => "cognitect.anomalies/unavailable",
            Category::NotFound => "cognitect.anomalies/not-found",
            Category::Interrupted => "cognitect.anomalies/interrupted",
            Category::Fault => "cognitect.anomalies/fault",
        }
    }

    /// Parses a category keyword, namespaced or bare. Accepts the
    /// historical `unvailable` misspelling some peers still emit; we never
    /// produce it ourselves.
    pub fn from_keyword(kw: &str) -> Option<Category> {
        let name = kw.rsplit('/').next().unwrap_or(kw);
        match name {
            "incorrect" => Some(Category::Incorrect),
            "forbidden" => Some(Category::Forbidden),
            "busy" => Some(Category::Busy),
            "unavailable" | "unvailable" => Some(Category::Unavailable),
            "not-found" => Some(Category::NotFound),
            "interrupted" => Some(Category::Interrupted),
            "fault" => Some(Category::Fault),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_keyword())
    }
}

/// Status and decoded body of a failed HTTP exchange, attached to the
/// anomaly when classification happened at the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResult {
    pub status: u16,
    pub body: Option<Value>,
}

/// A failure value. Propagated through `Result`, never panicked.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{category}{}", render_message(.message))]
pub struct Anomaly {
    pub category: Category,
    pub message: Option<String>,
    pub http_result: Option<HttpResult>,
}

impl Anomaly {
    pub fn new(category: Category) -> Anomaly {
        Anomaly {
            category,
            message: None,
            http_result: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Anomaly {
        self.message = Some(message.into());
        self
    }

    pub fn with_http_result(mut self, status: u16, body: Option<Value>) -> Anomaly {
        self.http_result = Some(HttpResult { status, body });
        self
    }

    pub fn incorrect(message: impl Into<String>) -> Anomaly {
        Anomaly::new(Category::Incorrect).with_message(message)
    }

    pub fn not_found(message: impl Into<String>) -> Anomaly {
        Anomaly::new(Category::NotFound).with_message(message)
    }

    pub fn unavailable(message: impl Into<String>) -> Anomaly {
        Anomaly::new(Category::Unavailable).with_message(message)
    }

    pub fn interrupted(message: impl Into<String>) -> Anomaly {
        Anomaly::new(Category::Interrupted).with_message(message)
    }

    pub fn busy(message: impl Into<String>) -> Anomaly {
        Anomaly::new(Category::Busy).with_message(message)
    }

    pub fn fault(message: impl Into<String>) -> Anomaly {
        Anomaly::new(Category::Fault).with_message(message)
    }

    pub fn is_busy(&self) -> bool {
        self.category == Category::Busy
    }

    /// Reads an anomaly out of a decoded body, if the body carries a
    /// category field.
    pub fn from_value(value: &Value) -> Option<Anomaly> {
        let category = value
            .kget("cognitect.anomalies/category")
            .and_then(|v| v.as_keyword())
            .and_then(Category::from_keyword)?;
        let message = value
            .kget("cognitect.anomalies/message")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Some(Anomaly {
            category,
            message,
            http_result: None,
        })
    }

}

fn render_message(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

/// True iff the decoded value carries an anomaly category field.
pub fn is_anomaly(value: &Value) -> bool {
    Anomaly::from_value(value).is_some()
}
