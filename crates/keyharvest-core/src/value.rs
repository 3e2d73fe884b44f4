//! Scalar field values and their column kinds

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// A single scalar cell of a [`Record`](crate::Record).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Kind of this value, `None` for null.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(ValueKind::Integer),
            Self::Float(_) => Some(ValueKind::Float),
            Self::Text(_) => Some(ValueKind::Text),
            Self::Timestamp(_) => Some(ValueKind::Timestamp),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse an RFC 3339 string into a timestamp, falling back to text.
    pub fn timestamp_or_text(s: &str) -> Self {
        match DateTime::parse_from_rfc3339(s) {
            Ok(ts) => Self::Timestamp(ts.with_timezone(&Utc)),
            Err(_) => Self::Text(s.to_string()),
        }
    }

    /// Identity string used for deduplication, `None` for null.
    ///
    /// Values of different kinds never collide (`1` vs `"1"`).
    pub fn dedup_token(&self) -> Option<String> {
        match self {
            Self::Null => None,
            other => Some(encode_tagged(other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Persisted column type, inferred from the non-null values of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    Integer,
    Float,
    Timestamp,
    /// Column holds more than one kind; cells use the tagged encoding.
    Mixed,
}

impl ValueKind {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "int" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "timestamp" => Some(Self::Timestamp),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "int",
            Self::Float => "float",
            Self::Timestamp => "timestamp",
            Self::Mixed => "mixed",
        }
    }

    /// Infer the kind of a column from its values. All-null columns are text.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut kind = None;
        for v in values {
            match (kind, v.kind()) {
                (_, None) => {}
                (None, Some(k)) => kind = Some(k),
                (Some(a), Some(b)) if a == b => {}
                (Some(_), Some(_)) => return Self::Mixed,
            }
        }
        kind.unwrap_or(Self::Text)
    }

    /// Encode a non-null value of this column as text.
    pub fn encode(self, value: &Value) -> String {
        match (self, value) {
            (Self::Mixed, v) => encode_tagged(v),
            (_, Value::Timestamp(ts)) => format_timestamp(ts),
            (_, v) => v.to_string(),
        }
    }

    /// Decode text produced by [`ValueKind::encode`].
    pub fn decode(self, s: &str) -> Result<Value, String> {
        match self {
            Self::Text => Ok(Value::Text(s.to_string())),
            Self::Integer => s
                .parse()
                .map(Value::Integer)
                .map_err(|e| format!("invalid integer {s:?}: {e}")),
            Self::Float => s
                .parse()
                .map(Value::Float)
                .map_err(|e| format!("invalid float {s:?}: {e}")),
            Self::Timestamp => parse_timestamp(s).map(Value::Timestamp),
            Self::Mixed => decode_tagged(s),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp {s:?}: {e}"))
}

/// `i:42`, `f:1.5`, `s:text`, `t:2024-01-01T00:00:00Z`, `n:` for null.
fn encode_tagged(value: &Value) -> String {
    match value {
        Value::Null => "n:".to_string(),
        Value::Integer(i) => format!("i:{i}"),
        Value::Float(x) => format!("f:{x}"),
        Value::Text(s) => format!("s:{s}"),
        Value::Timestamp(ts) => format!("t:{}", format_timestamp(ts)),
    }
}

fn decode_tagged(s: &str) -> Result<Value, String> {
    let (tag, body) = s
        .split_once(':')
        .ok_or_else(|| format!("untagged mixed cell {s:?}"))?;
    match tag {
        "n" => Ok(Value::Null),
        "i" => ValueKind::Integer.decode(body),
        "f" => ValueKind::Float.decode(body),
        "s" => Ok(Value::Text(body.to_string())),
        "t" => ValueKind::Timestamp.decode(body),
        _ => Err(format!("unknown mixed cell tag {tag:?}")),
    }
}
