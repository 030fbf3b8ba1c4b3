use std::fmt;

/// A dynamically-typed SQL value.
///
/// The five fundamental storage classes: NULL, INTEGER, REAL, TEXT, BLOB.
/// Providers receive these as filter and update arguments, and produce them
/// for column reads.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit IEEE 754 floating-point number.
    Float(f64),
    /// A UTF-8 text string.
    Text(String),
    /// A binary large object.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true if this is a NULL value.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to extract an integer value.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to extract a float value.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to extract a text reference.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to extract a blob reference.
    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Coerce to an integer the way SQLite's CAST does: NULL and blobs
    /// become 0, floats truncate, text parses a leading integer prefix.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_integer(&self) -> i64 {
        match self {
            Self::Null | Self::Blob(_) => 0,
            Self::Integer(i) => *i,
            Self::Float(f) => *f as i64,
            Self::Text(s) => parse_integer_prefix(s),
        }
    }

    /// Render as text the way SQLite's CAST does. NULL renders empty,
    /// blobs render lossily as UTF-8.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    /// The storage-class name, as `typeof()` would report it.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Float(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Blob(b) => write!(f, "x'{}'", hex(b)),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn parse_integer_prefix(s: &str) -> i64 {
    let s = s.trim_start();
    let mut end = 0;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    s[..end].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Integer(7).as_integer(), Some(7));
        assert_eq!(Value::Float(1.5).as_float(), Some(1.5));
        assert_eq!(Value::Text("hi".to_owned()).as_text(), Some("hi"));
        assert_eq!(Value::Blob(vec![1, 2]).as_blob(), Some(&[1u8, 2][..]));
        assert_eq!(Value::Integer(7).as_text(), None);
    }

    #[test]
    fn test_to_integer_coercions() {
        assert_eq!(Value::Null.to_integer(), 0);
        assert_eq!(Value::Integer(42).to_integer(), 42);
        assert_eq!(Value::Float(3.9).to_integer(), 3);
        assert_eq!(Value::Text("17abc".to_owned()).to_integer(), 17);
        assert_eq!(Value::Text("-5".to_owned()).to_integer(), -5);
        assert_eq!(Value::Text("abc".to_owned()).to_integer(), 0);
        assert_eq!(Value::Blob(vec![9]).to_integer(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(-3).to_string(), "-3");
        assert_eq!(Value::Text("x".to_owned()).to_string(), "'x'");
        assert_eq!(Value::Blob(vec![0xde, 0xad]).to_string(), "x'dead'");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Integer(0).type_name(), "integer");
        assert_eq!(Value::Float(0.0).type_name(), "real");
        assert_eq!(Value::Text(String::new()).type_name(), "text");
        assert_eq!(Value::Blob(Vec::new()).type_name(), "blob");
    }

    #[test]
    fn test_from_impls() {
        assert_eq!(Value::from(1_i64), Value::Integer(1));
        assert_eq!(Value::from("s"), Value::Text("s".to_owned()));
        assert_eq!(Value::from(2.0_f64), Value::Float(2.0));
    }
}
