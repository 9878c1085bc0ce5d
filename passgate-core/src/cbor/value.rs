//! Decoded CBOR data model.

use std::fmt;

/// Values of major type 7 that are not the break marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OtherValue {
    False,
    True,
    Null,
    Undefined,
    /// Unassigned simple value (0..=19 or 32..=255).
    Simple(u8),
    /// Half, single and double precision floats, widened to f64.
    Float(f64),
}

/// A fully decoded CBOR data item.
///
/// Indefinite-length strings, arrays and maps are normalized while decoding,
/// so a value carries no trace of how its length was encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum CborValue {
    Unsigned(u64),
    /// Negative integer stored as its major-type-1 argument `n`; the value is `-1 - n`.
    Negative(u64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<CborValue>),
    Map(Vec<(CborValue, CborValue)>),
    Tag(u64, Box<CborValue>),
    Other(OtherValue),
}

impl CborValue {
    pub fn integer(value: i64) -> Self {
        if value >= 0 {
            CborValue::Unsigned(value as u64)
        } else {
            CborValue::Negative((-1 - value) as u64)
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        CborValue::Text(value.into())
    }

    pub fn as_integer(&self) -> Option<i128> {
        match self {
            CborValue::Unsigned(n) => Some(*n as i128),
            CborValue::Negative(n) => Some(-1 - *n as i128),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|n| i64::try_from(n).ok())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CborValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CborValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[CborValue]> {
        match self {
            CborValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(CborValue, CborValue)]> {
        match self {
            CborValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CborValue::Other(OtherValue::True) => Some(true),
            CborValue::Other(OtherValue::False) => Some(false),
            _ => None,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, CborValue::Map(_))
    }

    /// Look up a text key in a map value.
    pub fn get(&self, key: &str) -> Option<&CborValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    /// Look up an integer key in a map value (COSE labels).
    pub fn get_int(&self, key: i64) -> Option<&CborValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_i64() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CborValue::Unsigned(_) => "unsigned integer",
            CborValue::Negative(_) => "negative integer",
            CborValue::Bytes(_) => "byte string",
            CborValue::Text(_) => "text string",
            CborValue::Array(_) => "array",
            CborValue::Map(_) => "map",
            CborValue::Tag(_, _) => "tag",
            CborValue::Other(OtherValue::Float(_)) => "float",
            CborValue::Other(_) => "simple value",
        }
    }
}

/// RFC 8949 diagnostic notation.
impl fmt::Display for CborValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CborValue::Unsigned(n) => write!(f, "{n}"),
            CborValue::Negative(n) => write!(f, "{}", -1 - *n as i128),
            CborValue::Bytes(b) => write!(f, "h'{}'", hex::encode(b)),
            CborValue::Text(s) => write!(f, "{s:?}"),
            CborValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            CborValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            CborValue::Tag(tag, inner) => write!(f, "{tag}({inner})"),
            CborValue::Other(other) => match other {
                OtherValue::False => write!(f, "false"),
                OtherValue::True => write!(f, "true"),
                OtherValue::Null => write!(f, "null"),
                OtherValue::Undefined => write!(f, "undefined"),
                OtherValue::Simple(n) => write!(f, "simple({n})"),
                OtherValue::Float(v) if v.is_nan() => write!(f, "NaN"),
                OtherValue::Float(v) if v.is_infinite() => {
                    write!(f, "{}Infinity", if *v < 0.0 { "-" } else { "" })
                }
                OtherValue::Float(v) => write!(f, "{v:?}"),
            },
        }
    }
}
