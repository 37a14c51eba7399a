use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BindError;

/// Closed set of value kinds an argument spec may declare.
///
/// Each kind has an explicit conversion from a literal script token; a token
/// that does not parse yields a cast error naming the argument label, never a
/// silently truncated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// UTF-8 string, taken verbatim from the token.
    Str,
}

impl ValueKind {
    /// Convert a literal token into a typed [`Value`] of this kind.
    ///
    /// `label` is the argument's display label, used in the error message.
    pub fn cast(self, label: &str, token: &str) -> Result<Value, BindError> {
        let err = || BindError::TypeCast {
            label: label.to_string(),
            kind: self,
            token: token.to_string(),
        };
        match self {
            ValueKind::U16 => token.parse().map(Value::U16).map_err(|_| err()),
            ValueKind::U32 => token.parse().map(Value::U32).map_err(|_| err()),
            ValueKind::I32 => token.parse().map(Value::I32).map_err(|_| err()),
            ValueKind::I64 => token.parse().map(Value::I64).map_err(|_| err()),
            ValueKind::F32 => token.parse().map(Value::F32).map_err(|_| err()),
            ValueKind::F64 => token.parse().map(Value::F64).map_err(|_| err()),
            ValueKind::Str => Ok(Value::Str(token.to_string())),
        }
    }

    /// Zero value of this kind, used as the implicit default for
    /// user-required argument specs.
    pub fn zero(self) -> Value {
        match self {
            ValueKind::U16 => Value::U16(0),
            ValueKind::U32 => Value::U32(0),
            ValueKind::I32 => Value::I32(0),
            ValueKind::I64 => Value::I64(0),
            ValueKind::F32 => Value::F32(0.0),
            ValueKind::F64 => Value::F64(0.0),
            ValueKind::Str => Value::Str(String::new()),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::U16 => "u16",
            ValueKind::U32 => "u32",
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Str => "string",
        };
        f.write_str(name)
    }
}

/// Typed scalar passed to command callables and carried in replies.
///
/// `Display` renders the wire form used when serializing request frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Signed 32-bit integer.
    I32(i32),
    /// Signed 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// UTF-8 string.
    Str(String),
}

impl Value {
    /// Kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::U16(_) => ValueKind::U16,
            Value::U32(_) => ValueKind::U32,
            Value::I32(_) => ValueKind::I32,
            Value::I64(_) => ValueKind::I64,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
            Value::Str(_) => ValueKind::Str,
        }
    }

    /// Numeric view of the value; `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::U16(n) => Some(f64::from(*n)),
            Value::U32(n) => Some(f64::from(*n)),
            Value::I32(n) => Some(f64::from(*n)),
            Value::I64(n) => Some(*n as f64),
            Value::F32(n) => Some(f64::from(*n)),
            Value::F64(n) => Some(*n),
            Value::Str(_) => None,
        }
    }

    /// Integer view of the value; `None` for floats and strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::U16(n) => Some(i64::from(*n)),
            Value::U32(n) => Some(i64::from(*n)),
            Value::I32(n) => Some(i64::from(*n)),
            Value::I64(n) => Some(*n),
            _ => None,
        }
    }

    /// String view of the value; `None` for numerics.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Parse a reply token without a declared kind: integer first, then
    /// float, falling back to a verbatim string.
    pub fn parse_lenient(token: &str) -> Value {
        if let Ok(int) = token.parse::<i64>() {
            return Value::I64(int);
        }
        if let Ok(float) = token.parse::<f64>() {
            return Value::F64(float);
        }
        Value::Str(token.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U16(n) => write!(f, "{}", n),
            Value::U32(n) => write!(f, "{}", n),
            Value::I32(n) => write!(f, "{}", n),
            Value::I64(n) => write!(f, "{}", n),
            Value::F32(n) => write!(f, "{}", n),
            Value::F64(n) => write!(f, "{}", n),
            Value::Str(text) => f.write_str(text),
        }
    }
}
