use std::fmt;

use super::buffer::ByteString;
use super::invoke::Callable;

/// A script value.
///
/// The host's value domain, reduced to the types the runtime exchanges with
/// script code: callback arguments, callback slots, and assertion operands.
#[derive(Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i32),
    Double(f64),
    Str(ByteString),
    Callable(Callable),
}

impl Value {
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Callable(_))
    }

    pub fn as_str(&self) -> Option<&ByteString> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an integer when it is numeric.
    ///
    /// Doubles truncate, matching how the script host coerces a numeric
    /// argument into an integer slot.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Double(d) => Some(*d as i32),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Callable(f) => Some(f),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Callable(_) => "function",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Value {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(ByteString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(ByteString::from(s))
    }
}

impl From<ByteString> for Value {
    fn from(s: ByteString) -> Value {
        Value::Str(s)
    }
}

impl From<Callable> for Value {
    fn from(f: Callable) -> Value {
        Value::Callable(f)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Void => write!(fmt, "void"),
            Value::Bool(b) => write!(fmt, "{}", b),
            Value::Int(n) => write!(fmt, "{}", n),
            Value::Double(d) => write!(fmt, "{}", d),
            Value::Str(s) => write!(fmt, "{:?}", s),
            Value::Callable(_) => write!(fmt, "function"),
        }
    }
}
