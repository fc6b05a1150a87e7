//! Typed values carried by parameter updates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParamError;

/// Kind of a camera parameter, fixed when the definition file is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Float,
    Int,
    Bool,
    Enum,
}

/// A parameter value as delivered by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Enum(String),
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Float => "float",
            ParamKind::Int => "int",
            ParamKind::Bool => "bool",
            ParamKind::Enum => "enum",
        }
    }

    /// Converts `value` into the representation this kind writes to the
    /// camera, or `None` if the value cannot stand for this kind.
    ///
    /// Floats take floats and integers, integers take integers and floats
    /// (truncated toward zero), booleans take booleans and integers.
    /// Enums take anything and use its string form with quotes removed.
    pub fn coerce(self, value: &ParamValue) -> Option<ParamValue> {
        match (self, value) {
            (ParamKind::Float, ParamValue::Float(f)) => Some(ParamValue::Float(*f)),
            (ParamKind::Float, ParamValue::Int(i)) => Some(ParamValue::Float(*i as f64)),
            (ParamKind::Int, ParamValue::Int(i)) => Some(ParamValue::Int(*i)),
            (ParamKind::Int, ParamValue::Float(f))
                if f.is_finite()
                    && *f >= i64::MIN as f64
                    && *f <= i64::MAX as f64 =>
            {
                Some(ParamValue::Int(*f as i64))
            }
            (ParamKind::Bool, ParamValue::Bool(b)) => Some(ParamValue::Bool(*b)),
            (ParamKind::Bool, ParamValue::Int(i)) => Some(ParamValue::Bool(*i != 0)),
            (ParamKind::Enum, v) => Some(ParamValue::Enum(strip_quotes(&v.to_string()))),
            _ => None,
        }
    }

    pub fn accepts(self, value: &ParamValue) -> bool {
        self.coerce(value).is_some()
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamKind {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" => Ok(ParamKind::Float),
            "int" => Ok(ParamKind::Int),
            "bool" => Ok(ParamKind::Bool),
            "enum" => Ok(ParamKind::Enum),
            other => Err(ParamError::UnknownKind(other.to_string())),
        }
    }
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Enum(_) => "string",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Enum(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Enum(v.to_string())
    }
}

fn strip_quotes(s: &str) -> String {
    s.chars().filter(|c| *c != '"' && *c != '\'').collect()
}
