//! Channel types.

use std::fmt;

/// A single register value read from a meter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// Integer value (unscaled register contents).
    Integer(i64),
    /// Floating point value (scaled register contents).
    Float(f64),
    /// Text value (identifiers, manufacturer codes, signatures).
    Text(String),
}

impl Value {
    /// Returns the value as a float, if it is numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Returns the value as text, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One named measurement within a sample.
///
/// `name` is an OBIS-style identifier such as `1-0:1.8.0*255` or `6.8`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Channel {
    /// OBIS code of the register.
    pub name: String,
    /// Register value.
    pub value: Value,
    /// Physical unit, if the meter reported one.
    pub unit: Option<String>,
}

impl Channel {
    /// Creates a new channel.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Value>, unit: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            unit: unit.map(str::to_owned),
        }
    }
}
