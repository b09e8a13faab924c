//! Wire formats spoken by meters.
//!
//! This module contains the low-level protocol pieces:
//! - SML frame markers and structural validation
//! - The SML TLV decoder and its output tree
//! - OBIS code and unit formatting

pub mod frame;
pub mod obis;
pub mod sml;

use std::collections::BTreeMap;

use crate::error::DecodeError;
use crate::types::Value;

pub use frame::{END, START, validate as validate_frame};
pub use sml::SmlDecoder;

/// Decoded frame contents.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Ordered elements.
    List(Vec<Node>),
    /// Named fields.
    Map(BTreeMap<String, Node>),
    /// A single value.
    Scalar(Value),
}

impl Node {
    /// Looks up a field of a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Returns the elements of a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the value of a scalar.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the text of a scalar text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

/// Turns a validated frame into a [`Node`] tree.
///
/// Implementations must fail on malformed input rather than return a partial tree.
pub trait TlvDecoder: Send + Sync {
    /// Decodes a complete frame, start sequence and trailer included.
    fn decode(&self, frame: &[u8]) -> Result<Node, DecodeError>;
}
