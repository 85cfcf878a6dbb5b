//! AMF value types
//!
//! Only the subset of AMF0 that publishers actually send during command
//! negotiation and `@setDataFrame` metadata is represented.

use std::collections::HashMap;

/// Decoded AMF0 value
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// 0x05
    Null,

    /// 0x06 (also used for markers we skip)
    Undefined,

    /// 0x01
    Boolean(bool),

    /// 0x00, IEEE 754 double
    Number(f64),

    /// 0x02 / 0x0C
    String(String),

    /// 0x0A strict array
    Array(Vec<AmfValue>),

    /// 0x03 anonymous object
    Object(HashMap<String, AmfValue>),

    /// 0x08 ECMA array, as sent in `onMetaData`
    EcmaArray(HashMap<String, AmfValue>),

    /// 0x0B, milliseconds since the Unix epoch
    Date(f64),
}

impl AmfValue {
    /// Build an object from key/value pairs
    pub fn object<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<AmfValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        AmfValue::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Objects and ECMA arrays both expose their properties
    pub fn as_object(&self) -> Option<&HashMap<String, AmfValue>> {
        match self {
            AmfValue::Object(m) | AmfValue::EcmaArray(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Get a property from an object value
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}
