//! Parameter values

use std::fmt;

/// Shape of a value, used to pick the wire encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Numeric,
    Text,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Numeric => "numeric",
            ValueKind::Text => "text",
        }
    }
}

/// Value held by a parameter entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    /// Numeric value (0-16383 for NRPN, 0-127 times scale for CC)
    Number(i32),
    /// ASCII text (string parameters)
    Text(String),
}

impl ParameterValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ParameterValue::Number(_) => ValueKind::Numeric,
            ParameterValue::Text(_) => ValueKind::Text,
        }
    }

    /// Default value for a freshly created entry of the given shape
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Numeric => ParameterValue::Number(0),
            ValueKind::Text => ParameterValue::Text(String::new()),
        }
    }

    /// Extract numeric value if available
    pub fn as_number(&self) -> Option<i32> {
        match self {
            ParameterValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract text if available
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        ParameterValue::Number(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::Text(value)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Number(n) => write!(f, "{}", n),
            ParameterValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}
