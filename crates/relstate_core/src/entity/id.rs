//! Row identifier.

use relstate_codec::Value;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Canonical identifier of a row within one table.
///
/// Ids are canonicalized to strings: `1`, `1.0` and `"1"` all name the same
/// row. The row itself keeps the id attribute as a [`Value`]; `Id` is the
/// key under which the table indexes it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Creates an id from its canonical string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Canonicalizes an attribute value into an id.
    ///
    /// Integers and integral floats become their decimal form, text is
    /// kept verbatim, and null becomes `"null"`.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Text(s) => Self(s.clone()),
            Value::Integer(n) => Self(n.to_string()),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => Self((*x as i64).to_string()),
            other => Self(other.to_string()),
        }
    }

    /// Returns the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the id as a text value, the form stored in foreign keys.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Text(self.0.clone())
    }

    /// Parses the id as an integer, if it is one.
    #[must_use]
    pub fn numeric(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

/// Canonicalizes an id-like value (text or number) into the text form
/// stored in rows. Other values pass through unchanged.
pub(crate) fn canonical_id_value(value: &Value) -> Value {
    match value {
        Value::Integer(_) | Value::Float(_) => Id::from_value(value).to_value(),
        other => other.clone(),
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Id {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl From<&Value> for Id {
    fn from(value: &Value) -> Self {
        Self::from_value(value)
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Value::Text(id.0)
    }
}

impl From<&Id> for Value {
    fn from(id: &Id) -> Self {
        id.to_value()
    }
}

impl PartialEq<str> for Id {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_and_text_share_one_form() {
        assert_eq!(Id::from_value(&Value::Integer(1)), Id::new("1"));
        assert_eq!(Id::from_value(&Value::Float(1.0)), Id::new("1"));
        assert_eq!(Id::from_value(&Value::from("1")), Id::new("1"));
    }

    #[test]
    fn fractional_and_null_ids() {
        assert_eq!(Id::from_value(&Value::Float(1.5)), Id::new("1.5"));
        assert_eq!(Id::from_value(&Value::Null), Id::new("null"));
    }

    #[test]
    fn numeric_parse() {
        assert_eq!(Id::new("42").numeric(), Some(42));
        assert_eq!(Id::new("abc").numeric(), None);
    }

    #[test]
    fn canonical_id_value_only_touches_numbers() {
        assert_eq!(canonical_id_value(&Value::Integer(7)), Value::from("7"));
        assert_eq!(canonical_id_value(&Value::from("x")), Value::from("x"));
        assert_eq!(canonical_id_value(&Value::Null), Value::Null);
    }

    #[test]
    fn compares_with_str() {
        assert_eq!(Id::new("u0"), "u0");
        assert_eq!(format!("{}", Id::new("u0")), "u0");
    }
}
