//! # relstate Codec
//!
//! Dynamic values and plain keyed records for relstate.
//!
//! Every row the store holds is a [`Record`]: an ordered map from attribute
//! name to [`Value`]. Records are plain data with no live bindings, so they
//! can be embedded directly in a host application's state tree and handed
//! to JSON-speaking layers unchanged.
//!
//! ## Usage
//!
//! ```
//! use relstate_codec::{record_from_json, Value};
//!
//! let record = record_from_json(serde_json::json!({"id": "1", "name": "Ann"})).unwrap();
//! assert_eq!(record.get("name"), Some(&Value::from("Ann")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod json;
mod value;

pub use error::{CodecError, CodecResult};
pub use json::{from_json_str, record_from_json, record_to_json, to_json, to_json_string};
pub use value::{Record, Value};

/// Builds a [`Record`] from `key => value` pairs.
///
/// ```
/// use relstate_codec::{record, Value};
///
/// let r = record! { "id" => "1", "pages" => 412 };
/// assert_eq!(r.get("pages"), Some(&Value::Integer(412)));
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $( record.insert(::std::string::String::from($key), $crate::Value::from($value)); )+
        record
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scalar_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            "[a-z]{0,8}".prop_map(Value::Text),
        ]
    }

    #[test]
    fn record_macro_builds_sorted_map() {
        let r = record! { "b" => 2, "a" => "x" };
        let keys: Vec<_> = r.keys().cloned().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    proptest! {
        #[test]
        fn cmp_total_is_antisymmetric(a in scalar_strategy(), b in scalar_strategy()) {
            prop_assert_eq!(a.cmp_total(&b), b.cmp_total(&a).reverse());
        }

        #[test]
        fn scalar_json_roundtrip(v in scalar_strategy()) {
            let json = to_json(&v).unwrap();
            prop_assert_eq!(Value::from(json), v);
        }
    }
}
