//! Id sequencing.

use crate::error::{CoreError, CoreResult};
use relstate_codec::Value;

/// Sentinel max id recorded when the first id supplied to a table is not numeric.
pub const NON_NUMERIC_SENTINEL: i64 = -1;

/// Decides the id of a new row and the table's next max id.
///
/// - No id supplied: the next integer after `curr_max` (or `0` for an empty
///   sequence) becomes both the id and the new max.
/// - An integer or integral float id: used as the id in decimal text form;
///   the max advances only if the id exceeds it.
/// - A numeric text id: used verbatim (`"05"` stays `"05"`); the max
///   advances to its value as for integers.
/// - A non-numeric text id: used verbatim; the max is unchanged
///   ([`NON_NUMERIC_SENTINEL`] if there was none).
/// - A null id: passed through unchanged, the max behaves as for
///   non-numeric ids.
///
/// Fails when no id is supplied and the sequence is already at `i64::MAX`.
pub fn id_sequencer(curr_max: Option<i64>, supplied: Option<&Value>) -> CoreResult<(i64, Value)> {
    let Some(supplied) = supplied else {
        let next = match curr_max {
            None => 0,
            Some(max) => max.checked_add(1).ok_or_else(|| {
                CoreError::invalid_operation(format!("id sequence exhausted after {max}"))
            })?,
        };
        return Ok((next, Value::Text(next.to_string())));
    };

    Ok(match numeric_id(supplied) {
        Some(n) => {
            let max = curr_max.map_or(n, |max| max.max(n));
            let id = match supplied {
                Value::Text(_) => supplied.clone(),
                _ => Value::Text(n.to_string()),
            };
            (max, id)
        }
        None => (curr_max.unwrap_or(NON_NUMERIC_SENTINEL), supplied.clone()),
    })
}

fn numeric_id(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(n) => Some(*n),
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(x) if x.is_finite() && x.fract() == 0.0 => Some(*x as i64),
        Value::Text(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_sequence_starts_at_zero() {
        assert_eq!(id_sequencer(None, None).unwrap(), (0, Value::from("0")));
    }

    #[test]
    fn absent_id_increments() {
        assert_eq!(id_sequencer(Some(1), None).unwrap(), (2, Value::from("2")));
    }

    #[test]
    fn larger_numeric_id_advances_max() {
        assert_eq!(
            id_sequencer(Some(1), Some(&Value::Integer(5))).unwrap(),
            (5, Value::from("5"))
        );
        assert_eq!(
            id_sequencer(Some(1), Some(&Value::Float(7.0))).unwrap(),
            (7, Value::from("7"))
        );
    }

    #[test]
    fn smaller_numeric_id_keeps_max() {
        assert_eq!(
            id_sequencer(Some(9), Some(&Value::from("3"))).unwrap(),
            (9, Value::from("3"))
        );
    }

    #[test]
    fn numeric_text_id_keeps_its_spelling() {
        assert_eq!(
            id_sequencer(None, Some(&Value::from("05"))).unwrap(),
            (5, Value::from("05"))
        );
        assert_eq!(
            id_sequencer(Some(2), Some(&Value::from("+7"))).unwrap(),
            (7, Value::from("+7"))
        );
    }

    #[test]
    fn non_numeric_id_is_verbatim() {
        assert_eq!(
            id_sequencer(Some(5), Some(&Value::from("abc"))).unwrap(),
            (5, Value::from("abc"))
        );
        assert_eq!(
            id_sequencer(None, Some(&Value::from("abc"))).unwrap(),
            (NON_NUMERIC_SENTINEL, Value::from("abc"))
        );
    }

    #[test]
    fn null_id_passes_through() {
        assert_eq!(
            id_sequencer(None, Some(&Value::Null)).unwrap(),
            (NON_NUMERIC_SENTINEL, Value::Null)
        );
    }

    #[test]
    fn exhausted_sequence_is_an_error() {
        let err = id_sequencer(Some(i64::MAX), None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        // Supplying an id still works at the limit.
        assert_eq!(
            id_sequencer(Some(i64::MAX), Some(&Value::from("x"))).unwrap(),
            (i64::MAX, Value::from("x"))
        );
    }

    proptest! {
        #[test]
        fn generated_ids_exceed_supplied_numeric_ids(
            supplied in prop::collection::vec(0i64..1000, 0..20)
        ) {
            let mut max = None;
            for n in &supplied {
                let (next, _) = id_sequencer(max, Some(&Value::Integer(*n))).unwrap();
                max = Some(next);
            }
            let (next, id) = id_sequencer(max, None).unwrap();
            prop_assert!(supplied.iter().all(|n| *n < next));
            prop_assert_eq!(id, Value::Text(next.to_string()));
        }
    }
}
