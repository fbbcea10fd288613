//! Structural JSON diff.

use super::DiffCodec;
use crate::error::{HistoryError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A change turning one JSON value into another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Delta {
    /// Replace the value wholesale (scalars, or a change of kind).
    Replace { value: Value },

    /// Edit an object in place.
    Object {
        /// Keys added, or replaced wholesale.
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        set: Map<String, Value>,

        /// Keys removed.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        remove: Vec<String>,

        /// Keys whose container value is edited recursively.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        nested: BTreeMap<String, Delta>,
    },

    /// Edit an array in place.
    ///
    /// `items` touch indices shared by both sides, then the array is
    /// truncated to `len` or grown by `append`.
    Array {
        len: usize,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        items: Vec<ItemDelta>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        append: Vec<Value>,
    },
}

/// Delta for one array element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemDelta {
    pub index: usize,
    pub delta: Delta,
}

impl Delta {
    /// Compute the delta from `from` to `to`; `None` if they are equal.
    pub fn between(from: &Value, to: &Value) -> Option<Delta> {
        if from == to {
            return None;
        }

        match (from, to) {
            (Value::Object(a), Value::Object(b)) => Some(diff_objects(a, b)),
            (Value::Array(a), Value::Array(b)) => Some(diff_arrays(a, b)),
            _ => Some(Delta::Replace { value: to.clone() }),
        }
    }

    /// Apply this delta to `base`.
    pub fn apply_to(&self, base: Value) -> Result<Value> {
        match self {
            Delta::Replace { value } => Ok(value.clone()),

            Delta::Object { set, remove, nested } => {
                let mut obj = match base {
                    Value::Object(obj) => obj,
                    other => {
                        return Err(HistoryError::Codec(format!(
                            "object delta applied to {}",
                            kind(&other)
                        )))
                    }
                };

                for key in remove {
                    obj.remove(key);
                }

                for (key, delta) in nested {
                    let field = obj.remove(key).ok_or_else(|| {
                        HistoryError::Codec(format!("nested delta for missing key {:?}", key))
                    })?;
                    obj.insert(key.clone(), delta.apply_to(field)?);
                }

                for (key, value) in set {
                    obj.insert(key.clone(), value.clone());
                }

                Ok(Value::Object(obj))
            }

            Delta::Array { len, items, append } => {
                let mut arr = match base {
                    Value::Array(arr) => arr,
                    other => {
                        return Err(HistoryError::Codec(format!(
                            "array delta applied to {}",
                            kind(&other)
                        )))
                    }
                };

                let base_len = arr.len();
                for item in items {
                    let slot = arr.get_mut(item.index).ok_or_else(|| {
                        HistoryError::Codec(format!(
                            "item delta index {} out of bounds (len {})",
                            item.index, base_len
                        ))
                    })?;
                    let current = std::mem::take(slot);
                    *slot = item.delta.apply_to(current)?;
                }

                arr.truncate(*len);
                arr.extend(append.iter().cloned());

                if arr.len() != *len {
                    return Err(HistoryError::Codec(format!(
                        "array delta expected length {}, produced {}",
                        len,
                        arr.len()
                    )));
                }

                Ok(Value::Array(arr))
            }
        }
    }
}

fn diff_objects(a: &Map<String, Value>, b: &Map<String, Value>) -> Delta {
    let mut set = Map::new();
    let mut nested = BTreeMap::new();

    for (key, new_value) in b {
        match a.get(key) {
            None => {
                set.insert(key.clone(), new_value.clone());
            }
            Some(old_value) if old_value == new_value => {}
            Some(old_value) if same_container(old_value, new_value) => {
                if let Some(delta) = Delta::between(old_value, new_value) {
                    nested.insert(key.clone(), delta);
                }
            }
            Some(_) => {
                set.insert(key.clone(), new_value.clone());
            }
        }
    }

    let remove = a
        .keys()
        .filter(|key| !b.contains_key(*key))
        .cloned()
        .collect();

    Delta::Object { set, remove, nested }
}

fn diff_arrays(a: &[Value], b: &[Value]) -> Delta {
    let common = a.len().min(b.len());

    let items = (0..common)
        .filter_map(|index| {
            Delta::between(&a[index], &b[index]).map(|delta| ItemDelta { index, delta })
        })
        .collect();

    let append = if b.len() > a.len() {
        b[a.len()..].to_vec()
    } else {
        Vec::new()
    };

    Delta::Array {
        len: b.len(),
        items,
        append,
    }
}

fn same_container(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
    )
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Default codec: recursive object/array deltas encoded as [`Delta`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StructuralCodec;

impl DiffCodec for StructuralCodec {
    fn diff(&self, from: &Value, to: &Value) -> Result<Option<Value>> {
        match Delta::between(from, to) {
            Some(delta) => Ok(Some(serde_json::to_value(&delta)?)),
            None => Ok(None),
        }
    }

    fn apply(&self, base: &Value, delta: &Value) -> Result<Value> {
        let delta: Delta = serde_json::from_value(delta.clone())
            .map_err(|e| HistoryError::Deserialization(format!("delta: {}", e)))?;
        delta.apply_to(base.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn roundtrip(a: Value, b: Value) {
        let codec = StructuralCodec;
        match codec.diff(&a, &b).unwrap() {
            Some(delta) => assert_eq!(codec.apply(&a, &delta).unwrap(), b),
            None => assert_eq!(a, b),
        }
    }

    #[test]
    fn test_equal_values_have_no_delta() {
        assert_eq!(Delta::between(&json!({"a": [1, 2]}), &json!({"a": [1, 2]})), None);
    }

    #[test]
    fn test_object_set_and_remove() {
        let delta = Delta::between(&json!({"a": 1, "b": 2}), &json!({"a": 2, "c": 3})).unwrap();

        match &delta {
            Delta::Object { set, remove, nested } => {
                assert_eq!(set.get("a"), Some(&json!(2)));
                assert_eq!(set.get("c"), Some(&json!(3)));
                assert_eq!(remove, &vec!["b".to_string()]);
                assert!(nested.is_empty());
            }
            other => panic!("unexpected delta {:?}", other),
        }

        let result = delta.apply_to(json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(result, json!({"a": 2, "c": 3}));
    }

    #[test]
    fn test_nested_object_recurses() {
        let delta = Delta::between(
            &json!({"user": {"name": "ann", "age": 30}}),
            &json!({"user": {"name": "ann", "age": 31}}),
        )
        .unwrap();

        let encoded = serde_json::to_value(&delta).unwrap();
        assert_eq!(
            encoded,
            json!({
                "op": "object",
                "nested": {
                    "user": { "op": "object", "set": { "age": 31 } }
                }
            })
        );
    }

    #[test]
    fn test_array_grow_and_shrink() {
        roundtrip(json!([1, 2, 3]), json!([1, 5, 3, 4, 5]));
        roundtrip(json!([1, 2, 3, 4]), json!([0, 2]));
        roundtrip(json!([]), json!([{"a": 1}]));
        roundtrip(json!([[1], [2]]), json!([[1, 2], [2]]));
    }

    #[test]
    fn test_kind_change_replaces() {
        let delta = Delta::between(&json!({"a": [1]}), &json!({"a": {"b": 1}})).unwrap();
        assert_eq!(
            delta.apply_to(json!({"a": [1]})).unwrap(),
            json!({"a": {"b": 1}})
        );

        roundtrip(json!({}), json!(null));
        roundtrip(json!("x"), json!([1]));
    }

    #[test]
    fn test_object_delta_on_array_fails() {
        let delta = Delta::between(&json!({"a": 1}), &json!({"a": 2})).unwrap();
        let result = delta.apply_to(json!([1, 2]));
        assert!(matches!(result, Err(HistoryError::Codec(_))));
    }

    #[test]
    fn test_item_index_out_of_bounds_fails() {
        let delta = Delta::Array {
            len: 3,
            items: vec![ItemDelta {
                index: 5,
                delta: Delta::Replace { value: json!(1) },
            }],
            append: vec![],
        };
        match delta.apply_to(json!([1, 2, 3])) {
            Err(HistoryError::Codec(msg)) => assert!(msg.contains("index 5"), "{}", msg),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_nested_item_deltas_apply_in_place() {
        let from = json!([{"a": 1}, [1, 2], "x"]);
        let to = json!([{"a": 2}, [1, 2, 3], "x"]);
        let delta = Delta::between(&from, &to).unwrap();

        match &delta {
            Delta::Array { items, .. } => assert_eq!(items.len(), 2),
            other => panic!("unexpected delta {:?}", other),
        }
        assert_eq!(delta.apply_to(from).unwrap(), to);
    }

    #[test]
    fn test_array_length_mismatch_fails() {
        let delta = Delta::between(&json!([1]), &json!([1, 2])).unwrap();
        // Base already longer than the delta was computed against
        assert!(matches!(
            delta.apply_to(json!([1, 9, 9])),
            Err(HistoryError::Codec(_))
        ));
    }

    #[test]
    fn test_malformed_delta_rejected() {
        let codec = StructuralCodec;
        let result = codec.apply(&json!({}), &json!({"op": "teleport"}));
        assert!(matches!(result, Err(HistoryError::Deserialization(_))));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-e]", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_apply_diff_yields_target(a in arb_json(), b in arb_json()) {
            let codec = StructuralCodec;
            match codec.diff(&a, &b).unwrap() {
                Some(delta) => prop_assert_eq!(codec.apply(&a, &delta).unwrap(), b),
                None => prop_assert_eq!(a, b),
            }
        }
    }
}
