//! JSON -> Bolt parameter conversion.
//!
//! Stages hand rows to the adapter as `serde_json::Value` objects; this module
//! converts them into driver parameter types. Nested objects become Bolt maps,
//! arrays become Bolt lists. JSON `null` entries are omitted entirely: an
//! absent property and a null property are equivalent under `SET n += row`.

use neo4rs::{BoltList, BoltMap, BoltType};
use serde_json::Value;

/// Convert a JSON value into a Bolt parameter value.
/// Returns `None` for JSON `null` (callers drop the entry).
pub fn json_to_bolt(value: &Value) -> Option<BoltType> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some((*b).into()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.into())
            } else {
                n.as_f64().map(Into::into)
            }
        }
        Value::String(s) => Some(s.clone().into()),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items.iter().filter_map(json_to_bolt) {
                list.push(item);
            }
            Some(BoltType::List(list))
        }
        Value::Object(map) => {
            let mut out = BoltMap::new();
            for (k, v) in map {
                if let Some(bolt) = json_to_bolt(v) {
                    out.put(k.as_str().into(), bolt);
                }
            }
            Some(BoltType::Map(out))
        }
    }
}

/// Convert a list of JSON row objects into one Bolt list parameter,
/// suitable for `UNWIND $rows AS row`.
pub fn rows_to_bolt(rows: &[Value]) -> BoltType {
    let mut list = BoltList::new();
    for row in rows.iter().filter_map(json_to_bolt) {
        list.push(row);
    }
    BoltType::List(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_convert() {
        assert!(json_to_bolt(&json!(null)).is_none());
        assert!(matches!(json_to_bolt(&json!(true)), Some(BoltType::Boolean(_))));
        assert!(matches!(json_to_bolt(&json!(42)), Some(BoltType::Integer(_))));
        assert!(matches!(json_to_bolt(&json!(1.5)), Some(BoltType::Float(_))));
        assert!(matches!(json_to_bolt(&json!("x")), Some(BoltType::String(_))));
    }

    #[test]
    fn null_properties_are_dropped() {
        let row = json!({"path": "src/a.py", "old_path": null});
        match json_to_bolt(&row) {
            Some(BoltType::Map(m)) => {
                assert_eq!(m.value.len(), 1);
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn nested_rows_convert() {
        let rows = vec![
            json!({"path": "src/a.py", "props": {"size": 10, "tags": ["a", "b"]}}),
            json!({"path": "src/b.py", "props": {"size": 20, "tags": []}}),
        ];
        match rows_to_bolt(&rows) {
            BoltType::List(list) => assert_eq!(list.value.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }
}
