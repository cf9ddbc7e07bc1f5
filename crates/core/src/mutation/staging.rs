//! Pure functions computing tentative data for optimistic writes.

use serde_json::{Map, Value};

use crate::remote::MutationKind;

/// Applies a JSON merge patch (RFC 7386) to `base`.
///
/// Object members in `patch` replace or extend those in `base`, `null`
/// members delete, and any non-object patch replaces `base` wholesale.
///
/// # Examples
///
/// ```
/// use clinicsync_core::mutation::merge_patch;
/// use serde_json::json;
///
/// let merged = merge_patch(&json!({"progress": 50, "name": "Ada"}), &json!({"progress": 80}));
/// assert_eq!(merged, json!({"progress": 80, "name": "Ada"}));
/// ```
pub fn merge_patch(base: &Value, patch: &Value) -> Value {
    let Value::Object(patch_members) = patch else {
        return patch.clone();
    };

    let mut merged = match base {
        Value::Object(members) => members.clone(),
        _ => Map::new(),
    };

    for (name, value) in patch_members {
        if value.is_null() {
            merged.remove(name);
        } else {
            let current = merged.get(name).cloned().unwrap_or(Value::Null);
            merged.insert(name.clone(), merge_patch(&current, value));
        }
    }

    Value::Object(merged)
}

/// Computes the tentative data staged for a mutation.
///
/// - create: the payload with `id` set to the placeholder id
/// - update: the payload merged onto the current data (or onto nothing)
/// - delete: `None`, the entry disappears until the server answers
pub fn tentative_data(
    kind: MutationKind,
    current: Option<&Value>,
    payload: &Value,
    entity_id: &str,
) -> Option<Value> {
    match kind {
        MutationKind::Create => {
            let mut data = match payload {
                Value::Object(members) => members.clone(),
                _ => Map::new(),
            };
            data.insert("id".to_string(), Value::String(entity_id.to_string()));
            Some(Value::Object(data))
        }
        MutationKind::Update => Some(merge_patch(current.unwrap_or(&Value::Null), payload)),
        MutationKind::Delete => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_replaces_and_extends() {
        let merged = merge_patch(&json!({"a": 1, "b": 2}), &json!({"b": 3, "c": 4}));
        assert_eq!(merged, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_merge_null_deletes() {
        let merged = merge_patch(&json!({"a": 1, "b": 2}), &json!({"b": null}));
        assert_eq!(merged, json!({"a": 1}));
    }

    #[test]
    fn test_merge_nested_objects() {
        let merged = merge_patch(
            &json!({"contact": {"email": "a@x", "phone": "1"}}),
            &json!({"contact": {"phone": "2"}}),
        );
        assert_eq!(merged, json!({"contact": {"email": "a@x", "phone": "2"}}));
    }

    #[test]
    fn test_non_object_patch_replaces() {
        assert_eq!(merge_patch(&json!({"a": 1}), &json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn test_update_merges_onto_current() {
        let current = json!({"id": "client-42", "progress": 50});
        let data = tentative_data(
            MutationKind::Update,
            Some(&current),
            &json!({"progress": 80}),
            "client-42",
        );
        assert_eq!(data, Some(json!({"id": "client-42", "progress": 80})));
    }

    #[test]
    fn test_update_without_current_uses_patch() {
        let data = tentative_data(MutationKind::Update, None, &json!({"progress": 80}), "x");
        assert_eq!(data, Some(json!({"progress": 80})));
    }

    #[test]
    fn test_create_carries_placeholder_id() {
        let data = tentative_data(
            MutationKind::Create,
            None,
            &json!({"name": "Ada", "id": "ignored"}),
            "temp-1",
        );
        assert_eq!(data, Some(json!({"name": "Ada", "id": "temp-1"})));
    }

    #[test]
    fn test_delete_has_no_tentative_data() {
        let current = json!({"id": "s-1"});
        assert_eq!(
            tentative_data(MutationKind::Delete, Some(&current), &Value::Null, "s-1"),
            None
        );
    }
}
