//! Sort keys and stable multi-key ordering of managed objects.

use crate::model::object::ManagedObject;
use crate::query::predicate::compare_values;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// One ordering criterion applied to fetch results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// Sorts `objects` by `keys` in listed order.
///
/// Stable: objects comparing equal on every key keep their input order.
pub fn sort_objects(objects: Vec<ManagedObject>, keys: &[SortKey]) -> Vec<ManagedObject> {
    if keys.is_empty() {
        return objects;
    }

    let mut keyed: Vec<(Vec<Option<Value>>, ManagedObject)> = objects
        .into_iter()
        .map(|object| {
            let values = object.with_fields(|fields| {
                keys.iter()
                    .map(|key| fields.get(&key.field).cloned())
                    .collect()
            });
            (values, object)
        })
        .collect();

    keyed.sort_by(|(left, _), (right, _)| {
        keys.iter()
            .zip(left.iter().zip(right.iter()))
            .map(|(key, (left, right))| {
                let ordering = order_for_sort(left.as_ref(), right.as_ref());
                if key.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    keyed.into_iter().map(|(_, object)| object).collect()
}

/// Total order used for sorting: null < bool < number < string < array < object.
fn order_for_sort(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.unwrap_or(&Value::Null);
    let right = right.unwrap_or(&Value::Null);
    type_rank(left)
        .cmp(&type_rank(right))
        .then_with(|| compare_values(left, right).unwrap_or(Ordering::Equal))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
