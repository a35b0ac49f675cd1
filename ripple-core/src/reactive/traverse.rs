//! Deep dependency registration.
//!
//! `deep` watchers need to react to changes anywhere inside the value they
//! produce. After the getter runs, the result is walked recursively while
//! the watcher is still the evaluation target, so every nested read
//! subscribes it.

use std::collections::HashSet;

use crate::observer::Value;

/// Touch every nested property of `value`.
///
/// Each object or array is visited once, so cyclic graphs terminate.
/// Frozen values are skipped; they never change.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    walk(value, &mut seen);
}

fn walk(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Object(obj) => {
            if obj.is_frozen() || !seen.insert(obj.addr()) {
                return;
            }
            for key in obj.keys() {
                walk(&obj.get(&key), seen);
            }
        }
        Value::Array(arr) => {
            if arr.is_frozen() || !seen.insert(arr.addr()) {
                return;
            }
            for item in arr.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}
