//! '/'-delimited paths into nested JSON values.
//!
//! `user/address/0/street` walks object keys and, where the current value is
//! an array, numeric indices. Empty segments are ignored, so a leading or
//! doubled '/' is harmless. A path without segments never resolves.
//!
//! Paths are normalised into JSON pointers and resolved by `serde_json`.

use serde_json::Value;

/// The JSON pointer for `path`, or `None` when it has no segments.
fn to_pointer(path: &str) -> Option<String> {
    let pointer: String = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("/{}", segment.replace('~', "~0")))
        .collect();
    (!pointer.is_empty()).then_some(pointer)
}

pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    root.pointer(&to_pointer(path)?)
}

pub fn get_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    root.pointer_mut(&to_pointer(path)?)
}

/// Replace the value at `path`. Returns `false` if the path does not resolve.
pub fn set(root: &mut Value, path: &str, value: Value) -> bool {
    match get_mut(root, path) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}
