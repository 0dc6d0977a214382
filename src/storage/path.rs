//! Dotted-path resolution.
//!
//! Keys are flat strings, but a key like `user.address.city` is also readable
//! as a field of `user`. Asking for `user` when no exact `user` key exists
//! folds every `user.<rest>` key into one nested JSON object:
//!
//! ```text
//! user.name         -> "Ariz"          {
//! user.address.city -> "Pune"    =>      "name": "Ariz",
//!                                        "address": { "city": "Pune" }
//!                                      }
//! ```
//!
//! Entries are folded in the order given. When two paths collide (`a.b` and
//! `a.b.c`), the later one replaces whatever the earlier one left at that
//! position.

use serde_json::{Map, Value};

/// Returns `rest` when `stored` has the form `<prefix>.<rest>`.
pub fn child_path<'a>(stored: &'a str, prefix: &str) -> Option<&'a str> {
    stored.strip_prefix(prefix)?.strip_prefix('.')
}

/// Writes `value` into `root` at the dotted position `rest`, creating
/// intermediate objects as needed.
pub fn insert_path(root: &mut Map<String, Value>, rest: &str, value: Value) {
    let (parents, leaf) = match rest.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, rest),
    };

    let mut node = root;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        let child = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            *child = Value::Object(Map::new());
        }
        node = match child.as_object_mut() {
            Some(map) => map,
            None => return,
        };
    }

    node.insert(leaf.to_string(), value);
}

/// Builds the nested object for `prefix` out of `entries`.
///
/// Returns `None` when no entry lives under `prefix`.
pub fn synthesize<'a, I>(prefix: &str, entries: I) -> Option<Value>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut root = Map::new();
    let mut found = false;

    for (key, value) in entries {
        if let Some(rest) = child_path(key, prefix) {
            insert_path(&mut root, rest, value.clone());
            found = true;
        }
    }

    found.then_some(Value::Object(root))
}
