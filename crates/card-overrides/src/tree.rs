//! Path-addressed operations over an untyped configuration tree

use serde_json::{Map, Value};

use crate::path::{ConfigPath, PathSegment};

/// Get the value at `path`
pub fn get<'a>(tree: &'a Value, path: &ConfigPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(tree, |node, segment| match (segment, node) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key),
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
            _ => None,
        })
}

/// Get a mutable reference to the value at `path`
pub fn get_mut<'a>(tree: &'a mut Value, path: &ConfigPath) -> Option<&'a mut Value> {
    let mut node = tree;
    for segment in path.segments() {
        node = match (segment, node) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Step into `segment`, creating the container it needs
///
/// A node of the wrong shape is replaced by an empty container; arrays are
/// padded with `null` up to the index.
fn step_or_create<'a>(node: &'a mut Value, segment: &PathSegment) -> &'a mut Value {
    match segment {
        PathSegment::Key(key) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            match node {
                Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                _ => unreachable!("node was just made an object"),
            }
        }
        PathSegment::Index(index) => {
            if !node.is_array() {
                *node = Value::Array(Vec::new());
            }
            match node {
                Value::Array(items) => {
                    if items.len() <= *index {
                        items.resize(*index + 1, Value::Null);
                    }
                    &mut items[*index]
                }
                _ => unreachable!("node was just made an array"),
            }
        }
    }
}

/// Set `value` at `path`, creating intermediate containers as needed
pub fn set(tree: &mut Value, path: &ConfigPath, value: Value) {
    let node = path
        .segments()
        .iter()
        .fold(tree, |node, segment| step_or_create(node, segment));
    *node = value;
}

/// Result of [`unset`]
#[derive(Debug, Clone, PartialEq)]
pub enum Unset {
    /// Nothing existed at the path
    Missing,
    /// An object key was removed
    Removed(Value),
    /// An array element was cleared to `null`, leaving a hole at `array[index]`
    Hole {
        array: Option<ConfigPath>,
        index: usize,
        removed: Value,
    },
}

impl Unset {
    pub fn removed_anything(&self) -> bool {
        !matches!(self, Unset::Missing)
    }
}

/// Remove the value at `path`
///
/// Object keys are removed outright. Array elements are cleared to `null`
/// so that the indices of other pending operations stay valid; callers
/// collect the reported holes and pass them to [`compact_holes`].
pub fn unset(tree: &mut Value, path: &ConfigPath) -> Unset {
    let parent = path.parent();
    let container = match &parent {
        Some(parent) => match get_mut(tree, parent) {
            Some(node) => node,
            None => return Unset::Missing,
        },
        None => tree,
    };

    match (path.last(), container) {
        (PathSegment::Key(key), Value::Object(map)) => match map.remove(key) {
            Some(removed) => Unset::Removed(removed),
            None => Unset::Missing,
        },
        (PathSegment::Index(index), Value::Array(items)) if *index < items.len() => Unset::Hole {
            removed: std::mem::take(&mut items[*index]),
            array: parent,
            index: *index,
        },
        _ => Unset::Missing,
    }
}

/// Remove array holes left by [`unset`]
///
/// Deeper arrays are compacted before their ancestors and, within one array,
/// higher indices before lower ones, so every recorded position is still
/// valid when it is visited. A slot is only removed if it is still `null`.
pub fn compact_holes(tree: &mut Value, mut holes: Vec<(Option<ConfigPath>, usize)>) {
    holes.sort_by(|(a_path, a_index), (b_path, b_index)| {
        let depth = |p: &Option<ConfigPath>| p.as_ref().map_or(0, ConfigPath::len);
        depth(b_path)
            .cmp(&depth(a_path))
            .then_with(|| {
                a_path
                    .as_ref()
                    .map(ToString::to_string)
                    .cmp(&b_path.as_ref().map(ToString::to_string))
            })
            .then_with(|| b_index.cmp(a_index))
    });
    holes.dedup();

    for (array, index) in holes {
        let node = match &array {
            Some(path) => get_mut(tree, path),
            None => Some(&mut *tree),
        };
        if let Some(Value::Array(items)) = node {
            if items.get(index).is_some_and(Value::is_null) {
                items.remove(index);
            }
        }
    }
}

/// Deep-merge `source` into `target`
///
/// Objects merge key by key, arrays merge element by element (extending the
/// target when the source is longer), anything else is replaced.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(source)) => {
            for (index, value) in source.into_iter().enumerate() {
                match target.get_mut(index) {
                    Some(existing) => deep_merge(existing, value),
                    None => target.push(value),
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// Deep-merge `value` into the node at `path`, setting it if absent
pub fn merge(tree: &mut Value, path: &ConfigPath, value: Value) {
    match get_mut(tree, path) {
        Some(existing) => deep_merge(existing, value),
        None => set(tree, path, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(path: &str) -> ConfigPath {
        ConfigPath::parse(path).unwrap()
    }

    #[test]
    fn test_get() {
        let tree = json!({"a": {"b": [1, {"c": "x"}]}});
        assert_eq!(get(&tree, &p("a.b[1].c")), Some(&json!("x")));
        assert_eq!(get(&tree, &p("a.b[5]")), None);
        assert_eq!(get(&tree, &p("a.b.c")), None);
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut tree = json!({});
        set(&mut tree, &p("a.b[2].c"), json!(true));
        assert_eq!(tree, json!({"a": {"b": [null, null, {"c": true}]}}));
    }

    #[test]
    fn test_set_replaces_wrong_shape() {
        let mut tree = json!({"a": 5});
        set(&mut tree, &p("a.b"), json!(1));
        assert_eq!(tree, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_unset_object_key() {
        let mut tree = json!({"a": {"b": 1, "c": 2}});
        assert_eq!(unset(&mut tree, &p("a.b")), Unset::Removed(json!(1)));
        assert_eq!(tree, json!({"a": {"c": 2}}));
        assert_eq!(unset(&mut tree, &p("a.b")), Unset::Missing);
        assert_eq!(unset(&mut tree, &p("x.y")), Unset::Missing);
    }

    #[test]
    fn test_unset_array_element_and_compact() {
        let mut tree = json!({"list": ["a", "b", "c", "d"]});
        let mut holes = Vec::new();
        for path in ["list[1]", "list[3]"] {
            if let Unset::Hole { array, index, .. } = unset(&mut tree, &p(path)) {
                holes.push((array, index));
            }
        }
        assert_eq!(tree, json!({"list": ["a", null, "c", null]}));

        compact_holes(&mut tree, holes);
        assert_eq!(tree, json!({"list": ["a", "c"]}));
    }

    #[test]
    fn test_compact_nested_arrays() {
        let mut tree = json!([[1, 2], [3, 4], [5]]);
        let mut holes = Vec::new();
        for path in ["[1]", "[0][0]", "[2][0]"] {
            if let Unset::Hole { array, index, .. } = unset(&mut tree, &p(path)) {
                holes.push((array, index));
            }
        }

        compact_holes(&mut tree, holes);
        assert_eq!(tree, json!([[2], []]));
    }

    #[test]
    fn test_compact_skips_refilled_slot() {
        let mut tree = json!({"list": [1, 2]});
        let Unset::Hole { array, index, .. } = unset(&mut tree, &p("list[0]")) else {
            panic!("expected a hole");
        };
        set(&mut tree, &p("list[0]"), json!(9));

        compact_holes(&mut tree, vec![(array, index)]);
        assert_eq!(tree, json!({"list": [9, 2]}));
    }

    #[test]
    fn test_deep_merge() {
        let mut target = json!({
            "a": {"x": 1, "y": [1, 2, 3]},
            "b": "keep"
        });
        deep_merge(
            &mut target,
            json!({"a": {"y": [9], "z": true}, "c": null}),
        );
        assert_eq!(
            target,
            json!({"a": {"x": 1, "y": [9, 2, 3], "z": true}, "b": "keep", "c": null})
        );
    }

    #[test]
    fn test_merge_at_path() {
        let mut tree = json!({"live": {"controls": {"ptz": {"mode": "on"}}}});
        merge(&mut tree, &p("live.controls"), json!({"ptz": {"position": "top-left"}}));
        merge(&mut tree, &p("menu"), json!({"style": "none"}));

        assert_eq!(
            tree,
            json!({
                "live": {"controls": {"ptz": {"mode": "on", "position": "top-left"}}},
                "menu": {"style": "none"}
            })
        );
    }
}
