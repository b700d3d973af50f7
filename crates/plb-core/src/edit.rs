// Path-addressed get/set/delete over a document tree.
// Highlights:
// - Lookups only descend through tables; anything else reads as "absent".
// - `set` creates missing intermediate tables and only writes when the new
//   value differs from the stored one, returning whether it wrote.
// - `delete` of a missing key is a quiet no-op.
use crate::error::{Error, Result};
use crate::path::Path;
use crate::value::{Table, Value};

const ROOT_SEGMENT: &str = "(root)";

pub fn get<'v>(root: &'v Value, path: &Path) -> Option<&'v Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, seg| node.as_table()?.get(seg))
}

pub fn get_mut<'v>(root: &'v mut Value, path: &Path) -> Option<&'v mut Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, seg| node.as_table_mut()?.get_mut(seg))
}

/// Write `value` at `path`, returning `true` if the tree changed.
///
/// Fails with [`Error::StructuralConflict`] when an existing intermediate
/// node is not a table; the tree is left untouched in that case.
pub fn set(root: &mut Value, path: &Path, value: Value) -> Result<bool> {
    let (parents, last) = path.split_last();
    let mut table = as_container(root, path, ROOT_SEGMENT)?;
    for seg in parents {
        let child = table
            .entry(seg.clone())
            .or_insert_with(Value::empty_table);
        table = as_container(child, path, seg)?;
    }
    if table.get(last) == Some(&value) {
        return Ok(false);
    }
    table.insert(last.to_string(), value);
    Ok(true)
}

/// Remove the key at `path`, returning `true` if something was removed.
pub fn delete(root: &mut Value, path: &Path) -> bool {
    let (parents, last) = path.split_last();
    let mut node = root;
    for seg in parents {
        match node.as_table_mut().and_then(|t| t.get_mut(seg)) {
            Some(child) => node = child,
            None => return false,
        }
    }
    node.as_table_mut()
        .is_some_and(|t| t.shift_remove(last).is_some())
}

fn as_container<'v>(node: &'v mut Value, path: &Path, segment: &str) -> Result<&'v mut Table> {
    node.as_table_mut().ok_or_else(|| Error::StructuralConflict {
        path: path.to_string(),
        segment: segment.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::parse(s)
    }

    #[test]
    fn get_walks_tables_only() {
        let root: Value = [(
            "a",
            Value::from_iter([("b", Value::from(vec![Value::from(1)]))]),
        )]
        .into_iter()
        .collect();
        assert_eq!(get(&root, &p("a:b")), Some(&Value::from(vec![Value::from(1)])));
        assert_eq!(get(&root, &p("a:b:0")), None);
        assert_eq!(get(&root, &p("a:missing")), None);
        assert_eq!(get(&root, &p("nope:b")), None);
    }

    #[test]
    fn set_autovivifies_and_reports_change() {
        let mut root = Value::empty_table();
        assert!(set(&mut root, &p("server:port"), Value::from(8080)).unwrap());
        assert_eq!(get(&root, &p("server:port")), Some(&Value::Integer(8080)));
        assert!(!set(&mut root, &p("server:port"), Value::from(8080)).unwrap());
        assert!(set(&mut root, &p("server:port"), Value::from(9090)).unwrap());
    }

    #[test]
    fn set_keeps_key_position_on_overwrite() {
        let mut root: Value = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        set(&mut root, &p("b"), Value::from(20)).unwrap();
        let keys: Vec<&String> = root.as_table().unwrap().keys().collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[test]
    fn set_through_scalar_is_a_conflict() {
        let mut root: Value = [("a", "text")].into_iter().collect();
        let before = root.clone();
        let err = set(&mut root, &p("a:b:c"), Value::from(1)).unwrap_err();
        match err {
            Error::StructuralConflict { path, segment } => {
                assert_eq!(path, "a:b:c");
                assert_eq!(segment, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(root, before);
    }

    #[test]
    fn set_on_non_table_root_is_a_conflict() {
        let mut root = Value::from(vec![Value::from(1)]);
        assert!(matches!(
            set(&mut root, &p("x"), Value::Null),
            Err(Error::StructuralConflict { .. })
        ));
    }

    #[test]
    fn delete_is_quiet_when_missing() {
        let mut root: Value = [("a", Value::from_iter([("b", 1)]))].into_iter().collect();
        assert!(!delete(&mut root, &p("x:y")));
        assert!(!delete(&mut root, &p("a:c")));
        assert!(!delete(&mut root, &p("a:b:c")));
        assert!(delete(&mut root, &p("a:b")));
        assert_eq!(get(&root, &p("a")), Some(&Value::empty_table()));
        assert!(!delete(&mut root, &p("a:b")));
    }

    #[test]
    fn delete_preserves_sibling_order() {
        let mut root: Value = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        assert!(delete(&mut root, &p("a")));
        let keys: Vec<&String> = root.as_table().unwrap().keys().collect();
        assert_eq!(keys, ["b", "c"]);
    }
}
