// Additive, shallow merge of a value into the tree.
//
// Dispatch is on the incoming value: arrays gain the elements they lack,
// tables gain or overwrite the keys given (one level deep), everything else
// replaces the stored value. Re-running a merge with the same input never
// reports a second change.
use crate::edit;
use crate::error::Result;
use crate::path::Path;
use crate::value::Value;

pub fn merge(root: &mut Value, path: &Path, incoming: Value) -> Result<bool> {
    let Some(existing) = edit::get_mut(root, path) else {
        return edit::set(root, path, incoming);
    };
    let changed = match (incoming, existing) {
        (Value::Array(items), Value::Array(current)) => {
            let mut appended = false;
            for item in items {
                if !current.contains(&item) {
                    current.push(item);
                    appended = true;
                }
            }
            appended
        }
        (Value::Table(entries), Value::Table(current)) => {
            let mut written = false;
            for (key, item) in entries {
                if current.get(&key) != Some(&item) {
                    current.insert(key, item);
                    written = true;
                }
            }
            written
        }
        // Scalars, and containers landing on a different kind, replace.
        (incoming, existing) => {
            if *existing == incoming {
                false
            } else {
                *existing = incoming;
                true
            }
        }
    };
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::get;

    fn p(s: &str) -> Path {
        Path::parse(s)
    }

    fn strings(items: &[&str]) -> Value {
        Value::Array(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn missing_target_is_a_plain_set() {
        let mut root = Value::empty_table();
        assert!(merge(&mut root, &p("a:b"), strings(&["x"])).unwrap());
        assert_eq!(get(&root, &p("a:b")), Some(&strings(&["x"])));
    }

    #[test]
    fn arrays_gain_missing_elements_only() {
        let mut root: Value = [("list", strings(&["x"]))].into_iter().collect();
        assert!(merge(&mut root, &p("list"), strings(&["x", "y"])).unwrap());
        assert_eq!(get(&root, &p("list")), Some(&strings(&["x", "y"])));
        assert!(!merge(&mut root, &p("list"), strings(&["x", "y"])).unwrap());
        assert!(!merge(&mut root, &p("list"), strings(&["y"])).unwrap());
    }

    #[test]
    fn array_merge_never_reorders_or_removes() {
        let mut root: Value = [("list", strings(&["c", "a", "b"]))].into_iter().collect();
        assert!(merge(&mut root, &p("list"), strings(&["d", "a", "d"])).unwrap());
        assert_eq!(get(&root, &p("list")), Some(&strings(&["c", "a", "b", "d"])));
    }

    #[test]
    fn tables_merge_one_level() {
        let mut root: Value = [("t", Value::from_iter([("a", 1)]))].into_iter().collect();
        let incoming: Value = [("a", 1), ("b", 2)].into_iter().collect();
        assert!(merge(&mut root, &p("t"), incoming.clone()).unwrap());
        assert_eq!(get(&root, &p("t")), Some(&incoming));
        assert!(!merge(&mut root, &p("t"), incoming).unwrap());

        assert!(merge(&mut root, &p("t"), Value::from_iter([("a", 5)])).unwrap());
        let expected: Value = [("a", 5), ("b", 2)].into_iter().collect();
        assert_eq!(get(&root, &p("t")), Some(&expected));
    }

    #[test]
    fn nested_tables_are_overwritten_not_merged() {
        let inner_old: Value = [("x", 1), ("y", 2)].into_iter().collect();
        let mut root: Value = [("t", Value::from_iter([("inner", inner_old)]))]
            .into_iter()
            .collect();
        let inner_new: Value = [("x", 1)].into_iter().collect();
        let incoming: Value = [("inner", inner_new.clone())].into_iter().collect();
        assert!(merge(&mut root, &p("t"), incoming).unwrap());
        assert_eq!(get(&root, &p("t:inner")), Some(&inner_new));
    }

    #[test]
    fn scalars_replace() {
        let mut root: Value = [("n", 1)].into_iter().collect();
        assert!(merge(&mut root, &p("n"), Value::from(2)).unwrap());
        assert!(!merge(&mut root, &p("n"), Value::from(2)).unwrap());
        assert_eq!(get(&root, &p("n")), Some(&Value::Integer(2)));
    }

    #[test]
    fn container_onto_other_kind_replaces() {
        let mut root: Value = [("k", "text")].into_iter().collect();
        assert!(merge(&mut root, &p("k"), strings(&["a"])).unwrap());
        assert_eq!(get(&root, &p("k")), Some(&strings(&["a"])));
        assert!(merge(&mut root, &p("k"), Value::from_iter([("a", 1)])).unwrap());
        assert_eq!(get(&root, &p("k:a")), Some(&Value::Integer(1)));
    }
}
