//! Caller-facing operations.
//!
//! Each operation reports whether it changed anything, the value it found
//! before acting (rendered as text) and a short status message. [`run`]
//! bundles load, one operation and the conditional save.
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::path::Path;
use crate::resource::Resource;
use crate::store::Store;
use crate::value::Value;

// Reads report through `original_value` and leave the message empty.
pub const MSG_READ: &str = "";
pub const MSG_NOT_PRESENT: &str = "key not present";
pub const MSG_REMOVED: &str = "removed key";
pub const MSG_UNCHANGED: &str = "entry exists; nothing to do";
pub const MSG_REPLACED: &str = "replaced item contents";
pub const MSG_UPDATED: &str = "updated item value";
pub const MSG_NO_CHANGES: &str = "entry exists; no changes made";

/// Rendering of a missing value in [`Outcome::original_value`].
pub const ABSENT: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub changed: bool,
    pub original_value: String,
    pub msg: String,
}

impl Outcome {
    fn new(changed: bool, original: Option<&Value>, msg: &str) -> Self {
        Self {
            changed,
            original_value: original.map_or_else(|| ABSENT.to_string(), Value::to_string),
            msg: msg.to_string(),
        }
    }
}

/// How `set_value` writes into an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Overwrite the entry wholesale.
    Replace,
    /// Add missing array elements / table keys, replace scalars.
    MergeAdditive,
}

/// Desired state of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    Absent,
    #[default]
    Present,
    Read,
    Replace,
}

impl FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "absent" => Ok(State::Absent),
            "present" => Ok(State::Present),
            "read" => Ok(State::Read),
            "replace" => Ok(State::Replace),
            other => Err(Error::Usage(format!(
                "unknown state '{other}' (expected absent, present, read or replace)"
            ))),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Absent => "absent",
            State::Present => "present",
            State::Read => "read",
            State::Replace => "replace",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub key: String,
    pub state: State,
    pub value: Option<Value>,
}

pub fn read<R: Resource>(store: &Store<R>, path: impl Into<Path>) -> Outcome {
    Outcome::new(false, store.get(path), MSG_READ)
}

pub fn set_value<R: Resource>(
    store: &mut Store<R>,
    path: impl Into<Path>,
    value: Value,
    strategy: Strategy,
) -> Result<Outcome> {
    let path = path.into();
    let original = store.get(&path).cloned();
    if original.as_ref() == Some(&value) {
        return Ok(Outcome::new(false, original.as_ref(), MSG_UNCHANGED));
    }
    let outcome = match strategy {
        Strategy::Replace => {
            let changed = store.set(&path, value)?;
            Outcome::new(changed, original.as_ref(), MSG_REPLACED)
        }
        Strategy::MergeAdditive => {
            let changed = store.merge(&path, value)?;
            let msg = if changed { MSG_UPDATED } else { MSG_NO_CHANGES };
            Outcome::new(changed, original.as_ref(), msg)
        }
    };
    Ok(outcome)
}

pub fn delete_key<R: Resource>(store: &mut Store<R>, path: impl Into<Path>) -> Outcome {
    let path = path.into();
    let Some(original) = store.get(&path).cloned() else {
        return Outcome::new(false, None, MSG_NOT_PRESENT);
    };
    let changed = store.delete(&path);
    Outcome::new(changed, Some(&original), MSG_REMOVED)
}

/// Apply one operation to a loaded store without saving.
pub fn apply<R: Resource>(store: &mut Store<R>, params: &Params) -> Result<Outcome> {
    let key = params.key.as_str();
    match (params.state, &params.value) {
        (State::Read, _) => Ok(read(store, key)),
        (State::Absent, _) => Ok(delete_key(store, key)),
        (State::Present, Some(v)) => set_value(store, key, v.clone(), Strategy::MergeAdditive),
        (State::Replace, Some(v)) => set_value(store, key, v.clone(), Strategy::Replace),
        (state, None) => Err(Error::Usage(format!("state '{state}' requires a value"))),
    }
}

/// Load, apply, and save only when the document changed and this is not a
/// check-mode run.
pub fn run<R: Resource>(resource: R, params: &Params, check_mode: bool) -> Result<Outcome> {
    let mut store = Store::load(resource)?;
    let outcome = apply(&mut store, params)?;
    if store.is_dirty() {
        if check_mode {
            info!(key = %params.key, "check mode; not saving");
        } else {
            store.save()?;
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::MemoryResource;

    fn store_with(pairs: &[(&str, Value)]) -> Store<MemoryResource> {
        let mut store = Store::load(MemoryResource::new("m")).unwrap();
        for (k, v) in pairs {
            store.set(*k, v.clone()).unwrap();
        }
        store
    }

    #[test]
    fn read_reports_absent_as_none() {
        let store = store_with(&[("a", Value::from(1))]);
        assert_eq!(read(&store, "a").original_value, "1");
        let out = read(&store, "b");
        assert_eq!(out.original_value, ABSENT);
        assert!(!out.changed);
        assert_eq!(out.msg, "");
    }

    #[test]
    fn replace_messages() {
        let mut store = store_with(&[("a", Value::from("x"))]);
        let out = set_value(&mut store, "a", Value::from("x"), Strategy::Replace).unwrap();
        assert_eq!((out.changed, out.msg.as_str()), (false, MSG_UNCHANGED));
        let out = set_value(&mut store, "a", Value::from("y"), Strategy::Replace).unwrap();
        assert_eq!((out.changed, out.msg.as_str()), (true, MSG_REPLACED));
        assert_eq!(out.original_value, "\"x\"");
    }

    #[test]
    fn merge_messages() {
        let list = |xs: &[&str]| Value::Array(xs.iter().map(|s| Value::from(*s)).collect());
        let mut store = store_with(&[("l", list(&["a", "b"]))]);
        let out = set_value(&mut store, "l", list(&["b"]), Strategy::MergeAdditive).unwrap();
        assert_eq!((out.changed, out.msg.as_str()), (false, MSG_NO_CHANGES));
        let out = set_value(&mut store, "l", list(&["c"]), Strategy::MergeAdditive).unwrap();
        assert_eq!((out.changed, out.msg.as_str()), (true, MSG_UPDATED));
        assert_eq!(store.get("l"), Some(&list(&["a", "b", "c"])));
    }

    #[test]
    fn delete_messages() {
        let mut store = store_with(&[("a", Value::from(1))]);
        let out = delete_key(&mut store, "zz");
        assert_eq!((out.changed, out.msg.as_str()), (false, MSG_NOT_PRESENT));
        let out = delete_key(&mut store, "a");
        assert_eq!((out.changed, out.msg.as_str()), (true, MSG_REMOVED));
        assert_eq!(out.original_value, "1");
    }

    #[test]
    fn present_without_value_is_a_usage_error() {
        let mut store = store_with(&[]);
        let params = Params {
            key: "a".into(),
            state: State::Present,
            value: None,
        };
        assert!(matches!(apply(&mut store, &params), Err(Error::Usage(_))));
    }

    #[test]
    fn run_respects_check_mode() {
        let handle = MemoryResource::new("m");
        let params = Params {
            key: "server:port".into(),
            state: State::Replace,
            value: Some(Value::from(8080)),
        };
        let out = run(handle.clone(), &params, true).unwrap();
        assert!(out.changed);
        assert_eq!(handle.writes(), 0);

        let out = run(handle.clone(), &params, false).unwrap();
        assert!(out.changed);
        assert_eq!(handle.writes(), 1);

        let out = run(handle.clone(), &params, false).unwrap();
        assert!(!out.changed);
        assert_eq!(out.original_value, "8080");
        assert_eq!(handle.writes(), 1);
    }

    #[test]
    fn state_parses() {
        assert_eq!("absent".parse::<State>().unwrap(), State::Absent);
        assert_eq!(State::default(), State::Present);
        assert!("gone".parse::<State>().is_err());
    }

    #[test]
    fn outcome_serializes_like_module_status() {
        let out = Outcome::new(true, None, MSG_UPDATED);
        let j = serde_json::to_value(&out).unwrap();
        assert_eq!(
            j,
            serde_json::json!({"changed": true, "original_value": "None", "msg": "updated item value"})
        );
    }
}
