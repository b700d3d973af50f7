//! plb-core: path-addressed editing of property list settings files
//!
//! This crate focuses on a small, well-factored surface:
//! - `Value` tree with insertion-ordered tables
//! - Colon-separated key paths with `\:` escapes
//! - Idempotent get/set/delete and additive merge, with a dirty flag
//! - Binary plist, XML plist and JSON codecs
//! - `Store` for load / edit / conditional save, plus zip backups
//!
pub mod backup;
pub mod bplist;
pub mod bplist_write;
pub mod edit;
pub mod error;
pub mod format;
pub mod json;
pub mod merge;
pub mod ops;
pub mod path;
pub mod resource;
pub mod store;
pub mod value;
pub mod xml;

pub use error::{Error, Result};
pub use format::Format;
pub use ops::{Outcome, Params, State, Strategy, apply, delete_key, read, run, set_value};
pub use path::{Path, resolve};
pub use resource::{FileResource, MemoryResource, Resource};
pub use store::Store;
pub use value::{Table, Value, ValueKind};
