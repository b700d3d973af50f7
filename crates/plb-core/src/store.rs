use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::Result;
use crate::format::{self, Format};
use crate::path::Path;
use crate::resource::{FileResource, Resource};
use crate::value::Value;
use crate::{edit, merge};

/// A loaded document plus its dirty flag and where it came from.
///
/// The flag turns on the first time an edit really changes the tree and
/// stays on until the document is loaded again; saving does not clear it.
/// Saving is the caller's decision; see [`Store::save_if_dirty`].
#[derive(Debug)]
pub struct Store<R: Resource = FileResource> {
    resource: R,
    format: Format,
    root: Value,
    dirty: bool,
    // real changes since load, and how many of them the last save covered
    edits: u64,
    saved_edits: u64,
}

impl Store<FileResource> {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::load(FileResource::new(path))
    }
}

impl<R: Resource> Store<R> {
    /// Load from `resource`, or start from an empty table if it does not
    /// exist or holds no content.
    pub fn load(resource: R) -> Result<Self> {
        let (format, root) = read_document(&resource)?;
        Ok(Self {
            resource,
            format,
            root,
            dirty: false,
            edits: 0,
            saved_edits: 0,
        })
    }

    /// Discard in-memory edits and read the resource again.
    pub fn reload(&mut self) -> Result<()> {
        let (format, root) = read_document(&self.resource)?;
        self.format = format;
        self.root = root;
        self.dirty = false;
        self.edits = 0;
        self.saved_edits = 0;
        Ok(())
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_root(self) -> Value {
        self.root
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether some change has not been written by [`Store::save`] yet.
    pub fn has_unsaved_changes(&self) -> bool {
        self.edits != self.saved_edits
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Encoding used by the next save. Does not mark the store dirty.
    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn get(&self, path: impl Into<Path>) -> Option<&Value> {
        edit::get(&self.root, &path.into())
    }

    /// Replace the value at `path`. Returns whether the tree changed.
    pub fn set(&mut self, path: impl Into<Path>, value: Value) -> Result<bool> {
        let path = path.into();
        let changed = edit::set(&mut self.root, &path, value)?;
        self.note("set", &path, changed);
        Ok(changed)
    }

    /// Remove the key at `path`. Missing keys are not an error.
    pub fn delete(&mut self, path: impl Into<Path>) -> bool {
        let path = path.into();
        let changed = edit::delete(&mut self.root, &path);
        self.note("delete", &path, changed);
        changed
    }

    /// Additive merge of `value` into the entry at `path`.
    pub fn merge(&mut self, path: impl Into<Path>, value: Value) -> Result<bool> {
        let path = path.into();
        let changed = merge::merge(&mut self.root, &path, value)?;
        self.note("merge", &path, changed);
        Ok(changed)
    }

    /// Encode and write the document, whether or not it is dirty. The dirty
    /// flag is left as is.
    pub fn save(&mut self) -> Result<()> {
        let data = self.format.encode(&self.root)?;
        self.resource.write_all(&data)?;
        info!(
            resource = %self.resource.name(),
            format = %self.format,
            bytes = data.len(),
            "saved document"
        );
        self.saved_edits = self.edits;
        Ok(())
    }

    /// Save when something changed since load and has not been written yet.
    /// Returns whether it wrote.
    pub fn save_if_dirty(&mut self) -> Result<bool> {
        if !self.dirty || !self.has_unsaved_changes() {
            debug!(resource = %self.resource.name(), "nothing new to save");
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn note(&mut self, op: &str, path: &Path, changed: bool) {
        if changed {
            debug!(%path, op, "document changed");
            self.dirty = true;
            self.edits += 1;
        } else {
            debug!(%path, op, "no change");
        }
    }
}

fn read_document<R: Resource>(resource: &R) -> Result<(Format, Value)> {
    let name = resource.name();
    if !resource.exists() {
        let format = Format::for_name(&name);
        info!(resource = %name, %format, "resource absent; starting empty");
        return Ok((format, Value::empty_table()));
    }
    let data = resource.read_all()?;
    if data.iter().all(u8::is_ascii_whitespace) {
        let format = Format::for_name(&name);
        info!(resource = %name, %format, "resource empty; starting empty");
        return Ok((format, Value::empty_table()));
    }
    let (format, root) = format::decode_any(&data)?;
    info!(resource = %name, %format, bytes = data.len(), "loaded document");
    Ok((format, root))
}
