// Byte-level backing storage for a document.
use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{Error, Result};

/// Somewhere a document's bytes live.
pub trait Resource {
    /// Human-readable name used in errors and logs.
    fn name(&self) -> String;
    fn exists(&self) -> bool;
    fn read_all(&self) -> Result<Vec<u8>>;
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileResource {
    path: PathBuf,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Resource for FileResource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| Error::io(self.name(), e))
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        fs::write(&self.path, data).map_err(|e| Error::io(self.name(), e))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    data: Option<Vec<u8>>,
    writes: usize,
    read_only: bool,
}

/// In-memory resource. Clones share the same bytes, so a test can keep a
/// handle while a store owns another.
#[derive(Debug, Clone)]
pub struct MemoryResource {
    name: String,
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryResource {
    /// A resource that does not exist yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Rc::default(),
        }
    }

    pub fn with_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let r = Self::new(name);
        r.state.borrow_mut().data = Some(data.into());
        r
    }

    /// Make every subsequent write fail with `PermissionDenied`.
    pub fn set_read_only(&self, read_only: bool) {
        self.state.borrow_mut().read_only = read_only;
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.state.borrow().data.clone()
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.state.borrow().writes
    }
}

impl Resource for MemoryResource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn exists(&self) -> bool {
        self.state.borrow().data.is_some()
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        self.contents().ok_or_else(|| {
            Error::io(self.name(), io::Error::from(io::ErrorKind::NotFound))
        })
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.read_only {
            return Err(Error::io(
                self.name.clone(),
                io::Error::from(io::ErrorKind::PermissionDenied),
            ));
        }
        state.data = Some(data.to_vec());
        state.writes += 1;
        Ok(())
    }
}
