//! Document persistence.
//!
//! All document reads and writes go through the [`DocumentRepository`]
//! trait so the executor can be tested against an in-memory implementation.
//! The file-backed repository persists the whole document atomically
//! (serialise to a sibling temp file, then rename over the target); loading
//! a previously-saved document reproduces the same logical state.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::document::Document;
use crate::errors::StoreError;
use crate::phase::Pipeline;

pub trait DocumentRepository: Send + Sync {
    fn load(&self) -> Result<Document, StoreError>;
    fn save(&self, doc: &Document) -> Result<(), StoreError>;
    fn exists(&self) -> bool;
}

/// File-backed repository storing the document as pretty JSON.
pub struct FileRepository {
    path: PathBuf,
}

impl FileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the existing document if present; otherwise initialise an empty
    /// one with all declared phase slots pending, persist it, and return it.
    /// An unreadable-but-existing file is an error; malformed content is a
    /// fatal parse error, never ignored.
    pub fn load_or_create(
        &self,
        name: &str,
        topology: &Pipeline,
        requirement_hash: Option<String>,
    ) -> Result<Document, StoreError> {
        if self.path.exists() {
            return self.load();
        }
        let doc = Document::new(name, topology, requirement_hash);
        self.save(&doc)?;
        Ok(doc)
    }
}

impl DocumentRepository for FileRepository {
    fn load(&self) -> Result<Document, StoreError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, doc: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        // Whole-document overwrite via temp file + rename so a crash mid-write
        // never leaves a half-written document behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// In-memory repository for tests and embedding.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Option<Document>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: Document) -> Self {
        Self {
            inner: Mutex::new(Some(doc)),
        }
    }
}

impl DocumentRepository for MemoryRepository {
    fn load(&self) -> Result<Document, StoreError> {
        self.inner
            .lock()
            .expect("memory repository lock")
            .clone()
            .ok_or_else(|| StoreError::Io {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no document stored"),
            })
    }

    fn save(&self, doc: &Document) -> Result<(), StoreError> {
        *self.inner.lock().expect("memory repository lock") = Some(doc.clone());
        Ok(())
    }

    fn exists(&self) -> bool {
        self.inner.lock().expect("memory repository lock").is_some()
    }
}
