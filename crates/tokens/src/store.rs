//! The token document store.

use crate::error::{Result, TokenStoreError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// A JSON object document backed by a file on disk.
///
/// Reads take a shared lock on the in-memory document. Every mutation,
/// save and reload goes through the single write lock, so concurrent
/// writers serialize and readers always see a complete document.
///
/// Cloning is cheap and all clones share the same document.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    file_name: Option<OsString>,
    doc: RwLock<Map<String, Value>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl TokenStore {
    /// Load a document from disk. A missing file yields an empty document;
    /// it is created on the first [`TokenStore::save`].
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = read_document(&path)?;
        tracing::debug!(path = %path.display(), entries = doc.len(), "loaded token document");
        Ok(Self {
            inner: Arc::new(Inner {
                file_name: path.file_name().map(OsString::from),
                path,
                doc: RwLock::new(doc),
                watcher: Mutex::new(None),
            }),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Look up a key whose value is an array of strings.
    ///
    /// Returns `None` when the key is absent or its value is not an array.
    /// Non-string array elements are skipped.
    pub fn get_tokens(&self, key: &str) -> Option<HashSet<String>> {
        let doc = self.read_doc();
        let values = doc.get(key)?.as_array()?;
        Some(
            values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect(),
        )
    }

    /// Look up a key whose value is a plain string.
    pub fn get_str(&self, key: &str) -> Option<String> {
        let doc = self.read_doc();
        doc.get(key)?.as_str().map(str::to_owned)
    }

    /// Whether the document has an entry for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.read_doc().contains_key(key)
    }

    /// All keys in the document.
    pub fn keys(&self) -> Vec<String> {
        self.read_doc().keys().cloned().collect()
    }

    /// Insert or replace a key with an array of strings.
    ///
    /// The array is written in sorted order so saved documents are stable
    /// under re-serialization.
    pub fn put_tokens(&self, key: &str, tokens: &HashSet<String>) {
        let mut sorted: Vec<&String> = tokens.iter().collect();
        sorted.sort();
        let value = Value::Array(sorted.into_iter().map(|t| Value::String(t.clone())).collect());
        self.write_doc().insert(key.to_string(), value);
    }

    /// Insert or replace a key with a plain string value.
    pub fn put_str(&self, key: &str, value: &str) {
        self.write_doc()
            .insert(key.to_string(), Value::String(value.to_string()));
    }

    /// Remove a key. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.write_doc().remove(key).is_some()
    }

    /// Persist the in-memory document to disk (pretty-printed).
    ///
    /// The write lock is held for the duration so saves serialize with
    /// mutations and with reloads.
    pub fn save(&self) -> Result<()> {
        let doc = self.write_doc();
        if let Some(parent) = self.inner.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&Value::Object(doc.clone()))?;
        std::fs::write(&self.inner.path, json)?;
        tracing::debug!(path = %self.inner.path.display(), entries = doc.len(), "saved token document");
        Ok(())
    }

    /// Replace the in-memory document with the file's current contents.
    /// Unsaved in-memory changes are discarded. A missing file yields an
    /// empty document.
    pub fn reload(&self) -> Result<()> {
        let fresh = read_document(&self.inner.path)?;
        let mut doc = self.write_doc();
        *doc = fresh;
        tracing::info!(path = %self.inner.path.display(), entries = doc.len(), "reloaded token document");
        Ok(())
    }

    /// Register a filesystem watcher that reloads the document whenever the
    /// backing file is modified or recreated.
    ///
    /// The watch is on the parent directory because editors commonly replace
    /// files instead of writing in place. A save through this store also
    /// triggers a reload of what was just written; that round trip is
    /// harmless since the write path is serialized.
    pub fn watch(&self) -> Result<()> {
        let dir = match self.inner.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let store = self.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => store.handle_event(event),
                Err(error) => {
                    tracing::warn!(%error, "token document watcher error");
                }
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(path = %self.inner.path.display(), "watching token document");
        let mut slot = self
            .inner
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(watcher);
        Ok(())
    }

    fn handle_event(&self, event: Event) {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }
        let relevant = event
            .paths
            .iter()
            .any(|p| p.file_name() == self.inner.file_name.as_deref());
        if !relevant {
            return;
        }
        if let Err(error) = self.reload() {
            tracing::warn!(
                path = %self.inner.path.display(),
                %error,
                "failed to reload token document after external change"
            );
        }
    }

    fn read_doc(&self) -> std::sync::RwLockReadGuard<'_, Map<String, Value>> {
        self.inner
            .doc
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_doc(&self) -> std::sync::RwLockWriteGuard<'_, Map<String, Value>> {
        self.inner
            .doc
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_document(path: &Path) -> Result<Map<String, Value>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(e.into()),
    };
    let value: Value = serde_json::from_str(&raw)?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(TokenStoreError::NotAnObject),
    }
}
