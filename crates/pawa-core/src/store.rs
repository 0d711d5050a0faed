//! Key-value persistence used for chat history and browser conversations.
//!
//! Stands in for the editor's global state and the browser's local storage:
//! string keys mapping to JSON values.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>
    where
        Self: Sized,
    {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()>
    where
        Self: Sized,
    {
        self.set(key, serde_json::to_value(value)?)
    }
}

/// A store kept as one pretty-printed JSON object on disk.
///
/// Reads are served from the copy loaded at `open`; every `set` merges into
/// the current file and rewrites it.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = read_entries(&path)?;
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one key through to disk.
    ///
    /// The file is re-read first so keys written by other processes since
    /// `open` survive, and the new content replaces the file atomically.
    fn write_key(&mut self, key: &str, value: Value) -> Result<()> {
        let mut entries = match read_entries(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("rewriting unreadable store: {e:#}");
                self.entries.clone()
            }
        };
        entries.insert(key.to_string(), value);

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut file = NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut file, &entries)?;
        file.flush()?;
        file.persist(&self.path)
            .with_context(|| format!("writing {}", self.path.display()))?;

        self.entries = entries;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.write_key(key, value)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}
