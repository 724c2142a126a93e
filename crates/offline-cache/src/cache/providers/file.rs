//! # File Cache
//!
//! Persistent provider. Each namespace is a directory under the cache root
//! and each entry is a single `{hash}.entry` file: one line of JSON metadata
//! followed by the raw body. Entries are written to a temporary file and
//! renamed into place, so a reader sees either the old or the new entry.
//! The insertion-order index is rebuilt from the stored sequence numbers the
//! first time a namespace is touched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::fs;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::cache::index::OrderedIndex;
use crate::cache::providers::CacheProvider;
use crate::cache::types::{CacheEntry, CacheLookupResult};
use crate::error::{CacheError, CacheResult};
use crate::request::RequestKey;

const ENTRY_EXTENSION: &str = "entry";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug)]
struct FileNamespace {
    dir: PathBuf,
    index: Mutex<OrderedIndex>,
    /// Serializes writers so the index and the files change in the same order
    write_lock: tokio::sync::Mutex<()>,
}

impl FileNamespace {
    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        self.dir
            .join(key.to_filename())
            .with_extension(ENTRY_EXTENSION)
    }
}

/// Disk-backed provider that survives restarts
#[derive(Debug)]
pub struct FileCache {
    root: PathBuf,
    loaded: Mutex<HashMap<String, Arc<FileNamespace>>>,
}

impl FileCache {
    /// Create a file cache rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> CacheResult<PathBuf> {
        if !is_valid_namespace(namespace) {
            return Err(CacheError::InvalidNamespace(namespace.to_owned()));
        }
        Ok(self.root.join(namespace))
    }

    /// Load (creating if needed) a namespace.
    async fn load(&self, namespace: &str) -> CacheResult<Arc<FileNamespace>> {
        if let Some(ns) = self.loaded.lock().get(namespace) {
            return Ok(ns.clone());
        }

        let dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&dir).await?;
        let index = rebuild_index(&dir).await?;

        let ns = Arc::new(FileNamespace {
            dir,
            index: Mutex::new(index),
            write_lock: tokio::sync::Mutex::new(()),
        });

        // Another task may have loaded it while we were scanning.
        Ok(self
            .loaded
            .lock()
            .entry(namespace.to_owned())
            .or_insert(ns)
            .clone())
    }

    /// Load a namespace only if it exists.
    async fn existing(&self, namespace: &str) -> CacheResult<Option<Arc<FileNamespace>>> {
        if let Some(ns) = self.loaded.lock().get(namespace) {
            return Ok(Some(ns.clone()));
        }

        let dir = self.namespace_dir(namespace)?;
        if fs::try_exists(&dir).await? {
            self.load(namespace).await.map(Some)
        } else {
            Ok(None)
        }
    }
}

fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace != "."
        && namespace != ".."
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Scan a namespace directory and restore the insertion order.
async fn rebuild_index(dir: &Path) -> CacheResult<OrderedIndex> {
    let mut index = OrderedIndex::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(dir_entry) = entries.next_entry().await? {
        let path = dir_entry.path();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ENTRY_EXTENSION) => match read_header(&path).await {
                Ok(header) => index.insert(header.key, header.metadata.sequence),
                Err(e) => {
                    warn!(path = ?path, error = %e, "Dropping unreadable cache entry");
                    let _ = fs::remove_file(&path).await;
                }
            },
            // Leftover from an interrupted write
            Some(TEMP_EXTENSION) => {
                let _ = fs::remove_file(&path).await;
            }
            _ => {}
        }
    }

    debug!(dir = ?dir, entries = index.len(), "Rebuilt namespace index");
    Ok(index)
}

async fn read_header(path: &Path) -> CacheResult<CacheEntry> {
    let file = fs::File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;
    Ok(serde_json::from_slice(&line)?)
}

fn decode_entry(path: &Path, raw: Vec<u8>) -> CacheResult<CacheEntry> {
    let raw = Bytes::from(raw);
    let split = raw
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| CacheError::CorruptEntry {
            path: path.display().to_string(),
            reason: "missing metadata line".to_owned(),
        })?;

    let mut entry: CacheEntry = serde_json::from_slice(&raw[..split])?;
    entry.body = raw.slice(split + 1..);
    Ok(entry)
}

fn encode_entry(entry: &CacheEntry) -> CacheResult<Vec<u8>> {
    let mut buf = serde_json::to_vec(entry)?;
    buf.reserve(entry.body.len() + 1);
    buf.push(b'\n');
    buf.extend_from_slice(&entry.body);
    Ok(buf)
}

#[async_trait::async_trait]
impl CacheProvider for FileCache {
    async fn open(&self, namespace: &str) -> CacheResult<()> {
        self.load(namespace).await.map(|_| ())
    }

    async fn has(&self, namespace: &str) -> CacheResult<bool> {
        Ok(self.existing(namespace).await?.is_some())
    }

    async fn namespaces(&self) -> CacheResult<Vec<String>> {
        fs::create_dir_all(&self.root).await?;

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(dir_entry) = entries.next_entry().await? {
            if dir_entry.file_type().await?.is_dir() {
                match dir_entry.file_name().to_str() {
                    Some(name) if is_valid_namespace(name) => names.push(name.to_owned()),
                    _ => debug!(path = ?dir_entry.path(), "Skipping foreign directory"),
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete_namespace(&self, namespace: &str) -> CacheResult<bool> {
        let dir = self.namespace_dir(namespace)?;
        let was_loaded = self.loaded.lock().remove(namespace).is_some();

        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(namespace, "Deleted namespace directory");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(was_loaded),
            Err(e) => {
                warn!(dir = ?dir, error = %e, "Failed to remove namespace directory");
                Err(e.into())
            }
        }
    }

    async fn get(&self, namespace: &str, key: &RequestKey) -> CacheLookupResult {
        let Some(ns) = self.existing(namespace).await? else {
            return Ok(None);
        };

        let Some(sequence) = ns.index.lock().sequence_of(key) else {
            return Ok(None);
        };

        let path = ns.entry_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Removed behind our back; forget it.
                ns.index.lock().remove_if_current(key, sequence);
                return Ok(None);
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to read cache entry");
                return Err(e.into());
            }
        };

        match decode_entry(&path, raw) {
            Ok(entry) if entry.key == *key => return Ok(Some(entry)),
            Ok(entry) => {
                warn!(path = ?path, stored = ?entry.key, "Cache entry holds another key");
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to parse cache entry");
            }
        }

        // Unservable; stop counting it toward the namespace size.
        ns.index.lock().remove_if_current(key, sequence);
        Ok(None)
    }

    async fn put(&self, namespace: &str, mut entry: CacheEntry) -> CacheResult<()> {
        let ns = self.load(namespace).await?;
        let _writer = ns.write_lock.lock().await;

        let sequence = ns.index.lock().next_sequence();
        entry.metadata.sequence = sequence;

        let path = ns.entry_path(&entry.key);
        let temp_path = ns.dir.join(format!(
            "{}.{sequence}.{TEMP_EXTENSION}",
            entry.key.to_filename()
        ));

        let bytes = encode_entry(&entry)?;
        if let Err(e) = fs::write(&temp_path, &bytes).await {
            warn!(path = ?temp_path, error = %e, "Failed to write cache entry");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_path, &path).await {
            warn!(from = ?temp_path, to = ?path, error = %e, "Failed to move cache entry into place");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        ns.index.lock().insert(entry.key, sequence);
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &RequestKey) -> CacheResult<bool> {
        let Some(ns) = self.existing(namespace).await? else {
            return Ok(false);
        };
        let _writer = ns.write_lock.lock().await;

        let existed = ns.index.lock().remove(key);
        match fs::remove_file(ns.entry_path(key)).await {
            Ok(()) => Ok(existed),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(existed),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, namespace: &str) -> CacheResult<Vec<RequestKey>> {
        Ok(match self.existing(namespace).await? {
            Some(ns) => ns.index.lock().keys(),
            None => Vec::new(),
        })
    }

    async fn oldest(&self, namespace: &str) -> CacheResult<Option<RequestKey>> {
        Ok(match self.existing(namespace).await? {
            Some(ns) => ns.index.lock().oldest().cloned(),
            None => None,
        })
    }

    async fn len(&self, namespace: &str) -> CacheResult<usize> {
        Ok(match self.existing(namespace).await? {
            Some(ns) => ns.index.lock().len(),
            None => 0,
        })
    }
}
