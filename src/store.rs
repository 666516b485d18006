//! Content-addressed store interface and an in-memory implementation.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Lazily produced chunks of a file.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// One item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
        }
    }
}

/// Hash-rooted path resolution. Paths look like `<root hash>/<sub path>`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Entries below `path`. A file yields an empty listing.
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>, StoreError>;

    /// Bytes of the file at `path`, in transfer order.
    async fn stream(&self, path: &str) -> Result<ByteStream, StoreError>;
}

/// Store backed by a path → bytes map. Directories are implied by file paths.
pub struct MemoryStore {
    files: BTreeMap<String, Bytes>,
    listings: BTreeMap<String, Vec<DirEntry>>,
    chunk_size: usize,
    served: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            listings: BTreeMap::new(),
            chunk_size: 64 * 1024,
            served: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_file(mut self, path: &str, data: impl Into<Bytes>) -> Self {
        self.files.insert(normalize(path).to_string(), data.into());
        self
    }

    /// Override the listing reported for `path`.
    pub fn with_listing(mut self, path: &str, entries: Vec<DirEntry>) -> Self {
        self.listings.insert(normalize(path).to_string(), entries);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Total bytes handed out by [`ContentStore::stream`] so far.
    pub fn bytes_served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    fn children(&self, dir: &str) -> Option<Vec<DirEntry>> {
        let prefix = format!("{dir}/");
        let mut dirs = BTreeSet::new();
        let mut files = BTreeSet::new();
        for key in self.files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => dirs.insert(child.to_string()),
                None => files.insert(rest.to_string()),
            };
        }
        if dirs.is_empty() && files.is_empty() {
            return None;
        }
        let mut entries: Vec<DirEntry> = dirs.into_iter().map(DirEntry::dir).collect();
        entries.extend(files.into_iter().map(DirEntry::file));
        Some(entries)
    }
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>, StoreError> {
        let path = normalize(path);
        if let Some(entries) = self.listings.get(path) {
            return Ok(entries.clone());
        }
        if self.files.contains_key(path) {
            return Ok(vec![]);
        }
        self.children(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn stream(&self, path: &str) -> Result<ByteStream, StoreError> {
        let path = normalize(path);
        let data = match self.files.get(path) {
            Some(data) => data.clone(),
            None if self.children(path).is_some() => {
                return Err(StoreError::Unavailable(format!("{path} is a directory")))
            }
            None => return Err(StoreError::NotFound(path.to_string())),
        };
        let chunks: Vec<Bytes> = data
            .chunks(self.chunk_size)
            .map(|c| data.slice_ref(c))
            .collect();
        // Count bytes as they are pulled, not up front.
        let served = Arc::clone(&self.served);
        Ok(stream::iter(chunks)
            .map(move |chunk| {
                served.fetch_add(chunk.len(), Ordering::SeqCst);
                Ok(chunk)
            })
            .boxed())
    }
}
