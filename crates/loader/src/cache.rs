use async_trait::async_trait;
use bytes::Bytes;
use loader_config::LoaderConfig;
use lru::LruCache;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::request::Url;

const DEFAULT_MEMORY_ENTRIES: usize = 200;
const ENTRY_EXTENSION: &str = "entry";
const HEADER_PREFIX_LEN: usize = 4;
const MAX_HEADER_LEN: usize = 1024 * 1024;

/// Transport metadata stored next to a cached payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    /// Seconds since the Unix epoch.
    pub stored_at: u64,
}

impl ResponseMetadata {
    pub fn new(url: &Url, status: u16) -> Self {
        let stored_at = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            url: url.to_string(),
            status,
            headers: Vec::new(),
            content_type: None,
            stored_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub payload: Bytes,
    pub metadata: ResponseMetadata,
}

/// Response cache keyed by request URL.
///
/// Each call must be individually atomic and safe to race with other
/// callers; the loader takes no locks of its own.
#[async_trait]
pub trait HttpCache: Send + Sync {
    async fn lookup(&self, url: &Url) -> Option<CachedResponse>;

    async fn store(&self, url: &Url, response: CachedResponse);
}

#[derive(Debug)]
struct MemoryEntries {
    entries: LruCache<String, CachedResponse>,
    bytes: u64,
}

impl MemoryEntries {
    fn forget(&mut self, response: &CachedResponse) {
        self.bytes = self.bytes.saturating_sub(response.payload.len() as u64);
    }
}

/// LRU bounded by entry count and, optionally, total payload bytes.
#[derive(Clone, Debug)]
pub struct MemoryHttpCache {
    inner: Arc<Mutex<MemoryEntries>>,
    max_bytes: u64,
}

impl MemoryHttpCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Arc::new(Mutex::new(MemoryEntries {
                entries: LruCache::new(capacity),
                bytes: 0,
            })),
            max_bytes: 0,
        }
    }

    /// Cap the summed payload size. `0` removes the cap.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Payload bytes currently held.
    pub async fn bytes(&self) -> u64 {
        self.inner.lock().await.bytes
    }
}

impl Default for MemoryHttpCache {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_ENTRIES)
    }
}

#[async_trait]
impl HttpCache for MemoryHttpCache {
    async fn lookup(&self, url: &Url) -> Option<CachedResponse> {
        let mut inner = self.inner.lock().await;
        inner.entries.get(url.as_str()).cloned()
    }

    async fn store(&self, url: &Url, response: CachedResponse) {
        let size = response.payload.len() as u64;
        let mut inner = self.inner.lock().await;

        if self.max_bytes > 0 && size > self.max_bytes {
            debug!(
                "Not keeping {} in memory: {} bytes exceeds the {} byte budget",
                url, size, self.max_bytes
            );
            if let Some(stale) = inner.entries.pop(url.as_str()) {
                inner.forget(&stale);
            }
            return;
        }

        inner.bytes += size;
        // Returns the replaced value for this URL, or the evicted LRU entry
        if let Some((_, displaced)) = inner.entries.push(url.to_string(), response) {
            inner.forget(&displaced);
        }

        while self.max_bytes > 0 && inner.bytes > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => inner.forget(&evicted),
                None => break,
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    key: String,
    payload_len: u64,
    metadata: ResponseMetadata,
}

/// Persists each response as one `<hash>.entry` file: a little-endian `u32`
/// header length, the JSON header, then the payload.
///
/// Entries are written to a private temp file and renamed into place, so a
/// reader sees either the previous entry or the new one. IO failures are
/// logged and read as misses; a store that fails is dropped.
#[derive(Clone, Debug)]
pub struct DiskHttpCache {
    dir: PathBuf,
    max_bytes: u64,
}

impl DiskHttpCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_bytes: 0,
        }
    }

    /// Evict the oldest entries once the directory exceeds `max_bytes`.
    /// `0` disables eviction.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, url: &Url) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        url.as_str().hash(&mut hasher);
        self.dir
            .join(format!("{:016x}.{ENTRY_EXTENSION}", hasher.finish()))
    }

    async fn read(&self, url: &Url) -> io::Result<Option<CachedResponse>> {
        let raw = match tokio::fs::read(self.path(url)).await {
            Ok(raw) => Bytes::from(raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let (entry, payload) = split_entry(raw)?;

        // Hash collision: the slot belongs to a different URL
        if entry.key != url.as_str() {
            return Ok(None);
        }

        if payload.len() as u64 != entry.payload_len {
            return Err(invalid_entry("payload length does not match header"));
        }

        Ok(Some(CachedResponse {
            payload,
            metadata: entry.metadata,
        }))
    }

    async fn write(&self, url: &Url, response: &CachedResponse) -> io::Result<()> {
        let cache = self.clone();
        let url = url.clone();
        let response = response.clone();

        tokio::task::spawn_blocking(move || cache.write_blocking(&url, &response))
            .await
            .map_err(io::Error::other)?
    }

    fn write_blocking(&self, url: &Url, response: &CachedResponse) -> io::Result<()> {
        let payload_len = response.payload.len() as u64;
        if self.max_bytes > 0 && payload_len > self.max_bytes {
            debug!(
                "Not persisting {}: {} bytes exceeds the {} byte budget",
                url, payload_len, self.max_bytes
            );
            return Ok(());
        }

        fs::create_dir_all(&self.dir)?;

        let header = serde_json::to_vec(&DiskEntry {
            key: url.to_string(),
            payload_len,
            metadata: response.metadata.clone(),
        })?;
        let header_len = u32::try_from(header.len()).map_err(io::Error::other)?;

        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(&header_len.to_le_bytes())?;
        file.write_all(&header)?;
        file.write_all(&response.payload)?;

        let path = self.path(url);
        file.persist(&path).map_err(|e| e.error)?;

        if self.max_bytes > 0 {
            self.evict_to_fit(&path)?;
        }
        Ok(())
    }

    /// Remove entries, oldest `stored_at` first, until the directory fits the
    /// budget. The entry at `keep` is never removed.
    fn evict_to_fit(&self, keep: &Path) -> io::Result<()> {
        let mut entries = Vec::new();
        let mut total = 0u64;

        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.extension().is_none_or(|ext| ext != ENTRY_EXTENSION) {
                continue;
            }

            // Another writer may have replaced or evicted it meanwhile
            let Ok(size) = dir_entry.metadata().map(|metadata| metadata.len()) else {
                continue;
            };
            let Ok(entry) = read_header(&path) else {
                continue;
            };

            total += size;
            if path != keep {
                entries.push((entry.metadata.stored_at, path, size));
            }
        }

        if total <= self.max_bytes {
            return Ok(());
        }

        entries.sort_by_key(|(stored_at, _, _)| *stored_at);
        for (_, path, size) in entries {
            if total <= self.max_bytes {
                break;
            }
            match fs::remove_file(&path) {
                Ok(()) => debug!("Evicted cached response {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            total = total.saturating_sub(size);
        }

        Ok(())
    }
}

fn invalid_entry(reason: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.to_string())
}

fn header_len(prefix: [u8; HEADER_PREFIX_LEN]) -> io::Result<usize> {
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_HEADER_LEN {
        return Err(invalid_entry("header too large"));
    }
    Ok(len)
}

fn split_entry(raw: Bytes) -> io::Result<(DiskEntry, Bytes)> {
    let prefix = raw
        .get(..HEADER_PREFIX_LEN)
        .and_then(|prefix| <[u8; HEADER_PREFIX_LEN]>::try_from(prefix).ok())
        .ok_or_else(|| invalid_entry("truncated header"))?;
    let header_end = HEADER_PREFIX_LEN + header_len(prefix)?;
    let header = raw
        .get(HEADER_PREFIX_LEN..header_end)
        .ok_or_else(|| invalid_entry("truncated header"))?;

    let entry: DiskEntry = serde_json::from_slice(header)?;
    Ok((entry, raw.slice(header_end..)))
}

fn read_header(path: &Path) -> io::Result<DiskEntry> {
    let mut file = fs::File::open(path)?;
    let mut prefix = [0u8; HEADER_PREFIX_LEN];
    file.read_exact(&mut prefix)?;

    let mut header = vec![0u8; header_len(prefix)?];
    file.read_exact(&mut header)?;
    Ok(serde_json::from_slice(&header)?)
}

#[async_trait]
impl HttpCache for DiskHttpCache {
    async fn lookup(&self, url: &Url) -> Option<CachedResponse> {
        match self.read(url).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to read cached response for {}: {}", url, e);
                None
            }
        }
    }

    async fn store(&self, url: &Url, response: CachedResponse) {
        if let Err(e) = self.write(url, &response).await {
            warn!("Failed to persist response for {}: {}", url, e);
        }
    }
}

/// Memory cache in front of an optional disk cache.
#[derive(Clone, Debug, Default)]
pub struct TieredHttpCache {
    memory: MemoryHttpCache,
    disk: Option<DiskHttpCache>,
}

impl TieredHttpCache {
    pub fn new(memory: MemoryHttpCache, disk: Option<DiskHttpCache>) -> Self {
        Self { memory, disk }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(
            MemoryHttpCache::new(config.memory_cache_entries)
                .with_max_bytes(config.memory_cache_bytes),
            config
                .http_cache_dir()
                .map(|dir| DiskHttpCache::new(dir).with_max_bytes(config.disk_cache_bytes)),
        )
    }

    pub fn memory(&self) -> &MemoryHttpCache {
        &self.memory
    }

    pub fn disk(&self) -> Option<&DiskHttpCache> {
        self.disk.as_ref()
    }
}

#[async_trait]
impl HttpCache for TieredHttpCache {
    async fn lookup(&self, url: &Url) -> Option<CachedResponse> {
        if let Some(response) = self.memory.lookup(url).await {
            return Some(response);
        }

        let response = self.disk.as_ref()?.lookup(url).await?;
        debug!("Promoting disk cached response for {}", url);
        self.memory.store(url, response.clone()).await;
        Some(response)
    }

    async fn store(&self, url: &Url, response: CachedResponse) {
        if let Some(disk) = &self.disk {
            disk.store(url, response.clone()).await;
        }
        self.memory.store(url, response).await;
    }
}

static SHARED_CACHE: Lazy<Arc<TieredHttpCache>> =
    Lazy::new(|| Arc::new(TieredHttpCache::from_config(&LoaderConfig::load())));

/// Process-wide response cache configured from the user's config file.
pub fn shared_cache() -> Arc<TieredHttpCache> {
    SHARED_CACHE.clone()
}
