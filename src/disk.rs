use crate::model::{MacrotaskContext, Monotask, MonotaskId, ResourceKind};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache placement requested when registering block bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageLevel {
    MemoryOnly,
    MemoryAndDisk,
    DiskOnly,
}

/// Storage/cache collaborator of disk monotasks.
///
/// `get_block_file` resolves the on-disk file for a (block, disk) pair;
/// `cache_bytes` registers an in-memory copy of a block's bytes after a
/// successful read.
pub trait BlockStore: Send + Sync {
    fn get_block_file(&self, block_id: &str, disk_id: &str) -> Option<PathBuf>;
    fn cache_bytes(&self, block_id: &str, bytes: Bytes, level: StorageLevel, serialized: bool);
}

/// A block held in memory by [`MemoryBlockStore`].
#[derive(Debug, Clone)]
pub struct CachedBlock {
    pub bytes: Bytes,
    pub level: StorageLevel,
    pub serialized: bool,
}

/// In-memory [`BlockStore`] mapping (block, disk) pairs to files and keeping
/// cached blocks in a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    files: DashMap<(String, String), PathBuf>,
    cached: DashMap<String, CachedBlock>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_block_file(
        &self,
        block_id: impl Into<String>,
        disk_id: impl Into<String>,
        path: impl Into<PathBuf>,
    ) {
        self.files
            .insert((block_id.into(), disk_id.into()), path.into());
    }

    pub fn cached_block(&self, block_id: &str) -> Option<CachedBlock> {
        self.cached.get(block_id).map(|entry| entry.clone())
    }

    pub fn num_cached_blocks(&self) -> usize {
        self.cached.len()
    }
}

impl BlockStore for MemoryBlockStore {
    fn get_block_file(&self, block_id: &str, disk_id: &str) -> Option<PathBuf> {
        self.files
            .get(&(block_id.to_string(), disk_id.to_string()))
            .map(|entry| entry.clone())
    }

    fn cache_bytes(&self, block_id: &str, bytes: Bytes, level: StorageLevel, serialized: bool) {
        self.cached.insert(
            block_id.to_string(),
            CachedBlock {
                bytes,
                level,
                serialized,
            },
        );
    }
}

/// Disk monotask that reads one named block from one named disk device into
/// memory and hands the bytes to the cache.
///
/// `execute` never raises: a missing file or any I/O error is logged with
/// the block and disk identifiers and reported as `false`. The file handle
/// is closed on every path before returning.
pub struct DiskReadMonotask {
    id: MonotaskId,
    context: Arc<MacrotaskContext>,
    block_id: String,
    disk_id: String,
    store: Arc<dyn BlockStore>,
}

impl DiskReadMonotask {
    pub fn new(
        id: MonotaskId,
        context: Arc<MacrotaskContext>,
        block_id: impl Into<String>,
        disk_id: impl Into<String>,
        store: Arc<dyn BlockStore>,
    ) -> Self {
        Self {
            id,
            context,
            block_id: block_id.into(),
            disk_id: disk_id.into(),
            store,
        }
    }

    pub fn block_id(&self) -> &str {
        &self.block_id
    }

    pub fn disk_id(&self) -> &str {
        &self.disk_id
    }
}

#[async_trait]
impl Monotask for DiskReadMonotask {
    fn id(&self) -> MonotaskId {
        self.id
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Disk
    }

    fn context(&self) -> &Arc<MacrotaskContext> {
        &self.context
    }

    async fn execute(&self) -> bool {
        let Some(path) = self.store.get_block_file(&self.block_id, &self.disk_id) else {
            warn!(
                block_id = %self.block_id,
                disk_id = %self.disk_id,
                "block file not found on disk"
            );
            return false;
        };

        // Sizes the buffer from file metadata, reads to the end, and closes
        // the handle on both the success and error paths.
        match tokio::fs::read(&path).await {
            Ok(buffer) => {
                debug!(
                    block_id = %self.block_id,
                    disk_id = %self.disk_id,
                    bytes = buffer.len(),
                    "read block from disk"
                );
                self.store.cache_bytes(
                    &self.block_id,
                    Bytes::from(buffer),
                    StorageLevel::MemoryOnly,
                    true,
                );
                true
            }
            Err(error) => {
                warn!(
                    block_id = %self.block_id,
                    disk_id = %self.disk_id,
                    %error,
                    "failed to read block file"
                );
                false
            }
        }
    }

    fn failure_reason(&self) -> Bytes {
        Bytes::from(format!(
            "disk read of block {} on disk {} failed",
            self.block_id, self.disk_id
        ))
    }
}
