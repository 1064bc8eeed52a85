//! Content-addressed cache of prepared tile data.
//!
//! Keys combine the agent size, the tile position and the input mesh
//! content signature, so a changed input never hits a stale entry. The
//! cache is byte-bounded and evicts least-recently-used entries; entries
//! larger than the whole capacity are rejected as overflow and the caller
//! uses the fresh data uncached.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::build::PreparedTileData;
use crate::input::{AgentHalfExtents, InputMesh};
use crate::tile::TilePosition;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CacheKey {
    agent: [u32; 2],
    tile: (i32, i32),
    mesh: Vec<u8>,
}

impl CacheKey {
    fn new(agent: &AgentHalfExtents, tile: TilePosition, input: &InputMesh) -> Self {
        Self {
            agent: agent.key(),
            tile: (tile.x, tile.y),
            mesh: input.signature(),
        }
    }
}

struct Entry {
    data: Arc<PreparedTileData>,
    size: usize,
    last_used: u64,
}

/// Cache hit/miss/overflow counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub overflows: u64,
}

struct Inner {
    entries: BTreeMap<CacheKey, Entry>,
    used_size: usize,
    clock: u64,
    stats: CacheStats,
}

/// Byte-bounded store of prepared tile data shared between build workers.
/// A `get` racing a `set` observes either the complete entry or nothing.
pub struct TilesCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl TilesCache {
    /// Creates a cache bounded to `capacity` bytes of tile data
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                used_size: 0,
                clock: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Previously built data for a content-identical input, if any
    pub fn get(
        &self,
        agent: &AgentHalfExtents,
        tile: TilePosition,
        input: &InputMesh,
    ) -> Option<Arc<PreparedTileData>> {
        let key = CacheKey::new(agent, tile, input);
        let mut inner = self.locked();
        inner.clock += 1;
        let clock = inner.clock;
        match inner.entries.get_mut(&key) {
            Some(entry) => {
                entry.last_used = clock;
                let data = Arc::clone(&entry.data);
                inner.stats.hits += 1;
                Some(data)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Inserts freshly built data, evicting least-recently-used entries to
    /// make room. Returns a shared handle either way; on overflow the data
    /// is simply not retained.
    pub fn set(
        &self,
        agent: &AgentHalfExtents,
        tile: TilePosition,
        input: &InputMesh,
        data: PreparedTileData,
    ) -> Arc<PreparedTileData> {
        let size = data.byte_size();
        let data = Arc::new(data);
        if size > self.capacity {
            let mut inner = self.locked();
            inner.stats.overflows += 1;
            debug!("tile data of {size} bytes exceeds cache capacity {}", self.capacity);
            return data;
        }

        let key = CacheKey::new(agent, tile, input);
        let mut inner = self.locked();
        inner.clock += 1;
        let clock = inner.clock;

        if let Some(previous) = inner.entries.remove(&key) {
            inner.used_size -= previous.size;
        }
        while inner.used_size + size > self.capacity {
            let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            if let Some(evicted) = inner.entries.remove(&oldest) {
                inner.used_size -= evicted.size;
            }
        }

        inner.entries.insert(
            key,
            Entry {
                data: Arc::clone(&data),
                size,
                last_used: clock,
            },
        );
        inner.used_size += size;
        data
    }

    /// Counter snapshot for diagnostics
    pub fn stats(&self) -> CacheStats {
        self.locked().stats
    }
}
