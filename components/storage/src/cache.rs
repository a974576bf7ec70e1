// Copyright 2024 regio
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hands out shared [RegionFile] handles for chunk coordinates.
//!
//! ## Eviction
//! The cache keeps at most `capacity` region files open, in LRU order. When
//! a new file is opened at capacity only the least recently used one is
//! evicted. An evicted file that nobody else holds is flushed and closed;
//! one that a caller still holds is remembered weakly, so resolving its
//! path again hands back that same instance instead of opening the file a
//! second time.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use bytes::Bytes;
use lru::LruCache;
use regio_common::{ChunkPos, RegionPos};
use snafu::ResultExt;
use tracing::{debug, error};

use crate::{
    codec::ChunkCodec,
    config::{Config, ReadPolicy},
    err::{RegionIoSnafu, Result},
    region::{ChunkWriter, RegionFile},
};

pub type RegionFileRef = Arc<RegionFile>;

pub struct RegionFileCache {
    config: Config,
    codec:  ChunkCodec,
    inner:  Mutex<Inner>,
}

struct Inner {
    open:    LruCache<PathBuf, RegionFileRef>,
    // evicted while still in use somewhere else.
    retired: HashMap<PathBuf, Weak<RegionFile>>,
}

impl Default for RegionFileCache {
    fn default() -> Self { Self::new(Config::default()) }
}

impl RegionFileCache {
    pub fn new(config: Config) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            codec: ChunkCodec::new(config.compression_level),
            inner: Mutex::new(Inner {
                open:    LruCache::new(capacity),
                retired: HashMap::new(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &Config { &self.config }

    /// The path of the region file holding the chunk at `(chunk_x, chunk_z)`.
    pub fn region_path(&self, base: &Path, chunk_x: i32, chunk_z: i32) -> PathBuf {
        let region: RegionPos = ChunkPos::new(chunk_x, chunk_z).region();
        base.join(region.file_name(&self.config.extension))
    }

    /// The region file holding the chunk at `(chunk_x, chunk_z)` under `base`,
    /// opening (and creating) it when needed.
    pub fn resolve(&self, base: &Path, chunk_x: i32, chunk_z: i32) -> Result<RegionFileRef> {
        let path = self.region_path(base, chunk_x, chunk_z);
        let mut inner = self.lock();

        if let Some(region) = inner.open.get(&path) {
            return Ok(region.clone());
        }

        let region = match inner.retired.remove(&path).and_then(|weak| weak.upgrade()) {
            Some(region) => {
                debug!("revive retired region file {}", path.display());
                region
            }
            None => {
                std::fs::create_dir_all(base).context(RegionIoSnafu { path: base })?;
                Arc::new(RegionFile::open_with_codec(&path, self.codec)?)
            }
        };

        if let Some((evicted_path, evicted)) = inner.open.push(path, region.clone()) {
            inner.retire(evicted_path, evicted);
        }
        Ok(region)
    }

    pub fn chunk_exists(&self, base: &Path, chunk_x: i32, chunk_z: i32) -> Result<bool> {
        let local = ChunkPos::new(chunk_x, chunk_z).local();
        self.resolve(base, chunk_x, chunk_z)?
            .chunk_exists(local.x as i32, local.z as i32)
    }

    /// Read a chunk, applying the configured [ReadPolicy] to damaged data.
    pub fn read_chunk(&self, base: &Path, chunk_x: i32, chunk_z: i32) -> Result<Option<Bytes>> {
        let local = ChunkPos::new(chunk_x, chunk_z).local();
        let res = self
            .resolve(base, chunk_x, chunk_z)
            .and_then(|region| region.read_chunk(local.x as i32, local.z as i32));
        match (res, self.config.read_policy) {
            (Err(e), ReadPolicy::Lenient) if e.is_corrupt() || e.is_io() => {
                error!(
                    "failed to read chunk ({}, {}) under {}, treat it as absent: {}",
                    chunk_x,
                    chunk_z,
                    base.display(),
                    e
                );
                Ok(None)
            }
            (res, _) => res,
        }
    }

    pub fn chunk_writer(&self, base: &Path, chunk_x: i32, chunk_z: i32) -> Result<ChunkWriter> {
        let local = ChunkPos::new(chunk_x, chunk_z).local();
        self.resolve(base, chunk_x, chunk_z)?
            .chunk_writer(local.x as i32, local.z as i32)
    }

    pub fn write_chunk(
        &self,
        base: &Path,
        chunk_x: i32,
        chunk_z: i32,
        payload: &[u8],
    ) -> Result<()> {
        let local = ChunkPos::new(chunk_x, chunk_z).local();
        self.resolve(base, chunk_x, chunk_z)?
            .write_chunk(local.x as i32, local.z as i32, payload)
    }

    pub fn delete_chunk(&self, base: &Path, chunk_x: i32, chunk_z: i32) -> Result<()> {
        let local = ChunkPos::new(chunk_x, chunk_z).local();
        self.resolve(base, chunk_x, chunk_z)?
            .delete_chunk(local.x as i32, local.z as i32)
    }

    /// Growth of the region file holding `(chunk_x, chunk_z)` since the last
    /// call for that file.
    pub fn size_delta(&self, base: &Path, chunk_x: i32, chunk_z: i32) -> Result<u64> {
        Ok(self.resolve(base, chunk_x, chunk_z)?.size_delta())
    }

    /// Number of region files currently open in the cache.
    pub fn len(&self) -> usize { self.lock().open.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Flush and drop every cached region file.
    ///
    /// The cache lock is held for the whole sequence, so no resolve can open
    /// a second handle on a path that is being closed.
    pub fn close_all(&self) -> Result<()> {
        let mut inner = self.lock();
        let mut first_err = None;
        while let Some((path, region)) = inner.open.pop_lru() {
            if let Err(e) = region.flush() {
                error!("failed to flush region file {}: {}", path.display(), e);
                first_err.get_or_insert(e);
            }
            if Arc::strong_count(&region) > 1 {
                inner.retired.insert(path, Arc::downgrade(&region));
            }
        }
        inner.retired.retain(|_, weak| weak.strong_count() > 0);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn retire(&mut self, path: PathBuf, region: RegionFileRef) {
        if let Err(e) = region.flush() {
            error!("failed to flush evicted region file {}: {}", path.display(), e);
        }
        if Arc::strong_count(&region) > 1 {
            debug!("evict region file {}, still in use", path.display());
            self.retired.insert(path, Arc::downgrade(&region));
        } else {
            debug!("evict and close region file {}", path.display());
        }
        self.retired.retain(|_, weak| weak.strong_count() > 0);
    }
}

impl Drop for RegionFileCache {
    fn drop(&mut self) {
        if let Err(e) = self.close_all() {
            error!("failed to close region file cache: {}", e);
        }
    }
}
