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

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub const REGIO: &str = "regio";

// The allocation unit of a region file.
pub const SECTOR_BYTES: usize = 4096; // 4 KiB
pub const SECTOR_INTS: usize = SECTOR_BYTES / 4;
// Offset table + timestamp table.
pub const HEADER_SECTORS: usize = 2;
pub const HEADER_BYTES: usize = SECTOR_BYTES * HEADER_SECTORS;
// 4 bytes length + 1 byte version tag.
pub const CHUNK_HEADER_SIZE: usize = 5;
// The sector count lives in the low byte of an offset entry, so a chunk
// may span at most 255 sectors (~1 MiB).
pub const MAX_CHUNK_SECTORS: usize = 255;

pub const REGION_SHIFT: i32 = 5;
pub const REGION_WIDTH: i32 = 1 << REGION_SHIFT; // 32
pub const REGION_CHUNKS: usize = (REGION_WIDTH * REGION_WIDTH) as usize; // 1024

pub const DEFAULT_REGION_EXTENSION: &str = "mca";
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

pub type SectorNumber = u32;
pub type SectorCount = u8;
pub type SlotIndex = usize;

/// Global chunk coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self { Self { x, z } }

    pub const fn region(&self) -> RegionPos {
        RegionPos::new(self.x >> REGION_SHIFT, self.z >> REGION_SHIFT)
    }

    pub const fn local(&self) -> LocalPos {
        LocalPos::new(
            (self.x & (REGION_WIDTH - 1)) as u8,
            (self.z & (REGION_WIDTH - 1)) as u8,
        )
    }
}

impl Display for ChunkPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Region coordinates, i.e. chunk coordinates shifted right by 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub const fn new(x: i32, z: i32) -> Self { Self { x, z } }

    /// The file name of this region, `r.<x>.<z>.<ext>`.
    pub fn file_name(&self, extension: &str) -> String {
        format!("r.{}.{}.{}", self.x, self.z, extension)
    }

    /// Parse a `r.<x>.<z>.<ext>` file name back into region coordinates.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let mut parts = name.split('.');
        if parts.next()? != "r" {
            return None;
        }
        let x = parts.next()?.parse().ok()?;
        let z = parts.next()?.parse().ok()?;
        parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(x, z))
    }

    /// The global position of the chunk at `local` inside this region.
    pub const fn chunk(&self, local: LocalPos) -> ChunkPos {
        ChunkPos::new(
            (self.x << REGION_SHIFT) + local.x as i32,
            (self.z << REGION_SHIFT) + local.z as i32,
        )
    }
}

/// A chunk position relative to its region, both axes in [0, 32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalPos {
    pub x: u8,
    pub z: u8,
}

impl LocalPos {
    pub const fn new(x: u8, z: u8) -> Self { Self { x, z } }

    /// Checked construction from signed coordinates.
    pub fn try_new(x: i32, z: i32) -> Option<Self> {
        if (0..REGION_WIDTH).contains(&x) && (0..REGION_WIDTH).contains(&z) {
            Some(Self::new(x as u8, z as u8))
        } else {
            None
        }
    }

    pub const fn from_slot(slot: SlotIndex) -> Self {
        Self::new(
            (slot % REGION_WIDTH as usize) as u8,
            (slot / REGION_WIDTH as usize) as u8,
        )
    }

    pub const fn slot(&self) -> SlotIndex {
        self.x as usize + self.z as usize * REGION_WIDTH as usize
    }
}

impl Display for LocalPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_chunks_map_to_negative_regions() {
        let pos = ChunkPos::new(30, -3);
        assert_eq!(pos.region(), RegionPos::new(0, -1));
        assert_eq!(pos.local(), LocalPos::new(30, 29));

        let pos = ChunkPos::new(70, -30);
        assert_eq!(pos.region(), RegionPos::new(2, -1));
        assert_eq!(pos.local(), LocalPos::new(6, 2));
        assert_eq!(pos.region().chunk(pos.local()), pos);
    }

    #[test]
    fn file_name() {
        let region = RegionPos::new(-1, 4);
        let name = region.file_name(DEFAULT_REGION_EXTENSION);
        assert_eq!(name, "r.-1.4.mca");
        assert_eq!(RegionPos::from_file_name(&name), Some(region));
        assert_eq!(RegionPos::from_file_name("r.1.mca"), None);
        assert_eq!(RegionPos::from_file_name("level.dat"), None);
    }

    #[test]
    fn slots() {
        assert_eq!(LocalPos::new(5, 6).slot(), 5 + 6 * 32);
        assert_eq!(LocalPos::from_slot(5 + 6 * 32), LocalPos::new(5, 6));
        assert_eq!(LocalPos::try_new(-1, 0), None);
        assert_eq!(LocalPos::try_new(0, 32), None);
        assert_eq!(LocalPos::try_new(31, 31), Some(LocalPos::new(31, 31)));
    }
}
