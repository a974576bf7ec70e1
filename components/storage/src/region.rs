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

//! A region file packs the chunks of a 32x32 area into runs of 4 KiB sectors.
//!
//! ## Layout
//! 1. Sector 0: 1024 big-endian offset entries, `sector << 8 | count`, zero
//!    when the slot is empty. Slot index is `x + z * 32`.
//! 2. Sector 1: 1024 big-endian unix-second timestamps.
//! 3. Every chunk starts at its first sector with a 4 byte length (version
//!    byte + body), the version byte, and the compressed body. The rest of
//!    the last sector is padding.
//!
//! The free/used sector map only lives in memory and is rebuilt from the
//! offset table on open. Deleting a chunk never shrinks the file, use
//! [RegionFile::export_subset] to get a compacted copy.

use std::{
    collections::HashSet,
    fmt::{Debug, Display, Formatter},
    fs::{File, OpenOptions},
    io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write},
    ops::Range,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use regio_common::{
    LocalPos, SectorCount, SectorNumber, SlotIndex, CHUNK_HEADER_SIZE, HEADER_BYTES,
    HEADER_SECTORS, MAX_CHUNK_SECTORS, REGION_CHUNKS, SECTOR_BYTES, SECTOR_INTS,
};
use regio_utils::align::{align_to_sector, sector_offset, sectors_for};
use snafu::{ensure, IntoError, OptionExt, ResultExt};
use tracing::{debug, warn};

use crate::{
    codec::{ChunkCodec, ChunkVersion},
    err::{
        ChunkTooLargeSnafu, CorruptSnafu, DecodeSnafu, Error, OutOfBoundsSnafu, ReadOnlySnafu,
        RegionIoSnafu, Result, UnknownIOSnafu,
    },
    sector_map::SectorMap,
};

/// Where a chunk lives, decoded from an offset table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLocation {
    pub sector: SectorNumber,
    pub count:  SectorCount,
}

impl ChunkLocation {
    /// `None` for the empty entry.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        if raw == 0 {
            return None;
        }
        Some(Self {
            sector: raw >> 8,
            count:  (raw & 0xFF) as SectorCount,
        })
    }

    pub const fn raw(&self) -> u32 { self.sector << 8 | self.count as u32 }

    pub const fn range(&self) -> Range<SectorNumber> {
        self.sector..self.sector + self.count as SectorNumber
    }
}

/// What an export wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub chunks:  usize,
    /// Total sectors of the exported file, header included.
    pub sectors: SectorNumber,
}

pub struct RegionFile {
    path:          PathBuf,
    read_only:     bool,
    // the modification time of the file when it was opened.
    last_modified: Option<SystemTime>,
    codec:         ChunkCodec,
    inner:         Mutex<Inner>,
}

struct Inner {
    file:       File,
    offsets:    Vec<u32>,
    timestamps: Vec<u32>,
    sectors:    SectorMap,
    // bytes the file has grown since the last time somebody asked.
    size_delta: u64,
}

impl RegionFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_codec(path, ChunkCodec::default())
    }

    /// Open or create the region file at `path`.
    ///
    /// A missing or short header is (re)written with zeros and an unaligned
    /// file is padded to a whole sector. Offset entries pointing outside of
    /// the file are kept as they are but don't claim any sector.
    pub fn open_with_codec<P: AsRef<Path>>(path: P, codec: ChunkCodec) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path);
        match file {
            Ok(file) => Self::load(path, file, false, codec),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                warn!(
                    "cannot open region file {} for writing, fall back to read-only",
                    path.display()
                );
                let file = File::open(&path).context(RegionIoSnafu { path: &path })?;
                Self::load(path, file, true, codec)
            }
            Err(e) => Err(RegionIoSnafu { path: &path }.into_error(e)),
        }
    }

    /// Open an existing region file without ever writing to it.
    ///
    /// The file is neither created, nor padded, nor given a header. A short
    /// file reads as if the missing bytes were zero, and a trailing partial
    /// sector is not addressable.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).context(RegionIoSnafu { path: &path })?;
        Self::load(path, file, true, ChunkCodec::default())
    }

    fn load(path: PathBuf, mut file: File, read_only: bool, codec: ChunkCodec) -> Result<Self> {
        let meta = file.metadata().context(RegionIoSnafu { path: &path })?;
        let last_modified = meta.modified().ok();
        let mut length = meta.len();
        let mut size_delta = 0;
        if !read_only {
            if length < HEADER_BYTES as u64 {
                file.seek(SeekFrom::Start(0))
                    .and_then(|_| file.write_all(&[0u8; HEADER_BYTES]))
                    .context(RegionIoSnafu { path: &path })?;
                size_delta += HEADER_BYTES as u64 - length;
                length = HEADER_BYTES as u64;
            }
            let aligned = align_to_sector(length);
            if aligned != length {
                file.set_len(aligned).context(RegionIoSnafu { path: &path })?;
                size_delta += aligned - length;
                length = aligned;
            }
        }

        // a read-only short file is read as if the missing bytes were zero.
        let mut header = vec![0u8; HEADER_BYTES];
        let readable = length.min(HEADER_BYTES as u64) as usize;
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_exact(&mut header[..readable]))
            .context(RegionIoSnafu { path: &path })?;

        let mut offsets = vec![0u32; SECTOR_INTS];
        let mut timestamps = vec![0u32; SECTOR_INTS];
        BigEndian::read_u32_into(&header[..SECTOR_BYTES], &mut offsets);
        BigEndian::read_u32_into(&header[SECTOR_BYTES..], &mut timestamps);

        let total = (length / SECTOR_BYTES as u64).max(HEADER_SECTORS as u64);
        let mut sectors = SectorMap::new(total as SectorNumber);
        for (slot, raw) in offsets.iter().enumerate() {
            let Some(loc) = ChunkLocation::from_raw(*raw) else {
                continue;
            };
            if sectors.in_bounds(&loc.range()) {
                sectors.mark_used(loc.range());
            } else {
                warn!(
                    "{}: chunk {} claims sectors {:?} of {}, ignoring it",
                    path.display(),
                    LocalPos::from_slot(slot),
                    loc.range(),
                    sectors.len()
                );
            }
        }
        debug!("open region file {}: {}", path.display(), sectors);

        Ok(Self {
            path,
            read_only,
            last_modified,
            codec,
            inner: Mutex::new(Inner {
                file,
                offsets,
                timestamps,
                sectors,
                size_delta,
            }),
        })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn is_read_only(&self) -> bool { self.read_only }

    pub fn last_modified(&self) -> Option<SystemTime> { self.last_modified }

    /// How many bytes the file has grown since the last call.
    pub fn size_delta(&self) -> u64 { std::mem::take(&mut self.lock().size_delta) }

    pub fn chunk_exists(&self, x: i32, z: i32) -> Result<bool> {
        let pos = check_bounds(x, z)?;
        Ok(self.lock().offsets[pos.slot()] != 0)
    }

    /// The recorded location of a chunk, `None` when the slot is empty.
    pub fn location(&self, x: i32, z: i32) -> Result<Option<ChunkLocation>> {
        let pos = check_bounds(x, z)?;
        Ok(ChunkLocation::from_raw(self.lock().offsets[pos.slot()]))
    }

    /// The unix-second time the chunk was last written.
    pub fn timestamp(&self, x: i32, z: i32) -> Result<u32> {
        let pos = check_bounds(x, z)?;
        Ok(self.lock().timestamps[pos.slot()])
    }

    /// Occupied slots in slot order.
    pub fn chunk_positions(&self) -> Vec<LocalPos> {
        self.lock()
            .offsets
            .iter()
            .enumerate()
            .filter(|(_, raw)| **raw != 0)
            .map(|(slot, _)| LocalPos::from_slot(slot))
            .collect()
    }

    pub fn sector_count(&self) -> SectorNumber { self.lock().sectors.len() }

    pub fn free_sector_count(&self) -> SectorNumber { self.lock().sectors.free_count() }

    /// Read and decompress the chunk at local `(x, z)`.
    ///
    /// `Ok(None)` means nothing is stored there. Data that is stored but
    /// can't be read back is an [Error::Corrupt].
    pub fn read_chunk(&self, x: i32, z: i32) -> Result<Option<Bytes>> {
        let pos = check_bounds(x, z)?;
        let (version, body) = {
            let mut inner = self.lock();
            let Some(loc) = ChunkLocation::from_raw(inner.offsets[pos.slot()]) else {
                return Ok(None);
            };
            ensure!(
                inner.sectors.in_bounds(&loc.range()),
                CorruptSnafu {
                    path: &self.path,
                    x,
                    z,
                    reason: format!(
                        "sectors {:?} outside of the file ({} sectors)",
                        loc.range(),
                        inner.sectors.len()
                    ),
                }
            );

            let file = &mut inner.file;
            file.seek(SeekFrom::Start(sector_offset(loc.sector)))
                .context(RegionIoSnafu { path: &self.path })?;
            let length = file
                .read_u32::<BigEndian>()
                .map_err(|e| self.read_error(x, z, e))? as usize;
            ensure!(
                length > 0 && length <= loc.count as usize * SECTOR_BYTES,
                CorruptSnafu {
                    path: &self.path,
                    x,
                    z,
                    reason: format!("invalid length {} for {} sectors", length, loc.count),
                }
            );
            let version = file.read_u8().map_err(|e| self.read_error(x, z, e))?;
            let mut body = vec![0u8; length - 1];
            file.read_exact(&mut body)
                .map_err(|e| self.read_error(x, z, e))?;
            (version, body)
        };

        let data = ChunkCodec::decode(version, &body).context(DecodeSnafu {
            path: &self.path,
            x,
            z,
        })?;
        Ok(Some(Bytes::from(data)))
    }

    /// Compress `payload` and store it at local `(x, z)`.
    pub fn write_chunk(&self, x: i32, z: i32, payload: &[u8]) -> Result<()> {
        let pos = check_bounds(x, z)?;
        ensure!(!self.read_only, ReadOnlySnafu { path: &self.path });
        let body = self.codec.encode(payload).context(UnknownIOSnafu)?;
        self.write_body(pos, ChunkVersion::CURRENT.tag(), &body)
    }

    /// A buffer for the chunk at local `(x, z)`. Nothing reaches the file
    /// until [ChunkWriter::finish] is called.
    pub fn chunk_writer(self: &Arc<Self>, x: i32, z: i32) -> Result<ChunkWriter> {
        let pos = check_bounds(x, z)?;
        ensure!(!self.read_only, ReadOnlySnafu { path: &self.path });
        Ok(ChunkWriter {
            region:  self.clone(),
            pos,
            encoder: self.codec.encoder(),
        })
    }

    /// Store an already compressed body tagged with `version`.
    pub(crate) fn write_body(&self, pos: LocalPos, version: u8, body: &[u8]) -> Result<()> {
        ensure!(!self.read_only, ReadOnlySnafu { path: &self.path });
        let (x, z) = (pos.x as i32, pos.z as i32);
        let needed = sectors_for(body.len() + CHUNK_HEADER_SIZE);
        ensure!(
            needed <= MAX_CHUNK_SECTORS,
            ChunkTooLargeSnafu {
                x,
                z,
                sectors: needed,
            }
        );
        let needed = needed as SectorNumber;
        let slot = pos.slot();

        let mut inner = self.lock();
        let previous = ChunkLocation::from_raw(inner.offsets[slot])
            .filter(|loc| inner.sectors.in_bounds(&loc.range()));

        let sector = match previous {
            Some(loc) if loc.count as SectorNumber == needed => {
                debug!("{} {}: rewrite {} sectors at {}", self, pos, needed, loc.sector);
                loc.sector
            }
            _ => {
                if let Some(loc) = previous {
                    inner.sectors.mark_free(loc.range());
                }
                match inner.sectors.first_fit(needed) {
                    Some(start) => {
                        debug!("{} {}: reuse {} sectors at {}", self, pos, needed, start);
                        inner.sectors.mark_used(start..start + needed);
                        start
                    }
                    None => {
                        let start = inner.sectors.len();
                        debug!("{} {}: grow {} sectors at {}", self, pos, needed, start);
                        if let Err(e) = inner.file.set_len(sector_offset(start + needed)) {
                            if let Some(loc) = previous {
                                inner.sectors.mark_used(loc.range());
                            }
                            return Err(RegionIoSnafu { path: &self.path }.into_error(e));
                        }
                        inner.sectors.grow(needed);
                        inner.size_delta += needed as u64 * SECTOR_BYTES as u64;
                        start
                    }
                }
            }
        };

        let location = ChunkLocation {
            sector,
            count: needed as SectorCount,
        };
        let committed = inner
            .write_sectors(sector, version, body)
            .and_then(|_| inner.set_offset(slot, location.raw()));
        if let Err(e) = committed {
            if previous != Some(location) {
                inner.rollback(location.range(), previous);
            }
            return Err(RegionIoSnafu { path: &self.path }.into_error(e));
        }
        inner
            .set_timestamp(slot, unix_now())
            .context(RegionIoSnafu { path: &self.path })
    }

    /// Forget the chunk at local `(x, z)`. Its sectors become free but are
    /// neither zeroed nor returned to the file system.
    pub fn delete_chunk(&self, x: i32, z: i32) -> Result<()> {
        let pos = check_bounds(x, z)?;
        ensure!(!self.read_only, ReadOnlySnafu { path: &self.path });
        let slot = pos.slot();
        let mut inner = self.lock();
        let Some(loc) = ChunkLocation::from_raw(inner.offsets[slot]) else {
            return Ok(());
        };
        inner
            .set_offset(slot, 0)
            .context(RegionIoSnafu { path: &self.path })?;
        if inner.sectors.in_bounds(&loc.range()) {
            inner.sectors.mark_free(loc.range());
        }
        debug!("{} {}: delete sectors {:?}", self, pos, loc.range());
        Ok(())
    }

    /// Write a compacted copy of this region to `out`.
    ///
    /// Only occupied slots accepted by `filter` (all of them when `None`) are
    /// copied, packed right after the header in slot order. Chunk bodies are
    /// copied verbatim, sector by sector.
    pub fn export_subset<W: Write>(
        &self,
        out: &mut W,
        filter: Option<&HashSet<LocalPos>>,
    ) -> Result<ExportSummary> {
        let mut inner = self.lock();

        let mut offsets = vec![0u32; SECTOR_INTS];
        let mut timestamps = vec![0u32; SECTOR_INTS];
        let mut next = HEADER_SECTORS as SectorNumber;
        let mut plan = Vec::new();
        for slot in 0..REGION_CHUNKS {
            let Some(loc) = ChunkLocation::from_raw(inner.offsets[slot]) else {
                continue;
            };
            let pos = LocalPos::from_slot(slot);
            if filter.is_some_and(|chunks| !chunks.contains(&pos)) {
                continue;
            }
            if !inner.sectors.in_bounds(&loc.range()) {
                warn!("{} {}: skip corrupt chunk in export", self, pos);
                continue;
            }
            offsets[slot] = ChunkLocation {
                sector: next,
                count:  loc.count,
            }
            .raw();
            timestamps[slot] = inner.timestamps[slot];
            next += loc.count as SectorNumber;
            plan.push(loc);
        }

        let mut header = Vec::with_capacity(HEADER_BYTES);
        for v in offsets.iter().chain(timestamps.iter()) {
            header
                .write_u32::<BigEndian>(*v)
                .context(UnknownIOSnafu)?;
        }
        out.write_all(&header).context(UnknownIOSnafu)?;

        let mut buffer = vec![0u8; SECTOR_BYTES];
        for loc in plan.iter() {
            inner
                .file
                .seek(SeekFrom::Start(sector_offset(loc.sector)))
                .context(RegionIoSnafu { path: &self.path })?;
            for _ in 0..loc.count {
                inner
                    .file
                    .read_exact(&mut buffer)
                    .context(RegionIoSnafu { path: &self.path })?;
                out.write_all(&buffer).context(UnknownIOSnafu)?;
            }
        }
        out.flush().context(UnknownIOSnafu)?;

        debug!(
            "{}: exported {} chunks in {} sectors",
            self,
            plan.len(),
            next
        );
        Ok(ExportSummary {
            chunks:  plan.len(),
            sectors: next,
        })
    }

    /// [RegionFile::export_subset] into a new file at `path`.
    pub fn export_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        filter: Option<&HashSet<LocalPos>>,
    ) -> Result<ExportSummary> {
        let path = path.as_ref();
        let file = File::create(path).context(RegionIoSnafu { path })?;
        let mut writer = BufWriter::new(file);
        let summary = self.export_subset(&mut writer, filter)?;
        let file = writer
            .into_inner()
            .map_err(|e| RegionIoSnafu { path }.into_error(e.into_error()))?;
        file.sync_all().context(RegionIoSnafu { path })?;
        Ok(summary)
    }

    /// Push everything written so far down to the disk.
    pub fn flush(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.lock()
            .file
            .sync_all()
            .context(RegionIoSnafu { path: &self.path })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // A short read inside a validated range means the chunk is damaged.
    fn read_error(&self, x: i32, z: i32, e: std::io::Error) -> Error {
        if e.kind() == ErrorKind::UnexpectedEof {
            return CorruptSnafu {
                path: &self.path,
                x,
                z,
                reason: "truncated chunk",
            }
            .build();
        }
        RegionIoSnafu { path: &self.path }.into_error(e)
    }
}

impl Inner {
    fn write_sectors(
        &mut self,
        sector: SectorNumber,
        version: u8,
        body: &[u8],
    ) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(body.len() + CHUNK_HEADER_SIZE);
        buf.write_u32::<BigEndian>(body.len() as u32 + 1)?;
        buf.write_u8(version)?;
        buf.extend_from_slice(body);
        self.file.seek(SeekFrom::Start(sector_offset(sector)))?;
        self.file.write_all(&buf)
    }

    fn set_offset(&mut self, slot: SlotIndex, raw: u32) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(slot as u64 * 4))?;
        self.file.write_u32::<BigEndian>(raw)?;
        self.offsets[slot] = raw;
        Ok(())
    }

    fn set_timestamp(&mut self, slot: SlotIndex, value: u32) -> std::io::Result<()> {
        self.file
            .seek(SeekFrom::Start((SECTOR_BYTES + slot * 4) as u64))?;
        self.file.write_u32::<BigEndian>(value)?;
        self.timestamps[slot] = value;
        Ok(())
    }

    // Undo an allocation whose write never got committed.
    fn rollback(&mut self, allocated: Range<SectorNumber>, previous: Option<ChunkLocation>) {
        self.sectors.mark_free(allocated);
        if let Some(loc) = previous {
            self.sectors.mark_used(loc.range());
        }
    }
}

/// Buffers and compresses a chunk in memory; the region file is only
/// touched by [ChunkWriter::finish], so a half serialized chunk is never
/// visible. Dropping the writer without finishing discards the chunk.
#[derive(Debug)]
pub struct ChunkWriter {
    region:  Arc<RegionFile>,
    pos:     LocalPos,
    encoder: ZlibEncoder<Vec<u8>>,
}

impl ChunkWriter {
    pub fn finish(self) -> Result<()> {
        let body = self.encoder.finish().context(UnknownIOSnafu)?;
        self.region
            .write_body(self.pos, ChunkVersion::CURRENT.tag(), &body)
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> { self.encoder.write(buf) }

    fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
}

impl Display for RegionFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        write!(f, "REGION {}", name)
    }
}

impl Debug for RegionFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionFile")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish()
    }
}

fn check_bounds(x: i32, z: i32) -> Result<LocalPos> {
    LocalPos::try_new(x, z).context(OutOfBoundsSnafu { x, z })
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_default()
}
