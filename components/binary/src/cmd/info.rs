use std::path::PathBuf;

use clap::Args;
use regio_common::SECTOR_BYTES;
use regio_storage::RegionFile;
use serde::Serialize;
use snafu::{ResultExt, Whatever};

#[derive(Debug, Clone, Args)]
#[command(long_about = r"

Show the chunks stored in a region file, where they live and how much of
the file is free.
")]
pub struct InfoArgs {
    #[arg(help = "The region file to inspect", value_name = "REGION_FILE")]
    pub file: PathBuf,
    #[arg(long, help = "Print the summary as JSON")]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegionSummary {
    pub path:         String,
    pub sectors:      u32,
    pub free_sectors: u32,
    pub bytes:        u64,
    pub chunks:       Vec<ChunkSummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChunkSummary {
    pub x:         u8,
    pub z:         u8,
    pub sector:    u32,
    pub count:     u8,
    pub timestamp: u32,
}

impl RegionSummary {
    pub(crate) fn collect(region: &RegionFile) -> Result<Self, Whatever> {
        let mut chunks = Vec::new();
        for pos in region.chunk_positions() {
            let (x, z) = (pos.x as i32, pos.z as i32);
            let Some(loc) = region
                .location(x, z)
                .whatever_context("chunk position out of region")?
            else {
                continue;
            };
            chunks.push(ChunkSummary {
                x:         pos.x,
                z:         pos.z,
                sector:    loc.sector,
                count:     loc.count,
                timestamp: region
                    .timestamp(x, z)
                    .whatever_context("chunk position out of region")?,
            });
        }
        let sectors = region.sector_count();
        Ok(Self {
            path: region.path().display().to_string(),
            sectors,
            free_sectors: region.free_sector_count(),
            bytes: sectors as u64 * SECTOR_BYTES as u64,
            chunks,
        })
    }
}

impl InfoArgs {
    pub fn run(&self) -> Result<(), Whatever> {
        let region = super::open_existing(&self.file)?;
        let summary = RegionSummary::collect(&region)?;
        if self.json {
            let out = serde_json::to_string_pretty(&summary)
                .whatever_context("could not serialize the summary")?;
            println!("{}", out);
            return Ok(());
        }

        println!(
            "{}: {} chunks, {} sectors ({} bytes), {} free",
            summary.path,
            summary.chunks.len(),
            summary.sectors,
            summary.bytes,
            summary.free_sectors
        );
        for chunk in summary.chunks.iter() {
            println!(
                "  [{:>2}, {:>2}] sectors {}..{} written at {}",
                chunk.x,
                chunk.z,
                chunk.sector,
                chunk.sector + chunk.count as u32,
                chunk.timestamp
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use regio_storage::RegionFile;

    use super::*;

    #[test]
    fn info_on_a_short_file_leaves_it_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        std::fs::write(&path, [0u8; 100]).unwrap();

        InfoArgs {
            file: path.clone(),
            json: true,
        }
        .run()
        .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0u8; 100]);
    }

    #[test]
    fn summary_lists_stored_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        let region = RegionFile::open(&path).unwrap();
        region.write_chunk(3, 1, b"chunk").unwrap();
        drop(region);

        let region = crate::cmd::open_existing(&path).unwrap();
        let summary = RegionSummary::collect(&region).unwrap();
        assert_eq!(summary.sectors, 3);
        assert_eq!(summary.free_sectors, 0);
        assert_eq!(summary.chunks.len(), 1);
        assert_eq!((summary.chunks[0].x, summary.chunks[0].z), (3, 1));
        assert_eq!(summary.chunks[0].sector, 2);
    }
}
