use std::{io::Write, path::PathBuf};

use clap::Args;
use regio_storage::{Config, ReadPolicy, RegionFileCache};
use snafu::{whatever, ResultExt, Whatever};

#[derive(Debug, Clone, Args)]
#[command(long_about = r"

Write the decompressed bytes of one chunk to stdout. Chunk coordinates are
global, the region file is derived from them.
")]
pub struct CatArgs {
    #[arg(help = "The directory holding the region files", value_name = "REGION_DIR")]
    pub dir:     PathBuf,
    #[arg(allow_negative_numbers = true)]
    pub chunk_x: i32,
    #[arg(allow_negative_numbers = true)]
    pub chunk_z: i32,
    #[arg(long, help = "Report damaged chunks as missing instead of failing")]
    pub lenient: bool,
}

impl CatArgs {
    pub fn run(&self) -> Result<(), Whatever> {
        let policy = if self.lenient {
            ReadPolicy::Lenient
        } else {
            ReadPolicy::Strict
        };
        let cache = RegionFileCache::new(Config::default().with_read_policy(policy));
        let path = cache.region_path(&self.dir, self.chunk_x, self.chunk_z);
        if !path.is_file() {
            whatever!("no region file {}", path.display());
        }

        let data = cache
            .read_chunk(&self.dir, self.chunk_x, self.chunk_z)
            .with_whatever_context(|_| {
                format!("could not read chunk ({}, {})", self.chunk_x, self.chunk_z)
            })?;
        let Some(data) = data else {
            whatever!("chunk ({}, {}) is not stored", self.chunk_x, self.chunk_z);
        };
        std::io::stdout()
            .lock()
            .write_all(&data)
            .whatever_context("could not write to stdout")?;
        Ok(())
    }
}
