use std::path::{Path, PathBuf};

use clap::Args;
use snafu::{ResultExt, Whatever};
use tracing::info;

#[derive(Debug, Clone, Args)]
#[command(long_about = r"

Rewrite a region file without its free sectors. The packed copy is written
next to the file first and then renamed over it.
")]
pub struct CompactArgs {
    #[arg(help = "The region file to compact", value_name = "REGION_FILE")]
    pub file: PathBuf,
}

impl CompactArgs {
    pub fn run(&self) -> Result<(), Whatever> {
        let staging = staging_path(&self.file);
        let (before, summary) = {
            let region = super::open_existing(&self.file)?;
            let before = region.sector_count();
            let summary = region
                .export_to_path(&staging, None)
                .with_whatever_context(|_| format!("could not write {}", staging.display()))?;
            (before, summary)
        };
        std::fs::rename(&staging, &self.file).with_whatever_context(|_| {
            format!(
                "could not move {} over {}",
                staging.display(),
                self.file.display()
            )
        })?;
        info!(
            "compacted {}: {} chunks, {} -> {} sectors",
            self.file.display(),
            summary.chunks,
            before,
            summary.sectors
        );
        Ok(())
    }
}

fn staging_path(file: &Path) -> PathBuf {
    let mut name = file.file_name().unwrap_or_default().to_os_string();
    name.push(".compact");
    file.with_file_name(name)
}
