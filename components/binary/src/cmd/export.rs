use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use clap::Args;
use regio_common::LocalPos;
use snafu::{ensure_whatever, ResultExt, Whatever};
use tracing::info;

#[derive(Debug, Clone, Args)]
#[command(long_about = r"

Copy chunks of a region file into a new, tightly packed region file. Without
any --chunk every stored chunk is copied.
")]
pub struct ExportArgs {
    #[arg(help = "The region file to read", value_name = "SOURCE")]
    pub source: PathBuf,
    #[arg(help = "The region file to create", value_name = "TARGET")]
    pub target: PathBuf,
    #[arg(
        long = "chunk",
        value_name = "X,Z",
        help = "Local chunk position to keep, may be repeated",
        value_parser = parse_local_pos,
    )]
    pub chunks: Vec<LocalPos>,
    #[arg(long, short, help = "Overwrite the target if it exists")]
    pub force:  bool,
}

impl ExportArgs {
    pub fn run(&self) -> Result<(), Whatever> {
        ensure_whatever!(
            self.force || !self.target.exists(),
            "{} exists, use --force to overwrite it",
            self.target.display()
        );
        ensure_whatever!(
            !same_file(&self.source, &self.target),
            "{} and {} are the same file",
            self.source.display(),
            self.target.display()
        );
        let region = super::open_existing(&self.source)?;
        let filter: Option<HashSet<LocalPos>> =
            (!self.chunks.is_empty()).then(|| self.chunks.iter().copied().collect());
        let summary = region
            .export_to_path(&self.target, filter.as_ref())
            .with_whatever_context(|_| format!("could not export to {}", self.target.display()))?;
        info!(
            "exported {} chunks from {} to {} ({} sectors)",
            summary.chunks,
            self.source.display(),
            self.target.display(),
            summary.sectors
        );
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn parse_local_pos(s: &str) -> Result<LocalPos, String> {
    let (x, z) = s
        .split_once(',')
        .ok_or_else(|| format!("{:?} is not of the form X,Z", s))?;
    let x: i32 = x.trim().parse().map_err(|e| format!("invalid x {:?}: {}", x, e))?;
    let z: i32 = z.trim().parse().map_err(|e| format!("invalid z {:?}: {}", z, e))?;
    LocalPos::try_new(x, z).ok_or_else(|| format!("({}, {}) is outside of a region", x, z))
}
