use std::path::Path;

use regio_storage::RegionFile;
use snafu::{ensure_whatever, ResultExt, Whatever};

pub mod cat;
pub mod compact;
pub mod export;
pub mod info;

/// Open an existing region file for reading. The file is left exactly as
/// it is, even when its header is short or its length unaligned.
pub(crate) fn open_existing(path: &Path) -> Result<RegionFile, Whatever> {
    ensure_whatever!(path.is_file(), "{} is not a region file", path.display());
    RegionFile::open_read_only(path)
        .with_whatever_context(|_| format!("could not open {}", path.display()))
}
