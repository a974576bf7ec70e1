use regio_common::{SECTOR_BYTES, SectorNumber};

/// Number of whole sectors needed to hold `length` bytes.
pub const fn sectors_for(length: usize) -> usize { length.div_ceil(SECTOR_BYTES) }

/// Round `length` up to the next sector boundary.
pub const fn align_to_sector(length: u64) -> u64 {
    let sector = SECTOR_BYTES as u64;
    length.div_ceil(sector) * sector
}

/// Byte offset of the sector `sector` from the start of the file.
pub const fn sector_offset(sector: SectorNumber) -> u64 { sector as u64 * SECTOR_BYTES as u64 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align() {
        assert_eq!(align_to_sector(0), 0);
        assert_eq!(align_to_sector(1), 4096);
        assert_eq!(align_to_sector(4096), 4096);
        assert_eq!(align_to_sector(4097), 8192);

        assert_eq!(sectors_for(0), 0);
        assert_eq!(sectors_for(10_016), 3);
        assert_eq!(sectors_for(8192), 2);

        assert_eq!(sector_offset(2), 8192);
    }
}
