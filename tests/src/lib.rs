//! Scenario tests across the region file and the cache.

#[cfg(test)]
mod scenarios {
    use std::{fs, ops::Range, path::Path, sync::Arc};

    use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
    use regio_common::{SectorNumber, REGION_WIDTH, SECTOR_BYTES};
    use regio_storage::{Config, ReadPolicy, RegionFile, RegionFileCache};
    use regio_utils::logger::install_fmt_log;

    fn payload(rng: &mut StdRng, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rng.fill_bytes(&mut data);
        data
    }

    fn occupied(region: &RegionFile) -> Vec<Range<SectorNumber>> {
        let mut ranges: Vec<_> = region
            .chunk_positions()
            .into_iter()
            .filter_map(|pos| region.location(pos.x as i32, pos.z as i32).unwrap())
            .map(|loc| loc.range())
            .collect();
        ranges.sort_by_key(|r| r.start);
        ranges
    }

    fn assert_consistent(region: &RegionFile, path: &Path) {
        let ranges = occupied(region);
        for pair in ranges.windows(2) {
            assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
        let used: SectorNumber = ranges.iter().map(|r| r.end - r.start).sum();
        assert_eq!(used + region.free_sector_count() + 2, region.sector_count());

        let len = fs::metadata(path).unwrap().len();
        assert_eq!(len % SECTOR_BYTES as u64, 0);
        assert_eq!(len, region.sector_count() as u64 * SECTOR_BYTES as u64);
    }

    #[test]
    fn random_writes_and_deletes_stay_disjoint() {
        install_fmt_log();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        let region = RegionFile::open(&path).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut expected = vec![None; 64];
        let mut last_len = 0;

        for _ in 0..400 {
            let slot = rng.gen_range(0..expected.len());
            let (x, z) = ((slot % 8) as i32, (slot / 8) as i32);
            if rng.gen_bool(0.25) {
                region.delete_chunk(x, z).unwrap();
                expected[slot] = None;
            } else {
                let len = rng.gen_range(0..40_000);
                let data = payload(&mut rng, len);
                region.write_chunk(x, z, &data).unwrap();
                expected[slot] = Some(data);
            }

            let len = fs::metadata(&path).unwrap().len();
            assert!(len >= last_len);
            last_len = len;
            assert_consistent(&region, &path);
        }

        drop(region);
        let region = RegionFile::open(&path).unwrap();
        assert_consistent(&region, &path);
        for (slot, data) in expected.iter().enumerate() {
            let (x, z) = ((slot % 8) as i32, (slot / 8) as i32);
            let read = region.read_chunk(x, z).unwrap();
            assert_eq!(read.as_deref(), data.as_deref());
        }
    }

    #[test]
    fn concurrent_writers_share_handles() {
        install_fmt_log();
        let dir = tempfile::tempdir().unwrap();
        let cache = RegionFileCache::default();
        let base = dir.path();

        crossbeam::scope(|s| {
            for worker in 0..8i32 {
                let cache = &cache;
                s.spawn(move |_| {
                    let mut rng = StdRng::seed_from_u64(worker as u64);
                    // two workers per region, each on its own rows.
                    let region_x = worker % 4 * REGION_WIDTH;
                    for i in 0..64 {
                        let x = region_x + i % REGION_WIDTH;
                        let z = worker / 4 * 16 + i / REGION_WIDTH;
                        let len = rng.gen_range(100..12_000);
                        let data = payload(&mut rng, len);
                        cache.write_chunk(base, x, z, &data).unwrap();
                        assert_eq!(&cache.read_chunk(base, x, z).unwrap().unwrap()[..], &data[..]);
                    }
                });
            }
        })
        .unwrap();

        assert_eq!(cache.len(), 4);
        for region_x in 0..4 {
            let region = cache.resolve(base, region_x * REGION_WIDTH, 0).unwrap();
            assert_eq!(region.chunk_positions().len(), 128);
            let path = region.path().to_path_buf();
            assert_consistent(&region, &path);
        }
    }

    #[test]
    fn bounded_cache_keeps_data_reachable() {
        install_fmt_log();
        let dir = tempfile::tempdir().unwrap();
        let cache = RegionFileCache::new(Config::default().with_capacity(4));

        for i in 0..20 {
            cache
                .write_chunk(dir.path(), i * REGION_WIDTH, -i, format!("chunk {}", i).as_bytes())
                .unwrap();
            assert!(cache.len() <= 4);
        }
        for i in 0..20 {
            let data = cache.read_chunk(dir.path(), i * REGION_WIDTH, -i).unwrap().unwrap();
            assert_eq!(&data[..], format!("chunk {}", i).as_bytes());
        }
    }

    #[test]
    fn handle_identity_follows_reachability() {
        install_fmt_log();
        let dir = tempfile::tempdir().unwrap();
        let cache = RegionFileCache::default();

        let held = cache.resolve(dir.path(), 3, 3).unwrap();
        held.write_chunk(3, 3, b"kept").unwrap();
        assert!(Arc::ptr_eq(&held, &cache.resolve(dir.path(), 3, 3).unwrap()));

        cache.close_all().unwrap();
        // still strongly held, so the same instance comes back.
        assert!(Arc::ptr_eq(&held, &cache.resolve(dir.path(), 3, 3).unwrap()));

        drop(held);
        cache.close_all().unwrap();
        let fresh = cache.resolve(dir.path(), 3, 3).unwrap();
        assert_eq!(&fresh.read_chunk(3, 3).unwrap().unwrap()[..], b"kept");

        // another cache is another world, it shares nothing.
        let other = RegionFileCache::default();
        assert!(!Arc::ptr_eq(&fresh, &other.resolve(dir.path(), 3, 3).unwrap()));
    }

    #[test]
    fn read_policy_decides_about_damaged_chunks() {
        install_fmt_log();
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        let path;
        let sector;
        {
            let cache = RegionFileCache::default();
            cache.write_chunk(base, 7, 8, b"soon broken").unwrap();
            let region = cache.resolve(base, 7, 8).unwrap();
            sector = region.location(7, 8).unwrap().unwrap().sector;
            path = region.path().to_path_buf();
        }

        // overwrite the version byte with an unknown one.
        let mut bytes = fs::read(&path).unwrap();
        bytes[sector as usize * SECTOR_BYTES + 4] = 42;
        fs::write(&path, &bytes).unwrap();

        {
            let strict = RegionFileCache::default();
            let err = strict.read_chunk(base, 7, 8).unwrap_err();
            assert!(err.is_corrupt());
            assert!(strict.chunk_exists(base, 7, 8).unwrap());
        }

        let lenient =
            RegionFileCache::new(Config::default().with_read_policy(ReadPolicy::Lenient));
        assert!(lenient.read_chunk(base, 7, 8).unwrap().is_none());
        assert!(lenient.read_chunk(base, 7, 9).unwrap().is_none());
    }
}
