use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use regio_storage::RegionFile;

fn payload(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    StdRng::seed_from_u64(size as u64).fill_bytes(&mut data);
    data
}

fn write_read(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let region = RegionFile::open(dir.path().join("r.0.0.mca")).unwrap();
    let mut group = c.benchmark_group("region-throughput");

    for size in [4 << 10, 64 << 10, 512 << 10] {
        let data = payload(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("write", size), &data, |b, data| {
            let mut slot = 0;
            b.iter(|| {
                region.write_chunk(slot % 32, slot / 32 % 32, data).unwrap();
                slot += 1;
            })
        });

        region.write_chunk(0, 0, &data).unwrap();
        group.bench_with_input(BenchmarkId::new("read", size), &size, |b, _| {
            b.iter(|| region.read_chunk(0, 0).unwrap().unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, write_read);
criterion_main!(benches);
