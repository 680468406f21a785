//! A read/write throughput benchmark against an in-memory block device.
//!
//! A criterion `read speed` benchmark group with a log-scaled throughput
//! plot, driven through this crate's own `Volume`/`File` surface against a
//! `Vec<u8>`-backed device defined locally (see DESIGN.md for why a real
//! disk-image-backed device isn't carried forward).

use criterion::{criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration, Throughput};

use tinyfat::device::{BlockDevice, DResult, DStatus, IoCtl};
use tinyfat::fat::Volume;
use tinyfat::{Clock, FatTimestamp, OpenMode};

struct MemDevice {
    sectors: Vec<u8>,
}

impl MemDevice {
    fn new(sector_count: usize) -> Self {
        Self { sectors: vec![0u8; sector_count * 512] }
    }
}

impl BlockDevice for MemDevice {
    fn initialize(&mut self) -> DStatus {
        DStatus::empty()
    }

    fn status(&self) -> DStatus {
        DStatus::empty()
    }

    fn read(&mut self, lba: u32, count: u32, buf: &mut [u8]) -> DResult {
        let start = lba as usize * 512;
        let len = count as usize * 512;
        if start + len > self.sectors.len() {
            return DResult::ParamError;
        }
        buf[..len].copy_from_slice(&self.sectors[start..start + len]);
        DResult::Ok
    }

    fn write(&mut self, lba: u32, count: u32, buf: &[u8]) -> DResult {
        let start = lba as usize * 512;
        let len = count as usize * 512;
        if start + len > self.sectors.len() {
            return DResult::ParamError;
        }
        self.sectors[start..start + len].copy_from_slice(&buf[..len]);
        DResult::Ok
    }

    fn ioctl(&mut self, code: IoCtl) -> Option<u32> {
        match code {
            IoCtl::GetSectors => Some((self.sectors.len() / 512) as u32),
            _ => None,
        }
    }
}

struct NullClock;

impl Clock for NullClock {
    fn now(&self) -> FatTimestamp {
        FatTimestamp::EPOCH
    }
}

const FILE_SIZES: &[usize] = &[1024, 100 * 1024, 1024 * 1024];

fn bench_read_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("read speed");
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    let config = tinyfat::Config::default();
    let clock = NullClock;

    for &size in FILE_SIZES {
        let mut device = MemDevice::new(size / 512 + 4096);
        tinyfat::mkfs::mkfs(&mut device, 8, tinyfat::mkfs::PartitionStyle::Sfd, &config).unwrap();
        let mut volume = Volume::new(device, 0);

        let mut next_id = 0u16;
        let payload = vec![0xABu8; size];
        let mut file = volume
            .open(&mut next_id, b"bench.bin", OpenMode::CREATE_ALWAYS | OpenMode::WRITE, &clock, &config)
            .unwrap();
        volume.write(&mut file, &payload).unwrap();
        volume.close(file, &clock).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sequential read", size), &size, |b, _| {
            b.iter(|| {
                let mut file = volume
                    .open(&mut next_id, b"bench.bin", OpenMode::READ, &clock, &config)
                    .unwrap();
                let mut buf = vec![0u8; size];
                volume.read(&mut file, &mut buf).unwrap();
                volume.close(file, &clock).unwrap();
            })
        });
    }
}

criterion_group!(benches, bench_read_speed);
criterion_main!(benches);
