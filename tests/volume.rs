//! Integration tests walking an open/write/read/rename/unlink session end
//! to end, driven entirely through the public `Volume`/`File` surface
//! against a `Vec<u8>`-backed `BlockDevice` kept local to this test file
//! rather than exposed from the crate.

use tinyfat::device::{BlockDevice, DResult, DStatus, IoCtl};
use tinyfat::fat::dir::Attributes;
use tinyfat::fat::Volume;
use tinyfat::mkfs::{mkfs, PartitionStyle};
use tinyfat::{Clock, Config, FatError, FatTimestamp, OpenMode};

struct MemDevice {
    sectors: Vec<u8>,
}

impl MemDevice {
    fn new(sector_count: usize) -> Self {
        Self { sectors: vec![0u8; sector_count * 512] }
    }

    fn sector(&self, lba: u32) -> &[u8] {
        let start = lba as usize * 512;
        &self.sectors[start..start + 512]
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

/// Scenario 1: mkfs on a 128-sector x 512-byte device with allocation
/// unit 1 (no partition table) produces a FAT12 volume with
/// sectors_per_cluster=1, fat_copies=2, root_dir_entry_count=512, and
/// the first FAT cell equal to 0x00FFFFF8.
#[test]
fn scenario_1_mkfs_small_device_is_fat12() {
    let config = Config::default();
    let mut device = MemDevice::new(128);
    mkfs(&mut device, 1, PartitionStyle::Sfd, &config).unwrap();

    // n_rsv for Sfd on a non-FAT32 volume is 1 plus the partition-flag
    // offset Sfd sets, so the first FAT sector is LBA 2.
    let fat_base_cell = u32::from_le_bytes(device.sector(2)[0..4].try_into().unwrap());
    assert_eq!(fat_base_cell, 0x00FF_FFF8);

    let mut volume = Volume::new(device, 0);
    let mut next_id = 0u16;
    volume.auto_mount(&mut next_id).unwrap();

    assert_eq!(volume.fs_type(), tinyfat::fat::FatType::Fat12);
    assert_eq!(volume.sectors_per_cluster(), 1);
    assert_eq!(volume.fat_copies(), 2);
    assert_eq!(volume.root_dir_entry_count(), 512);
}

fn mounted_volume(sectors: usize) -> (Volume<MemDevice>, u16) {
    let config = Config::default();
    let mut device = MemDevice::new(sectors);
    mkfs(&mut device, 1, PartitionStyle::Fdisk, &config).unwrap();

    let mut volume = Volume::new(device, 0);
    let mut next_id = 0u16;
    volume.auto_mount(&mut next_id).unwrap();
    (volume, next_id)
}

/// Scenarios 2-7, run in sequence against one freshly-formatted volume:
/// create/write/close/reopen/read, a rejected overlong name, a seek past
/// the first cluster, a directory listing, a rename, and the free-cluster
/// count changing after an unlink.
#[test]
fn scenarios_2_through_7_round_trip() {
    let (mut v, mut next_id) = mounted_volume(1 << 17);
    let config = Config::default();
    let clock = NullClock;

    // Scenario 2: create, write, close, reopen, read back.
    let mut f = v.open(&mut next_id, b"/test.txt", OpenMode::CREATE_ALWAYS | OpenMode::WRITE, &clock, &config).unwrap();
    let n = v.write(&mut f, b"test file\n").unwrap();
    assert_eq!(n, 10);
    v.close(f, &clock).unwrap();

    let mut f = v.open(&mut next_id, b"/test.txt", OpenMode::READ, &clock, &config).unwrap();
    let mut buf = [0u8; 100];
    let n = v.read(&mut f, &mut buf).unwrap();
    assert_eq!(n, 10);
    assert_eq!(&buf[..10], b"test file\n");
    v.close(f, &clock).unwrap();

    let info = v.stat(&mut next_id, b"/test.txt", &config).unwrap();
    assert_eq!(info.size, 10);
    assert!(info.attributes().contains(Attributes::ARCHIVE));

    // Scenario 3: a name whose base+ext exceeds 8+3 after stripping the dot.
    let err = v.open(
        &mut next_id,
        b"/filename-that-is-long.txt",
        OpenMode::CREATE_ALWAYS | OpenMode::WRITE,
        &clock,
        &config,
    );
    assert_eq!(err.err(), Some(FatError::InvalidName));

    // Scenario 4: write 1000 'A's, seek to 800, read 100 back.
    let mut f = v
        .open(&mut next_id, b"/file.txt", OpenMode::CREATE_ALWAYS | OpenMode::READ | OpenMode::WRITE, &clock, &config)
        .unwrap();
    v.write(&mut f, &[b'A'; 1000]).unwrap();
    v.seek(&mut f, 800).unwrap();
    let mut buf = [0u8; 100];
    let n = v.read(&mut f, &mut buf).unwrap();
    assert_eq!(n, 100);
    assert!(buf.iter().all(|&b| b == b'A'));
    v.close(f, &clock).unwrap();

    // Scenario 5: mkdir, opendir "/", readdir in physical order.
    v.mkdir(&mut next_id, b"/dir", &clock, &config).unwrap();
    let mut dir = v.opendir(&mut next_id, b"/", &config).unwrap();
    let first = v.readdir(&mut dir, &config).unwrap().unwrap();
    assert_eq!(first.name(), b"test.txt");
    assert!(first.attributes().contains(Attributes::ARCHIVE));
    let second = v.readdir(&mut dir, &config).unwrap().unwrap();
    assert_eq!(second.name(), b"file.txt");
    let third = v.readdir(&mut dir, &config).unwrap().unwrap();
    assert_eq!(third.name(), b"dir");
    assert!(third.attributes().contains(Attributes::DIRECTORY));
    assert!(v.readdir(&mut dir, &config).unwrap().is_none());

    // Scenario 6: rename, then the old name is gone and the new one has
    // the same size and content (proving the cluster chain moved as-is).
    v.rename(&mut next_id, b"/test.txt", b"/test2.txt", &config).unwrap();
    assert_eq!(v.stat(&mut next_id, b"/test.txt", &config).err(), Some(FatError::NoFile));
    let renamed = v.stat(&mut next_id, b"/test2.txt", &config).unwrap();
    assert_eq!(renamed.size, 10);

    let mut f = v.open(&mut next_id, b"/test2.txt", OpenMode::READ, &clock, &config).unwrap();
    let mut buf = [0u8; 10];
    v.read(&mut f, &mut buf).unwrap();
    assert_eq!(&buf, b"test file\n");
    v.close(f, &clock).unwrap();

    // Scenario 7: unlink frees the cluster(s) the file occupied.
    let free_before = v.getfree(&mut next_id, &config).unwrap();
    v.unlink(&mut next_id, b"/test2.txt", &config).unwrap();
    let free_after = v.getfree(&mut next_id, &config).unwrap();

    let bytes_per_cluster = v.bytes_per_cluster();
    let clusters_for_10_bytes = (10 + bytes_per_cluster - 1) / bytes_per_cluster;
    assert_eq!(free_after, free_before + clusters_for_10_bytes);
}

struct Inner {
    mem: MemDevice,
    force_uninit: bool,
}

/// A device shared between the `Volume` and the test so the test can
/// flip `force_uninit` to simulate the block device having been
/// reinitialized behind the driver's back, the trigger `auto_mount`
/// reacts to by remounting and bumping the generation counter.
#[derive(Clone)]
struct SharedDevice(std::rc::Rc<std::cell::RefCell<Inner>>);

impl BlockDevice for SharedDevice {
    fn initialize(&mut self) -> DStatus {
        let mut inner = self.0.borrow_mut();
        inner.force_uninit = false;
        inner.mem.initialize()
    }

    fn status(&self) -> DStatus {
        let inner = self.0.borrow();
        if inner.force_uninit {
            DStatus::NOT_INITIALIZED
        } else {
            inner.mem.status()
        }
    }

    fn read(&mut self, lba: u32, count: u32, buf: &mut [u8]) -> DResult {
        self.0.borrow_mut().mem.read(lba, count, buf)
    }

    fn write(&mut self, lba: u32, count: u32, buf: &[u8]) -> DResult {
        self.0.borrow_mut().mem.write(lba, count, buf)
    }

    fn ioctl(&mut self, code: IoCtl) -> Option<u32> {
        self.0.borrow_mut().mem.ioctl(code)
    }
}

/// A handle opened before a remount must be rejected by every later
/// operation on it: `auto_mount` bumps the mount generation, and every
/// handle carries the generation complement it was opened under.
#[test]
fn stale_handle_is_rejected_after_remount() {
    let config = Config::default();
    let clock = NullClock;
    let mut mem = MemDevice::new(4096);
    mkfs(&mut mem, 1, PartitionStyle::Fdisk, &config).unwrap();

    let shared = SharedDevice(std::rc::Rc::new(std::cell::RefCell::new(Inner { mem, force_uninit: false })));
    let mut v = Volume::new(shared.clone(), 0);
    let mut next_id = 0u16;
    v.auto_mount(&mut next_id).unwrap();

    let mut f = v.open(&mut next_id, b"/a.txt", OpenMode::CREATE_ALWAYS | OpenMode::WRITE, &clock, &config).unwrap();
    v.write(&mut f, b"hi").unwrap();

    shared.0.borrow_mut().force_uninit = true;
    v.auto_mount(&mut next_id).unwrap();

    assert_eq!(v.read(&mut f, &mut [0u8; 2]).err(), Some(FatError::InvalidObject));
}
