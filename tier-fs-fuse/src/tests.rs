use std::sync::{Arc, Mutex};

use block_dev::BlockDevice;
use tier_fs::{NAME_MAX, Path, SECTOR_SIZE, SectorCache, SectorId, TierFileSystem};
use vfs::Error;

/// 测试用内存块设备
#[derive(Debug)]
struct MemDisk(Mutex<Vec<u8>>);

impl MemDisk {
    fn new(total_sectors: usize) -> Self {
        Self(Mutex::new(vec![0; total_sectors * SECTOR_SIZE]))
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let data = self.0.lock().unwrap();
        let start = block_id * SECTOR_SIZE;
        buf.copy_from_slice(&data[start..start + buf.len()]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut data = self.0.lock().unwrap();
        let start = block_id * SECTOR_SIZE;
        data[start..start + buf.len()].copy_from_slice(buf);
    }
}

const TOTAL_SECTORS: usize = 4096;

fn fresh_fs() -> Arc<TierFileSystem> {
    TierFileSystem::format(Arc::new(MemDisk::new(TOTAL_SECTORS)), TOTAL_SECTORS).unwrap()
}

#[test]
fn cache_round_trip() {
    let cache = SectorCache::new(Arc::new(MemDisk::new(256)));

    // 写入超过容量的扇区数，迫使换出后再读回
    for i in 0..SectorCache::CAPACITY * 2 {
        cache.write(SectorId::new(i as u32), &[i as u8; SECTOR_SIZE]);
    }
    for i in 0..SectorCache::CAPACITY * 2 {
        let mut buf = [0u8; SECTOR_SIZE];
        cache.read(SectorId::new(i as u32), &mut buf);
        assert_eq!(buf, [i as u8; SECTOR_SIZE]);
    }
}

#[test]
fn eviction_bound() {
    let cache = SectorCache::new(Arc::new(MemDisk::new(512)));

    for i in 0..300u32 {
        let mut buf = [0u8; SECTOR_SIZE];
        cache.read(SectorId::new(i), &mut buf);
    }
    assert!(cache.occupied() <= SectorCache::CAPACITY);
}

#[test]
fn flush_reaches_device() {
    let disk = Arc::new(MemDisk::new(64));
    let cache = SectorCache::new(disk.clone());

    cache.write(SectorId::new(7), &[0xab; SECTOR_SIZE]);
    cache.flush_all();

    let mut buf = [0u8; SECTOR_SIZE];
    disk.read_block(7, &mut buf);
    assert_eq!(buf, [0xab; SECTOR_SIZE]);
}

#[test]
fn write_extends_length() {
    let fs = fresh_fs();
    let root = fs.open_root().unwrap();
    fs.create(&root, "f", 0).unwrap();

    let mut file = fs.open(&root, "f").unwrap();
    assert_eq!(file.length(), 0);

    file.seek(1000);
    assert_eq!(file.write(&[1u8; 300], &fs).unwrap(), 300);
    assert_eq!(file.length(), 1300);

    // 长度只增不减
    file.seek(0);
    assert_eq!(file.write(&[2u8; 10], &fs).unwrap(), 10);
    assert_eq!(file.length(), 1300);

    fs.close_file(file);
    fs.close_dir(root);
}

#[test]
fn gap_reads_back_zero() {
    let fs = fresh_fs();
    let root = fs.open_root().unwrap();
    fs.create(&root, "sparse", 0).unwrap();

    let mut file = fs.open(&root, "sparse").unwrap();
    file.write(&[0xff; 16], &fs).unwrap();
    file.seek(3000);
    file.write(&[0xee; 16], &fs).unwrap();

    // 空洞区间读回全零
    file.seek(16);
    let mut gap = vec![0xa5u8; 3000 - 16];
    assert_eq!(file.read(&mut gap, &fs).unwrap(), gap.len());
    assert!(gap.iter().all(|&b| b == 0));

    fs.close_file(file);
    fs.close_dir(root);
}

#[test]
fn create_with_initial_size_is_zero_filled() {
    let fs = fresh_fs();
    let root = fs.open_root().unwrap();
    fs.create(&root, "pre", 3000).unwrap();

    let mut file = fs.open(&root, "pre").unwrap();
    assert_eq!(file.length(), 3000);
    let mut buf = vec![0x5au8; 3000];
    assert_eq!(file.read(&mut buf, &fs).unwrap(), 3000);
    assert!(buf.iter().all(|&b| b == 0));

    fs.close_file(file);
    fs.close_dir(root);
}

#[test]
fn read_stops_at_end_of_stream() {
    let fs = fresh_fs();
    let root = fs.open_root().unwrap();
    fs.create(&root, "s", 100).unwrap();

    let mut file = fs.open(&root, "s").unwrap();
    file.seek(50);
    let mut buf = [0u8; 100];
    assert_eq!(file.read(&mut buf, &fs).unwrap(), 50);
    assert_eq!(file.read(&mut buf, &fs).unwrap(), 0);

    fs.close_file(file);
    fs.close_dir(root);
}

#[test]
fn removed_slot_is_reused() {
    let fs = fresh_fs();
    let mut root = fs.open_root().unwrap();
    fs.create(&root, "a", 0).unwrap();
    fs.create(&root, "b", 0).unwrap();
    let grown = root.inode().length();

    fs.remove(&root, "a").unwrap();
    fs.create(&root, "c", 0).unwrap();
    // 新项落进了a留下的空槽，目录流没有长大
    assert_eq!(root.inode().length(), grown);

    let mut names = Vec::new();
    while let Some(name) = fs.read_directory(&mut root).unwrap() {
        names.push(name);
    }
    names.sort();
    assert_eq!(names, ["b", "c"]);

    fs.close_dir(root);
}

#[test]
fn name_collision_covers_both_namespaces() {
    let fs = fresh_fs();
    let root = fs.open_root().unwrap();
    fs.create(&root, "x", 0).unwrap();

    assert_eq!(fs.make_directory(&root, "x"), Err(Error::AlreadyExists));
    assert_eq!(fs.create(&root, "x", 0), Err(Error::AlreadyExists));

    fs.close_dir(root);
}

#[test]
fn end_to_end() {
    let fs = fresh_fs();
    let root = fs.open_root().unwrap();

    fs.make_directory(&root, "/a").unwrap();
    fs.make_directory(&root, "/a/b").unwrap();
    fs.create(&root, "/a/b/f", 0).unwrap();

    // 5000字节跨越直接索引与一级索引
    let data: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
    let mut file = fs.open(&root, "/a/b/f").unwrap();
    assert_eq!(file.write(&data, &fs).unwrap(), 5000);
    fs.close_file(file);

    let mut file = fs.open(&root, "/a/b/f").unwrap();
    let mut back = vec![0u8; 5000];
    assert_eq!(file.read(&mut back, &fs).unwrap(), 5000);
    assert_eq!(back, data);
    fs.close_file(file);

    // 非空目录不可删除
    assert_eq!(fs.remove(&root, "/a/b"), Err(Error::DirectoryNotEmpty));
    fs.remove(&root, "/a/b/f").unwrap();
    fs.remove(&root, "/a/b").unwrap();
    assert!(!fs.exists(&root, "/a/b"));
    assert!(fs.exists(&root, "/a"));

    fs.close_dir(root);
}

#[test]
fn over_long_component_rejected() {
    let fs = fresh_fs();
    let mut root = fs.open_root().unwrap();
    let over = "x".repeat(NAME_MAX + 1);

    assert!(!format!("/{over}").as_str().is_valid());
    assert_eq!(fs.create(&root, &over, 0), Err(Error::NameTooLong));
    assert_eq!(
        fs.make_directory(&root, &format!("/{over}")),
        Err(Error::NameTooLong)
    );

    // 任何状态都未被改动
    assert_eq!(root.inode().length(), 0);
    assert_eq!(fs.read_directory(&mut root).unwrap(), None);

    fs.close_dir(root);
}

#[test]
fn deny_write_blocks_writes() {
    let fs = fresh_fs();
    let root = fs.open_root().unwrap();
    fs.create(&root, "exe", 0).unwrap();

    let mut file = fs.open(&root, "exe").unwrap();
    file.deny_write();
    assert_eq!(file.write(&[1u8; 4], &fs).unwrap(), 0);
    assert_eq!(file.length(), 0);

    file.allow_write();
    assert_eq!(file.write(&[1u8; 4], &fs).unwrap(), 4);
    assert_eq!(file.length(), 4);

    fs.close_file(file);
    fs.close_dir(root);
}

#[test]
fn removal_deferred_until_close() {
    let fs = fresh_fs();
    let root = fs.open_root().unwrap();
    fs.create(&root, "f", 0).unwrap();

    let mut file = fs.open(&root, "f").unwrap();
    file.write(b"still here", &fs).unwrap();

    fs.remove(&root, "f").unwrap();
    // 路径已经消失，但已打开的句柄仍可读写
    assert!(!fs.exists(&root, "f"));
    assert_eq!(fs.open(&root, "f").unwrap_err(), Error::NotFound);

    file.seek(0);
    let mut buf = [0u8; 10];
    assert_eq!(file.read(&mut buf, &fs).unwrap(), 10);
    assert_eq!(&buf, b"still here");

    fs.close_file(file);
    fs.close_dir(root);
}

#[test]
fn change_directory_swaps_anchor() {
    let fs = fresh_fs();
    let mut cwd = fs.open_root().unwrap();
    fs.make_directory(&cwd, "/d").unwrap();
    fs.create(&cwd, "/d/f", 0).unwrap();

    fs.change_directory(&mut cwd, "/d").unwrap();
    // 相对路径以当前目录为锚
    assert!(fs.exists(&cwd, "f"));
    assert!(fs.is_directory(&cwd, ".."));
    assert!(fs.exists(&cwd, "../d/f"));

    fs.change_directory(&mut cwd, "..").unwrap();
    assert!(fs.is_directory(&cwd, "d"));
    assert_eq!(
        fs.change_directory(&mut cwd, "d/f"),
        Err(Error::NotADirectory)
    );

    fs.close_dir(cwd);
}

#[test]
fn write_crosses_double_indirect() {
    let fs = fresh_fs();
    let root = fs.open_root().unwrap();
    fs.create(&root, "big", 0).unwrap();

    // 二级索引起点之前100字节处起笔，跨过区域边界
    let boundary = (10 + 10 * 128) * SECTOR_SIZE;
    let data: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();

    let mut file = fs.open(&root, "big").unwrap();
    file.seek(boundary - 100);
    assert_eq!(file.write(&data, &fs).unwrap(), 300);
    assert_eq!(file.length() as usize, boundary + 200);

    file.seek(boundary - 100);
    let mut back = vec![0u8; 300];
    assert_eq!(file.read(&mut back, &fs).unwrap(), 300);
    assert_eq!(back, data);

    fs.close_file(file);
    fs.close_dir(root);
}

#[test]
fn allocation_exhaustion_rolls_back() {
    let disk = Arc::new(MemDisk::new(64));
    let fs = TierFileSystem::format(disk, 64).unwrap();
    let root = fs.open_root().unwrap();
    fs.create(&root, "f", 0).unwrap();

    let mut file = fs.open(&root, "f").unwrap();
    // 64扇区的设备装不下62扇区的数据加索引
    let huge = vec![3u8; 62 * SECTOR_SIZE];
    assert_eq!(file.write(&huge, &fs), Err(Error::NoSpace));
    // 失败的扩展不改变长度
    assert_eq!(file.length(), 0);
    fs.close_file(file);

    // 回滚之后空间仍然可用
    let mut file = fs.open(&root, "f").unwrap();
    assert_eq!(file.write(&[1u8; 1024], &fs).unwrap(), 1024);
    fs.close_file(file);
    fs.close_dir(root);
}

#[test]
fn remount_preserves_data() {
    let disk = Arc::new(MemDisk::new(TOTAL_SECTORS));
    {
        let fs = TierFileSystem::format(disk.clone(), TOTAL_SECTORS).unwrap();
        let root = fs.open_root().unwrap();
        fs.make_directory(&root, "keep").unwrap();
        fs.create(&root, "keep/persist", 0).unwrap();

        let mut file = fs.open(&root, "keep/persist").unwrap();
        file.write(b"hello", &fs).unwrap();
        fs.close_file(file);
        fs.close_dir(root);
        fs.unmount();
    }

    let fs = TierFileSystem::mount(disk, TOTAL_SECTORS).unwrap();
    let root = fs.open_root().unwrap();
    let mut file = fs.open(&root, "keep/persist").unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(file.read(&mut buf, &fs).unwrap(), 5);
    assert_eq!(&buf, b"hello");

    fs.close_file(file);
    fs.close_dir(root);
}

#[test]
fn mount_rejects_unformatted_device() {
    let disk = Arc::new(MemDisk::new(64));
    assert_eq!(
        TierFileSystem::mount(disk, 64).unwrap_err(),
        Error::Corrupted
    );
}

#[test]
fn stat_reports_kind_and_size() {
    let fs = fresh_fs();
    let root = fs.open_root().unwrap();
    fs.make_directory(&root, "d").unwrap();
    fs.create(&root, "f", 600).unwrap();

    let stat = fs.stat(&root, "f").unwrap();
    assert!(!stat.is_dir());
    assert_eq!(stat.size, 600);
    assert_eq!(stat.blocks, 2);

    assert!(fs.stat(&root, "d").unwrap().is_dir());
    // 空的剩余路径指向锚点自身，恒为目录
    assert!(fs.stat(&root, "/").unwrap().is_dir());

    fs.close_dir(root);
}
