//! inode头部与多级块索引
//!
//! 头部持有10个直接指针、10个一级索引指针与1个二级索引指针：
//! - 直接指针直接编号**数据扇区**
//! - 一级索引块整块连续存储128个数据扇区编号
//! - 二级索引块整块连续存储128个一级索引块编号
//!
//! 可编号数据扇区上限为 10 + 10×128 + 128×128 = 17674。
//!
//! ## 块索引编码
//!
//! 逻辑索引依次减去上一级区域的容量后，
//! 除以128得到所在索引块的槽位，模128得到块内位置，
//! 全部为封闭式换算，不做指针递归。

use alloc::vec::Vec;

use spin::Mutex;
use vfs::Error;

use crate::block_cache::{SectorCache, SectorId};
use crate::{INODE_MAGIC, SECTOR_SIZE};

use super::bitmap::FreeMap;

/// 间接索引块的编号容量
const INDIRECT_COUNT: usize = SECTOR_SIZE / 4;
/// 间接索引块
type IndirectBlock = [u32; INDIRECT_COUNT];

/// 直接指针数量
const DIRECT_COUNT: usize = 10;
/// 一级索引指针数量
const SINGLE_COUNT: usize = 10;
/// 直接索引时的编号容量
const DIRECT_CAP: usize = DIRECT_COUNT;
/// 用上一级索引时的编号容量
const SINGLE_CAP: usize = DIRECT_CAP + SINGLE_COUNT * INDIRECT_COUNT;
/// 用上二级索引时的编号容量，即单文件数据扇区上限
pub const MAX_DATA_SECTORS: usize = SINGLE_CAP + INDIRECT_COUNT * INDIRECT_COUNT;
/// 单文件大小上限（字节）
pub const MAX_FILE_SIZE: u64 = (MAX_DATA_SECTORS * SECTOR_SIZE) as u64;

/// 未分配指针槽的哨兵值，不与任何合法扇区号冲突。
/// 取全1也使得新索引块可以按字节0xFF整块填充。
const UNALLOCATED: u32 = u32::MAX;

/// 头部中指针区之外的填充，使结构恰为一个扇区
const PAD: usize = (SECTOR_SIZE - 8 - 4 * (DIRECT_COUNT + SINGLE_COUNT + 2)) / 4;

/// 磁盘上的inode头部，恰为一个扇区
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct InodeDisk {
    /// 文件长度（字节）
    length: u64,
    direct: [u32; DIRECT_COUNT],
    single: [u32; SINGLE_COUNT],
    double: u32,
    magic: u32,
    _pad: [u32; PAD],
}

/// 数据块逻辑索引所落的索引区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRegion {
    /// 头部第几个直接指针
    Direct(usize),
    /// 头部第slot个一级索引块内的第entry项
    Single { slot: usize, entry: usize },
    /// 二级索引块内第slot个一级索引块的第entry项
    Double { slot: usize, entry: usize },
}

impl IndexRegion {
    /// 逻辑索引的封闭式区域换算；超出单文件上限时返回空
    pub fn locate(index: usize) -> Option<Self> {
        if index < DIRECT_CAP {
            return Some(Self::Direct(index));
        }

        // 剔去直接索引的部分
        let index = index - DIRECT_CAP;
        if index < SINGLE_COUNT * INDIRECT_COUNT {
            return Some(Self::Single {
                slot: index / INDIRECT_COUNT,
                entry: index % INDIRECT_COUNT,
            });
        }

        // 剔去使用了一级索引的部分
        let index = index - SINGLE_COUNT * INDIRECT_COUNT;
        (index < INDIRECT_COUNT * INDIRECT_COUNT).then_some(Self::Double {
            slot: index / INDIRECT_COUNT,
            entry: index % INDIRECT_COUNT,
        })
    }
}

impl InodeDisk {
    /// 全新头部：长度为零，指针全部未分配
    pub fn new() -> Self {
        Self {
            length: 0,
            direct: [UNALLOCATED; DIRECT_COUNT],
            single: [UNALLOCATED; SINGLE_COUNT],
            double: UNALLOCATED,
            magic: INODE_MAGIC,
            _pad: [0; PAD],
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// 容纳指定数据量需要多少个**数据扇区**
    #[inline]
    pub fn count_data_sectors(length: u64) -> usize {
        (length as usize).div_ceil(SECTOR_SIZE)
    }

    /// 容纳指定数据量需要多少个**数据扇区**和**索引扇区**
    pub fn count_total_sectors(length: u64) -> usize {
        let data = Self::count_data_sectors(length);
        let mut total = data;

        if data > DIRECT_CAP {
            total += (data - DIRECT_CAP).div_ceil(INDIRECT_COUNT).min(SINGLE_COUNT);
        }

        if data > SINGLE_CAP {
            total += 1 + (data - SINGLE_CAP).div_ceil(INDIRECT_COUNT);
        }

        total
    }

    /// 逻辑数据块索引翻译为物理扇区号。
    /// 读取路径上撞见未分配指针说明磁盘数据不一致。
    pub fn block_at(&self, index: usize, cache: &SectorCache) -> Result<SectorId, Error> {
        let ptr = match IndexRegion::locate(index).ok_or(Error::OutOfBounds)? {
            IndexRegion::Direct(i) => self.direct[i],
            IndexRegion::Single { slot, entry } => {
                let single = Self::load_index(self.single[slot], cache)?;
                single[entry]
            }
            IndexRegion::Double { slot, entry } => {
                let double = Self::load_index(self.double, cache)?;
                let single = Self::load_index(double[slot], cache)?;
                single[entry]
            }
        };

        if ptr == UNALLOCATED {
            return Err(Error::Corrupted);
        }
        Ok(SectorId::from(ptr))
    }

    fn load_index(ptr: u32, cache: &SectorCache) -> Result<IndirectBlock, Error> {
        if ptr == UNALLOCATED {
            return Err(Error::Corrupted);
        }
        Ok(cache.read_obj(SectorId::from(ptr)))
    }
}

impl InodeDisk {
    /// 扩展到`target`字节：补齐缺少的数据扇区（清零），
    /// 首次触及的索引块就地物化。
    /// 长度只在全部扇区就绪后更新；失败时本次分配的扇区
    /// 悉数归还，头部不发生任何变化。
    pub fn grow(
        &mut self,
        target: u64,
        cache: &SectorCache,
        free_map: &Mutex<FreeMap>,
    ) -> Result<(), Error> {
        if target <= self.length {
            return Ok(());
        }
        if target > MAX_FILE_SIZE {
            return Err(Error::TooLarge);
        }

        let have = Self::count_data_sectors(self.length);
        let want = Self::count_data_sectors(target);

        // 头部副本上操作，成功才回写。
        // fresh记录本次分配的所有扇区；touched记录写进既有二级
        // 索引块的槽位。失败时槽位恢复哨兵、扇区悉数归还，
        // 磁盘上不残留指向已释放扇区的指针。
        let mut header = *self;
        let mut fresh: Vec<SectorId> = Vec::new();
        let mut touched: Vec<(SectorId, usize)> = Vec::new();
        match header.fill(have, want, cache, free_map, &mut fresh, &mut touched) {
            Ok(()) => {
                header.length = target;
                *self = header;
                Ok(())
            }
            Err(e) => {
                for (block_id, slot) in touched {
                    let mut block: IndirectBlock = cache.read_obj(block_id);
                    block[slot] = UNALLOCATED;
                    cache.write_obj(block_id, &block);
                }
                let mut free_map = free_map.lock();
                for sector in fresh {
                    free_map.release(cache, sector, 1);
                }
                Err(e)
            }
        }
    }

    fn fill(
        &mut self,
        have: usize,
        want: usize,
        cache: &SectorCache,
        free_map: &Mutex<FreeMap>,
        fresh: &mut Vec<SectorId>,
        touched: &mut Vec<(SectorId, usize)>,
    ) -> Result<(), Error> {
        for index in have..want {
            let data = alloc_data(cache, free_map, fresh)?;

            match IndexRegion::locate(index).expect("index below MAX_DATA_SECTORS") {
                IndexRegion::Direct(i) => self.direct[i] = data.into(),
                IndexRegion::Single { slot, entry } => {
                    if self.single[slot] == UNALLOCATED {
                        self.single[slot] = alloc_index(cache, free_map, fresh)?.into();
                    }
                    set_entry(self.single[slot], entry, data, cache);
                }
                IndexRegion::Double { slot, entry } => {
                    if self.double == UNALLOCATED {
                        self.double = alloc_index(cache, free_map, fresh)?.into();
                    }

                    let double_id = SectorId::from(self.double);
                    let mut double: IndirectBlock = cache.read_obj(double_id);
                    if double[slot] == UNALLOCATED {
                        double[slot] = alloc_index(cache, free_map, fresh)?.into();
                        cache.write_obj(double_id, &double);
                        touched.push((double_id, slot));
                    }
                    set_entry(double[slot], entry, data, cache);
                }
            }
        }

        Ok(())
    }

    /// 收集索引树上的全部数据扇区与索引扇区（不含头部自身），
    /// 供物理回收使用
    pub fn collect_sectors(&self, cache: &SectorCache) -> Vec<SectorId> {
        let data = Self::count_data_sectors(self.length);
        let mut sectors = Vec::with_capacity(Self::count_total_sectors(self.length));

        for i in 0..data.min(DIRECT_CAP) {
            sectors.push(self.direct[i].into());
        }

        if data > DIRECT_CAP {
            let mut rest = (data - DIRECT_CAP).min(SINGLE_COUNT * INDIRECT_COUNT);
            let singles = rest.div_ceil(INDIRECT_COUNT);
            for slot in 0..singles {
                sectors.push(self.single[slot].into());
                let single: IndirectBlock = cache.read_obj(self.single[slot].into());
                let take = rest.min(INDIRECT_COUNT);
                for &ptr in &single[..take] {
                    sectors.push(ptr.into());
                }
                rest -= take;
            }
        }

        if data > SINGLE_CAP {
            sectors.push(self.double.into());
            let double: IndirectBlock = cache.read_obj(self.double.into());
            let mut rest = data - SINGLE_CAP;
            let singles = rest.div_ceil(INDIRECT_COUNT);
            for slot in 0..singles {
                sectors.push(double[slot].into());
                let single: IndirectBlock = cache.read_obj(double[slot].into());
                let take = rest.min(INDIRECT_COUNT);
                for &ptr in &single[..take] {
                    sectors.push(ptr.into());
                }
                rest -= take;
            }
        }

        sectors
    }
}

impl InodeDisk {
    /// 从指定位置（字节偏移）读出数据填充`buf`。
    /// 读取范围必须整体落在长度之内，越界由调用方负责约束。
    pub fn read_at(
        &self,
        offset: usize,
        buf: &mut [u8],
        cache: &SectorCache,
    ) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let end = offset + buf.len();
        if end as u64 > self.length {
            return Err(Error::OutOfBounds);
        }

        let mut start = offset;
        let mut read = 0;
        while start < end {
            // 当前块的逻辑索引与末地址（字节）
            let index = start / SECTOR_SIZE;
            let block_end = ((index + 1) * SECTOR_SIZE).min(end);
            let chunk = block_end - start;

            let sector = self.block_at(index, cache)?;
            let dest = &mut buf[read..read + chunk];
            if chunk == SECTOR_SIZE {
                cache.read(sector, dest);
            } else {
                // 不足整扇区，经由暂存扇区中转
                let mut scratch = [0u8; SECTOR_SIZE];
                cache.read(sector, &mut scratch);
                let ofs = start % SECTOR_SIZE;
                dest.copy_from_slice(&scratch[ofs..ofs + chunk]);
            }

            read += chunk;
            start = block_end;
        }

        Ok(read)
    }

    /// 在指定位置（字节偏移）写入`buf`，先扩展后调用，
    /// 写入范围一定落在长度之内。
    /// 不足整扇区的块读改写，保全块内既有数据。
    pub fn write_at(
        &mut self,
        offset: usize,
        buf: &[u8],
        cache: &SectorCache,
    ) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let end = offset + buf.len();
        assert!(end as u64 <= self.length);

        let mut start = offset;
        let mut written = 0;
        while start < end {
            let index = start / SECTOR_SIZE;
            let block_end = ((index + 1) * SECTOR_SIZE).min(end);
            let chunk = block_end - start;

            let sector = self.block_at(index, cache)?;
            let src = &buf[written..written + chunk];
            if chunk == SECTOR_SIZE {
                cache.write(sector, src);
            } else {
                let mut scratch = [0u8; SECTOR_SIZE];
                cache.read(sector, &mut scratch);
                let ofs = start % SECTOR_SIZE;
                scratch[ofs..ofs + chunk].copy_from_slice(src);
                cache.write(sector, &scratch);
            }

            written += chunk;
            start = block_end;
        }

        Ok(written)
    }
}

impl Default for InodeDisk {
    fn default() -> Self {
        Self::new()
    }
}

/// 分配并清零一个数据扇区
fn alloc_data(
    cache: &SectorCache,
    free_map: &Mutex<FreeMap>,
    fresh: &mut Vec<SectorId>,
) -> Result<SectorId, Error> {
    alloc_filled(cache, free_map, fresh, 0)
}

/// 分配一个索引扇区，整块填满哨兵（u32::MAX即字节0xFF）
fn alloc_index(
    cache: &SectorCache,
    free_map: &Mutex<FreeMap>,
    fresh: &mut Vec<SectorId>,
) -> Result<SectorId, Error> {
    alloc_filled(cache, free_map, fresh, 0xff)
}

fn alloc_filled(
    cache: &SectorCache,
    free_map: &Mutex<FreeMap>,
    fresh: &mut Vec<SectorId>,
    fill: u8,
) -> Result<SectorId, Error> {
    let sector = free_map
        .lock()
        .allocate(cache, 1)
        .ok_or(Error::NoSpace)?;
    cache.write(sector, &[fill; SECTOR_SIZE]);
    fresh.push(sector);
    Ok(sector)
}

/// 在一级索引块的指定槽位记下数据扇区编号
fn set_entry(index_ptr: u32, entry: usize, data: SectorId, cache: &SectorCache) {
    let id = SectorId::from(index_ptr);
    let mut block: IndirectBlock = cache.read_obj(id);
    block[entry] = data.into();
    cache.write_obj(id, &block);
}
