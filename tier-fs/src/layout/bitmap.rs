use crate::SECTOR_SIZE;
use crate::block_cache::{SectorCache, SectorId};

/// 位图区域内扇区的结构
type BitmapBlock = [u64; SECTOR_SIZE / 8];

/// 一个位图扇区管辖的扇区数
const SECTOR_BITS: usize = SECTOR_SIZE * 8;

/// 位图自身紧随根inode之后
const FREE_MAP_START: SectorId = SectorId::new(1);

/// 覆盖全盘的空闲扇区位图，置位表示已占用。
/// 位图经由扇区缓存读改写，持久化依托于缓存的统一落盘，
/// 挂载时无需单独装载。
///
/// 调用方以`Mutex`包裹本类型，分配的查找与置位之间不容他人插足。
#[derive(Debug)]
pub struct FreeMap {
    /// 位图占用扇区数
    sectors: usize,
    /// 位图管辖的扇区总数，即设备容量
    total: usize,
}

impl FreeMap {
    pub fn new(total_sectors: usize) -> Self {
        Self {
            sectors: total_sectors.div_ceil(SECTOR_BITS),
            total: total_sectors,
        }
    }

    /// 清空位图并保留元数据区：根inode、位图自身，
    /// 以及末块中越出设备容量的位
    pub fn format(&mut self, cache: &SectorCache) {
        let reserved = 1 + self.sectors;
        for i in 0..self.sectors {
            let mut block: BitmapBlock = [0; SECTOR_SIZE / 8];
            let base = i * SECTOR_BITS;
            for bit in 0..SECTOR_BITS {
                let sector = base + bit;
                if sector < reserved || sector >= self.total {
                    block[bit / 64] |= 1 << (bit % 64);
                }
            }
            cache.write_obj(FREE_MAP_START + i as u32, &block);
        }
        log::debug!("free map formatted, {} bitmap sectors", self.sectors);
    }

    /// 分配`count`个连续空闲扇区，返回首扇区号；
    /// 空间用尽则返回空。本设计的调用方恒以count=1调用。
    pub fn allocate(&mut self, cache: &SectorCache, count: usize) -> Option<SectorId> {
        assert!(count > 0);

        let mut run = 0;
        let mut first = 0;
        for i in 0..self.sectors {
            let block: BitmapBlock = cache.read_obj(FREE_MAP_START + i as u32);
            for (group, &bits) in block.iter().enumerate() {
                // 整组占满，快速跳过
                if bits == u64::MAX {
                    run = 0;
                    continue;
                }

                for bit in 0..64 {
                    if bits & (1 << bit) != 0 {
                        run = 0;
                        continue;
                    }

                    let sector = i * SECTOR_BITS + group * 64 + bit;
                    if run == 0 {
                        first = sector;
                    }
                    run += 1;
                    if run == count {
                        for s in first..first + count {
                            self.mark(cache, s, true);
                        }
                        return Some(SectorId::new(first as u32));
                    }
                }
            }
        }

        None
    }

    /// 归还从`first`起的`count`个扇区
    pub fn release(&mut self, cache: &SectorCache, first: SectorId, count: usize) {
        let first = usize::from(first);
        for sector in first..first + count {
            self.mark(cache, sector, false);
        }
    }

    fn mark(&self, cache: &SectorCache, sector: usize, used: bool) {
        let id = FREE_MAP_START + (sector / SECTOR_BITS) as u32;
        let mut block: BitmapBlock = cache.read_obj(id);
        let group = sector % SECTOR_BITS / 64;
        let mask = 1u64 << (sector % 64);

        if used {
            debug_assert_eq!(block[group] & mask, 0);
            block[group] |= mask;
        } else {
            // 编号一定得有对应的位
            assert_ne!(block[group] & mask, 0);
            block[group] &= !mask;
        }

        cache.write_obj(id, &block);
    }
}
