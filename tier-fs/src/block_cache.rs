//! # 扇区缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟
//! 固定容量的槽位数组，把即将操作的扇区复制到内存中，
//! 提高对块设备的操作效率。
//!
//! 槽位替换采用时钟（二次机会）算法：游标在槽位数组上旋转，
//! 引用位为假的槽位即为牺牲者，途经的引用位被清除。
//! 访问会重新置起引用位，因此扫描必然在有限圈数内终止。
//!
//! 脏槽位只在被换出或统一落盘时写回设备；
//! 命中与干净的缺失填充都不会同步触碰设备写入。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;
use core::ptr;
use core::slice;

use block_dev::BlockDevice;
use derive_more::{Add, From, Into};
use spin::Mutex;

use crate::SECTOR_SIZE;
use crate::SectorBuf;

/// 扇区编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Add, From, Into)]
#[repr(transparent)]
pub struct SectorId(u32);

impl SectorId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl core::ops::Add<u32> for SectorId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        self + Self(rhs)
    }
}

impl From<SectorId> for usize {
    fn from(id: SectorId) -> Self {
        id.0 as usize
    }
}

/// 一个槽位缓存一个扇区
#[derive(Debug)]
struct CacheSlot {
    /// 对应的扇区号，仅在occupied时有意义
    sector: SectorId,
    /// 缓存的数据
    data: SectorBuf,
    occupied: bool,
    /// 引用位，供时钟算法使用
    referenced: bool,
    /// 是否为脏槽位
    dirty: bool,
}

impl CacheSlot {
    const fn empty() -> Self {
        Self {
            sector: SectorId::new(0),
            data: [0; SECTOR_SIZE],
            occupied: false,
            referenced: false,
            dirty: false,
        }
    }
}

/// 槽位数组与时钟游标，整体处于同一把锁之下：
/// 查找、选择牺牲者、换出写回、槽位更新相互串行
#[derive(Debug)]
struct CacheState {
    slots: Vec<CacheSlot>,
    cursor: usize,
}

/// 扇区缓存，独占槽位缓冲区的所有权。
/// 同一扇区号任意时刻至多占据一个槽位。
#[derive(Debug)]
pub struct SectorCache {
    /// 底层块设备的引用
    dev: Arc<dyn BlockDevice>,
    state: Mutex<CacheState>,
}

impl SectorCache {
    /// 槽位个数的上限
    pub const CAPACITY: usize = 64;

    pub fn new(dev: Arc<dyn BlockDevice>) -> Self {
        let slots = (0..Self::CAPACITY).map(|_| CacheSlot::empty()).collect();
        Self {
            dev,
            state: Mutex::new(CacheState { slots, cursor: 0 }),
        }
    }

    /// 读出整个扇区。缺失时载入牺牲槽位再复制。
    pub fn read(&self, sector: SectorId, buf: &mut [u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE);
        let mut state = self.state.lock();

        if let Some(i) = state.position(sector) {
            let slot = &mut state.slots[i];
            slot.referenced = true;
            buf.copy_from_slice(&slot.data);
            return;
        }

        let i = self.take_slot(&mut state);
        let slot = &mut state.slots[i];
        self.dev.read_block(sector.into(), &mut slot.data);
        slot.sector = sector;
        slot.occupied = true;
        slot.referenced = true;
        slot.dirty = false;
        buf.copy_from_slice(&slot.data);
    }

    /// 覆写整个扇区。缺失时不读设备，直接占据牺牲槽位。
    pub fn write(&self, sector: SectorId, buf: &[u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE);
        let mut state = self.state.lock();

        let i = match state.position(sector) {
            Some(i) => i,
            None => self.take_slot(&mut state),
        };
        let slot = &mut state.slots[i];
        slot.data.copy_from_slice(buf);
        slot.sector = sector;
        slot.occupied = true;
        slot.referenced = true;
        slot.dirty = true;
    }

    /// 把全部脏槽位写回设备，用于卸载
    pub fn flush_all(&self) {
        let mut state = self.state.lock();
        for slot in &mut state.slots {
            if slot.occupied && slot.dirty {
                self.dev.write_block(slot.sector.into(), &slot.data);
                slot.dirty = false;
            }
        }
    }

    /// 当前被占据的槽位数
    pub fn occupied(&self) -> usize {
        self.state
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.occupied)
            .count()
    }
}

impl SectorCache {
    /// 取一个可用槽位：优先空槽，否则时钟扫描换出。
    /// 容量固定非零，换出必然成功。
    fn take_slot(&self, state: &mut CacheState) -> usize {
        if let Some(i) = state.slots.iter().position(|slot| !slot.occupied) {
            return i;
        }

        loop {
            let i = state.cursor;
            state.cursor = (i + 1) % Self::CAPACITY;

            let slot = &mut state.slots[i];
            if slot.referenced {
                slot.referenced = false;
                continue;
            }

            if slot.dirty {
                log::debug!("evict dirty sector {:?}", slot.sector);
                self.dev.write_block(slot.sector.into(), &slot.data);
            }
            slot.occupied = false;
            return i;
        }
    }
}

impl CacheState {
    fn position(&self, sector: SectorId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.occupied && slot.sector == sector)
    }
}

/// 恰为一个扇区的磁盘结构经由这两个方法整存整取
impl SectorCache {
    pub fn read_obj<T>(&self, sector: SectorId) -> T {
        assert_eq!(mem::size_of::<T>(), SECTOR_SIZE);
        let mut buf = [0u8; SECTOR_SIZE];
        self.read(sector, &mut buf);
        unsafe { mem::transmute_copy(&buf) }
    }

    pub fn write_obj<T>(&self, sector: SectorId, obj: &T) {
        assert_eq!(mem::size_of::<T>(), SECTOR_SIZE);
        let bytes = unsafe { slice::from_raw_parts(ptr::from_ref(obj).cast::<u8>(), SECTOR_SIZE) };
        self.write(sector, bytes);
    }
}
