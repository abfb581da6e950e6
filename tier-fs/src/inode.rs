//! # 索引节点层
//!
//! 内存中的inode句柄与打开表。
//! 同一扇区在任意时刻至多存在一个[`Inode`]实例：
//! 重复打开只会递增打开计数并返回既有句柄。
//!
//! 标记移除的inode推迟到最后一次关闭时物理回收，
//! 头部扇区与索引树上的全部数据、索引扇区一并归还。

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;
use vfs::Error;

use crate::TierFileSystem;
use crate::block_cache::SectorId;
use crate::layout::InodeDisk;

/// 内存中的inode，引用计数的打开句柄
#[derive(Debug)]
pub struct Inode {
    /// inode头部所在扇区
    sector: SectorId,
    inner: Mutex<InodeInner>,
}

#[derive(Debug)]
struct InodeInner {
    /// 头部的内存副本，修改后立即经缓存落盘
    header: InodeDisk,
    /// 打开计数，归零时从打开表摘除
    open_count: u32,
    /// 置位后物理回收推迟到最后一次关闭
    removed: bool,
    /// 写禁止计数，不得超过打开计数
    deny_write_count: u32,
}

impl Inode {
    #[inline]
    pub fn sector(&self) -> SectorId {
        self.sector
    }

    #[inline]
    pub fn length(&self) -> u64 {
        self.inner.lock().header.length()
    }

    /// 占据的扇区数，含索引块、不含头部
    #[inline]
    pub fn blocks(&self) -> u64 {
        InodeDisk::count_total_sectors(self.length()) as u64
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.inner.lock().removed
    }

    /// 从指定位置读出数据填充`buf`。
    /// 越过文件末尾的读取是调用方的违约，不做静默截断。
    pub fn read_at(
        &self,
        offset: usize,
        buf: &mut [u8],
        fs: &TierFileSystem,
    ) -> Result<usize, Error> {
        let inner = self.inner.lock();
        inner.header.read_at(offset, buf, fs.cache())
    }

    /// 在指定位置写入`buf`，必要时先扩展到`offset + buf.len()`。
    /// 写禁止期间不写入任何字节，返回0。
    pub fn write_at(&self, offset: usize, buf: &[u8], fs: &TierFileSystem) -> Result<usize, Error> {
        let mut inner = self.inner.lock();
        if inner.deny_write_count > 0 {
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let target = (offset + buf.len()) as u64;
        if target > inner.header.length() {
            log::debug!("extend inode {:?} to {target} bytes", self.sector);
            inner.header.grow(target, fs.cache(), fs.free_map())?;
            // 头部更新后立即落盘
            fs.cache().write_obj(self.sector, &inner.header);
        }

        inner.header.write_at(offset, buf, fs.cache())
    }

    /// 执行子系统在运行可执行文件期间禁止写入
    pub fn deny_write(&self) {
        let mut inner = self.inner.lock();
        inner.deny_write_count += 1;
        assert!(inner.deny_write_count <= inner.open_count);
    }

    /// 每个调用过[`deny_write`]的打开者关闭前必须调用一次
    ///
    /// [`deny_write`]: Inode::deny_write
    pub fn allow_write(&self) {
        let mut inner = self.inner.lock();
        assert!(inner.deny_write_count > 0);
        inner.deny_write_count -= 1;
    }
}

impl Inode {
    /// 在指定扇区构建全新inode并物化`length`字节（清零）。
    /// 失败时扩展已内部回滚，头部扇区本身由调用方归还。
    pub(crate) fn create(
        sector: SectorId,
        length: usize,
        fs: &TierFileSystem,
    ) -> Result<(), Error> {
        let mut header = InodeDisk::new();
        header.grow(length as u64, fs.cache(), fs.free_map())?;
        fs.cache().write_obj(sector, &header);
        Ok(())
    }

    /// 经缓存装载头部，魔数不符说明磁盘数据不一致
    fn load(sector: SectorId, fs: &TierFileSystem) -> Result<Self, Error> {
        let header: InodeDisk = fs.cache().read_obj(sector);
        if !header.is_valid() {
            return Err(Error::Corrupted);
        }

        Ok(Self {
            sector,
            inner: Mutex::new(InodeInner {
                header,
                open_count: 1,
                removed: false,
                deny_write_count: 0,
            }),
        })
    }

    #[inline]
    pub(crate) fn mark_removed(&self) {
        self.inner.lock().removed = true;
    }
}

/// 打开表：按扇区去重的打开inode集合
#[derive(Debug)]
pub(crate) struct InodeTable {
    open: Mutex<Vec<(SectorId, Arc<Inode>)>>,
}

impl InodeTable {
    pub const fn new() -> Self {
        Self {
            open: Mutex::new(Vec::new()),
        }
    }

    /// 返回指定扇区的共享句柄：已打开则递增计数复用，
    /// 否则装载头部新建
    pub fn open(&self, sector: SectorId, fs: &TierFileSystem) -> Result<Arc<Inode>, Error> {
        let mut open = self.open.lock();

        if let Some((_, inode)) = open.iter().find(|(s, _)| *s == sector) {
            inode.inner.lock().open_count += 1;
            return Ok(inode.clone());
        }

        let inode = Arc::new(Inode::load(sector, fs)?);
        open.push((sector, inode.clone()));
        Ok(inode)
    }

    /// 递减打开计数；归零时摘出打开表，
    /// 已标记移除的inode就此归还头部与索引树上的全部扇区
    pub fn close(&self, inode: Arc<Inode>, fs: &TierFileSystem) {
        let mut open = self.open.lock();
        let mut inner = inode.inner.lock();

        inner.open_count -= 1;
        if inner.open_count > 0 {
            return;
        }

        let pos = open
            .iter()
            .position(|(s, _)| *s == inode.sector)
            .expect("closing an inode missing from the open table");
        open.remove(pos);

        if inner.removed {
            log::debug!("release removed inode {:?}", inode.sector);
            let sectors = inner.header.collect_sectors(fs.cache());
            let mut free_map = fs.free_map().lock();
            for sector in sectors {
                free_map.release(fs.cache(), sector, 1);
            }
            free_map.release(fs.cache(), inode.sector, 1);
        }
    }
}
