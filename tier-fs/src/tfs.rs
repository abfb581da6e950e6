//! # 文件系统管理层
//!
//! [`TierFileSystem`]持有扇区缓存、空闲位图与inode打开表，
//! 对上提供以路径为操作数的文件与目录操作。
//!
//! ## 并发约定
//!
//! - 缓存自带一把锁，查找、换出、槽位更新整体串行；
//! - 每个inode一把锁，串行化同一inode上的头部与数据访问；
//! - 命名空间的结构变更（创建、删除、建目录、切目录）
//!   由一把全局结构锁串行化。
//!
//! 加锁顺序固定为 结构锁 → 打开表 → inode → 位图 → 缓存，
//! 任何路径都不反向持有。

use alloc::string::String;
use alloc::sync::Arc;

use block_dev::BlockDevice;
use spin::Mutex;
use vfs::{Error, Stat, StatKind};

use crate::ROOT_SECTOR;
use crate::block_cache::{SectorCache, SectorId};
use crate::directory::Directory;
use crate::file::File;
use crate::inode::{Inode, InodeTable};
use crate::layout::{FreeMap, InodeDisk};
use crate::path::{Path, components};

#[derive(Debug)]
pub struct TierFileSystem {
    cache: SectorCache,
    free_map: Mutex<FreeMap>,
    inodes: InodeTable,
    /// 命名空间结构变更的全局串行点
    structural: Mutex<()>,
}

impl TierFileSystem {
    /// 格式化并挂载：清空位图、保留元数据区、创建根目录inode。
    /// 根目录不持有`.`与`..`，只有子目录才合成这两项。
    pub fn format(dev: Arc<dyn BlockDevice>, total_sectors: usize) -> Result<Arc<Self>, Error> {
        log::info!("formatting {total_sectors} sectors");
        let fs = Self::build(dev, total_sectors);
        fs.free_map.lock().format(&fs.cache);
        Inode::create(ROOT_SECTOR, 0, &fs)?;
        fs.cache.flush_all();
        Ok(fs)
    }

    /// 挂载已格式化的设备。容量在格式化时已固定，由调用方给出；
    /// 根inode的魔数即挂载合法性校验。
    pub fn mount(dev: Arc<dyn BlockDevice>, total_sectors: usize) -> Result<Arc<Self>, Error> {
        let fs = Self::build(dev, total_sectors);
        let root: InodeDisk = fs.cache.read_obj(ROOT_SECTOR);
        if !root.is_valid() {
            return Err(Error::Corrupted);
        }
        log::info!("mounted, {total_sectors} sectors");
        Ok(fs)
    }

    /// 卸载前把全部脏扇区落盘
    pub fn unmount(&self) {
        self.cache.flush_all();
        log::info!("unmounted");
    }

    fn build(dev: Arc<dyn BlockDevice>, total_sectors: usize) -> Arc<Self> {
        Arc::new(Self {
            cache: SectorCache::new(dev),
            free_map: Mutex::new(FreeMap::new(total_sectors)),
            inodes: InodeTable::new(),
            structural: Mutex::new(()),
        })
    }

    /// 打开根目录；引导上下文以它作为初始当前目录
    pub fn open_root(&self) -> Result<Directory, Error> {
        Ok(Directory::open(self.open_inode(ROOT_SECTOR)?))
    }

    #[inline]
    pub fn open_inode(&self, sector: SectorId) -> Result<Arc<Inode>, Error> {
        self.inodes.open(sector, self)
    }

    #[inline]
    pub fn close_inode(&self, inode: Arc<Inode>) {
        self.inodes.close(inode, self);
    }

    #[inline]
    pub fn close_dir(&self, dir: Directory) {
        self.close_inode(dir.into_inode());
    }

    #[inline]
    pub fn close_file(&self, file: File) {
        self.close_inode(file.into_inode());
    }

    #[inline]
    pub(crate) fn cache(&self) -> &SectorCache {
        &self.cache
    }

    #[inline]
    pub(crate) fn free_map(&self) -> &Mutex<FreeMap> {
        &self.free_map
    }
}

/// 路径解析：从锚点（绝对路径为根，否则为调用方的当前目录）
/// 逐组件行走目录树
impl TierFileSystem {
    pub fn exists(&self, cwd: &Directory, path: &str) -> bool {
        self.walk(cwd, path).is_ok()
    }

    /// 终点是否为目录；空的剩余路径指向锚点自身，恒为目录
    pub fn is_directory(&self, cwd: &Directory, path: &str) -> bool {
        matches!(self.walk(cwd, path), Ok((_, true)))
    }

    /// 终点inode的扇区号，作为打开、创建、删除的操作数
    pub fn resolve_sector(&self, cwd: &Directory, path: &str) -> Result<SectorId, Error> {
        self.walk(cwd, path).map(|(sector, _)| sector)
    }

    /// 逐组件行走，返回终点的（扇区，是否目录）。
    /// 任一组件缺失、中途撞上文件、或经过已移除的inode都报错。
    fn walk(&self, cwd: &Directory, path: &str) -> Result<(SectorId, bool), Error> {
        if !path.is_valid() {
            return Err(Error::NameTooLong);
        }

        let mut dir = if path.is_absolute() {
            self.open_root()?
        } else {
            if cwd.inode().is_removed() {
                return Err(Error::NotFound);
            }
            Directory::open(self.open_inode(cwd.sector())?)
        };

        let mut cmps = components(path).peekable();
        while let Some(cmp) = cmps.next() {
            if let Some(entry) = dir.lookup(cmp, true, self)? {
                // 目录：换乘继续深入
                self.close_dir(dir);
                let inode = self.open_inode(entry.sector())?;
                if inode.is_removed() {
                    self.close_inode(inode);
                    return Err(Error::NotFound);
                }
                dir = Directory::open(inode);
            } else if let Some(entry) = dir.lookup(cmp, false, self)? {
                self.close_dir(dir);
                if cmps.peek().is_some() {
                    // 文件出现在中间组件
                    return Err(Error::NotADirectory);
                }

                let inode = self.open_inode(entry.sector())?;
                let removed = inode.is_removed();
                self.close_inode(inode);
                if removed {
                    return Err(Error::NotFound);
                }
                return Ok((entry.sector(), false));
            } else {
                self.close_dir(dir);
                return Err(Error::NotFound);
            }
        }

        let sector = dir.sector();
        self.close_dir(dir);
        Ok((sector, true))
    }

    /// 行走到目录并打开；终点是文件则拒绝
    fn walk_directory(&self, cwd: &Directory, path: &str) -> Result<Directory, Error> {
        match self.walk(cwd, path)? {
            (sector, true) => Ok(Directory::open(self.open_inode(sector)?)),
            (_, false) => Err(Error::NotADirectory),
        }
    }
}

/// 系统调用层消费的上行接口
impl TierFileSystem {
    /// 创建`initial_size`字节的文件（清零）
    pub fn create(&self, cwd: &Directory, path: &str, initial_size: usize) -> Result<(), Error> {
        let _guard = self.structural.lock();
        self.create_node(cwd, path, initial_size, false)
    }

    /// 创建空目录
    pub fn make_directory(&self, cwd: &Directory, path: &str) -> Result<(), Error> {
        let _guard = self.structural.lock();
        self.create_node(cwd, path, 0, true)
    }

    /// 打开文件；目录不可作为文件打开
    pub fn open(&self, cwd: &Directory, path: &str) -> Result<File, Error> {
        match self.walk(cwd, path)? {
            (_, true) => Err(Error::IsADirectory),
            (sector, false) => Ok(File::new(self.open_inode(sector)?)),
        }
    }

    /// 打开目录，供目录列举与当前目录切换使用
    pub fn open_directory(&self, cwd: &Directory, path: &str) -> Result<Directory, Error> {
        self.walk_directory(cwd, path)
    }

    /// 删除路径指向的文件或空目录。
    /// 叶名同时命中文件与目录时文件优先；
    /// 目录要求除`.`与`..`外为空。
    pub fn remove(&self, cwd: &Directory, path: &str) -> Result<(), Error> {
        let _guard = self.structural.lock();

        if !path.is_valid() {
            return Err(Error::NameTooLong);
        }
        let (parent, leaf) = path.parent_file().ok_or(Error::InvalidName)?;
        let parent = self.walk_directory(cwd, parent)?;

        let result = self.remove_leaf(&parent, leaf);
        self.close_dir(parent);
        result
    }

    /// 切换调用方的当前目录，成功时关闭旧句柄
    pub fn change_directory(&self, cwd: &mut Directory, path: &str) -> Result<(), Error> {
        let _guard = self.structural.lock();

        let new_dir = self.walk_directory(cwd, path)?;
        let old = core::mem::replace(cwd, new_dir);
        self.close_dir(old);
        Ok(())
    }

    /// 列举目录的下一项
    #[inline]
    pub fn read_directory(&self, dir: &mut Directory) -> Result<Option<String>, Error> {
        dir.read_next(self)
    }

    pub fn stat(&self, cwd: &Directory, path: &str) -> Result<Stat, Error> {
        let (sector, is_dir) = self.walk(cwd, path)?;
        let kind = if is_dir { StatKind::DIR } else { StatKind::FILE };

        let inode = self.open_inode(sector)?;
        let stat = Stat::new(
            usize::from(sector) as u64,
            kind,
            inode.length(),
            inode.blocks(),
        );
        self.close_inode(inode);
        Ok(stat)
    }
}

impl TierFileSystem {
    fn create_node(
        &self,
        cwd: &Directory,
        path: &str,
        size: usize,
        is_dir: bool,
    ) -> Result<(), Error> {
        if !path.is_valid() {
            return Err(Error::NameTooLong);
        }
        let (parent, leaf) = path.parent_file().ok_or(Error::InvalidName)?;
        let parent = self.walk_directory(cwd, parent)?;

        let Some(sector) = self.free_map.lock().allocate(&self.cache, 1) else {
            self.close_dir(parent);
            return Err(Error::NoSpace);
        };

        if let Err(e) = Inode::create(sector, size, self) {
            // 扩展已内部回滚，只需归还头部扇区
            self.close_dir(parent);
            self.free_map.lock().release(&self.cache, sector, 1);
            return Err(e);
        }

        if let Err(e) = parent.add(leaf, sector, is_dir, self) {
            self.close_dir(parent);
            // 头部已落盘，连同索引树一并回收
            if let Ok(inode) = self.open_inode(sector) {
                inode.mark_removed();
                self.close_inode(inode);
            }
            return Err(e);
        }

        self.close_dir(parent);
        Ok(())
    }

    fn remove_leaf(&self, parent: &Directory, leaf: &str) -> Result<(), Error> {
        if let Some(entry) = parent.lookup(leaf, false, self)? {
            return parent.remove(entry.sector(), self);
        }

        let entry = parent.lookup(leaf, true, self)?.ok_or(Error::NotFound)?;
        let dir = Directory::open(self.open_inode(entry.sector())?);
        let count = dir.count(self);
        self.close_dir(dir);
        if count? != 2 {
            return Err(Error::DirectoryNotEmpty);
        }

        parent.remove(entry.sector(), self)
    }
}
