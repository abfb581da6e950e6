//! # 目录层
//!
//! 目录就是一个inode，其字节流为定长目录项的平铺序列。
//! 查找、删除、计数都是按步长的线性扫描；
//! 插入优先复用逻辑删除留下的空槽，没有才在流末追加。
//!
//! 同名的文件与目录互不冲突：目录项以（名字, 目录标志）成对定位，
//! 两个命名空间由标志区分。

use alloc::string::{String, ToString};
use alloc::sync::Arc;

use vfs::Error;

use crate::TierFileSystem;
use crate::block_cache::SectorId;
use crate::inode::Inode;
use crate::layout::{DirEntry, NAME_MAX};

/// 目录：目录inode上的游标封装，不拥有目录项
#[derive(Debug)]
pub struct Directory {
    inode: Arc<Inode>,
    /// read_next的游标（字节偏移）
    pos: usize,
}

impl Directory {
    #[inline]
    pub fn open(inode: Arc<Inode>) -> Self {
        Self { inode, pos: 0 }
    }

    #[inline]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    #[inline]
    pub fn sector(&self) -> SectorId {
        self.inode.sector()
    }

    #[inline]
    pub(crate) fn into_inode(self) -> Arc<Inode> {
        self.inode
    }

    /// 返回首个名字与目录标志都匹配的在用目录项
    pub fn lookup(
        &self,
        name: &str,
        want_dir: bool,
        fs: &TierFileSystem,
    ) -> Result<Option<DirEntry>, Error> {
        let mut entry = DirEntry::default();

        for offset in (0..self.inode.length() as usize).step_by(DirEntry::SIZE) {
            assert_eq!(
                self.inode.read_at(offset, entry.as_bytes_mut(), fs)?,
                DirEntry::SIZE
            );
            if entry.in_use() && entry.is_dir() == want_dir && entry.name() == name {
                return Ok(Some(entry));
            }
        }

        Ok(None)
    }

    /// 添加一个目录项。名字为空、过长或与既有项冲突都会被拒绝，
    /// 且不产生任何部分修改。
    /// 新目录先在自己的流里合成`.`与`..`，再挂进本目录。
    pub fn add(
        &self,
        name: &str,
        sector: SectorId,
        is_dir: bool,
        fs: &TierFileSystem,
    ) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::InvalidName);
        }
        if name.len() > NAME_MAX {
            return Err(Error::NameTooLong);
        }
        // 同名检查覆盖两个命名空间
        if self.lookup(name, false, fs)?.is_some() || self.lookup(name, true, fs)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        if is_dir {
            let child = fs.open_inode(sector)?;
            let dots = append_entry(&child, DirEntry::new(".", sector, true), fs)
                .and_then(|()| append_entry(&child, DirEntry::new("..", self.sector(), true), fs));
            fs.close_inode(child);
            dots?;
        }

        let offset = self.free_slot(fs)?;
        let entry = DirEntry::new(name, sector, is_dir);
        self.inode.write_at(offset, entry.as_bytes(), fs)?;
        Ok(())
    }

    /// 逻辑删除指向`target`的目录项，并把目标inode标记为已移除；
    /// 物理回收推迟到它最后一次被关闭。
    pub fn remove(&self, target: SectorId, fs: &TierFileSystem) -> Result<(), Error> {
        let mut entry = DirEntry::default();

        for offset in (0..self.inode.length() as usize).step_by(DirEntry::SIZE) {
            assert_eq!(
                self.inode.read_at(offset, entry.as_bytes_mut(), fs)?,
                DirEntry::SIZE
            );
            if entry.in_use() && entry.sector() == target {
                entry.mark_free();
                self.inode.write_at(offset, entry.as_bytes(), fs)?;

                let inode = fs.open_inode(target)?;
                inode.mark_removed();
                fs.close_inode(inode);
                return Ok(());
            }
        }

        Err(Error::NotFound)
    }

    /// 在用目录项总数，`.`与`..`计算在内
    pub fn count(&self, fs: &TierFileSystem) -> Result<usize, Error> {
        let mut entry = DirEntry::default();
        let mut count = 0;

        for offset in (0..self.inode.length() as usize).step_by(DirEntry::SIZE) {
            assert_eq!(
                self.inode.read_at(offset, entry.as_bytes_mut(), fs)?,
                DirEntry::SIZE
            );
            if entry.in_use() {
                count += 1;
            }
        }

        Ok(count)
    }

    /// 迭代下一个在用目录项的名字，跳过`.`与`..`
    pub fn read_next(&mut self, fs: &TierFileSystem) -> Result<Option<String>, Error> {
        let mut entry = DirEntry::default();
        let length = self.inode.length() as usize;

        while self.pos < length {
            assert_eq!(
                self.inode.read_at(self.pos, entry.as_bytes_mut(), fs)?,
                DirEntry::SIZE
            );
            self.pos += DirEntry::SIZE;

            if entry.in_use() && entry.name() != "." && entry.name() != ".." {
                return Ok(Some(entry.name().to_string()));
            }
        }

        Ok(None)
    }

    #[inline]
    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl Directory {
    /// 首个空闲槽位的偏移；没有空槽就指向流末
    fn free_slot(&self, fs: &TierFileSystem) -> Result<usize, Error> {
        let mut entry = DirEntry::default();
        let length = self.inode.length() as usize;

        for offset in (0..length).step_by(DirEntry::SIZE) {
            assert_eq!(
                self.inode.read_at(offset, entry.as_bytes_mut(), fs)?,
                DirEntry::SIZE
            );
            if !entry.in_use() {
                return Ok(offset);
            }
        }

        Ok(length)
    }
}

/// 在目录流末尾追加一个目录项，`.`与`..`的合成也走此路径
fn append_entry(inode: &Arc<Inode>, entry: DirEntry, fs: &TierFileSystem) -> Result<(), Error> {
    let end = inode.length() as usize;
    inode.write_at(end, entry.as_bytes(), fs)?;
    Ok(())
}
