//! # 文件句柄层
//!
//! 系统调用层持有的打开文件：inode句柄加读写位置。
//! 每次打开得到独立游标，底层inode仍经打开表去重共享。

use alloc::sync::Arc;

use vfs::{Error, Stat, StatKind};

use crate::TierFileSystem;
use crate::inode::Inode;

#[derive(Debug)]
pub struct File {
    inode: Arc<Inode>,
    /// 文件内的读写位置
    pos: usize,
}

impl File {
    #[inline]
    pub(crate) fn new(inode: Arc<Inode>) -> Self {
        Self { inode, pos: 0 }
    }

    #[inline]
    pub(crate) fn into_inode(self) -> Arc<Inode> {
        self.inode
    }

    /// 从当前位置读取。只在抵达流末时短读，其余情况足额返回。
    pub fn read(&mut self, buf: &mut [u8], fs: &TierFileSystem) -> Result<usize, Error> {
        let length = self.inode.length() as usize;
        let n = buf.len().min(length.saturating_sub(self.pos));
        let read = self.inode.read_at(self.pos, &mut buf[..n], fs)?;
        self.pos += read;
        Ok(read)
    }

    /// 在当前位置写入，越过末尾自动扩展；写禁止期间返回0
    pub fn write(&mut self, buf: &[u8], fs: &TierFileSystem) -> Result<usize, Error> {
        let written = self.inode.write_at(self.pos, buf, fs)?;
        self.pos += written;
        Ok(written)
    }

    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn tell(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn length(&self) -> u64 {
        self.inode.length()
    }

    pub fn stat(&self) -> Stat {
        Stat::new(
            usize::from(self.inode.sector()) as u64,
            StatKind::FILE,
            self.inode.length(),
            self.inode.blocks(),
        )
    }

    /// 执行子系统在运行可执行文件期间禁止写入
    #[inline]
    pub fn deny_write(&self) {
        self.inode.deny_write();
    }

    #[inline]
    pub fn allow_write(&self) {
        self.inode.allow_write();
    }
}
