#![no_std]

extern crate alloc;

/* tier-fs 的整体架构，自上而下 */

// 文件句柄层：系统调用层消费的读写游标
mod file;

// 文件系统管理层：挂载与格式化、路径行走、上层文件操作
mod tfs;

// 路径处理：斜杠分隔路径的校验与拆分
mod path;

// 目录层：目录inode字节流上的定长目录项
mod directory;

// 索引节点层：打开表去重的inode句柄，随机偏移读写
mod inode;

// 磁盘数据结构层：inode头部、目录项、空闲位图
mod layout;

// 扇区缓存层：内存上的磁盘扇区缓存
mod block_cache;

pub use self::{
    block_cache::{SectorCache, SectorId},
    directory::Directory,
    file::File,
    inode::Inode,
    layout::{DirEntry, IndexRegion, InodeDisk, MAX_DATA_SECTORS, MAX_FILE_SIZE, NAME_MAX},
    path::{Path, components},
    tfs::TierFileSystem,
};

/// inode头部的魔数
pub const INODE_MAGIC: u32 = 0x3b54_4653;
/// 扇区大小（字节），所有磁盘结构恰为一个扇区
pub const SECTOR_SIZE: usize = 512;
/// 根目录inode所在的固定扇区
pub const ROOT_SECTOR: SectorId = SectorId::new(0);

pub(crate) type SectorBuf = [u8; SECTOR_SIZE];
