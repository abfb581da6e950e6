//! # 磁盘数据结构层
//!
//! 表示磁盘文件系统的数据结构，每个结构恰为一个扇区。

mod bitmap;
mod dir_entry;
mod inode;

pub use self::{
    dir_entry::{DirEntry, NAME_MAX},
    inode::{IndexRegion, InodeDisk, MAX_DATA_SECTORS, MAX_FILE_SIZE},
};

pub(crate) use self::bitmap::FreeMap;
