use enumflags2::bitflags;

#[repr(C)]
#[derive(Debug, Default)]
pub struct Stat {
    /// Inode number（即inode头部所在扇区）
    pub inode: u64,
    pub kind: StatKind,
    /// 文件大小（字节）
    pub size: u64,
    /// 占据的扇区数，含索引块
    pub blocks: u64,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}

impl Stat {
    #[inline]
    pub fn new(inode: u64, kind: StatKind, size: u64, blocks: u64) -> Self {
        Self {
            inode,
            kind,
            size,
            blocks,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == StatKind::DIR
    }
}
