use std::mem;

use tier_fs::{DirEntry, InodeDisk, SECTOR_SIZE};

#[test]
fn layout() {
    assert_eq!(SECTOR_SIZE, mem::size_of::<InodeDisk>());
    assert_eq!(DirEntry::SIZE, mem::size_of::<DirEntry>());
}
