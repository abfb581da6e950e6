use tier_fs::{IndexRegion, MAX_DATA_SECTORS, MAX_FILE_SIZE, SECTOR_SIZE};

#[test]
fn direct_region() {
    assert_eq!(IndexRegion::locate(0), Some(IndexRegion::Direct(0)));
    assert_eq!(IndexRegion::locate(9), Some(IndexRegion::Direct(9)));
}

#[test]
fn single_region() {
    assert_eq!(
        IndexRegion::locate(10),
        Some(IndexRegion::Single { slot: 0, entry: 0 })
    );
    assert_eq!(
        IndexRegion::locate(10 + 127),
        Some(IndexRegion::Single {
            slot: 0,
            entry: 127
        })
    );
    assert_eq!(
        IndexRegion::locate(10 + 128),
        Some(IndexRegion::Single { slot: 1, entry: 0 })
    );
    assert_eq!(
        IndexRegion::locate(10 + 10 * 128 - 1),
        Some(IndexRegion::Single {
            slot: 9,
            entry: 127
        })
    );
}

#[test]
fn double_region() {
    let base = 10 + 10 * 128;
    assert_eq!(
        IndexRegion::locate(base),
        Some(IndexRegion::Double { slot: 0, entry: 0 })
    );
    assert_eq!(
        IndexRegion::locate(base + 128),
        Some(IndexRegion::Double { slot: 1, entry: 0 })
    );
    assert_eq!(
        IndexRegion::locate(base + 128 * 128 - 1),
        Some(IndexRegion::Double {
            slot: 127,
            entry: 127
        })
    );
}

#[test]
fn addressing_limit() {
    assert_eq!(MAX_DATA_SECTORS, 10 + 10 * 128 + 128 * 128);
    assert_eq!(MAX_FILE_SIZE, (MAX_DATA_SECTORS * SECTOR_SIZE) as u64);
    assert_eq!(IndexRegion::locate(MAX_DATA_SECTORS), None);
}
