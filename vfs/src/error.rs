/// 文件系统操作的可恢复失败。
///
/// [`Corrupted`]与[`OutOfBounds`]不属于正常运行时情况：
/// 前者指示磁盘数据不一致（魔数错误、索引指向未分配扇区），
/// 后者指示调用者违反了前置条件（读取越过文件末尾）。
/// 两者都交由调用者处理，而非直接中止内核。
///
/// [`Corrupted`]: Error::Corrupted
/// [`OutOfBounds`]: Error::OutOfBounds
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    AlreadyExists,
    NotFound,
    IsADirectory,
    NotADirectory,
    DirectoryNotEmpty,
    InvalidName,
    NameTooLong,
    NoSpace,
    TooLarge,
    OutOfBounds,
    Corrupted,
}
