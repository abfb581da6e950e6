//! 斜杠分隔路径的校验与拆分。
//! 行走本身需要文件系统配合，见[`TierFileSystem`]。
//!
//! [`TierFileSystem`]: crate::TierFileSystem

use crate::layout::NAME_MAX;

pub trait Path {
    /// Returns `true` if the `Path` is absolute, i.e., if it is
    /// independent of the current directory.
    fn is_absolute(&self) -> bool;

    /// 每个非空组件的长度都不得超过[`NAME_MAX`]；
    /// 连续分隔符产生的空组件按无操作容忍，不视为非法。
    fn is_valid(&self) -> bool;

    /// 返回路径的`(父目录, 叶名)`：叶名为最后一个非空组件，
    /// 父目录为叶名之前的全部内容。
    ///
    /// 根目录与空路径无叶可拆，返回[`None`]。
    fn parent_file(&self) -> Option<(&Self, &Self)>;

    fn is_relative(&self) -> bool {
        !self.is_absolute()
    }
}

impl Path for str {
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn is_valid(&self) -> bool {
        components(self).all(|cmp| cmp.len() <= NAME_MAX)
    }

    fn parent_file(&self) -> Option<(&Self, &Self)> {
        let trimmed = self.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }

        match trimmed.rsplit_once('/') {
            // 单组件的相对路径：父目录即当前目录
            None => Some(("", trimmed)),
            Some(("", leaf)) => Some(("/", leaf)),
            Some(pair) => Some(pair),
        }
    }
}

/// 迭代路径的非空组件
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|cmp| !cmp.is_empty())
}
