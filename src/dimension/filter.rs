//! 过滤状态
//!
//! 每个维度持有一个过滤器：不过滤 / 半开区间 [lo, hi) / 显式键集合。
//! 替换过滤器只改变记录的"存活"归属，永不改动维度索引。

use std::collections::BTreeSet;
use std::fmt;

use super::key::Key;

/// 维度过滤器
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    /// 不过滤
    #[default]
    All,
    /// 半开区间 [lo, hi)
    Range { lo: Key, hi: Key },
    /// 显式键集合
    Exact(BTreeSet<Key>),
}

impl Filter {
    pub fn range(lo: impl Into<Key>, hi: impl Into<Key>) -> Self {
        Filter::Range {
            lo: lo.into(),
            hi: hi.into(),
        }
    }

    pub fn exact<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Filter::Exact(keys.into_iter().map(Into::into).collect())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    /// 单个键是否满足过滤条件
    pub fn accepts(&self, key: &Key) -> bool {
        match self {
            Filter::All => true,
            Filter::Range { lo, hi } => key >= lo && key < hi,
            Filter::Exact(keys) => keys.contains(key),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => f.write_str("all"),
            Filter::Range { lo, hi } => write!(f, "[{}, {})", lo, hi),
            Filter::Exact(keys) => {
                let keys: Vec<String> = keys.iter().map(Key::to_string).collect();
                write!(f, "{{{}}}", keys.join(", "))
            }
        }
    }
}
