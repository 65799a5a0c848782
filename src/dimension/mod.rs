//! 维度模块
//!
//! @yutiansut @quantaxis
//!
//! 维度 = 命名的键函数 + 排序索引 + 过滤状态：
//! - 键 (key) - 封闭枚举，自然序比较，复合标签按数字前缀排序
//! - 过滤器 (filter) - 不过滤 / 区间 / 键集合
//! - 排序索引 (index) - 区间查询与差集计算
//!
//! 多个维度只读共享同一份记录存储，维度不拥有记录。

pub mod filter;
pub mod index;
pub mod key;

pub use filter::Filter;
pub use index::{difference, selection_len, DimensionIndex, Selection};
pub use key::{Key, OrdinalLabel};

use crate::record::{Record, RecordId};

/// 维度 ID (注册序号，同时决定过滤位)
pub type DimensionId = usize;

/// 过滤位掩码可容纳的最大维度数
pub const MAX_DIMENSIONS: usize = 64;

/// 一次过滤切换的差集 (排序位置区间)
#[derive(Debug, Clone, Default)]
pub struct FilterDelta {
    /// 离开选中集合的位置
    pub exited: Selection,
    /// 进入选中集合的位置
    pub entered: Selection,
}

impl FilterDelta {
    pub fn exited_len(&self) -> usize {
        selection_len(&self.exited)
    }

    pub fn entered_len(&self) -> usize {
        selection_len(&self.entered)
    }

    pub fn is_empty(&self) -> bool {
        self.exited.is_empty() && self.entered.is_empty()
    }
}

/// 维度
#[derive(Debug, Clone)]
pub struct Dimension {
    id: DimensionId,
    name: String,
    index: DimensionIndex,
    filter: Filter,
    selection: Selection,
}

impl Dimension {
    /// 在全部记录上构建维度 (键函数必须纯且全定义)
    pub fn new<F>(id: DimensionId, name: impl Into<String>, records: &[Record], key_fn: F) -> Self
    where
        F: Fn(&Record) -> Key,
    {
        let index = DimensionIndex::build(records, key_fn);
        let selection = index.select(&Filter::All);
        Self {
            id,
            name: name.into(),
            index,
            filter: Filter::All,
            selection,
        }
    }

    pub fn id(&self) -> DimensionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 该维度在记录过滤掩码中的位
    #[inline]
    pub fn bit(&self) -> u64 {
        1u64 << self.id
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn index(&self) -> &DimensionIndex {
        &self.index
    }

    #[inline]
    pub fn key_of(&self, id: RecordId) -> &Key {
        self.index.key_of(id)
    }

    pub fn distinct_keys(&self) -> &[Key] {
        self.index.distinct_keys()
    }

    /// 原子替换过滤器，返回旧过滤器与选中集合差集
    ///
    /// 只更新选中区间，索引本身不变。
    pub fn replace_filter(&mut self, filter: Filter) -> (Filter, FilterDelta) {
        let selection = self.index.select(&filter);
        let delta = FilterDelta {
            exited: difference(&self.selection, &selection),
            entered: difference(&selection, &self.selection),
        };

        self.selection = selection;
        let previous = std::mem::replace(&mut self.filter, filter);
        (previous, delta)
    }

    /// 按键降序遍历选中位置上的记录
    pub fn iter_selected_desc(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.selection
            .iter()
            .rev()
            .flat_map(|r| r.clone().rev())
            .map(move |p| self.index.record_at(p))
    }

    /// 按键升序遍历选中位置上的记录
    pub fn iter_selected_asc(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.selection
            .iter()
            .flat_map(|r| r.clone())
            .map(move |p| self.index.record_at(p))
    }
}
