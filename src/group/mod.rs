//! 分组聚合模块
//!
//! @yutiansut @quantaxis
//!
//! 分组 = 维度上按键划分的聚合值，由归约器增量维护：
//! - 归约器 (Reducer) - initial / add / remove 三元组
//! - 基础归约器 (reducers) - 计数、求和、闭包三元组
//! - 复合归约器 (composite) - 月度指数均值、年度表现统计
//!
//! 归约器契约：`remove(add(acc, r), r) == acc`。引擎不在运行时校验该契约，
//! 违反契约会静默破坏聚合结果，因此每个归约器都必须有对应的往返测试。

pub mod composite;
pub mod reducers;

pub use composite::*;
pub use reducers::*;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::Serialize;

use crate::dimension::{DimensionId, Key};
use crate::record::Record;

// ═══════════════════════════════════════════════════════════════════════════
// 归约器
// ═══════════════════════════════════════════════════════════════════════════

/// 增量归约器
///
/// 设计原则:
/// 1. 累加器是纯数据：按值传入，按值返回
/// 2. add / remove 互逆：先 add 再 remove 同一记录必须回到原累加器
/// 3. 净效果与顺序无关：任意 add/remove 历史的结果等于对当前集合的一次 fold
pub trait Reducer: Send + Sync + 'static {
    /// 累加器类型
    type Acc: Clone + Debug + Serialize + Send + Sync + 'static;

    /// 初始累加器
    fn initial(&self) -> Self::Acc;

    /// 记录进入集合
    fn add(&self, acc: Self::Acc, record: &Record) -> Self::Acc;

    /// 记录离开集合
    fn remove(&self, acc: Self::Acc, record: &Record) -> Self::Acc;

    /// 对一组记录从头 fold
    fn reduce_all<'a, I>(&self, records: I) -> Self::Acc
    where
        Self: Sized,
        I: IntoIterator<Item = &'a Record>,
    {
        records
            .into_iter()
            .fold(self.initial(), |acc, r| self.add(acc, r))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 分组选项
// ═══════════════════════════════════════════════════════════════════════════

/// 分组选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupOptions {
    /// 自过滤：计算时忽略所属维度自身的过滤器
    ///
    /// 用于兼作过滤控件的分组 (例如可刷选的直方图)，选中某个键时其余键仍然可见。
    pub exclude_own_filter: bool,
}

impl GroupOptions {
    pub fn self_filtering() -> Self {
        Self {
            exclude_own_filter: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 类型擦除的分组状态
// ═══════════════════════════════════════════════════════════════════════════

/// 分组状态 (引擎按 trait 对象持有不同累加器类型的分组)
pub(crate) trait GroupState: Send + Sync {
    /// 为键建立初始累加器
    fn insert_key(&mut self, key: &Key);

    fn add(&mut self, key: &Key, record: &Record);

    fn remove(&mut self, key: &Key, record: &Record);

    /// `&BTreeMap<Key, Acc>`，供类型化读取向下转型
    fn values_any(&self) -> &dyn Any;

    /// 累加器类型名 (错误信息用)
    fn acc_type_name(&self) -> &'static str;

    fn entries_json(&self) -> serde_json::Result<Vec<(Key, serde_json::Value)>>;

    fn len(&self) -> usize;
}

/// 归约器驱动的分组状态
pub(crate) struct ReducerGroup<R: Reducer> {
    reducer: R,
    values: BTreeMap<Key, R::Acc>,
}

impl<R: Reducer> ReducerGroup<R> {
    pub(crate) fn new(reducer: R) -> Self {
        Self {
            reducer,
            values: BTreeMap::new(),
        }
    }
}

impl<R: Reducer> GroupState for ReducerGroup<R> {
    fn insert_key(&mut self, key: &Key) {
        if !self.values.contains_key(key) {
            self.values.insert(key.clone(), self.reducer.initial());
        }
    }

    fn add(&mut self, key: &Key, record: &Record) {
        match self.values.get_mut(key) {
            Some(slot) => *slot = self.reducer.add(slot.clone(), record),
            None => {
                let acc = self.reducer.add(self.reducer.initial(), record);
                self.values.insert(key.clone(), acc);
            }
        }
    }

    fn remove(&mut self, key: &Key, record: &Record) {
        if let Some(slot) = self.values.get_mut(key) {
            *slot = self.reducer.remove(slot.clone(), record);
        }
    }

    fn values_any(&self) -> &dyn Any {
        &self.values
    }

    fn acc_type_name(&self) -> &'static str {
        std::any::type_name::<R::Acc>()
    }

    fn entries_json(&self) -> serde_json::Result<Vec<(Key, serde_json::Value)>> {
        self.values
            .iter()
            .map(|(k, v)| Ok((k.clone(), serde_json::to_value(v)?)))
            .collect()
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

/// 已注册分组
pub(crate) struct Group {
    pub(crate) name: String,
    /// None 表示 group-all (全体存活记录的单一聚合)
    pub(crate) dimension: Option<DimensionId>,
    pub(crate) options: GroupOptions,
    /// 计算时忽略的过滤位
    pub(crate) ignore_mask: u64,
    pub(crate) state: Box<dyn GroupState>,
}

impl Group {
    pub(crate) fn new(
        name: String,
        dimension: Option<DimensionId>,
        options: GroupOptions,
        state: Box<dyn GroupState>,
    ) -> Self {
        let ignore_mask = match dimension {
            Some(d) if options.exclude_own_filter => 1u64 << d,
            _ => 0,
        };
        Self {
            name,
            dimension,
            options,
            ignore_mask,
            state,
        }
    }

    /// 在给定过滤掩码下，记录是否计入本分组
    #[inline]
    pub(crate) fn observes(&self, mask: u64) -> bool {
        mask & !self.ignore_mask == 0
    }

    /// 该过滤位的变化是否与本分组相关
    #[inline]
    pub(crate) fn is_affected_by(&self, bit: u64) -> bool {
        self.ignore_mask & bit == 0
    }
}
