//! 过滤聚合引擎
//!
//! @yutiansut @quantaxis
//!
//! 核心设计理念：
//! - 记录存储只加载一次，维度与分组在其上只读共享
//! - 每条记录维护一个过滤掩码 (每个维度一位)，掩码为 0 即"存活"
//! - 过滤切换只遍历该维度选中集合的差集，按 add/remove 增量更新受影响分组
//! - 复杂度 O(|delta| × 受影响分组数)，不对全量数据重新 fold
//! - 读取分组是纯读操作，所有聚合维护都发生在 `apply_filter` 内
//!
//! 单线程、同步执行：调用方负责串行化所有写操作。

pub mod subscription;

pub use subscription::{FilterCallback, FilterEvent, SubscriptionId, SubscriptionManager};

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};

use crate::dimension::{Dimension, DimensionId, Filter, Key, MAX_DIMENSIONS};
use crate::group::{
    CountReducer, Group, GroupOptions, GroupState, Reducer, ReducerGroup, SumReducer,
};
use crate::record::{Record, RecordId, RecordStore};
use crate::{FilterError, Result};

/// group-all 分组内部使用的唯一键
const GROUP_ALL_KEY: Key = Key::Int(0);

/// 过滤聚合引擎
pub struct Engine {
    store: RecordStore,
    dimensions: Vec<Dimension>,
    dimension_names: HashMap<String, DimensionId>,
    groups: Vec<Group>,
    group_names: HashMap<String, usize>,
    /// record_id → 过滤掩码 (置位 = 被该维度过滤掉)
    masks: Vec<u64>,
    live_count: usize,
    /// 每次 apply_filter 自增，派生视图据此判断缓存是否过期
    generation: u64,
    subscriptions: SubscriptionManager,
}

impl Engine {
    pub fn new(store: RecordStore) -> Self {
        let total = store.size();
        Self {
            store,
            dimensions: Vec::new(),
            dimension_names: HashMap::new(),
            groups: Vec::new(),
            group_names: HashMap::new(),
            masks: vec![0; total],
            live_count: total,
            generation: 0,
            subscriptions: SubscriptionManager::new(),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    // ═══════════════════════════════════════════════════════════════════════
    // 注册
    // ═══════════════════════════════════════════════════════════════════════

    /// 注册维度 (键函数必须纯且对每条记录都有定义)
    pub fn register_dimension<K, F>(&mut self, name: &str, key_fn: F) -> Result<DimensionId>
    where
        K: Into<Key>,
        F: Fn(&Record) -> K,
    {
        if self.dimension_names.contains_key(name) {
            return Err(FilterError::DuplicateDimensionError(name.to_string()));
        }
        let id = self.dimensions.len();
        if id >= MAX_DIMENSIONS {
            return Err(FilterError::DimensionLimitError(MAX_DIMENSIONS));
        }

        let dimension = Dimension::new(id, name, self.store.records(), |r| key_fn(r).into());
        log::info!(
            "Dimension registered: {} ({} distinct keys)",
            name,
            dimension.distinct_keys().len()
        );

        self.dimensions.push(dimension);
        self.dimension_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// 注册分组：对当前存活集合做一次完整 fold，之后只做增量维护
    pub fn register_group<R: Reducer>(
        &mut self,
        name: &str,
        dimension: &str,
        reducer: R,
        options: GroupOptions,
    ) -> Result<()> {
        let dim = self.dimension_id(dimension)?;
        self.insert_group(name, Some(dim), reducer, options)
    }

    /// 注册计数分组 (默认聚合)
    pub fn register_count_group(
        &mut self,
        name: &str,
        dimension: &str,
        options: GroupOptions,
    ) -> Result<()> {
        self.register_group(name, dimension, CountReducer, options)
    }

    /// 注册求和分组
    pub fn register_sum_group<F>(
        &mut self,
        name: &str,
        dimension: &str,
        value: F,
        options: GroupOptions,
    ) -> Result<()>
    where
        F: Fn(&Record) -> f64 + Send + Sync + 'static,
    {
        self.register_group(name, dimension, SumReducer::new(value), options)
    }

    /// 注册 group-all：全体存活记录上的单一聚合
    pub fn register_group_all<R: Reducer>(&mut self, name: &str, reducer: R) -> Result<()> {
        self.insert_group(name, None, reducer, GroupOptions::default())
    }

    fn insert_group<R: Reducer>(
        &mut self,
        name: &str,
        dimension: Option<DimensionId>,
        reducer: R,
        options: GroupOptions,
    ) -> Result<()> {
        if self.group_names.contains_key(name) {
            return Err(FilterError::DuplicateGroupError(name.to_string()));
        }

        let mut state = Box::new(ReducerGroup::new(reducer));
        match dimension {
            Some(d) => {
                for key in self.dimensions[d].distinct_keys() {
                    state.insert_key(key);
                }
            }
            None => state.insert_key(&GROUP_ALL_KEY),
        }

        let mut group = Group::new(name.to_string(), dimension, options, state);
        for record in self.store.iter() {
            if group.observes(self.masks[record.id]) {
                let key = group_key(&self.dimensions, group.dimension, record.id);
                group.state.add(key, record);
            }
        }

        log::info!(
            "Group registered: {} ({} keys, self-filtering: {})",
            name,
            group.state.len(),
            options.exclude_own_filter
        );

        self.group_names.insert(name.to_string(), self.groups.len());
        self.groups.push(group);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // 过滤
    // ═══════════════════════════════════════════════════════════════════════

    /// 替换维度过滤器并传播到所有分组
    pub fn apply_filter(&mut self, dimension: &str, filter: Filter) -> Result<()> {
        self.replace_filter(dimension, filter).map(|_| ())
    }

    /// 区间过滤 [lo, hi)，返回旧过滤器
    pub fn filter_range(
        &mut self,
        dimension: &str,
        lo: impl Into<Key>,
        hi: impl Into<Key>,
    ) -> Result<Filter> {
        self.replace_filter(dimension, Filter::range(lo, hi))
    }

    /// 键集合过滤，返回旧过滤器
    pub fn filter_exact<I, K>(&mut self, dimension: &str, keys: I) -> Result<Filter>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        self.replace_filter(dimension, Filter::exact(keys))
    }

    /// 清除过滤，返回旧过滤器
    pub fn filter_all(&mut self, dimension: &str) -> Result<Filter> {
        self.replace_filter(dimension, Filter::All)
    }

    /// 清除所有维度的过滤
    pub fn reset_filters(&mut self) -> Result<()> {
        let active: Vec<String> = self
            .dimensions
            .iter()
            .filter(|d| !d.filter().is_all())
            .map(|d| d.name().to_string())
            .collect();
        for name in active {
            self.replace_filter(&name, Filter::All)?;
        }
        Ok(())
    }

    pub fn current_filter(&self, dimension: &str) -> Result<&Filter> {
        let id = self.dimension_id(dimension)?;
        Ok(self.dimensions[id].filter())
    }

    fn replace_filter(&mut self, dimension: &str, filter: Filter) -> Result<Filter> {
        let dim = self.dimension_id(dimension)?;
        let (previous, delta) = self.dimensions[dim].replace_filter(filter);

        let Engine {
            store,
            dimensions,
            groups,
            masks,
            live_count,
            ..
        } = self;

        let dimensions = &*dimensions;
        let dimension = &dimensions[dim];
        let bit = dimension.bit();
        // 自过滤分组忽略本维度，整个跳过
        let affected: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.is_affected_by(bit))
            .map(|(i, _)| i)
            .collect();

        for position in delta.exited.iter().flat_map(|r| r.clone()) {
            let id = dimension.index().record_at(position);
            let old = masks[id];
            debug_assert_eq!(old & bit, 0);
            let new = old | bit;
            masks[id] = new;
            if old == 0 {
                *live_count -= 1;
            }

            let record = store.at(id);
            for &gi in &affected {
                let group = &mut groups[gi];
                if group.observes(old) && !group.observes(new) {
                    let key = group_key(dimensions, group.dimension, id);
                    group.state.remove(key, record);
                }
            }
        }

        for position in delta.entered.iter().flat_map(|r| r.clone()) {
            let id = dimension.index().record_at(position);
            let old = masks[id];
            debug_assert_ne!(old & bit, 0);
            let new = old & !bit;
            masks[id] = new;
            if new == 0 {
                *live_count += 1;
            }

            let record = store.at(id);
            for &gi in &affected {
                let group = &mut groups[gi];
                if !group.observes(old) && group.observes(new) {
                    let key = group_key(dimensions, group.dimension, id);
                    group.state.add(key, record);
                }
            }
        }

        self.generation += 1;

        let event = FilterEvent {
            dimension: self.dimensions[dim].name().to_string(),
            generation: self.generation,
            live_count: self.live_count,
            entered: delta.entered_len(),
            exited: delta.exited_len(),
        };
        log::debug!(
            "Filter applied on {}: {} -> {} (exited {}, entered {}, {} groups, live {})",
            event.dimension,
            previous,
            self.dimensions[dim].filter(),
            event.exited,
            event.entered,
            affected.len(),
            event.live_count
        );

        self.subscriptions.notify(&event);
        Ok(previous)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // 读取
    // ═══════════════════════════════════════════════════════════════════════

    /// 读取分组快照 (按键升序)
    pub fn read_group<A: Clone + 'static>(&self, name: &str) -> Result<Vec<(Key, A)>> {
        let values = self.typed_values::<A>(name)?;
        Ok(values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// 读取分组中单个键的聚合值
    pub fn group_value<A: Clone + 'static>(&self, name: &str, key: &Key) -> Result<Option<A>> {
        Ok(self.typed_values::<A>(name)?.get(key).cloned())
    }

    /// 读取 group-all 的聚合值
    pub fn read_group_all<A: Clone + 'static>(&self, name: &str) -> Result<A> {
        self.typed_values::<A>(name)?
            .values()
            .next()
            .cloned()
            .ok_or_else(|| FilterError::UnknownGroupError(name.to_string()))
    }

    /// 以 JSON 值读取分组 (供渲染层使用，无需知道累加器类型)
    pub fn read_group_json(&self, name: &str) -> Result<Vec<(Key, serde_json::Value)>> {
        self.group(name)?
            .state
            .entries_json()
            .map_err(|e| FilterError::SerializationError(format!("group {}: {}", name, e)))
    }

    fn typed_values<A: 'static>(&self, name: &str) -> Result<&BTreeMap<Key, A>> {
        let group = self.group(name)?;
        group
            .state
            .values_any()
            .downcast_ref::<BTreeMap<Key, A>>()
            .ok_or_else(|| FilterError::AggregateTypeMismatch {
                group: format!("{} ({})", name, group.state.acc_type_name()),
                expected: type_name::<A>(),
            })
    }

    /// 键最大的 n 条存活记录 (降序)
    pub fn top(&self, dimension: &str, n: usize) -> Result<Vec<&Record>> {
        let dim = &self.dimensions[self.dimension_id(dimension)?];
        Ok(dim
            .iter_selected_desc()
            .filter(|&id| self.masks[id] == 0)
            .take(n)
            .map(|id| self.store.at(id))
            .collect())
    }

    /// 键最小的 n 条存活记录 (升序)
    pub fn bottom(&self, dimension: &str, n: usize) -> Result<Vec<&Record>> {
        let dim = &self.dimensions[self.dimension_id(dimension)?];
        Ok(dim
            .iter_selected_asc()
            .filter(|&id| self.masks[id] == 0)
            .take(n)
            .map(|id| self.store.at(id))
            .collect())
    }

    /// 存活记录数
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// 记录总数
    pub fn total_count(&self) -> usize {
        self.store.size()
    }

    pub fn is_live(&self, id: RecordId) -> bool {
        self.masks.get(id).map(|m| *m == 0).unwrap_or(false)
    }

    /// 遍历存活记录 (插入顺序)
    pub fn live_records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.store.iter().filter(move |r| self.masks[r.id] == 0)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.name()).collect()
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.group_names.contains_key(name)
    }

    /// 分组是否为自过滤
    pub fn group_options(&self, name: &str) -> Result<GroupOptions> {
        Ok(self.group(name)?.options)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // 订阅
    // ═══════════════════════════════════════════════════════════════════════

    /// 订阅 "apply_filter 已完成" 通知
    pub fn subscribe(&self, callback: FilterCallback) -> SubscriptionId {
        self.subscriptions.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.unsubscribe(id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // 内部
    // ═══════════════════════════════════════════════════════════════════════

    fn dimension_id(&self, name: &str) -> Result<DimensionId> {
        self.dimension_names
            .get(name)
            .copied()
            .ok_or_else(|| FilterError::UnknownDimensionError(name.to_string()))
    }

    fn group(&self, name: &str) -> Result<&Group> {
        self.group_names
            .get(name)
            .map(|&i| &self.groups[i])
            .ok_or_else(|| FilterError::UnknownGroupError(name.to_string()))
    }
}

/// 记录在分组中的键
#[inline]
fn group_key(dimensions: &[Dimension], dimension: Option<DimensionId>, id: RecordId) -> &Key {
    match dimension {
        Some(d) => dimensions[d].key_of(id),
        None => &GROUP_ALL_KEY,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 测试
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{YearlyPerformance, YearlyPerformanceReducer};
    use crate::record::RawRow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn engine() -> Engine {
        let rows = vec![
            RawRow::new("01/02/2010", 100.0, 104.0, 10.0),
            RawRow::new("06/01/2010", 104.0, 101.0, 20.0),
            RawRow::new("01/03/2011", 101.0, 108.0, 30.0),
            RawRow::new("09/12/2011", 108.0, 107.0, 40.0),
            RawRow::new("03/05/2012", 107.0, 115.0, 50.0),
            RawRow::new("12/28/2012", 115.0, 110.0, 60.0),
        ];
        let mut engine = Engine::new(RecordStore::load(&rows).unwrap());
        engine.register_dimension("year", |r: &Record| r.year).unwrap();
        engine
            .register_dimension("gain_or_loss", |r: &Record| {
                if r.is_loss() { "Loss" } else { "Gain" }
            })
            .unwrap();
        engine
            .register_count_group("year_count", "year", GroupOptions::default())
            .unwrap();
        engine
            .register_sum_group(
                "volume_by_outcome",
                "gain_or_loss",
                |r: &Record| r.volume,
                GroupOptions::default(),
            )
            .unwrap();
        engine
            .register_count_group(
                "outcome_selector",
                "gain_or_loss",
                GroupOptions::self_filtering(),
            )
            .unwrap();
        engine.register_group_all("all", CountReducer).unwrap();
        engine
    }

    #[test]
    fn test_initial_state() {
        let engine = engine();
        assert_eq!(engine.total_count(), 6);
        assert_eq!(engine.live_count(), 6);
        assert_eq!(
            engine.read_group::<u64>("year_count").unwrap(),
            vec![(Key::Int(2010), 2), (Key::Int(2011), 2), (Key::Int(2012), 2)]
        );
        assert_eq!(engine.read_group_all::<u64>("all").unwrap(), 6);
        assert_eq!(engine.generation(), 0);
    }

    #[test]
    fn test_filter_propagates_to_other_dimensions() {
        let mut engine = engine();
        let previous = engine.filter_range("year", 2011, 2013).unwrap();
        assert!(previous.is_all());

        assert_eq!(engine.live_count(), 4);
        assert_eq!(engine.read_group_all::<u64>("all").unwrap(), 4);
        assert_eq!(
            engine.read_group::<f64>("volume_by_outcome").unwrap(),
            vec![(Key::text("Gain"), 80.0), (Key::text("Loss"), 100.0)]
        );
        // 非自过滤分组同样反映本维度的过滤
        assert_eq!(
            engine.group_value::<u64>("year_count", &Key::Int(2010)).unwrap(),
            Some(0)
        );
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn test_self_filtering_group_keeps_all_bars() {
        let mut engine = engine();
        let before = engine.read_group::<u64>("outcome_selector").unwrap();

        engine.filter_exact("gain_or_loss", ["Loss"]).unwrap();
        assert_eq!(engine.live_count(), 3);
        assert_eq!(engine.read_group::<u64>("outcome_selector").unwrap(), before);

        // 其他维度的过滤依然生效
        engine.filter_exact("year", [2012]).unwrap();
        assert_eq!(
            engine.read_group::<u64>("outcome_selector").unwrap(),
            vec![(Key::text("Gain"), 1), (Key::text("Loss"), 1)]
        );
    }

    #[test]
    fn test_filter_all_restores() {
        let mut engine = engine();
        let baseline = engine.read_group::<f64>("volume_by_outcome").unwrap();

        engine.filter_range("year", 2010, 2011).unwrap();
        engine.filter_exact("year", [2012, 2011]).unwrap();
        engine.filter_exact("gain_or_loss", ["Gain"]).unwrap();
        let previous = engine.filter_all("year").unwrap();
        assert_eq!(previous, Filter::exact([2011, 2012]));
        engine.reset_filters().unwrap();

        assert_eq!(engine.live_count(), 6);
        assert_eq!(engine.read_group::<f64>("volume_by_outcome").unwrap(), baseline);
        assert!(engine.current_filter("gain_or_loss").unwrap().is_all());
    }

    #[test]
    fn test_empty_range_yields_initial_values() {
        let mut engine = engine();
        engine.filter_range("year", 1990, 2000).unwrap();

        assert_eq!(engine.live_count(), 0);
        assert!(engine
            .read_group::<u64>("year_count")
            .unwrap()
            .iter()
            .all(|(_, v)| *v == 0));
        assert!(engine
            .read_group::<f64>("volume_by_outcome")
            .unwrap()
            .iter()
            .all(|(_, v)| *v == 0.0));
        assert_eq!(engine.read_group_all::<u64>("all").unwrap(), 0);
    }

    #[test]
    fn test_group_registered_after_filter() {
        let mut engine = engine();
        engine.filter_exact("gain_or_loss", ["Gain"]).unwrap();
        engine
            .register_group(
                "performance",
                "year",
                YearlyPerformanceReducer,
                GroupOptions::default(),
            )
            .unwrap();

        let perf = engine
            .group_value::<YearlyPerformance>("performance", &Key::Int(2011))
            .unwrap()
            .unwrap();
        assert_eq!(perf.count, 1);
        assert!((perf.abs_gain - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_and_bottom() {
        let mut engine = engine();
        let top: Vec<i32> = engine.top("year", 3).unwrap().iter().map(|r| r.year).collect();
        assert_eq!(top, vec![2012, 2012, 2011]);

        engine.filter_exact("gain_or_loss", ["Loss"]).unwrap();
        let bottom: Vec<usize> = engine.bottom("year", 10).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(bottom, vec![1, 3, 5]);
    }

    #[test]
    fn test_errors() {
        let mut engine = engine();
        assert!(matches!(
            engine.apply_filter("weekday", Filter::All),
            Err(FilterError::UnknownDimensionError(_))
        ));
        assert!(matches!(
            engine.read_group::<u64>("nope"),
            Err(FilterError::UnknownGroupError(_))
        ));
        assert!(matches!(
            engine.read_group::<f64>("year_count"),
            Err(FilterError::AggregateTypeMismatch { .. })
        ));
        assert!(matches!(
            engine.register_dimension("year", |r: &Record| r.year),
            Err(FilterError::DuplicateDimensionError(_))
        ));
        assert!(matches!(
            engine.register_count_group("all", "year", GroupOptions::default()),
            Err(FilterError::DuplicateGroupError(_))
        ));
        assert!(matches!(
            engine.register_count_group("x", "missing", GroupOptions::default()),
            Err(FilterError::UnknownDimensionError(_))
        ));
    }

    #[test]
    fn test_dimension_limit() {
        let mut engine = Engine::new(RecordStore::default());
        for i in 0..MAX_DIMENSIONS {
            engine
                .register_dimension(&format!("d{}", i), |r: &Record| r.year)
                .unwrap();
        }
        assert!(matches!(
            engine.register_dimension("overflow", |r: &Record| r.year),
            Err(FilterError::DimensionLimitError(64))
        ));
    }

    #[test]
    fn test_read_group_json() {
        let engine = engine();
        let json = engine.read_group_json("year_count").unwrap();
        assert_eq!(json[0], (Key::Int(2010), serde_json::json!(2)));
    }

    #[test]
    fn test_subscription_after_propagation() {
        let mut engine = engine();
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let sink = events.clone();
        let counter = calls.clone();
        let id = engine.subscribe(Box::new(move |e: &FilterEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            sink.lock().push(e.clone());
        }));

        engine.filter_range("year", 2012, 2013).unwrap();
        engine.apply_filter("year", Filter::All).unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].live_count, 2);
        assert_eq!(events[0].exited, 4);
        assert_eq!(events[1].entered, 4);
        assert_eq!(events[1].generation, 2);

        assert!(engine.unsubscribe(id));
        engine.filter_all("year").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
