//! 维度排序索引
//!
//! @yutiansut @quantaxis
//!
//! 设计理念：
//! - 每条记录的键只计算一次 (`record_keys[id]`)
//! - `sorted` 保存按键升序排列的记录 ID (同键按 ID 升序，排序稳定)
//! - 过滤器在索引上表示为若干个互不相交的位置区间 (`Selection`)
//! - 区间查找 O(log n)，过滤切换只遍历差集 O(|delta|)

use std::ops::Range;

use super::filter::Filter;
use super::key::Key;
use crate::record::{Record, RecordId};

/// 选中区间：按位置升序、互不相交的半开区间
pub type Selection = Vec<Range<usize>>;

/// 维度排序索引
#[derive(Debug, Clone)]
pub struct DimensionIndex {
    /// record_id → key
    record_keys: Vec<Key>,
    /// 按键排序后的 record_id
    sorted: Vec<RecordId>,
    /// 去重后的有序键
    distinct: Vec<Key>,
}

impl DimensionIndex {
    /// 在全部记录上构建索引
    pub fn build<F>(records: &[Record], key_fn: F) -> Self
    where
        F: Fn(&Record) -> Key,
    {
        let record_keys: Vec<Key> = records.iter().map(|r| key_fn(r)).collect();

        let mut sorted: Vec<RecordId> = (0..records.len()).collect();
        sorted.sort_by(|&a, &b| record_keys[a].cmp(&record_keys[b]));

        let mut distinct: Vec<Key> = Vec::new();
        for &id in &sorted {
            if distinct.last() != Some(&record_keys[id]) {
                distinct.push(record_keys[id].clone());
            }
        }

        Self {
            record_keys,
            sorted,
            distinct,
        }
    }

    #[inline]
    pub fn key_of(&self, id: RecordId) -> &Key {
        &self.record_keys[id]
    }

    /// 排序位置上的记录 ID
    #[inline]
    pub fn record_at(&self, position: usize) -> RecordId {
        self.sorted[position]
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// 去重后的有序键
    pub fn distinct_keys(&self) -> &[Key] {
        &self.distinct
    }

    /// 第一个键 >= `key` 的位置
    fn lower_bound(&self, key: &Key) -> usize {
        self.sorted.partition_point(|&id| &self.record_keys[id] < key)
    }

    /// 第一个键 > `key` 的位置
    fn upper_bound(&self, key: &Key) -> usize {
        self.sorted.partition_point(|&id| &self.record_keys[id] <= key)
    }

    /// 将过滤器映射为位置区间
    pub fn select(&self, filter: &Filter) -> Selection {
        match filter {
            Filter::All => {
                if self.sorted.is_empty() {
                    Vec::new()
                } else {
                    vec![0..self.sorted.len()]
                }
            }
            Filter::Range { lo, hi } => {
                let start = self.lower_bound(lo);
                let end = self.lower_bound(hi);
                if start < end {
                    vec![start..end]
                } else {
                    Vec::new()
                }
            }
            Filter::Exact(keys) => {
                // BTreeSet 升序遍历，得到的区间天然有序且不相交
                let mut selection: Selection = Vec::with_capacity(keys.len());
                for key in keys {
                    let start = self.lower_bound(key);
                    let end = self.upper_bound(key);
                    if start < end {
                        selection.push(start..end);
                    }
                }
                selection
            }
        }
    }
}

/// 区间差集 `a \ b`，两边都必须有序且不相交
///
/// 复杂度 O(|a| + |b|)，输出区间同样有序且不相交。
pub fn difference(a: &[Range<usize>], b: &[Range<usize>]) -> Selection {
    let mut out = Vec::new();
    let mut j = 0;

    for range in a {
        let mut start = range.start;
        let end = range.end;

        // 跳过完全位于当前区间左侧的 b
        while j < b.len() && b[j].end <= start {
            j += 1;
        }

        let mut k = j;
        while start < end && k < b.len() && b[k].start < end {
            if b[k].start > start {
                out.push(start..b[k].start);
            }
            start = start.max(b[k].end);
            k += 1;
        }

        if start < end {
            out.push(start..end);
        }
    }

    out
}

/// 区间内位置总数
pub fn selection_len(selection: &[Range<usize>]) -> usize {
    selection.iter().map(|r| r.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RawRow, RecordStore};

    fn store() -> RecordStore {
        let rows = vec![
            RawRow::new("01/05/2012", 10.0, 11.0, 0.0),
            RawRow::new("01/02/2011", 10.0, 9.0, 0.0),
            RawRow::new("01/03/2012", 10.0, 12.0, 0.0),
            RawRow::new("01/04/2010", 10.0, 10.0, 0.0),
            RawRow::new("02/01/2011", 10.0, 10.5, 0.0),
        ];
        RecordStore::load(&rows).unwrap()
    }

    fn year_index(store: &RecordStore) -> DimensionIndex {
        DimensionIndex::build(store.records(), |r| Key::from(r.year))
    }

    fn ids(index: &DimensionIndex, selection: &[Range<usize>]) -> Vec<RecordId> {
        selection
            .iter()
            .flat_map(|r| r.clone())
            .map(|p| index.record_at(p))
            .collect()
    }

    #[test]
    fn test_build_sorted_and_stable() {
        let store = store();
        let index = year_index(&store);

        // 2010: [3], 2011: [1, 4], 2012: [0, 2]
        assert_eq!(ids(&index, &index.select(&Filter::All)), vec![3, 1, 4, 0, 2]);
        assert_eq!(
            index.distinct_keys(),
            &[Key::Int(2010), Key::Int(2011), Key::Int(2012)]
        );
        assert_eq!(index.key_of(4), &Key::Int(2011));
    }

    #[test]
    fn test_select_range_half_open() {
        let store = store();
        let index = year_index(&store);

        let selection = index.select(&Filter::range(2011, 2012));
        assert_eq!(ids(&index, &selection), vec![1, 4]);

        // 空区间 / 反向区间
        assert!(index.select(&Filter::range(2013, 2020)).is_empty());
        assert!(index.select(&Filter::range(2012, 2011)).is_empty());
    }

    #[test]
    fn test_select_exact() {
        let store = store();
        let index = year_index(&store);

        let selection = index.select(&Filter::exact([2012, 2010, 1999]));
        assert_eq!(selection, vec![0..1, 3..5]);
        assert_eq!(ids(&index, &selection), vec![3, 0, 2]);
    }

    #[test]
    fn test_difference() {
        assert_eq!(difference(&[0..10], &[2..4, 6..8]), vec![0..2, 4..6, 8..10]);
        assert_eq!(difference(&[0..3, 5..9], &[1..6]), vec![0..1, 6..9]);
        assert_eq!(difference(&[2..4], &[0..10]), Vec::<Range<usize>>::new());
        assert_eq!(difference(&[0..4], &[]), vec![0..4]);
        assert_eq!(difference(&[], &[0..4]), Vec::<Range<usize>>::new());
        assert_eq!(difference(&[0..4, 8..12], &[3..9]), vec![0..3, 9..12]);
        assert_eq!(selection_len(&[0..3, 9..12]), 6);
    }
}
