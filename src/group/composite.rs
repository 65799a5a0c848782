//! 复合增量归约器
//!
//! @yutiansut @quantaxis
//!
//! 两个多字段累加器，add/remove 互为代数逆运算：
//! - IndexAverage: 月度指数运行均值 {count, total, avg}
//! - YearlyPerformance: 年度表现统计 (涨跌额、波动、均值指数、百分比)
//!
//! 取整只作用于读出的 avg，运行中的 total 保持原值，避免取整误差累积。

use serde::Serialize;

use super::Reducer;
use crate::record::Record;
use crate::utils::round_half_up;

// ═══════════════════════════════════════════════════════════════════════════
// IndexAverage - 运行均值
// ═══════════════════════════════════════════════════════════════════════════

/// 月度指数均值累加器
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndexAverage {
    pub count: u64,
    /// Σ (open + close) / 2
    pub total: f64,
    /// round(total / count)，count 为 0 时为 0
    pub avg: f64,
}

impl IndexAverage {
    pub fn add(mut self, record: &Record) -> Self {
        self.count += 1;
        self.total += record.mid();
        self.avg = round_half_up(self.total / self.count as f64);
        self
    }

    pub fn remove(mut self, record: &Record) -> Self {
        self.count = self.count.saturating_sub(1);
        self.total -= record.mid();
        self.avg = if self.count > 0 {
            round_half_up(self.total / self.count as f64)
        } else {
            0.0
        };
        self
    }

    /// 容差比较 (浮点字段)
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.count == other.count
            && (self.total - other.total).abs() <= tolerance
            && (self.avg - other.avg).abs() <= tolerance
    }
}

/// 月度指数均值归约器
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexAverageReducer;

impl Reducer for IndexAverageReducer {
    type Acc = IndexAverage;

    fn initial(&self) -> IndexAverage {
        IndexAverage::default()
    }

    fn add(&self, acc: IndexAverage, record: &Record) -> IndexAverage {
        acc.add(record)
    }

    fn remove(&self, acc: IndexAverage, record: &Record) -> IndexAverage {
        acc.remove(record)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// YearlyPerformance - 年度表现
// ═══════════════════════════════════════════════════════════════════════════

/// 年度表现累加器
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyPerformance {
    pub count: u64,
    /// Σ (close - open)
    pub abs_gain: f64,
    /// Σ |close - open|
    pub fluctuation: f64,
    /// Σ (open + close) / 2
    pub sum_index: f64,
    pub avg_index: f64,
    /// abs_gain / avg_index * 100
    pub percentage_gain: f64,
    /// fluctuation / avg_index * 100
    pub fluctuation_percentage: f64,
}

impl YearlyPerformance {
    pub fn add(mut self, record: &Record) -> Self {
        self.count += 1;
        self.abs_gain += record.gain();
        self.fluctuation += record.abs_move();
        self.sum_index += record.mid();
        self.avg_index = self.sum_index / self.count as f64;
        self.refresh_percentages();
        self
    }

    pub fn remove(mut self, record: &Record) -> Self {
        self.count = self.count.saturating_sub(1);
        self.abs_gain -= record.gain();
        self.fluctuation -= record.abs_move();
        self.sum_index -= record.mid();
        self.avg_index = if self.count > 0 {
            self.sum_index / self.count as f64
        } else {
            0.0
        };
        self.refresh_percentages();
        self
    }

    fn refresh_percentages(&mut self) {
        if self.avg_index != 0.0 {
            self.percentage_gain = self.abs_gain / self.avg_index * 100.0;
            self.fluctuation_percentage = self.fluctuation / self.avg_index * 100.0;
        } else {
            self.percentage_gain = 0.0;
            self.fluctuation_percentage = 0.0;
        }
    }

    /// 容差比较 (浮点字段)
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
        self.count == other.count
            && close(self.abs_gain, other.abs_gain)
            && close(self.fluctuation, other.fluctuation)
            && close(self.sum_index, other.sum_index)
            && close(self.avg_index, other.avg_index)
            && close(self.percentage_gain, other.percentage_gain)
            && close(self.fluctuation_percentage, other.fluctuation_percentage)
    }
}

/// 年度表现归约器
#[derive(Debug, Clone, Copy, Default)]
pub struct YearlyPerformanceReducer;

impl Reducer for YearlyPerformanceReducer {
    type Acc = YearlyPerformance;

    fn initial(&self) -> YearlyPerformance {
        YearlyPerformance::default()
    }

    fn add(&self, acc: YearlyPerformance, record: &Record) -> YearlyPerformance {
        acc.add(record)
    }

    fn remove(&self, acc: YearlyPerformance, record: &Record) -> YearlyPerformance {
        acc.remove(record)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 测试
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RawRow, RecordStore};

    const TOLERANCE: f64 = 1e-9;

    fn scenario() -> RecordStore {
        RecordStore::load(&[
            RawRow::new("01/02/2012", 100.0, 110.0, 0.0),
            RawRow::new("01/03/2012", 110.0, 99.0, 0.0),
        ])
        .unwrap()
    }

    fn sample() -> RecordStore {
        let rows: Vec<RawRow> = (0..40)
            .map(|i| {
                let open = 1000.0 + (i as f64 * 1.7).sin() * 80.0;
                let close = open + (i as f64 * 0.9).cos() * 35.0;
                RawRow::new(&format!("{:02}/15/2011", i % 12 + 1), open, close, 10.0)
            })
            .collect();
        RecordStore::load(&rows).unwrap()
    }

    #[test]
    fn test_yearly_performance_scenario() {
        let store = scenario();
        let reducer = YearlyPerformanceReducer;

        let both = reducer.reduce_all(store.iter());
        assert_eq!(both.count, 2);
        assert!((both.abs_gain + 1.0).abs() < TOLERANCE);
        assert!((both.avg_index - 104.75).abs() < TOLERANCE);
        assert!((both.percentage_gain - (-1.0 / 104.75 * 100.0)).abs() < TOLERANCE);
        assert!((both.percentage_gain + 0.955).abs() < 1e-3);

        let first = reducer.remove(both, store.at(1));
        assert_eq!(first.count, 1);
        assert!((first.abs_gain - 10.0).abs() < TOLERANCE);
        assert!((first.avg_index - 105.0).abs() < TOLERANCE);
        assert!((first.percentage_gain - 9.5238).abs() < 1e-3);
        assert!((first.fluctuation_percentage - 9.5238).abs() < 1e-3);
    }

    #[test]
    fn test_yearly_performance_inverse_law() {
        let store = sample();
        let reducer = YearlyPerformanceReducer;

        let mut acc = reducer.initial();
        for r in store.iter() {
            let round_trip = reducer.remove(reducer.add(acc, r), r);
            assert!(
                round_trip.approx_eq(&acc, TOLERANCE),
                "round trip diverged: {:?} vs {:?}",
                round_trip,
                acc
            );
            acc = reducer.add(acc, r);
        }
    }

    #[test]
    fn test_yearly_performance_empty_after_remove_all() {
        let store = scenario();
        let reducer = YearlyPerformanceReducer;

        let mut acc = reducer.reduce_all(store.iter());
        acc = reducer.remove(acc, store.at(0));
        acc = reducer.remove(acc, store.at(1));

        assert!(acc.approx_eq(&reducer.initial(), TOLERANCE));
        assert_eq!(acc.avg_index, 0.0);
        assert_eq!(acc.percentage_gain, 0.0);
    }

    #[test]
    fn test_index_average() {
        let store = scenario();
        let reducer = IndexAverageReducer;

        let acc = reducer.reduce_all(store.iter());
        assert_eq!(acc.count, 2);
        assert!((acc.total - 209.5).abs() < TOLERANCE);
        // 104.75 → 105
        assert_eq!(acc.avg, 105.0);

        let acc = reducer.remove(acc, store.at(0));
        assert_eq!(acc.avg, 105.0); // 104.5 → 105 (向上进位)
        let acc = reducer.remove(acc, store.at(1));
        assert_eq!(acc, IndexAverage::default());
    }

    #[test]
    fn test_index_average_inverse_law() {
        let store = sample();
        let reducer = IndexAverageReducer;

        let mut acc = reducer.initial();
        for r in store.iter() {
            let round_trip = reducer.remove(reducer.add(acc, r), r);
            assert!(round_trip.approx_eq(&acc, TOLERANCE));
            acc = reducer.add(acc, r);
        }
    }

    #[test]
    fn test_net_effect_independent_of_history() {
        let store = sample();
        let reducer = YearlyPerformanceReducer;

        // 加入全部，再移除偶数行，再加回部分
        let mut acc = reducer.reduce_all(store.iter());
        for r in store.iter().filter(|r| r.id % 2 == 0) {
            acc = reducer.remove(acc, r);
        }
        for r in store.iter().filter(|r| r.id % 4 == 0) {
            acc = reducer.add(acc, r);
        }

        let expected = reducer.reduce_all(store.iter().filter(|r| r.id % 2 == 1 || r.id % 4 == 0));
        assert!(acc.approx_eq(&expected, 1e-6));
    }

    #[test]
    fn test_serialize_camel_case() {
        let store = scenario();
        let acc = YearlyPerformanceReducer.reduce_all(store.iter());
        let json = serde_json::to_value(acc).unwrap();
        assert_eq!(json["count"], 2);
        assert!(json.get("percentageGain").is_some());
        assert!(json.get("fluctuationPercentage").is_some());
    }
}
