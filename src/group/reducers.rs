//! 基础归约器 - Count, Sum, 闭包三元组
//!
//! @yutiansut @quantaxis

use std::fmt::Debug;
use std::marker::PhantomData;

use serde::Serialize;

use super::Reducer;
use crate::record::Record;

// ═══════════════════════════════════════════════════════════════════════════
// Count
// ═══════════════════════════════════════════════════════════════════════════

/// 计数归约器 (分组默认聚合)
#[derive(Debug, Clone, Copy, Default)]
pub struct CountReducer;

impl Reducer for CountReducer {
    type Acc = u64;

    fn initial(&self) -> u64 {
        0
    }

    fn add(&self, acc: u64, _record: &Record) -> u64 {
        acc + 1
    }

    fn remove(&self, acc: u64, _record: &Record) -> u64 {
        acc.saturating_sub(1)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Sum
// ═══════════════════════════════════════════════════════════════════════════

/// 求和归约器：对记录的某个取值函数求和
pub struct SumReducer<F> {
    value: F,
}

impl<F> SumReducer<F>
where
    F: Fn(&Record) -> f64 + Send + Sync + 'static,
{
    pub fn new(value: F) -> Self {
        Self { value }
    }
}

impl<F> Reducer for SumReducer<F>
where
    F: Fn(&Record) -> f64 + Send + Sync + 'static,
{
    type Acc = f64;

    fn initial(&self) -> f64 {
        0.0
    }

    fn add(&self, acc: f64, record: &Record) -> f64 {
        acc + (self.value)(record)
    }

    fn remove(&self, acc: f64, record: &Record) -> f64 {
        acc - (self.value)(record)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 闭包三元组
// ═══════════════════════════════════════════════════════════════════════════

/// 用户提供的 (initial, add, remove) 闭包三元组
pub struct FnReducer<A, I, Ad, Rm> {
    initial: I,
    add: Ad,
    remove: Rm,
    _acc: PhantomData<fn() -> A>,
}

impl<A, I, Ad, Rm> FnReducer<A, I, Ad, Rm>
where
    A: Clone + Debug + Serialize + Send + Sync + 'static,
    I: Fn() -> A + Send + Sync + 'static,
    Ad: Fn(A, &Record) -> A + Send + Sync + 'static,
    Rm: Fn(A, &Record) -> A + Send + Sync + 'static,
{
    pub fn new(initial: I, add: Ad, remove: Rm) -> Self {
        Self {
            initial,
            add,
            remove,
            _acc: PhantomData,
        }
    }
}

impl<A, I, Ad, Rm> Reducer for FnReducer<A, I, Ad, Rm>
where
    A: Clone + Debug + Serialize + Send + Sync + 'static,
    I: Fn() -> A + Send + Sync + 'static,
    Ad: Fn(A, &Record) -> A + Send + Sync + 'static,
    Rm: Fn(A, &Record) -> A + Send + Sync + 'static,
{
    type Acc = A;

    fn initial(&self) -> A {
        (self.initial)()
    }

    fn add(&self, acc: A, record: &Record) -> A {
        (self.add)(acc, record)
    }

    fn remove(&self, acc: A, record: &Record) -> A {
        (self.remove)(acc, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RawRow, RecordStore};

    fn store() -> RecordStore {
        RecordStore::load(&[
            RawRow::new("01/02/2012", 100.0, 110.0, 1000.0),
            RawRow::new("01/03/2012", 110.0, 99.0, 2500.0),
            RawRow::new("01/04/2012", 99.0, 99.5, 500.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_count() {
        let store = store();
        let reducer = CountReducer;
        assert_eq!(reducer.reduce_all(store.iter()), 3);
        assert_eq!(reducer.remove(reducer.add(5, store.at(0)), store.at(0)), 5);
    }

    #[test]
    fn test_sum_inverse() {
        let store = store();
        let reducer = SumReducer::new(|r: &Record| r.volume);
        assert_eq!(reducer.reduce_all(store.iter()), 4000.0);

        for r in store.iter() {
            let acc = 123.25;
            assert!((reducer.remove(reducer.add(acc, r), r) - acc).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fn_reducer() {
        // (天数, 上涨天数)
        let reducer = FnReducer::new(
            || (0u32, 0u32),
            |(days, up): (u32, u32), r: &Record| (days + 1, up + (r.gain() > 0.0) as u32),
            |(days, up): (u32, u32), r: &Record| (days - 1, up - (r.gain() > 0.0) as u32),
        );

        let store = store();
        let acc = reducer.reduce_all(store.iter());
        assert_eq!(acc, (3, 2));
        assert_eq!(reducer.remove(acc, store.at(1)), (2, 2));
    }
}
