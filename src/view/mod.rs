//! 派生视图缓存
//!
//! @yutiansut @quantaxis
//!
//! 派生视图是建立在引擎分组之上的复合结果 (例如年度气泡点、月度指数曲线)：
//! - 惰性计算：第一次读取时才构建
//! - 显式缓存条目：记录构建时的 generation
//! - 失效规则：引擎 generation 变化 (任何一次 apply_filter) 即视为过期
//! - 读时重建，写时不做任何工作

use crate::engine::Engine;
use crate::Result;

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewCacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// generation 键控的单条目缓存
#[derive(Debug, Clone)]
pub struct ViewCache<T> {
    entry: Option<(u64, T)>,
    stats: ViewCacheStats,
}

impl<T> ViewCache<T> {
    pub fn new() -> Self {
        Self {
            entry: None,
            stats: ViewCacheStats::default(),
        }
    }

    /// 缓存是否对应给定 generation
    pub fn is_fresh(&self, generation: u64) -> bool {
        matches!(&self.entry, Some((g, _)) if *g == generation)
    }

    /// 命中则返回缓存值，否则调用 `build` 重建
    pub fn get_or_try_build<F>(&mut self, generation: u64, build: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        let entry = match self.entry.take() {
            Some((cached, value)) if cached == generation => {
                self.stats.hits += 1;
                log::trace!("view cache hit at generation {}", generation);
                (cached, value)
            }
            _ => {
                self.stats.misses += 1;
                (generation, build()?)
            }
        };
        Ok(&self.entry.insert(entry).1)
    }

    /// 丢弃缓存
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn stats(&self) -> ViewCacheStats {
        self.stats
    }
}

impl<T> Default for ViewCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 视图构建函数
pub type ViewBuilder<T> = Box<dyn Fn(&Engine) -> Result<T> + Send + Sync>;

/// 命名派生视图 = 构建函数 + generation 缓存
pub struct DerivedView<T> {
    name: String,
    build: ViewBuilder<T>,
    cache: ViewCache<T>,
}

impl<T> DerivedView<T> {
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&Engine) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Box::new(build),
            cache: ViewCache::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 读取视图；引擎 generation 变化后的第一次读取会重建
    pub fn get(&mut self, engine: &Engine) -> Result<&T> {
        let generation = engine.generation();
        let name = &self.name;
        let build = &self.build;
        self.cache.get_or_try_build(generation, || {
            log::debug!("Rebuilding derived view {} at generation {}", name, generation);
            build(engine)
        })
    }

    pub fn is_fresh(&self, engine: &Engine) -> bool {
        self.cache.is_fresh(engine.generation())
    }

    pub fn stats(&self) -> ViewCacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupOptions;
    use crate::record::{RawRow, Record, RecordStore};
    use crate::FilterError;

    #[test]
    fn test_view_cache_generation() {
        let mut cache: ViewCache<Vec<u32>> = ViewCache::new();
        let mut builds = 0;

        cache
            .get_or_try_build(0, || {
                builds += 1;
                Ok(vec![1])
            })
            .unwrap();
        cache
            .get_or_try_build(0, || {
                builds += 1;
                Ok(vec![2])
            })
            .unwrap();
        assert_eq!(builds, 1);
        assert!(cache.is_fresh(0));

        let value = cache.get_or_try_build(1, || Ok(vec![3])).unwrap();
        assert_eq!(value, &vec![3]);
        assert_eq!(cache.stats(), ViewCacheStats { hits: 1, misses: 2 });

        cache.invalidate();
        assert!(!cache.is_fresh(1));
    }

    #[test]
    fn test_failed_build_keeps_cache_empty() {
        let mut cache: ViewCache<u32> = ViewCache::new();
        let err = cache.get_or_try_build(5, || Err(FilterError::UnknownGroupError("x".into())));
        assert!(err.is_err());
        assert!(!cache.is_fresh(5));
    }

    #[test]
    fn test_hit_returns_cached_value_and_failed_rebuild_drops_stale() {
        let mut cache: ViewCache<String> = ViewCache::new();
        let first = cache.get_or_try_build(3, || Ok("v3".to_string())).unwrap();
        assert_eq!(first, "v3");
        let hit = cache
            .get_or_try_build(3, || Err(FilterError::UnknownGroupError("unused".into())))
            .unwrap();
        assert_eq!(hit, "v3");

        assert!(cache
            .get_or_try_build(4, || Err(FilterError::UnknownGroupError("g".into())))
            .is_err());
        assert!(!cache.is_fresh(3));
        assert!(!cache.is_fresh(4));
        assert_eq!(cache.stats(), ViewCacheStats { hits: 1, misses: 2 });
    }

    #[test]
    fn test_derived_view_rebuilds_after_filter() {
        let rows = vec![
            RawRow::new("01/02/2012", 100.0, 110.0, 0.0),
            RawRow::new("01/03/2013", 110.0, 99.0, 0.0),
        ];
        let mut engine = Engine::new(RecordStore::load(&rows).unwrap());
        engine.register_dimension("year", |r: &Record| r.year).unwrap();
        engine
            .register_count_group("year_count", "year", GroupOptions::default())
            .unwrap();

        let mut view = DerivedView::new("non_empty_years", |engine: &Engine| {
            Ok(engine
                .read_group::<u64>("year_count")?
                .into_iter()
                .filter(|(_, n)| *n > 0)
                .count())
        });

        assert_eq!(*view.get(&engine).unwrap(), 2);
        assert_eq!(*view.get(&engine).unwrap(), 2);
        assert!(view.is_fresh(&engine));

        engine.filter_exact("year", [2013]).unwrap();
        assert!(!view.is_fresh(&engine));
        assert_eq!(*view.get(&engine).unwrap(), 1);
        assert_eq!(view.stats(), ViewCacheStats { hits: 1, misses: 2 });
        assert_eq!(view.name(), "non_empty_years");
    }
}
