//! # QAFILTER-RS
//!
//! 多维索引与增量聚合引擎 - 日线行情看板的计算内核
//!
//! ## 核心能力
//!
//! - **记录存储**: 一次性加载日线记录，入库时派生日期/财月/星期/季度/涨跌幅分桶
//! - **维度索引**: 基于排序索引的范围/集合过滤，O(变化量) 重新过滤
//! - **分组聚合**: 计数/求和/自定义 add/remove/initial 三元组增量归约
//! - **过滤传播**: 任一维度过滤变化后，所有分组只按差集增量更新
//! - **派生视图**: 基于 generation 计数的惰性缓存（年度表现、月度指数均值）
//! - **看板上下文**: 复现行情看板使用的全部维度与分组
//!
//! ## 架构设计
//!
//! ```text
//! 渲染层 (外部协作者, 只读 + 订阅)
//!     ↓
//! Dashboard (dashboard/) ← 派生视图缓存 (view/)
//!     ↓
//! Engine (engine/) ── 过滤传播 + 订阅通知
//!     ↓
//! Dimension (dimension/) + Group (group/)
//!     ↓
//! Record Store (record/)
//! ```
//!
//! ## 并发模型
//!
//! 单线程、同步执行：所有 `apply_filter` 由调用方串行化，引擎内部不加锁保护聚合状态。

// ============================================================================
// 外部依赖
// ============================================================================

// 序列化
pub use serde;
pub use serde_json;

// 时间
pub use chrono;

// 日志
pub use log;

// 错误处理
pub use anyhow;
pub use thiserror;

// ============================================================================
// 内部模块
// ============================================================================

/// 记录存储 - 行情记录加载与派生字段
pub mod record;

/// 维度 - 键函数 + 排序索引 + 过滤状态
pub mod dimension;

/// 分组 - 归约器与增量聚合
pub mod group;

/// 引擎 - 维度/分组注册与过滤传播
pub mod engine;

/// 派生视图缓存
pub mod view;

/// 看板上下文 (行情看板的维度/分组组合)
pub mod dashboard;

/// 工具模块
pub mod utils;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use dashboard::{MarketDashboard, Outcome};
pub use dimension::{Filter, Key};
pub use engine::{Engine, FilterEvent, SubscriptionId};
pub use group::{
    CountReducer, FnReducer, GroupOptions, IndexAverage, IndexAverageReducer, Reducer,
    SumReducer, YearlyPerformance, YearlyPerformanceReducer,
};
pub use record::{RawRow, Record, RecordId, RecordStore};
pub use view::{DerivedView, ViewCache};

// ============================================================================
// 全局错误类型
// ============================================================================

/// 引擎错误类型
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Ingest error at row {row}: {reason}")]
    IngestError { row: usize, reason: String },

    #[error("Unknown dimension: {0}")]
    UnknownDimensionError(String),

    #[error("Unknown group: {0}")]
    UnknownGroupError(String),

    #[error("Dimension already registered: {0}")]
    DuplicateDimensionError(String),

    #[error("Group already registered: {0}")]
    DuplicateGroupError(String),

    #[error("Too many dimensions: at most {0} are supported")]
    DimensionLimitError(usize),

    #[error("Group {group} does not aggregate into {expected}")]
    AggregateTypeMismatch { group: String, expected: &'static str },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl FilterError {
    pub(crate) fn ingest(row: usize, reason: impl Into<String>) -> Self {
        FilterError::IngestError {
            row,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;

// ============================================================================
// 测试模块
// ============================================================================
