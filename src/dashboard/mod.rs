//! 行情看板上下文
//!
//! @yutiansut @quantaxis
//!
//! 在引擎之上组装日线行情看板使用的全部维度、分组与派生视图：
//!
//! ```text
//! 维度            分组                        控件
//! date            -                           明细表 (最近 N 条)
//! year            yearly_performance (惰性)   年度气泡图
//! day_of_week     day_of_week_count           星期行图
//! gain_or_loss    gain_or_loss_count          涨跌饼图
//! quarter         quarter_volume              季度饼图
//! fluctuation     fluctuation_count           涨跌幅柱状图
//! month           month_move / month_index    月度指数折线
//! -               all_count (group-all)       记录计数
//! ```
//!
//! 选择器控件对应的分组均为自过滤，在本维度被过滤时仍显示全部柱/扇区。

use serde::Serialize;

use crate::dimension::{Filter, Key};
use crate::engine::Engine;
use crate::group::{
    CountReducer, GroupOptions, IndexAverage, IndexAverageReducer, YearlyPerformance,
    YearlyPerformanceReducer,
};
use crate::record::{Record, RecordStore, WEEKDAY_LABELS};
use crate::view::DerivedView;
use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════
// 名称常量
// ═══════════════════════════════════════════════════════════════════════════

pub const DIM_DATE: &str = "date";
pub const DIM_YEAR: &str = "year";
pub const DIM_DAY_OF_WEEK: &str = "day_of_week";
pub const DIM_GAIN_OR_LOSS: &str = "gain_or_loss";
pub const DIM_QUARTER: &str = "quarter";
pub const DIM_FLUCTUATION: &str = "fluctuation";
pub const DIM_MONTH: &str = "month";

pub const GROUP_DAY_OF_WEEK: &str = "day_of_week_count";
pub const GROUP_GAIN_OR_LOSS: &str = "gain_or_loss_count";
pub const GROUP_QUARTER_VOLUME: &str = "quarter_volume";
pub const GROUP_FLUCTUATION: &str = "fluctuation_count";
pub const GROUP_MONTH_MOVE: &str = "month_move";
pub const GROUP_ALL: &str = "all_count";
pub const GROUP_YEARLY_PERFORMANCE: &str = "yearly_performance";
pub const GROUP_MONTH_INDEX: &str = "month_index_average";

/// 涨跌
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Gain,
    Loss,
}

impl Outcome {
    pub fn of(record: &Record) -> Self {
        if record.is_loss() {
            Outcome::Loss
        } else {
            Outcome::Gain
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Gain => "Gain",
            Outcome::Loss => "Loss",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 视图数据
// ═══════════════════════════════════════════════════════════════════════════

/// 年度气泡点
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BubblePoint {
    pub year: i64,
    /// x = absGain
    pub x: f64,
    /// y = percentageGain
    pub y: f64,
    /// 半径 = fluctuationPercentage
    pub radius: f64,
    pub performance: YearlyPerformance,
}

/// 月度指数点 (均值折线 + 波动叠加)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPoint {
    pub month: String,
    pub index: IndexAverage,
    /// Σ |close - open|
    pub monthly_move: f64,
}

/// 饼图扇区
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub key: String,
    pub count: u64,
    /// 占当前存活记录的百分比
    pub percent: f64,
}

impl Share {
    /// 饼图标签，例如 `Gain (53.12%)`
    pub fn label(&self) -> String {
        format!("{} ({:.2}%)", self.key, self.percent)
    }
}

/// 记录计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataCount {
    pub live: usize,
    pub total: usize,
}

/// 明细表行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub date: String,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
}

/// 明细表分段 (按 `YYYY/M`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSection {
    pub label: String,
    pub rows: Vec<TableRow>,
}

// ═══════════════════════════════════════════════════════════════════════════
// 看板
// ═══════════════════════════════════════════════════════════════════════════

/// 日线行情看板上下文
pub struct MarketDashboard {
    engine: Engine,
    yearly_bubbles: DerivedView<Vec<BubblePoint>>,
    monthly_index: DerivedView<Vec<MonthlyPoint>>,
    gain_or_loss_shares: DerivedView<Vec<Share>>,
}

impl MarketDashboard {
    /// 在记录存储上注册全部维度与基础分组
    pub fn new(store: RecordStore) -> Result<Self> {
        let mut engine = Engine::new(store);
        let selector = GroupOptions::self_filtering();

        engine.register_dimension(DIM_DATE, |r: &Record| r.parsed_date)?;
        engine.register_dimension(DIM_YEAR, |r: &Record| r.year)?;
        engine.register_dimension(DIM_DAY_OF_WEEK, |r: &Record| {
            Key::label(r.day_of_week as i64, r.weekday_label())
        })?;
        engine.register_dimension(DIM_GAIN_OR_LOSS, |r: &Record| Outcome::of(r).as_str())?;
        engine.register_dimension(DIM_QUARTER, |r: &Record| format!("Q{}", r.quarter))?;
        engine.register_dimension(DIM_FLUCTUATION, |r: &Record| r.fluctuation_bucket)?;
        engine.register_dimension(DIM_MONTH, |r: &Record| r.fiscal_month)?;

        engine.register_count_group(GROUP_DAY_OF_WEEK, DIM_DAY_OF_WEEK, selector)?;
        engine.register_count_group(GROUP_GAIN_OR_LOSS, DIM_GAIN_OR_LOSS, selector)?;
        engine.register_sum_group(
            GROUP_QUARTER_VOLUME,
            DIM_QUARTER,
            |r: &Record| r.volume,
            selector,
        )?;
        engine.register_count_group(GROUP_FLUCTUATION, DIM_FLUCTUATION, selector)?;
        engine.register_sum_group(
            GROUP_MONTH_MOVE,
            DIM_MONTH,
            |r: &Record| r.abs_move(),
            GroupOptions::default(),
        )?;
        engine.register_group_all(GROUP_ALL, CountReducer)?;

        log::info!(
            "MarketDashboard ready: {} records, {} dimensions, {} groups",
            engine.total_count(),
            engine.dimension_names().len(),
            engine.group_names().len()
        );

        Ok(Self {
            engine,
            yearly_bubbles: DerivedView::new("yearly_bubbles", build_yearly_bubbles),
            monthly_index: DerivedView::new("monthly_index", build_monthly_index),
            gain_or_loss_shares: DerivedView::new("gain_or_loss_shares", build_shares),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// 直接访问引擎 (注册自定义维度/分组)
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    // ═══════════════════════════════════════════════════════════════════════
    // 派生视图
    // ═══════════════════════════════════════════════════════════════════════

    /// 年度气泡图 (年度表现分组在首次读取时注册)
    pub fn yearly_bubbles(&mut self) -> Result<&[BubblePoint]> {
        if !self.engine.has_group(GROUP_YEARLY_PERFORMANCE) {
            self.engine.register_group(
                GROUP_YEARLY_PERFORMANCE,
                DIM_YEAR,
                YearlyPerformanceReducer,
                GroupOptions::self_filtering(),
            )?;
        }
        Ok(self.yearly_bubbles.get(&self.engine)?.as_slice())
    }

    /// 月度指数均值 + 月度波动
    pub fn monthly_index(&mut self) -> Result<&[MonthlyPoint]> {
        if !self.engine.has_group(GROUP_MONTH_INDEX) {
            self.engine.register_group(
                GROUP_MONTH_INDEX,
                DIM_MONTH,
                IndexAverageReducer,
                GroupOptions::default(),
            )?;
        }
        Ok(self.monthly_index.get(&self.engine)?.as_slice())
    }

    /// 涨跌饼图扇区
    pub fn gain_or_loss_shares(&mut self) -> Result<&[Share]> {
        Ok(self.gain_or_loss_shares.get(&self.engine)?.as_slice())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // 直读
    // ═══════════════════════════════════════════════════════════════════════

    pub fn data_count(&self) -> Result<DataCount> {
        Ok(DataCount {
            live: self.engine.read_group_all::<u64>(GROUP_ALL)? as usize,
            total: self.engine.total_count(),
        })
    }

    /// 最近 `rows` 条存活记录，按 `YYYY/M` 分段
    pub fn table(&self, rows: usize) -> Result<Vec<TableSection>> {
        let mut sections: Vec<TableSection> = Vec::new();
        for record in self.engine.top(DIM_DATE, rows)? {
            let label = format!("{}/{}", record.year, record.fiscal_month.format("%-m"));
            let row = TableRow {
                date: record.date.clone(),
                open: record.open,
                close: record.close,
                volume: record.volume,
            };
            match sections.last_mut() {
                Some(section) if section.label == label => section.rows.push(row),
                _ => sections.push(TableSection {
                    label,
                    rows: vec![row],
                }),
            }
        }
        Ok(sections)
    }

    pub fn day_of_week_counts(&self) -> Result<Vec<(Key, u64)>> {
        self.engine.read_group(GROUP_DAY_OF_WEEK)
    }

    pub fn quarter_volumes(&self) -> Result<Vec<(Key, f64)>> {
        self.engine.read_group(GROUP_QUARTER_VOLUME)
    }

    pub fn fluctuation_counts(&self) -> Result<Vec<(Key, u64)>> {
        self.engine.read_group(GROUP_FLUCTUATION)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // 过滤
    // ═══════════════════════════════════════════════════════════════════════

    /// 年份区间 [lo, hi]
    pub fn filter_years(&mut self, lo: i32, hi: i32) -> Result<Filter> {
        self.engine.filter_range(DIM_YEAR, lo, hi.saturating_add(1))
    }

    /// 星期集合 (0 = Sun)
    pub fn filter_weekdays(&mut self, days: &[u32]) -> Result<Filter> {
        let keys = days
            .iter()
            .filter_map(|&d| {
                WEEKDAY_LABELS
                    .get(d as usize)
                    .map(|label| Key::label(d as i64, *label))
            })
            .collect::<Vec<_>>();
        self.engine.filter_exact(DIM_DAY_OF_WEEK, keys)
    }

    /// 涨跌幅分桶区间 [lo, hi]
    pub fn filter_fluctuation(&mut self, lo: i64, hi: i64) -> Result<Filter> {
        self.engine.filter_range(DIM_FLUCTUATION, lo, hi.saturating_add(1))
    }

    pub fn filter_gain_or_loss(&mut self, outcome: Outcome) -> Result<Filter> {
        self.engine.filter_exact(DIM_GAIN_OR_LOSS, [outcome.as_str()])
    }

    pub fn filter_quarters(&mut self, quarters: &[u32]) -> Result<Filter> {
        self.engine.filter_exact(DIM_QUARTER, quarters.iter().map(|q| format!("Q{}", q)))
    }

    pub fn reset_filters(&mut self) -> Result<()> {
        self.engine.reset_filters()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 视图构建
// ═══════════════════════════════════════════════════════════════════════════

fn build_yearly_bubbles(engine: &Engine) -> Result<Vec<BubblePoint>> {
    Ok(engine
        .read_group::<YearlyPerformance>(GROUP_YEARLY_PERFORMANCE)?
        .into_iter()
        .filter_map(|(key, perf)| {
            key.as_int().map(|year| BubblePoint {
                year,
                x: perf.abs_gain,
                y: perf.percentage_gain,
                radius: perf.fluctuation_percentage,
                performance: perf,
            })
        })
        .collect())
}

fn build_monthly_index(engine: &Engine) -> Result<Vec<MonthlyPoint>> {
    let index = engine.read_group::<IndexAverage>(GROUP_MONTH_INDEX)?;
    let moves = engine.read_group::<f64>(GROUP_MONTH_MOVE)?;

    // 两个分组建立在同一维度上，键序列一致
    Ok(index
        .into_iter()
        .zip(moves)
        .map(|((key, index), (_, monthly_move))| MonthlyPoint {
            month: key.display_name(),
            index,
            monthly_move,
        })
        .collect())
}

fn build_shares(engine: &Engine) -> Result<Vec<Share>> {
    let live = engine.read_group_all::<u64>(GROUP_ALL)?;
    Ok(engine
        .read_group::<u64>(GROUP_GAIN_OR_LOSS)?
        .into_iter()
        .map(|(key, count)| Share {
            key: key.display_name(),
            count,
            percent: if live > 0 {
                count as f64 / live as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect())
}

// ═══════════════════════════════════════════════════════════════════════════
// 测试
// ═══════════════════════════════════════════════════════════════════════════
