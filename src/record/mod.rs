//! 记录存储
//!
//! @yutiansut @quantaxis
//!
//! 持有全部日线记录（按插入顺序），入库时一次性派生：
//! - 解析日期 / 年份
//! - 财月 (所在自然月的第一天)
//! - 星期序号 (0 = 周日)
//! - 季度 (1-4)
//! - 涨跌幅分桶 round((close - open) / open * 100)
//!
//! 记录一经加载即不可变，RecordId 为稠密、稳定的插入序号。

pub mod loader;

pub use loader::{load_rows, parse_csv_rows, parse_json_rows};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::utils::round_half_up;
use crate::{FilterError, Result};

/// 默认日期格式 (MM/DD/YYYY)
pub const DEFAULT_DATE_FORMAT: &str = "%m/%d/%Y";

/// 星期标签 (按 0 = 周日 排列)
pub const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// 星期名称 → 序号 (0 = Sun)，接受前缀 (`mon`、`Monday`)，不区分大小写
pub fn weekday_ordinal(name: &str) -> Option<u32> {
    let name = name.trim().to_ascii_lowercase();
    if name.len() < 3 {
        return None;
    }
    WEEKDAY_LABELS
        .iter()
        .position(|label| name.starts_with(&label.to_ascii_lowercase()))
        .map(|i| i as u32)
}

/// 记录 ID (插入序号)
pub type RecordId = usize;

// ═══════════════════════════════════════════════════════════════════════════
// 原始行
// ═══════════════════════════════════════════════════════════════════════════

/// 原始字段值：数字或文本（CSV 中的数字以文本形式出现）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    Number(f64),
    Text(String),
}

impl RawField {
    fn as_text(&self) -> String {
        match self {
            RawField::Number(v) => v.to_string(),
            RawField::Text(s) => s.clone(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            RawField::Number(v) => Some(*v),
            RawField::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl From<f64> for RawField {
    fn from(v: f64) -> Self {
        RawField::Number(v)
    }
}

impl From<&str> for RawField {
    fn from(s: &str) -> Self {
        RawField::Text(s.to_string())
    }
}

/// 加载器交付的原始行
///
/// 字段均为可选：缺失或无法解析在 `RecordStore::load` 时报告行号。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub date: Option<RawField>,
    #[serde(default)]
    pub open: Option<RawField>,
    #[serde(default)]
    pub close: Option<RawField>,
    #[serde(default)]
    pub volume: Option<RawField>,
}

impl RawRow {
    pub fn new(date: &str, open: f64, close: f64, volume: f64) -> Self {
        Self {
            date: Some(date.into()),
            open: Some(open.into()),
            close: Some(close.into()),
            volume: Some(volume.into()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 记录
// ═══════════════════════════════════════════════════════════════════════════

/// 日线记录 (原始字段 + 派生字段)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: RecordId,
    /// 原始日期字符串
    pub date: String,
    pub open: f64,
    pub close: f64,
    pub volume: f64,

    pub parsed_date: NaiveDate,
    pub year: i32,
    /// 财月：所在自然月第一天
    pub fiscal_month: NaiveDate,
    /// 星期序号，0 = Sun
    pub day_of_week: u32,
    /// 季度 1-4
    pub quarter: u32,
    /// 涨跌幅分桶 (百分比取整)
    pub fluctuation_bucket: i64,
}

impl Record {
    /// 收盘 - 开盘
    #[inline]
    pub fn gain(&self) -> f64 {
        self.close - self.open
    }

    /// |收盘 - 开盘|
    #[inline]
    pub fn abs_move(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// (开盘 + 收盘) / 2
    #[inline]
    pub fn mid(&self) -> f64 {
        (self.open + self.close) / 2.0
    }

    pub fn is_loss(&self) -> bool {
        self.open > self.close
    }

    pub fn weekday_label(&self) -> &'static str {
        WEEKDAY_LABELS[self.day_of_week as usize]
    }

    fn derive(id: RecordId, raw: &RawRow, date_format: &str) -> Result<Self> {
        let date = raw
            .date
            .as_ref()
            .map(RawField::as_text)
            .ok_or_else(|| FilterError::ingest(id, "missing field `date`"))?;
        let parsed_date = NaiveDate::parse_from_str(date.trim(), date_format).map_err(|e| {
            FilterError::ingest(id, format!("invalid date `{}`: {}", date, e))
        })?;

        let open = number_field(id, "open", raw.open.as_ref())?;
        let close = number_field(id, "close", raw.close.as_ref())?;
        let volume = number_field(id, "volume", raw.volume.as_ref())?;

        if open == 0.0 {
            return Err(FilterError::ingest(id, "field `open` must be non-zero"));
        }

        let fiscal_month = NaiveDate::from_ymd_opt(parsed_date.year(), parsed_date.month(), 1)
            .ok_or_else(|| FilterError::ingest(id, format!("no month start for {}", parsed_date)))?;

        Ok(Self {
            id,
            date,
            open,
            close,
            volume,
            parsed_date,
            year: parsed_date.year(),
            fiscal_month,
            day_of_week: parsed_date.weekday().num_days_from_sunday(),
            quarter: parsed_date.month0() / 3 + 1,
            fluctuation_bucket: round_half_up((close - open) / open * 100.0) as i64,
        })
    }
}

fn number_field(row: usize, name: &str, field: Option<&RawField>) -> Result<f64> {
    let field = field.ok_or_else(|| FilterError::ingest(row, format!("missing field `{}`", name)))?;
    let value = field.as_number().ok_or_else(|| {
        FilterError::ingest(row, format!("field `{}` is not a number: {:?}", name, field))
    })?;
    if !value.is_finite() {
        return Err(FilterError::ingest(
            row,
            format!("field `{}` is not finite: {}", name, value),
        ));
    }
    Ok(value)
}

// ═══════════════════════════════════════════════════════════════════════════
// 记录存储
// ═══════════════════════════════════════════════════════════════════════════

/// 记录存储 (只读)
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    /// 加载并派生字段；任一行失败则整体失败，不做部分加载
    pub fn load(rows: &[RawRow]) -> Result<Self> {
        Self::load_with_format(rows, DEFAULT_DATE_FORMAT)
    }

    /// 使用指定日期格式加载
    pub fn load_with_format(rows: &[RawRow], date_format: &str) -> Result<Self> {
        let records = rows
            .iter()
            .enumerate()
            .map(|(id, raw)| Record::derive(id, raw, date_format))
            .collect::<Result<Vec<_>>>()?;

        log::info!("RecordStore loaded {} records", records.len());
        Ok(Self { records })
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 按 ID 取记录 (ID 稠密且稳定，越界属于调用方错误)
    #[inline]
    pub fn at(&self, id: RecordId) -> &Record {
        &self.records[id]
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 测试
// ═══════════════════════════════════════════════════════════════════════════
