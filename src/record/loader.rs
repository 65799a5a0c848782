//! 原始行加载
//!
//! 按扩展名读取 JSON 数组或带表头的 CSV (`date,open,close,volume`)。
//! 这里只做文本到 `RawRow` 的搬运，字段校验统一在 `RecordStore::load` 完成。

use std::fs;
use std::path::Path;

use super::{RawField, RawRow};
use crate::{FilterError, Result};

/// 从文件加载原始行
pub fn load_rows<P: AsRef<Path>>(path: P) -> Result<Vec<RawRow>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| FilterError::IOError(format!("Failed to read {}: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let rows = if is_json {
        parse_json_rows(&content)?
    } else {
        parse_csv_rows(&content)?
    };

    log::info!("Loaded {} raw rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// 解析 JSON 数组
pub fn parse_json_rows(content: &str) -> Result<Vec<RawRow>> {
    serde_json::from_str(content)
        .map_err(|e| FilterError::SerializationError(format!("Failed to parse rows: {}", e)))
}

/// 解析带表头的 CSV (不支持引号转义，多余列忽略)
pub fn parse_csv_rows(content: &str) -> Result<Vec<RawRow>> {
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| FilterError::SerializationError("CSV input has no header".to_string()))?;
    let columns: Vec<String> = header
        .split(',')
        .map(|c| c.trim().to_ascii_lowercase())
        .collect();
    let position = |name: &str| columns.iter().position(|c| c == name);

    let date_col = position("date");
    let open_col = position("open");
    let close_col = position("close");
    let volume_col = position("volume");

    let rows = lines
        .map(|line| {
            let cells: Vec<&str> = line.split(',').map(str::trim).collect();
            let cell = |col: Option<usize>| {
                col.and_then(|i| cells.get(i))
                    .filter(|s| !s.is_empty())
                    .map(|s| RawField::Text((*s).to_string()))
            };
            RawRow {
                date: cell(date_col),
                open: cell(open_col),
                close: cell(close_col),
                volume: cell(volume_col),
            }
        })
        .collect();

    Ok(rows)
}
