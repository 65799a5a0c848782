//! 配置管理模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::record::DEFAULT_DATE_FORMAT;
use crate::{FilterError, Result};

/// 看板配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub table: TableConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// env_logger 默认过滤级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// 行情文件 (.json / .csv)
    #[serde(default = "default_data_path")]
    pub path: String,
    /// chrono 日期格式
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            date_format: default_date_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// 明细表显示行数
    #[serde(default = "default_table_rows")]
    pub rows: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            rows: default_table_rows(),
        }
    }
}

// 默认值函数
fn default_app_name() -> String {
    "qafilter-dashboard".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_path() -> String {
    "data/ndx.csv".to_string()
}
fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}
fn default_table_rows() -> usize {
    25
}

impl DashboardConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            FilterError::ConfigError(format!("Failed to read config file: {}", e))
        })?;
        Self::from_toml(&content)
    }

    pub fn load_default() -> Result<Self> {
        Self::load_from_file("config/dashboard.toml")
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            FilterError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data.date_format.trim().is_empty() {
            return Err(FilterError::ConfigError(
                "data.date_format must not be empty".to_string(),
            ));
        }
        if self.table.rows == 0 {
            return Err(FilterError::ConfigError(
                "table.rows must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
