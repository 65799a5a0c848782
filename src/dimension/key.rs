//! 维度键
//!
//! 维度键是封闭的枚举，按自然序比较：
//! - Int / Date / Text 按值比较
//! - Label 为 "序号.标签" 复合键，按序号比较 (星期维度 Sun→Sat 而非字母序)

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::fmt;

/// 复合标签键 (例如 `0.Sun`)
///
/// 字段顺序决定派生的 Ord：先比较 ordinal，再比较 label。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrdinalLabel {
    pub ordinal: i64,
    pub label: String,
}

/// 维度键
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Int(i64),
    Date(NaiveDate),
    Label(OrdinalLabel),
    Text(String),
}

impl Key {
    pub fn label(ordinal: i64, label: impl Into<String>) -> Self {
        Key::Label(OrdinalLabel {
            ordinal,
            label: label.into(),
        })
    }

    pub fn text(s: impl Into<String>) -> Self {
        Key::Text(s.into())
    }

    /// 解析 "序号.标签" 形式的复合键；没有数字前缀时退化为 Text
    pub fn parse_label(s: &str) -> Self {
        match s.split_once('.') {
            Some((prefix, label)) => match prefix.trim().parse::<i64>() {
                Ok(ordinal) => Key::label(ordinal, label),
                Err(_) => Key::text(s),
            },
            None => Key::text(s),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(v) => Some(*v),
            Key::Label(l) => Some(l.ordinal),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Key::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// 展示用名称 (Label 只取标签部分)
    pub fn display_name(&self) -> String {
        match self {
            Key::Label(l) => l.label.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{}", v),
            Key::Date(d) => write!(f, "{}", d),
            Key::Label(l) => write!(f, "{}.{}", l.ordinal, l.label),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Key::Int(v) => serializer.serialize_i64(*v),
            other => serializer.collect_str(other),
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Int(v as i64)
    }
}

impl From<u32> for Key {
    fn from(v: u32) -> Self {
        Key::Int(v as i64)
    }
}

impl From<NaiveDate> for Key {
    fn from(d: NaiveDate) -> Self {
        Key::Date(d)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_orders_by_numeric_prefix() {
        let mut keys = vec![
            Key::parse_label("10.Oct"),
            Key::parse_label("2.Tue"),
            Key::parse_label("0.Sun"),
            Key::parse_label("6.Sat"),
        ];
        keys.sort();
        let names: Vec<String> = keys.iter().map(Key::display_name).collect();
        assert_eq!(names, vec!["Sun", "Tue", "Sat", "Oct"]);
    }

    #[test]
    fn test_parse_label_without_prefix() {
        assert_eq!(Key::parse_label("Gain"), Key::text("Gain"));
        assert_eq!(Key::parse_label("x.Gain"), Key::text("x.Gain"));
    }

    #[test]
    fn test_display_and_serialize() {
        assert_eq!(Key::label(3, "Wed").to_string(), "3.Wed");
        assert_eq!(serde_json::to_string(&Key::Int(-4)).unwrap(), "-4");
        let d = NaiveDate::from_ymd_opt(2012, 1, 1).unwrap();
        assert_eq!(serde_json::to_string(&Key::Date(d)).unwrap(), "\"2012-01-01\"");
    }
}
