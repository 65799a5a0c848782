//! 工具模块

pub mod config;

pub use config::DashboardConfig;

/// 四舍五入 (0.5 向正无穷方向进位)
///
/// 与 `f64::round` 不同：`-2.5` → `-2.0`，`2.5` → `3.0`。
/// 分桶键与均值展示都依赖这一取整口径。
#[inline]
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-2.5), -2.0);
        assert_eq!(round_half_up(-2.6), -3.0);
        assert_eq!(round_half_up(9.49), 9.0);
        assert_eq!(round_half_up(0.0), 0.0);
    }
}
