//! 候选内容单元
//!
//! 适配器从文档中抽取的最小判定对象：单元格、段落、PDF 文本片段。
//! 只在一次脱敏过程中临时存在，不做持久化。

use serde::{Deserialize, Serialize};

/// 单元的原始值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitValue {
    /// 文本内容
    Text(String),
    /// 数值，保存其十进制文本形式
    Number(String),
}

/// 候选内容单元
#[derive(Debug, Clone, PartialEq)]
pub struct ContentUnit {
    pub value: UnitValue,
    /// 几何格式（PDF）中的位置
    pub region: Option<Region>,
}

impl ContentUnit {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            value: UnitValue::Text(text.into()),
            region: None,
        }
    }

    pub fn number(decimal: impl Into<String>) -> Self {
        Self {
            value: UnitValue::Number(decimal.into()),
            region: None,
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn as_str(&self) -> &str {
        match &self.value {
            UnitValue::Text(s) | UnitValue::Number(s) => s,
        }
    }
}

/// PDF 用户空间中的矩形（左下角为原点）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Region {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left: left.min(right),
            bottom: bottom.min(top),
            right: left.max(right),
            top: bottom.max(top),
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn union(&self, other: &Region) -> Region {
        Region {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.bottom < other.top
            && self.top > other.bottom
    }

    /// 点是否落在矩形内（四周放宽 `margin`）
    pub fn contains(&self, x: f32, y: f32, margin: f32) -> bool {
        x >= self.left - margin
            && x <= self.right + margin
            && y >= self.bottom - margin
            && y <= self.top + margin
    }
}

/// 把单元格里的数值原文规范成十进制文本
///
/// 整数原样保留（去掉前导零），其它数值按最短往返形式输出，
/// 指数范围之外使用科学计数法（`1e+16`、`1e-05`）。
pub fn decimal_text(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", raw),
    };
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        let trimmed = digits.trim_start_matches('0');
        let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
        let sign = if trimmed == "0" { "" } else { sign };
        return Some(format!("{}{}", sign, trimmed));
    }

    let value: f64 = raw.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(float_text(value))
}

fn float_text(value: f64) -> String {
    let abs = value.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let formatted = format!("{:e}", value);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) => {
                let (exp_sign, exp_digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!("{}e{}{:0>2}", mantissa, exp_sign, exp_digits)
            }
            None => formatted,
        };
    }
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_text_integers() {
        assert_eq!(decimal_text("9876543210").as_deref(), Some("9876543210"));
        assert_eq!(decimal_text("007").as_deref(), Some("7"));
        assert_eq!(decimal_text("-42").as_deref(), Some("-42"));
        assert_eq!(decimal_text("").as_deref(), None);
    }

    #[test]
    fn test_decimal_text_floats() {
        assert_eq!(decimal_text("1234.5").as_deref(), Some("1234.5"));
        assert_eq!(decimal_text("1234.0").as_deref(), Some("1234.0"));
        assert_eq!(decimal_text("1.5E+3").as_deref(), Some("1500.0"));
        assert_eq!(decimal_text("1E+20").as_deref(), Some("1e+20"));
        assert_eq!(decimal_text("0.00001").as_deref(), Some("1e-05"));
        assert_eq!(decimal_text("abc"), None);
    }

    #[test]
    fn test_region_geometry() {
        let a = Region::new(10.0, 10.0, 0.0, 0.0);
        assert_eq!(a.left, 0.0);
        assert_eq!(a.top, 10.0);
        let b = Region::new(5.0, 5.0, 15.0, 15.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&Region::new(20.0, 20.0, 30.0, 30.0)));
        assert_eq!(a.union(&b), Region::new(0.0, 0.0, 15.0, 15.0));
        assert!(a.contains(10.5, 5.0, 1.0));
        assert!(!a.contains(11.5, 5.0, 1.0));
    }
}
