//! 敏感判定
//!
//! 对单个内容单元给出是否需要遮盖的二值判断。

use crate::catalog::{Catalog, Category};
use crate::unit::{ContentUnit, UnitValue};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static TEN_DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{10}").unwrap_or_else(|e| panic!("{}", e)));

/// 敏感内容判定器
///
/// 无状态、可在线程间共享，克隆只复制目录的引用计数。
#[derive(Debug, Clone)]
pub struct Classifier {
    catalog: Arc<Catalog>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::standard()
    }
}

impl Classifier {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    /// 全部类别启用的判定器
    pub fn standard() -> Self {
        Self::new(Catalog::standard().clone())
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn is_sensitive(&self, unit: &ContentUnit) -> bool {
        match &unit.value {
            UnitValue::Text(text) => self.is_sensitive_text(text),
            UnitValue::Number(decimal) => self.is_sensitive_number(decimal),
        }
    }

    /// 文本判定：去除首尾空白后，任一启用类别的任一规则命中即为敏感
    pub fn is_sensitive_text(&self, text: &str) -> bool {
        self.matching_category(text).is_some()
    }

    /// 数值判定：只看十进制文本是否含 10 位连续数字，或是否为 4 位以上纯数字
    pub fn is_sensitive_number(&self, decimal: &str) -> bool {
        let decimal = decimal.trim();
        if decimal.is_empty() {
            return false;
        }
        TEN_DIGIT_RUN.is_match(decimal)
            || (decimal.len() >= 4 && decimal.bytes().all(|b| b.is_ascii_digit()))
    }

    /// 第一个命中的类别（按目录顺序）
    pub fn matching_category(&self, text: &str) -> Option<Category> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.catalog
            .enabled_rules()
            .find(|rule| rule.matches(text))
            .map(|rule| rule.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogOptions;

    fn classifier() -> Classifier {
        Classifier::standard()
    }

    #[test]
    fn test_empty_and_whitespace_are_not_sensitive() {
        let c = classifier();
        assert!(!c.is_sensitive(&ContentUnit::text("")));
        assert!(!c.is_sensitive(&ContentUnit::text("   \t\n")));
        assert!(!c.is_sensitive(&ContentUnit::number("")));
    }

    #[test]
    fn test_email_anywhere_is_sensitive() {
        let c = classifier();
        assert!(c.is_sensitive_text("please write to john.doe@example.com today"));
        assert_eq!(
            c.matching_category("john.doe@example.com"),
            Some(Category::Email)
        );
    }

    #[test]
    fn test_title_case_name_alone_vs_in_sentence() {
        let c = classifier();
        assert!(c.is_sensitive_text("John Smith"));
        assert!(c.is_sensitive_text("  John Smith  "));
        assert!(!c.is_sensitive_text("I met John Smith yesterday"));
    }

    #[test]
    fn test_partial_categories() {
        let c = classifier();
        assert!(c.is_sensitive_text("call 9876543210 now"));
        assert!(c.is_sensitive_text("id 1234 5678 9012"));
        assert!(c.is_sensitive_text("ref no 12345"));
        assert!(c.is_sensitive_text("enter your password here"));
        assert!(c.is_sensitive_text("Age 42"));
        assert!(c.is_sensitive_text("salary: 50000"));
        assert!(c.is_sensitive_text("costs $ 1,200"));
        assert!(c.is_sensitive_text("transfer via hdfc branch"));
        assert!(!c.is_sensitive_text("the quick brown fox, 12 times."));
    }

    #[test]
    fn test_full_span_name_shapes() {
        let c = classifier();
        assert_eq!(c.matching_category("JOHN SMITH"), Some(Category::UpperCaseName));
        assert_eq!(c.matching_category("mary watson"), Some(Category::LowerCaseName));
        assert_eq!(c.matching_category("Mr. Smith"), Some(Category::HonorificName));
        assert_eq!(c.matching_category("Smith"), Some(Category::CapitalizedWord));
        assert!(!c.is_sensitive_text("of the"));
    }

    #[test]
    fn test_honorific_names_in_any_casing() {
        let c = classifier();
        for name in ["MR. SMITH", "dr. jane doe", "Dr. JANE DOE", "mr smith"] {
            assert_eq!(c.matching_category(name), Some(Category::HonorificName), "{}", name);
        }
    }

    #[test]
    fn test_numeric_units_use_narrow_check() {
        let c = classifier();
        assert!(c.is_sensitive(&ContentUnit::number("9876543210")));
        assert!(c.is_sensitive(&ContentUnit::number("1234")));
        assert!(c.is_sensitive(&ContentUnit::number("98765432101.5")));
        assert!(!c.is_sensitive(&ContentUnit::number("123")));
        assert!(!c.is_sensitive(&ContentUnit::number("1234.5")));
        assert!(!c.is_sensitive(&ContentUnit::number("-12345")));
    }

    #[test]
    fn test_disabled_category_is_ignored() {
        let mut options = CatalogOptions::default();
        options.disabled.insert(Category::CapitalizedWord);
        let c = Classifier::new(Catalog::with_options(&options));
        assert!(!c.is_sensitive_text("Smith"));
        assert!(c.is_sensitive_text("John Smith"));
    }

    #[test]
    fn test_classifier_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Classifier>();
    }
}
