//! 敏感信息类别目录
//!
//! 定义所有敏感类别及其匹配规则。目录是全部格式适配器共享的唯一规则来源，
//! 进程内只编译一次，之后只读共享。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod patterns;

/// 敏感信息类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// 邮箱地址
    Email,
    /// 电话号码
    Phone,
    /// 身份证号
    NationalId,
    /// 长数字串 / 银行账号
    LongNumber,
    /// 敏感关键词
    Keyword,
    /// 年龄
    Age,
    /// 金额 / 薪资
    Money,
    /// 银行机构名称
    Institution,
    /// 首字母大写人名
    TitleCaseName,
    /// 全大写人名
    UpperCaseName,
    /// 全小写人名
    LowerCaseName,
    /// 带称谓的人名
    HonorificName,
    /// 单个首字母大写单词
    CapitalizedWord,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::Email,
        Category::Phone,
        Category::NationalId,
        Category::LongNumber,
        Category::Keyword,
        Category::Age,
        Category::Money,
        Category::Institution,
        Category::TitleCaseName,
        Category::UpperCaseName,
        Category::LowerCaseName,
        Category::HonorificName,
        Category::CapitalizedWord,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Email => "email",
            Category::Phone => "phone",
            Category::NationalId => "national_id",
            Category::LongNumber => "long_number",
            Category::Keyword => "keyword",
            Category::Age => "age",
            Category::Money => "money",
            Category::Institution => "institution",
            Category::TitleCaseName => "title_case_name",
            Category::UpperCaseName => "upper_case_name",
            Category::LowerCaseName => "lower_case_name",
            Category::HonorificName => "honorific_name",
            Category::CapitalizedWord => "capitalized_word",
        }
    }

    /// 单次扫描时的重叠裁决优先级，数值越大越优先
    pub fn precedence(&self) -> u8 {
        match self {
            Category::Email => 8,
            Category::Money => 7,
            Category::HonorificName => 6,
            Category::Phone => 5,
            Category::LongNumber => 4,
            Category::UpperCaseName => 3,
            Category::TitleCaseName => 2,
            Category::Keyword => 1,
            _ => 0,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// 文本中任意位置包含即命中
    Partial,
    /// 整段文本必须恰好等于模式的匹配范围
    FullSpan,
}

/// 单条匹配规则
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub category: Category,
    pub mode: MatchMode,
    /// 命中文本还须全部为大写字母
    pub require_uppercase: bool,
    /// 未锚定的模式，用于文本内替换
    pattern: Regex,
    /// 整段匹配用的锚定版本
    anchored: Option<Regex>,
}

impl MatchRule {
    fn new(category: Category, mode: MatchMode, source: &str) -> Self {
        let pattern = compile(source);
        let anchored = match mode {
            MatchMode::Partial => None,
            MatchMode::FullSpan => Some(compile(&format!("^(?:{})$", source))),
        };
        Self {
            category,
            mode,
            require_uppercase: false,
            pattern,
            anchored,
        }
    }

    fn partial(category: Category, source: &str) -> Self {
        Self::new(category, MatchMode::Partial, source)
    }

    fn full_span(category: Category, source: &str) -> Self {
        Self::new(category, MatchMode::FullSpan, source)
    }

    fn uppercase(mut self) -> Self {
        self.require_uppercase = true;
        self
    }

    /// 按规则自身的匹配方式判断（调用方负责去除首尾空白）
    pub fn matches(&self, text: &str) -> bool {
        let hit = match &self.anchored {
            Some(anchored) => anchored.is_match(text),
            None => self.pattern.is_match(text),
        };
        hit && (!self.require_uppercase || is_all_uppercase(text))
    }

    /// 文本内替换使用的模式
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }
}

/// 目录构建选项
#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    /// 被关闭的类别
    pub disabled: HashSet<Category>,
    /// 电话号码使用首位 6-9 的严格规则
    pub strict_phone: bool,
}

/// 类别目录
#[derive(Debug, Clone)]
pub struct Catalog {
    rules: Vec<MatchRule>,
    disabled: HashSet<Category>,
}

static STANDARD: Lazy<Catalog> = Lazy::new(|| Catalog::with_options(&CatalogOptions::default()));

impl Catalog {
    /// 全部类别启用的标准目录（进程内共享）
    pub fn standard() -> &'static Catalog {
        &STANDARD
    }

    pub fn with_options(options: &CatalogOptions) -> Self {
        use Category::*;

        let phone = if options.strict_phone {
            patterns::PHONE_STRICT
        } else {
            patterns::PHONE
        };

        let mut rules = vec![
            MatchRule::partial(Email, patterns::EMAIL),
            MatchRule::partial(Phone, phone),
            MatchRule::partial(NationalId, patterns::NATIONAL_ID),
            MatchRule::partial(LongNumber, patterns::LONG_NUMBER),
            MatchRule::full_span(LongNumber, patterns::ACCOUNT_NUMBER),
            MatchRule::partial(Keyword, patterns::KEYWORD),
            MatchRule::partial(Age, patterns::AGE),
        ];
        rules.extend(patterns::MONEY.iter().map(|p| MatchRule::partial(Money, p)));
        rules.extend([
            MatchRule::partial(Institution, patterns::INSTITUTION),
            MatchRule::full_span(TitleCaseName, patterns::NAME_TITLE_CASE),
            MatchRule::full_span(UpperCaseName, patterns::NAME_UPPER_CASE).uppercase(),
            MatchRule::full_span(LowerCaseName, patterns::NAME_LOWER_CASE),
            MatchRule::full_span(HonorificName, patterns::NAME_HONORIFIC),
            MatchRule::full_span(CapitalizedWord, patterns::CAPITALIZED_WORD),
        ]);

        Self {
            rules,
            disabled: options.disabled.clone(),
        }
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        !self.disabled.contains(&category)
    }

    /// 启用的类别，按目录顺序
    pub fn categories(&self) -> Vec<Category> {
        Category::ALL
            .iter()
            .copied()
            .filter(|c| self.is_enabled(*c))
            .collect()
    }

    /// 某个类别的全部规则（类别被关闭时为空）
    pub fn rules(&self, category: Category) -> impl Iterator<Item = &MatchRule> {
        let enabled = self.is_enabled(category);
        self.rules
            .iter()
            .filter(move |r| enabled && r.category == category)
    }

    /// 所有启用的规则，按目录顺序
    pub fn enabled_rules(&self) -> impl Iterator<Item = &MatchRule> {
        self.rules.iter().filter(|r| self.is_enabled(r.category))
    }
}

fn compile(source: &str) -> Regex {
    // 模式源是编译期常量，由 patterns 的测试保证可编译
    Regex::new(source).unwrap_or_else(|e| panic!("invalid built-in pattern {}: {}", source, e))
}

fn is_all_uppercase(text: &str) -> bool {
    let mut has_cased = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            has_cased = true;
        }
    }
    has_cased
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_has_every_category() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.categories().len(), Category::ALL.len());
        for category in Category::ALL {
            assert!(catalog.rules(category).count() >= 1, "{} has no rule", category);
        }
        assert_eq!(catalog.rules(Category::Money).count(), 7);
    }

    #[test]
    fn test_disabled_category_has_no_rules() {
        let mut options = CatalogOptions::default();
        options.disabled.insert(Category::CapitalizedWord);
        let catalog = Catalog::with_options(&options);
        assert!(!catalog.is_enabled(Category::CapitalizedWord));
        assert_eq!(catalog.rules(Category::CapitalizedWord).count(), 0);
        assert!(catalog
            .enabled_rules()
            .all(|r| r.category != Category::CapitalizedWord));
    }

    #[test]
    fn test_full_span_rule_ignores_embedded_match() {
        let catalog = Catalog::standard();
        let rule = catalog.rules(Category::TitleCaseName).next().unwrap();
        assert!(rule.matches("John Smith"));
        assert!(!rule.matches("I met John Smith yesterday"));
        assert!(rule.pattern().is_match("I met John Smith yesterday"));
    }

    #[test]
    fn test_account_number_requires_whole_value() {
        let catalog = Catalog::standard();
        let account = catalog
            .rules(Category::LongNumber)
            .find(|r| r.mode == MatchMode::FullSpan)
            .unwrap();
        assert!(account.matches("123456789012345"));
        assert!(!account.matches("acct 123456789012345"));
        assert!(!account.matches("1234567"));
    }

    #[test]
    fn test_strict_phone() {
        let options = CatalogOptions {
            strict_phone: true,
            ..Default::default()
        };
        let catalog = Catalog::with_options(&options);
        let phone = catalog.rules(Category::Phone).next().unwrap();
        assert!(phone.matches("call 9876543210"));
        assert!(!phone.matches("call 1234567890"));
    }

    #[test]
    fn test_uppercase_check() {
        let catalog = Catalog::standard();
        let rule = catalog.rules(Category::UpperCaseName).next().unwrap();
        assert!(rule.require_uppercase);
        assert!(rule.matches("JOHN SMITH"));
        assert!(!rule.matches("JOHN Smith"));
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&Category::HonorificName).unwrap();
        assert_eq!(json, "\"honorific_name\"");
        let parsed: Category = serde_json::from_str("\"long_number\"").unwrap();
        assert_eq!(parsed, Category::LongNumber);
    }
}
