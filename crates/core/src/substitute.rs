//! 文本内片段替换
//!
//! 文字处理类适配器不做整段判定，而是把段落中命中的子串替换为占位符。
//! 替换按固定顺序的若干轮执行：邮箱 → 电话 → 长数字 → 关键词 →
//! 首字母大写人名 → 全大写人名 → 称谓人名 → 各金额子规则。

use crate::catalog::{Catalog, Category, MatchMode, MatchRule};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 默认占位符
pub const DEFAULT_PLACEHOLDER: &str = "████████";

/// 替换策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubstitutionStrategy {
    /// 各轮依次执行，后一轮看到的是前一轮替换后的文本
    Sequential,
    /// 所有轮次在原文上一次算出，重叠按类别优先级、长度、位置裁决
    #[default]
    SingleScan,
}

impl std::str::FromStr for SubstitutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "single-scan" | "single_scan" | "singlescan" => Ok(Self::SingleScan),
            other => Err(format!("unknown substitution strategy: {}", other)),
        }
    }
}

/// 原文中的一个待替换片段（字节区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub category: Category,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

const PASS_ORDER: [Category; 8] = [
    Category::Email,
    Category::Phone,
    Category::LongNumber,
    Category::Keyword,
    Category::TitleCaseName,
    Category::UpperCaseName,
    Category::HonorificName,
    Category::Money,
];

/// 段落替换器
#[derive(Debug, Clone)]
pub struct Substituter {
    catalog: Arc<Catalog>,
    strategy: SubstitutionStrategy,
    placeholder: String,
}

impl Substituter {
    pub fn new(catalog: Arc<Catalog>, strategy: SubstitutionStrategy, placeholder: impl Into<String>) -> Self {
        Self {
            catalog,
            strategy,
            placeholder: placeholder.into(),
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn strategy(&self) -> SubstitutionStrategy {
        self.strategy
    }

    /// 按执行顺序排列的替换轮次
    fn passes(&self) -> Vec<&MatchRule> {
        let mut passes = Vec::new();
        for category in PASS_ORDER {
            for rule in self.catalog.rules(category) {
                // 账号的整段规则只用于单元判定，文本内替换用部分匹配的长数字规则
                if category == Category::LongNumber && rule.mode == MatchMode::FullSpan {
                    continue;
                }
                passes.push(rule);
            }
        }
        passes
    }

    /// 计算原文中需要替换的区间，结果按起点升序且互不重叠
    pub fn spans(&self, text: &str) -> Vec<Span> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        match self.strategy {
            SubstitutionStrategy::Sequential => self.sequential_spans(text),
            SubstitutionStrategy::SingleScan => self.single_scan_spans(text),
        }
    }

    /// 替换后的文本；没有命中时返回 `None`
    pub fn substitute(&self, text: &str) -> Option<String> {
        let spans = self.spans(text);
        if spans.is_empty() {
            return None;
        }
        Some(apply_spans(text, &spans, &self.placeholder))
    }

    // 占位符不含任何可被规则匹配的字符，所以后续轮次的匹配不会跨过已替换的位置。
    // 这里只在尚未替换的原文区段上执行每一轮，等价于在替换后的文本上执行。
    fn sequential_spans(&self, text: &str) -> Vec<Span> {
        let mut taken: Vec<Span> = Vec::new();
        for rule in self.passes() {
            let free = free_ranges(text.len(), &taken);
            let mut found = Vec::new();
            for (from, to) in free {
                let slice = &text[from..to];
                for m in rule.pattern().find_iter(slice) {
                    if m.start() == m.end() {
                        continue;
                    }
                    found.push(Span {
                        start: from + m.start(),
                        end: from + m.end(),
                        category: rule.category,
                    });
                }
            }
            taken.extend(found);
            taken.sort_by_key(|s| s.start);
        }
        taken
    }

    fn single_scan_spans(&self, text: &str) -> Vec<Span> {
        let mut candidates: Vec<Span> = self
            .passes()
            .into_iter()
            .flat_map(|rule| {
                rule.pattern()
                    .find_iter(text)
                    .filter(|m| m.start() != m.end())
                    .map(move |m| Span {
                        start: m.start(),
                        end: m.end(),
                        category: rule.category,
                    })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.category
                .precedence()
                .cmp(&a.category.precedence())
                .then(b.len().cmp(&a.len()))
                .then(a.start.cmp(&b.start))
        });

        let mut accepted: Vec<Span> = Vec::new();
        for candidate in candidates {
            if accepted.iter().all(|s| !s.overlaps(&candidate)) {
                accepted.push(candidate);
            }
        }
        accepted.sort_by_key(|s| s.start);
        accepted
    }
}

/// 已占用区间之外的原文区段
fn free_ranges(len: usize, taken: &[Span]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut cursor = 0;
    for span in taken {
        if span.start > cursor {
            ranges.push((cursor, span.start));
        }
        cursor = cursor.max(span.end);
    }
    if cursor < len {
        ranges.push((cursor, len));
    }
    ranges
}

/// 把升序、互不重叠的区间替换为占位符
pub fn apply_spans(text: &str, spans: &[Span], placeholder: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(&text[cursor..span.start]);
        out.push_str(placeholder);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}
