//! 规则模式源
//!
//! 所有类别的正则表达式原文集中在这里，由 `Catalog` 统一编译。
//! 格式适配器不得自带模式副本，避免各格式之间的规则漂移。

// ============================================================================
// 通用（部分包含匹配）
// ============================================================================

/// 邮箱地址
pub const EMAIL: &str = r"[a-zA-Z0-9_.+\-]+@[a-zA-Z0-9\-]+\.[a-zA-Z0-9.\-]+";

/// 10 位电话号码
pub const PHONE: &str = r"\b\d{10}\b";

/// 严格模式：首位为 6/7/8/9 的 10 位手机号
pub const PHONE_STRICT: &str = r"\b[6-9]\d{9}\b";

/// 12 位身份证号，允许 4-4-4 分组间的单个空白
pub const NATIONAL_ID: &str = r"\b\d{4}\s?\d{4}\s?\d{4}\b";

/// 4 位以上的数字串
pub const LONG_NUMBER: &str = r"\b\d{4,}\b";

/// 银行账号：10-18 位，必须整段匹配
pub const ACCOUNT_NUMBER: &str = r"\d{10,18}";

/// 敏感关键词（不区分大小写）
pub const KEYWORD: &str = r"(?i)\b(?:Aadhaar|PAN|Account|ATM|Password|Address|IFSC|SSN|CVV)\b";

/// 年龄表述
pub const AGE: &str = r"(?i)\bage\s*\d{1,3}\b";

/// 金额 / 薪资，按币种拆成独立子规则，替换阶段逐条执行
pub const MONEY: [&str; 7] = [
    r"(?i)\b(?:salary|sal|pay|wage|income)\s*[:\-]?\s*\d[\d,.]*\s*(?:lakh|lac|k|cr|million|mn|bn)?\b",
    r"(?i)[₹$€£]\s*\d[\d,.]*\s*(?:lakh|lac|k|cr|m|mn|bn)?\b",
    r"(?i)\b(?:rs\.?|inr|rupee|rupees)\s*[:\-]?\s*\d[\d,.]*\s*(?:lakh|lac|k|cr)?\b",
    r"(?i)\b(?:usd|\$|dollar|dollars)\s*[:\-]?\s*\d[\d,.]*\s*(?:k|m|mn|million|bn)?\b",
    r"(?i)\b(?:eur|€|euro|euros)\s*[:\-]?\s*\d[\d,.]*\s*(?:k|m|mn|million)?\b",
    r"(?i)\b(?:gbp|£|pound|pounds)\s*[:\-]?\s*\d[\d,.]*\s*(?:k|m|mn)?\b",
    r"(?i)\b(?:dinar|dinars|kwd|bhd|jod|iqd|aed|sar)\s*[:\-]?\s*\d[\d,.]*\s*(?:k|m)?\b",
];

/// 银行机构名称
pub const INSTITUTION: &str = r"(?i)\b(?:SBI|HDFC|ICICI|Axis Bank|Kotak|PNB|Bank of Baroda|BOB|Canara|Union Bank|Indian Bank|Central Bank|IDBI|Yes Bank|IndusInd|Federal Bank|Bandhan Bank)\b";

// ============================================================================
// 人名（整段匹配）
// ============================================================================

/// 首字母大写的 2-3 个单词：John Smith, Mary Jane Watson
pub const NAME_TITLE_CASE: &str = r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2}\b";

/// 全大写的 2-3 个单词：JOHN SMITH
pub const NAME_UPPER_CASE: &str = r"\b[A-Z]{2,}\s+[A-Z]{2,}(?:\s+[A-Z]{2,})?\b";

/// 全小写的 2-3 个单词，首词至少 4 个字母，避开 "of the" 之类的连接短语
pub const NAME_LOWER_CASE: &str = r"\b[a-z]{4,}\s+[a-z]{3,}(?:\s+[a-z]{3,})?\b";

/// 称谓 + 1-2 个名字：Mr. Smith, DR JANE DOE, mrs. jane doe
///
/// 称谓不区分大小写；名字按首字母大写、全大写、全小写三种写法之一匹配，
/// 同一个名字内写法一致，"Mr. Smith at" 只取到 "Mr. Smith"。
pub const NAME_HONORIFIC: &str = concat!(
    r"\b(?i:Mr|Mrs|Ms|Miss|Dr|Prof)\.?\s+",
    r"(?:[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?",
    r"|[A-Z]+(?:\s+[A-Z]+)?",
    r"|[a-z]+(?:\s+[a-z]+)?)\b",
);

/// 单个首字母大写单词，后跟 1-30 个小写字母
pub const CAPITALIZED_WORD: &str = r"[A-Z][a-z]{1,30}";

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_all_patterns_compile() {
        let mut sources = vec![
            EMAIL,
            PHONE,
            PHONE_STRICT,
            NATIONAL_ID,
            LONG_NUMBER,
            ACCOUNT_NUMBER,
            KEYWORD,
            AGE,
            INSTITUTION,
            NAME_TITLE_CASE,
            NAME_UPPER_CASE,
            NAME_LOWER_CASE,
            NAME_HONORIFIC,
            CAPITALIZED_WORD,
        ];
        sources.extend(MONEY.iter());
        for source in sources {
            assert!(Regex::new(source).is_ok(), "pattern failed: {}", source);
        }
    }

    #[test]
    fn test_money_suffixes() {
        let pay = Regex::new(MONEY[0]).unwrap();
        assert!(pay.is_match("Salary: 12 lakh"));
        assert!(pay.is_match("income 4,50,000"));

        let symbol = Regex::new(MONEY[1]).unwrap();
        assert_eq!(symbol.find("costs ₹ 2.5cr total").unwrap().as_str(), "₹ 2.5cr");
    }

    #[test]
    fn test_honorific_matches_any_casing() {
        let re = Regex::new(NAME_HONORIFIC).unwrap();
        let names = [
            "dr. Jane Doe",
            "PROF Xavier",
            "MR. SMITH",
            "dr. jane doe",
            "Dr. JANE DOE",
            "mr smith",
        ];
        for name in names {
            assert_eq!(re.find(name).map(|m| m.as_str()), Some(name), "{}", name);
        }
        assert!(!re.is_match("Mr. 42"));
    }

    #[test]
    fn test_honorific_stops_at_casing_change() {
        let re = Regex::new(NAME_HONORIFIC).unwrap();
        let found = re.find("Contact Mr. Smith at 9876543210").unwrap();
        assert_eq!(found.as_str(), "Mr. Smith");
        let found = re.find("ask DR. JANE DOE today").unwrap();
        assert_eq!(found.as_str(), "DR. JANE DOE");
    }
}
