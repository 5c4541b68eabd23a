//! 日志中的敏感文本处理

/// 是否在日志中输出完整文本（VEIL_LOG_FULL_TEXT=1/true/yes）
pub fn should_log_full_text() -> bool {
    match std::env::var("VEIL_LOG_FULL_TEXT") {
        Ok(val) => {
            let val = val.to_ascii_lowercase();
            val == "1" || val == "true" || val == "yes"
        }
        Err(_) => false,
    }
}

/// 遮掩中间部分，只保留首尾少量字符
pub fn mask_snippet(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len <= 4 {
        "*".repeat(len)
    } else {
        let visible = 4.min(len / 3);
        let prefix: String = chars[..visible].iter().collect();
        let suffix: String = chars[len - visible..].iter().collect();
        format!("{}****{}", prefix, suffix)
    }
}

/// 日志用的文本：默认遮掩
pub fn log_text(text: &str) -> String {
    if should_log_full_text() {
        text.to_string()
    } else {
        mask_snippet(text)
    }
}
