//! 字体度量与字符解码
//!
//! 内容流回退路径需要知道每个字形的宽度才能定位字符。优先使用字体字典里的
//! /Widths（简单字体）或 /W（CID 字体），标准 14 字体没有宽度表时使用内置度量，
//! 都没有时由调用方按字号估算。

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::utils::{get_number, get_stream_content, resolve};

/// Helvetica（Arial 同宽）32..=126 的字宽，单位 1/1000 em
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // 58-64
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722,
    667, 611, 722, 667, 944, 667, 667, 611, // A-Z
    278, 278, 278, 469, 556, 333, // 91-96
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333,
    500, 278, 556, 500, 722, 500, 500, 500, // a-z
    334, 260, 334, 584, // 123-126
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BuiltinMetrics {
    #[default]
    None,
    Helvetica,
    Courier,
}

/// 单个字体资源的度量与解码信息
#[derive(Debug, Clone, Default)]
pub struct FontInfo {
    /// Type0 字体，字符编码为 2 字节
    pub two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: Option<f32>,
    builtin: BuiltinMetrics,
    to_unicode: HashMap<u32, String>,
}

impl FontInfo {
    /// 字形宽度（1/1000 em），未知时返回 None
    pub fn width(&self, code: u32) -> Option<f32> {
        if self.two_byte {
            return self.cid_widths.get(&code).copied().or(self.default_width);
        }
        if code >= self.first_char {
            if let Some(w) = self.widths.get((code - self.first_char) as usize) {
                return Some(*w);
            }
        }
        match self.builtin {
            BuiltinMetrics::Helvetica if (32..=126).contains(&code) => {
                Some(HELVETICA_WIDTHS[(code - 32) as usize] as f32)
            }
            BuiltinMetrics::Courier => Some(600.0),
            _ => None,
        }
    }

    /// 把字符串操作数切分为字符编码
    pub fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| match pair {
                    [hi, lo] => ((*hi as u32) << 8) | *lo as u32,
                    [single] => *single as u32,
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|b| *b as u32).collect()
        }
    }

    pub fn code_len(&self) -> usize {
        if self.two_byte {
            2
        } else {
            1
        }
    }

    /// 编码对应的文本
    pub fn decode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.get(&code) {
            return text.clone();
        }
        if self.two_byte {
            if code == 0 {
                return " ".to_string();
            }
            char::from_u32(code)
                .filter(|c| !c.is_control())
                .map(String::from)
                .unwrap_or_else(|| '\u{FFFD}'.to_string())
        } else {
            // 单字节字体按 Latin-1 解释
            (code as u8 as char).to_string()
        }
    }
}

/// 页面资源名 → 字体信息
pub type FontMap = HashMap<Vec<u8>, FontInfo>;

/// 读取资源字典中的字体
pub fn resource_fonts(doc: &Document, resources: &Dictionary) -> FontMap {
    let mut fonts = FontMap::new();
    let font_dict = match resources.get(b"Font").ok().and_then(|o| resolve(doc, o)) {
        Some(Object::Dictionary(dict)) => dict,
        _ => return fonts,
    };
    for (name, obj) in font_dict.iter() {
        if let Some(Object::Dictionary(dict)) = resolve(doc, obj) {
            fonts.insert(name.clone(), font_info(doc, dict));
        }
    }
    fonts
}

/// 页面的 Resources 字典，沿 Parent 链向上继承
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(obj) = current.get(b"Resources") {
            if let Some(Object::Dictionary(dict)) = resolve(doc, obj) {
                return Some(dict);
            }
        }
        match current.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = doc.get_dictionary(*parent).ok()?,
            _ => return None,
        }
    }
    None
}

fn font_info(doc: &Document, dict: &Dictionary) -> FontInfo {
    let mut info = FontInfo::default();
    let subtype = name_of(dict.get(b"Subtype").ok());
    let base_font = name_of(dict.get(b"BaseFont").ok()).unwrap_or_default();

    if subtype.as_deref() == Some("Type0") {
        info.two_byte = true;
        info.default_width = Some(1000.0);
        if let Some(Object::Array(descendants)) = dict.get(b"DescendantFonts").ok().and_then(|o| resolve(doc, o)) {
            if let Some(Object::Dictionary(cid_font)) = descendants.first().and_then(|o| resolve(doc, o)) {
                if let Some(dw) = cid_font.get(b"DW").ok().and_then(get_number) {
                    info.default_width = Some(dw);
                }
                if let Some(Object::Array(w)) = cid_font.get(b"W").ok().and_then(|o| resolve(doc, o)) {
                    info.cid_widths = parse_cid_widths(doc, w);
                }
            }
        }
    } else {
        info.first_char = dict
            .get(b"FirstChar")
            .ok()
            .and_then(get_number)
            .map(|v| v.max(0.0) as u32)
            .unwrap_or(0);
        if let Some(Object::Array(widths)) = dict.get(b"Widths").ok().and_then(|o| resolve(doc, o)) {
            info.widths = widths
                .iter()
                .map(|w| resolve(doc, w).and_then(get_number).unwrap_or(0.0))
                .collect();
        }
        let lower = base_font.to_ascii_lowercase();
        if lower.contains("helvetica") || lower.contains("arial") {
            info.builtin = BuiltinMetrics::Helvetica;
        } else if lower.contains("courier") {
            info.builtin = BuiltinMetrics::Courier;
        }
    }

    if let Some(Object::Stream(stream)) = dict.get(b"ToUnicode").ok().and_then(|o| resolve(doc, o)) {
        if let Ok(data) = get_stream_content(stream) {
            info.to_unicode = parse_to_unicode(&data);
        }
    }
    info
}

fn name_of(obj: Option<&Object>) -> Option<String> {
    match obj {
        Some(Object::Name(name)) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// /W 数组：`c [w1 w2 ...]` 或 `c_first c_last w`
fn parse_cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < w.len() {
        let Some(first) = get_number(&w[i]) else {
            break;
        };
        let first = first.max(0.0) as u32;
        match w.get(i + 1).and_then(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, value) in list.iter().enumerate() {
                    if let Some(v) = get_number(value) {
                        widths.insert(first + offset as u32, v);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(value)) = (get_number(last), w.get(i + 2).and_then(get_number)) else {
                    break;
                };
                let last = last.max(0.0) as u32;
                // 防止损坏的范围撑爆内存
                for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                    widths.insert(cid, value);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

// ============================================================================
// ToUnicode CMap
// ============================================================================

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Word(String),
    ArrayStart,
    ArrayEnd,
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        match b {
            b'<' if data.get(i + 1) != Some(&b'<') => {
                let end = data[i + 1..]
                    .iter()
                    .position(|c| *c == b'>')
                    .map(|p| i + 1 + p)
                    .unwrap_or(data.len());
                let hex: Vec<u8> = data[i + 1..end]
                    .iter()
                    .copied()
                    .filter(|c| c.is_ascii_hexdigit())
                    .collect();
                tokens.push(Token::Hex(hex_bytes(&hex)));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            _ if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < data.len()
                    && !data[i].is_ascii_whitespace()
                    && !matches!(data[i], b'<' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                if i == start {
                    i += 1;
                    continue;
                }
                tokens.push(Token::Word(String::from_utf8_lossy(&data[start..i]).into_owned()));
            }
        }
    }
    tokens
}

fn hex_bytes(hex: &[u8]) -> Vec<u8> {
    let digit = |c: u8| (c as char).to_digit(16).unwrap_or(0) as u8;
    hex.chunks(2)
        .map(|pair| match pair {
            [hi, lo] => digit(*hi) << 4 | digit(*lo),
            [hi] => digit(*hi) << 4,
            _ => 0,
        })
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => ((*hi as u16) << 8) | *lo as u16,
            [single] => *single as u16,
            _ => 0,
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// 解析 bfchar / bfrange 段
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let tokens = tokenize(data);
    let mut map = HashMap::new();
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(w) if w == "beginbfchar" => {
                i += 1;
                while i + 1 < tokens.len() {
                    match (&tokens[i], &tokens[i + 1]) {
                        (Token::Hex(src), Token::Hex(dst)) => {
                            map.insert(code_of(src), utf16_text(dst));
                            i += 2;
                        }
                        _ => break,
                    }
                }
            }
            Token::Word(w) if w == "beginbfrange" => {
                i += 1;
                while i + 2 < tokens.len() {
                    let (Token::Hex(lo), Token::Hex(hi)) = (&tokens[i], &tokens[i + 1]) else {
                        break;
                    };
                    let (lo, hi) = (code_of(lo), code_of(hi));
                    match &tokens[i + 2] {
                        Token::Hex(dst) => {
                            let base = utf16_text(dst);
                            let mut chars: Vec<char> = base.chars().collect();
                            for code in lo..=hi.min(lo.saturating_add(0xFFFF)) {
                                map.insert(code, chars.iter().collect());
                                if let Some(last) = chars.last_mut() {
                                    *last = char::from_u32(*last as u32 + 1).unwrap_or(*last);
                                }
                            }
                            i += 3;
                        }
                        Token::ArrayStart => {
                            let mut j = i + 3;
                            let mut code = lo;
                            while j < tokens.len() {
                                match &tokens[j] {
                                    Token::Hex(dst) => {
                                        if code <= hi {
                                            map.insert(code, utf16_text(dst));
                                        }
                                        code = code.saturating_add(1);
                                        j += 1;
                                    }
                                    _ => break,
                                }
                            }
                            i = j + 1;
                        }
                        _ => break,
                    }
                }
            }
            _ => i += 1,
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helvetica_builtin_widths() {
        let info = FontInfo {
            builtin: BuiltinMetrics::Helvetica,
            ..Default::default()
        };
        assert_eq!(info.width(b'0' as u32), Some(556.0));
        assert_eq!(info.width(b'i' as u32), Some(222.0));
        assert_eq!(info.width(200), None);
    }

    #[test]
    fn test_explicit_widths_win() {
        let info = FontInfo {
            first_char: 48,
            widths: vec![500.0, 510.0],
            builtin: BuiltinMetrics::Helvetica,
            ..Default::default()
        };
        assert_eq!(info.width(49), Some(510.0));
        assert_eq!(info.width(50), Some(556.0));
    }

    #[test]
    fn test_two_byte_codes() {
        let info = FontInfo {
            two_byte: true,
            default_width: Some(1000.0),
            ..Default::default()
        };
        assert_eq!(info.codes(&[0x00, 0x41, 0x01, 0x02]), vec![0x41, 0x0102]);
        assert_eq!(info.width(7), Some(1000.0));
        assert_eq!(info.decode(0x41), "A");
    }

    #[test]
    fn test_parse_to_unicode() {
        let cmap = b"/CIDInit /ProcSet findresource begin\n\
            2 beginbfchar\n<0003> <0020>\n<0024> <0041>\nendbfchar\n\
            1 beginbfrange\n<0044> <0046> <0061>\nendbfrange\n\
            1 beginbfrange\n<0050> <0051> [<0078> <0079>]\nendbfrange\nend";
        let map = parse_to_unicode(cmap);
        assert_eq!(map.get(&0x03).map(String::as_str), Some(" "));
        assert_eq!(map.get(&0x24).map(String::as_str), Some("A"));
        assert_eq!(map.get(&0x45).map(String::as_str), Some("b"));
        assert_eq!(map.get(&0x46).map(String::as_str), Some("c"));
        assert_eq!(map.get(&0x51).map(String::as_str), Some("y"));
    }
}
