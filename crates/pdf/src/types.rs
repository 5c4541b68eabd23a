use serde::Serialize;
use veil_core::Region;

/// 页面内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageContentType {
    Text,           // 包含文字操作符 (Tj/TJ)
    PathDrawn,      // 主要是路径绘制
    ImageBased,     // 主要是图片（扫描件）
    Mixed,          // 混合类型
    Empty,          // 空页面
}

/// 页面实际采用的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageAction {
    Burn,
    Rasterize,
}

/// 带位置的单个字形
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    /// 解码后的文本，连字可能不止一个字符
    pub text: String,
    pub region: Region,
}

impl Glyph {
    pub fn center(&self) -> (f32, f32) {
        (
            (self.region.left + self.region.right) / 2.0,
            (self.region.bottom + self.region.top) / 2.0,
        )
    }

    pub fn is_blank(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }
}

/// 候选文本：一个版面片段或一个单词
#[derive(Debug, Clone, PartialEq)]
pub struct TextCandidate {
    pub text: String,
    pub region: Region,
}

/// 一页的候选文本
#[derive(Debug, Clone, Default)]
pub struct PageText {
    /// 版面片段（pdfium 文本段，或内容流里的一个文字操作）
    pub spans: Vec<TextCandidate>,
    /// 按空白和换行切分的单词
    pub words: Vec<TextCandidate>,
}

impl PageText {
    pub fn candidates(&self) -> impl Iterator<Item = &TextCandidate> {
        self.spans.iter().chain(self.words.iter())
    }
}
