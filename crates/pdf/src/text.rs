//! 内容流文字遍历
//!
//! 跟踪 CTM、文本矩阵与文本状态参数，计算每个字形在用户空间中的位置。
//! 同一套遍历既用于提取（回退版面、校验）也用于抹除。
//! 遇到 `Do` 引用的表单时带着当前图形状态递归进入。

use lopdf::content::{Content, Operation};
use lopdf::{Object, ObjectId};
use veil_core::Region;

use crate::fonts::{FontInfo, FontMap};
use crate::types::Glyph;
use crate::utils::get_number;
use crate::xobject::{ContentScope, FormStore, XObjectMap};

pub type Matrix = [f32; 6];

pub const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// 表单嵌套层数上限
const MAX_FORM_DEPTH: usize = 12;

/// 字形中心落在区域外扩该距离内即视为命中
pub const HIT_MARGIN: f32 = 1.0;

/// `a × b`（PDF 行向量约定）
pub(crate) fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

pub(crate) fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, obj) in m.iter_mut().zip(operands) {
        *slot = get_number(obj)?;
    }
    Some(m)
}

/// 估算单个字符的宽度（1/1000 em）
fn estimate_char_width(code: u32) -> f32 {
    if code < 128 {
        550.0
    } else {
        1000.0
    }
}

/// q/Q 保存的图形状态（只含与文字定位有关的部分）
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            font: None,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// 字形访问者
pub trait GlyphVisitor {
    /// 返回 true 时该字形在内容流中被抹掉
    fn glyph(&mut self, glyph: &Glyph) -> bool;

    /// 一个文字显示操作（Tj / TJ / ' / "）结束
    fn end_run(&mut self) {}
}

struct Walker<'a> {
    fonts: &'a FontMap,
    xobjects: &'a XObjectMap,
    forms: &'a mut FormStore,
    depth: usize,
    gs: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    in_text_object: bool,
    blanked: usize,
}

impl<'a> Walker<'a> {
    fn new(
        fonts: &'a FontMap,
        xobjects: &'a XObjectMap,
        forms: &'a mut FormStore,
        gs: GraphicsState,
        depth: usize,
    ) -> Self {
        Self {
            fonts,
            xobjects,
            forms,
            depth,
            gs,
            stack: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            in_text_object: false,
            blanked: 0,
        }
    }

    fn translate_line(&mut self, tx: f32, ty: f32) {
        self.tlm = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.gs.leading;
        self.translate_line(0.0, -leading);
    }

    fn advance(&mut self, tx: f32) {
        self.tm[4] += tx * self.tm[0];
        self.tm[5] += tx * self.tm[1];
    }

    /// 处理一个字符串操作数，命中的字形原地替换为空白
    fn show_string<V: GlyphVisitor>(&mut self, bytes: &mut [u8], visitor: &mut V) {
        let fonts = self.fonts;
        let fallback = FontInfo::default();
        let font = self
            .gs
            .font
            .as_ref()
            .and_then(|name| fonts.get(name))
            .unwrap_or(&fallback);
        let fs = self.gs.font_size;
        let th = self.gs.h_scale;
        let code_len = font.code_len();

        for (index, code) in font.codes(bytes).into_iter().enumerate() {
            let w0 = font.width(code).unwrap_or_else(|| estimate_char_width(code)) / 1000.0;
            let width = w0 * fs * th;
            let bottom = self.gs.rise - 0.2 * fs;
            let top = self.gs.rise + 0.8 * fs;

            let m = multiply(&self.tm, &self.gs.ctm);
            let corners = [
                apply(&m, 0.0, bottom),
                apply(&m, width, bottom),
                apply(&m, 0.0, top),
                apply(&m, width, top),
            ];
            let region = corners.iter().skip(1).fold(
                Region::new(corners[0].0, corners[0].1, corners[0].0, corners[0].1),
                |acc, (x, y)| acc.union(&Region::new(*x, *y, *x, *y)),
            );
            let glyph = Glyph {
                text: font.decode(code),
                region,
            };

            if visitor.glyph(&glyph) {
                let start = index * code_len;
                let end = (start + code_len).min(bytes.len());
                let blank: &[u8] = if font.two_byte { &[0, 0] } else { b" " };
                bytes[start..end].copy_from_slice(&blank[..end - start]);
                self.blanked += 1;
            }

            let spacing = if !font.two_byte && code == 32 {
                self.gs.char_spacing + self.gs.word_spacing
            } else {
                self.gs.char_spacing
            };
            self.advance((w0 * fs + spacing) * th);
        }
    }

    fn operation<V: GlyphVisitor>(&mut self, op: &mut Operation, visitor: &mut V) {
        let number = |i: usize| op.operands.get(i).and_then(get_number);
        match op.operator.as_str() {
            "q" => self.stack.push(self.gs.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.gs = saved;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operands(&op.operands) {
                    self.gs.ctm = multiply(&m, &self.gs.ctm);
                }
            }
            "BT" => {
                self.in_text_object = true;
                self.tm = IDENTITY;
                self.tlm = IDENTITY;
            }
            "ET" => self.in_text_object = false,
            "Do" => {
                let form_id = match op.operands.first() {
                    Some(Object::Name(name)) => self.xobjects.get(name).copied(),
                    _ => None,
                };
                if let Some(id) = form_id {
                    let depth = self.depth + 1;
                    self.blanked += walk_form(&mut *self.forms, id, &self.gs, depth, visitor);
                }
            }
            "Tf" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    self.gs.font = Some(name.clone());
                }
                if let Some(size) = number(1) {
                    self.gs.font_size = size;
                }
            }
            "Tc" => self.gs.char_spacing = number(0).unwrap_or(self.gs.char_spacing),
            "Tw" => self.gs.word_spacing = number(0).unwrap_or(self.gs.word_spacing),
            "Tz" => self.gs.h_scale = number(0).map(|v| v / 100.0).unwrap_or(self.gs.h_scale),
            "TL" => self.gs.leading = number(0).unwrap_or(self.gs.leading),
            "Ts" => self.gs.rise = number(0).unwrap_or(self.gs.rise),
            "Tm" => {
                if let Some(m) = matrix_operands(&op.operands) {
                    self.tm = m;
                    self.tlm = m;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                    self.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                    self.gs.leading = -ty;
                    self.translate_line(tx, ty);
                }
            }
            "T*" => self.next_line(),
            "Tj" if self.in_text_object => {
                if let Some(Object::String(bytes, _)) = op.operands.first_mut() {
                    self.show_string(bytes, visitor);
                }
                visitor.end_run();
            }
            "'" if self.in_text_object => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.first_mut() {
                    self.show_string(bytes, visitor);
                }
                visitor.end_run();
            }
            "\"" if self.in_text_object => {
                if let (Some(aw), Some(ac)) = (number(0), number(1)) {
                    self.gs.word_spacing = aw;
                    self.gs.char_spacing = ac;
                }
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.get_mut(2) {
                    self.show_string(bytes, visitor);
                }
                visitor.end_run();
            }
            "TJ" if self.in_text_object => {
                if let Some(Object::Array(items)) = op.operands.first_mut() {
                    for item in items.iter_mut() {
                        match item {
                            Object::String(bytes, _) => self.show_string(bytes, visitor),
                            other => {
                                if let Some(n) = get_number(other) {
                                    let tx = -n / 1000.0 * self.gs.font_size * self.gs.h_scale;
                                    self.advance(tx);
                                }
                            }
                        }
                    }
                }
                visitor.end_run();
            }
            _ => {}
        }
    }
}

/// 在调用处的图形状态下遍历表单，表单内被抹掉的字形计入表单
fn walk_form<V: GlyphVisitor>(
    forms: &mut FormStore,
    id: ObjectId,
    gs: &GraphicsState,
    depth: usize,
    visitor: &mut V,
) -> usize {
    if depth > MAX_FORM_DEPTH {
        log::warn!("[Form] 表单 {:?} 嵌套超过 {} 层，跳过", id, MAX_FORM_DEPTH);
        return 0;
    }
    let Some(mut form) = forms.take(id) else {
        return 0;
    };

    let mut state = gs.clone();
    state.ctm = multiply(&form.matrix, &gs.ctm);
    let mut walker = Walker::new(&form.fonts, &form.xobjects, forms, state, depth);
    for op in form.operations.iter_mut() {
        walker.operation(op, visitor);
    }
    let blanked = walker.blanked;

    form.blanked += blanked;
    forms.insert(id, form);
    blanked
}

/// 遍历操作序列中的全部文字（含引用的表单），返回被抹掉的字形数
pub fn walk_text<V: GlyphVisitor>(
    operations: &mut [Operation],
    scope: &mut ContentScope,
    visitor: &mut V,
) -> usize {
    let ContentScope {
        fonts,
        xobjects,
        forms,
    } = scope;
    let mut walker = Walker::new(fonts, xobjects, forms, GraphicsState::default(), 0);
    for op in operations.iter_mut() {
        walker.operation(op, visitor);
    }
    walker.blanked
}

/// 按文字显示操作收集字形
#[derive(Debug, Default)]
pub struct RunCollector {
    pub runs: Vec<Vec<Glyph>>,
    current: Vec<Glyph>,
}

impl GlyphVisitor for RunCollector {
    fn glyph(&mut self, glyph: &Glyph) -> bool {
        self.current.push(glyph.clone());
        false
    }

    fn end_run(&mut self) {
        if !self.current.is_empty() {
            self.runs.push(std::mem::take(&mut self.current));
        }
    }
}

/// 抹掉中心落在任一区域内的非空白字形
struct RegionScrubber<'a> {
    regions: &'a [Region],
}

impl GlyphVisitor for RegionScrubber<'_> {
    fn glyph(&mut self, glyph: &Glyph) -> bool {
        if glyph.is_blank() {
            return false;
        }
        let (x, y) = glyph.center();
        self.regions.iter().any(|r| r.contains(x, y, HIT_MARGIN))
    }
}

/// 提取内容流中每个文字显示操作的字形
pub fn collect_runs(
    content_data: &[u8],
    scope: &mut ContentScope,
) -> Result<Vec<Vec<Glyph>>, String> {
    let mut content = Content::decode(content_data).map_err(|e| e.to_string())?;
    let mut collector = RunCollector::default();
    walk_text(&mut content.operations, scope, &mut collector);
    Ok(collector.runs)
}

/// 烧录：抹掉区域内字形，原内容包进 q…Q，再追加黑框
///
/// 返回新的内容流和被抹掉的字形数（含表单内的），表单改动留在 `scope` 里
pub fn burn_content(
    content_data: &[u8],
    scope: &mut ContentScope,
    regions: &[Region],
) -> Result<(Vec<u8>, usize), String> {
    let mut content = Content::decode(content_data).map_err(|e| e.to_string())?;
    let blanked = walk_text(&mut content.operations, scope, &mut RegionScrubber { regions });
    if blanked > 0 {
        log::info!("[Burn] 抹除 {} 个字形", blanked);
    }

    let mut operations = Vec::with_capacity(content.operations.len() + regions.len() * 2 + 6);
    operations.push(Operation::new("q", vec![]));
    operations.extend(content.operations);
    operations.push(Operation::new("Q", vec![]));
    add_black_overlay(&mut operations, regions);

    let encoded = Content { operations }.encode().map_err(|e| e.to_string())?;
    Ok((encoded, blanked))
}

/// 追加黑框覆盖（默认用户空间）
pub fn add_black_overlay(operations: &mut Vec<Operation>, regions: &[Region]) {
    operations.push(Operation::new("q", vec![]));
    operations.push(Operation::new(
        "rg",
        vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
    ));
    operations.push(Operation::new(
        "RG",
        vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
    ));

    for rect in regions {
        log::debug!(
            "[BlackOverlay] 绘制黑框: x={:.2}, y={:.2}, w={:.2}, h={:.2}",
            rect.left,
            rect.bottom,
            rect.width(),
            rect.height()
        );
        operations.push(Operation::new(
            "re",
            vec![
                Object::Real(rect.left),
                Object::Real(rect.bottom),
                Object::Real(rect.width()),
                Object::Real(rect.height()),
            ],
        ));
        operations.push(Operation::new("f", vec![]));
    }

    operations.push(Operation::new("Q", vec![]));
}
