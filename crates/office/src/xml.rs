//! 可修改的 XML 树
//!
//! 用 quick-xml 的事件流构建一棵拥有所有权的树，改完后再按原顺序写回。
//! 声明、注释、处理指令、CDATA 原样保留；文本节点保存反转义后的内容。

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::OfficeError;

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
    /// 不参与脱敏的其他事件
    Raw(Event<'static>),
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    /// 带前缀的限定名，如 `w:t`
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
    /// 原文为 `<x/>` 形式
    pub self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut el = Self::new(name);
        el.children.push(Node::Text(text.into()));
        el
    }

    /// 去掉命名空间前缀后的名字
    pub fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// 直接文本子节点拼接
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
        self.self_closing = false;
    }

    /// 按子节点下标路径取后代元素
    pub fn descendant_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for &index in path {
            current = match current.children.get_mut(index) {
                Some(Node::Element(e)) => e,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// 一个 XML 部件
#[derive(Debug, Clone)]
pub struct XmlDocument {
    pub nodes: Vec<Node>,
}

impl XmlDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, OfficeError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| OfficeError::Xml(format!("at {}: {}", reader.buffer_position(), e)))?;
            match event {
                Event::Start(start) => stack.push(element_from(&start, false)?),
                Event::Empty(start) => {
                    let el = element_from(&start, true)?;
                    push_node(&mut stack, &mut nodes, Node::Element(el));
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| OfficeError::Xml("unexpected closing tag".into()))?;
                    push_node(&mut stack, &mut nodes, Node::Element(el));
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| OfficeError::Xml(e.to_string()))?
                        .into_owned();
                    push_node(&mut stack, &mut nodes, Node::Text(text));
                }
                Event::Eof => break,
                other => push_node(&mut stack, &mut nodes, Node::Raw(other.into_owned())),
            }
        }

        if let Some(open) = stack.last() {
            return Err(OfficeError::Xml(format!("unclosed element <{}>", open.name)));
        }
        Ok(Self { nodes })
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, OfficeError> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.nodes {
            write_node(&mut writer, node)?;
        }
        Ok(writer.into_inner())
    }
}

fn element_from(start: &BytesStart<'_>, self_closing: bool) -> Result<Element, OfficeError> {
    let name = String::from_utf8(start.name().as_ref().to_vec())
        .map_err(|e| OfficeError::Xml(e.to_string()))?;
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| OfficeError::Xml(e.to_string()))?;
        let key = String::from_utf8(attr.key.as_ref().to_vec())
            .map_err(|e| OfficeError::Xml(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| OfficeError::Xml(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
        self_closing,
    })
}

fn push_node(stack: &mut [Element], top: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => top.push(node),
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<(), OfficeError> {
    let result = match node {
        Node::Element(el) => return write_element(writer, el),
        Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text))),
        Node::Raw(event) => writer.write_event(event.borrow()),
    };
    result.map_err(|e| OfficeError::Xml(e.to_string()))
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<(), OfficeError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if el.self_closing && el.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| OfficeError::Xml(e.to_string()));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| OfficeError::Xml(e.to_string()))?;
    for child in &el.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(|e| OfficeError::Xml(e.to_string()))
}
