//! 表单 XObject
//!
//! 页面可以把文字放进 `/Subtype /Form` 的 XObject，再用 `Do` 引用。
//! 表单有自己的内容流、资源和 /Matrix，遍历时按调用处的 CTM 递归进入，
//! 抹除后的内容写回原 XObject。

use std::collections::{HashMap, HashSet};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::fonts::{page_resources, resource_fonts, FontMap};
use crate::text::{matrix_operands, Matrix, IDENTITY};
use crate::utils::{get_stream_content, resolve};

/// 单页可加载的表单数量上限
const MAX_FORMS: usize = 256;

/// 资源名 → 表单对象
pub type XObjectMap = HashMap<Vec<u8>, ObjectId>;

/// 已解码的表单
#[derive(Debug, Clone)]
pub struct Form {
    pub matrix: Matrix,
    pub fonts: FontMap,
    pub xobjects: XObjectMap,
    pub operations: Vec<Operation>,
    /// 累计被抹掉的字形数
    pub blanked: usize,
}

impl Form {
    fn from_stream(
        doc: &Document,
        dict: &Dictionary,
        data: &[u8],
        inherited: Option<&Dictionary>,
    ) -> Result<Self, String> {
        // 没有 Resources 的表单沿用页面资源
        let resources = match dict.get(b"Resources").ok().and_then(|o| resolve(doc, o)) {
            Some(Object::Dictionary(own)) => Some(own),
            _ => inherited,
        };
        let matrix = match dict.get(b"Matrix").ok().and_then(|o| resolve(doc, o)) {
            Some(Object::Array(values)) => matrix_operands(values).unwrap_or(IDENTITY),
            _ => IDENTITY,
        };
        let operations = Content::decode(data)
            .map_err(|e| format!("内容流解析失败: {}", e))?
            .operations;

        Ok(Self {
            matrix,
            fonts: resources.map(|r| resource_fonts(doc, r)).unwrap_or_default(),
            xobjects: resources.map(|r| resource_xobjects(doc, r)).unwrap_or_default(),
            operations,
            blanked: 0,
        })
    }
}

/// 资源字典中子类型为 Form 的 XObject
pub fn resource_xobjects(doc: &Document, resources: &Dictionary) -> XObjectMap {
    let mut xobjects = XObjectMap::new();
    let dict = match resources.get(b"XObject").ok().and_then(|o| resolve(doc, o)) {
        Some(Object::Dictionary(dict)) => dict,
        _ => return xobjects,
    };
    for (name, obj) in dict.iter() {
        let Object::Reference(id) = obj else {
            continue;
        };
        if let Ok(Object::Stream(stream)) = doc.get_object(*id) {
            if matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(sub)) if sub == b"Form") {
                xobjects.insert(name.clone(), *id);
            }
        }
    }
    xobjects
}

/// 一页可达的全部表单
#[derive(Debug, Default)]
pub struct FormStore {
    forms: HashMap<ObjectId, Form>,
}

impl FormStore {
    /// 从页面直接引用的表单出发，加载嵌套引用的表单
    pub fn load(doc: &Document, roots: &XObjectMap, inherited: Option<&Dictionary>) -> Self {
        let mut store = Self::default();
        let mut seen = HashSet::new();
        let mut pending: Vec<ObjectId> = roots.values().copied().collect();

        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            if store.forms.len() >= MAX_FORMS {
                log::warn!("[Form] 表单数量超过 {}，其余表单不再展开", MAX_FORMS);
                break;
            }
            let Ok(Object::Stream(stream)) = doc.get_object(id) else {
                continue;
            };
            let parsed = get_stream_content(stream)
                .and_then(|data| Form::from_stream(doc, &stream.dict, &data, inherited));
            match parsed {
                Ok(form) => {
                    pending.extend(form.xobjects.values().copied());
                    store.forms.insert(id, form);
                }
                Err(e) => log::warn!("[Form] 表单 {:?} 解析失败: {}", id, e),
            }
        }

        if !store.forms.is_empty() {
            log::debug!("[Form] 加载 {} 个表单", store.forms.len());
        }
        store
    }

    pub fn insert(&mut self, id: ObjectId, form: Form) {
        self.forms.insert(id, form);
    }

    pub fn get(&self, id: ObjectId) -> Option<&Form> {
        self.forms.get(&id)
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    /// 遍历期间取出表单，自引用的 `Do` 因此找不到自己
    pub(crate) fn take(&mut self, id: ObjectId) -> Option<Form> {
        self.forms.remove(&id)
    }

    /// 把有字形被抹掉的表单写回文档，返回写回的表单数
    pub fn write_back(self, doc: &mut Document) -> Result<usize, String> {
        let mut written = 0;
        for (id, form) in self.forms.into_iter().filter(|(_, f)| f.blanked > 0) {
            let encoded = Content {
                operations: form.operations,
            }
            .encode()
            .map_err(|e| e.to_string())?;
            match doc.get_object_mut(id) {
                Ok(Object::Stream(stream)) => stream.set_plain_content(encoded),
                _ => return Err(format!("无法获取表单 {:?}", id)),
            }
            log::debug!("[Form] 表单 {:?} 抹除 {} 个字形", id, form.blanked);
            written += 1;
        }
        Ok(written)
    }
}

/// 一段内容流的遍历环境：字体、表单名和已加载的表单
#[derive(Debug, Default)]
pub struct ContentScope {
    pub fonts: FontMap,
    pub xobjects: XObjectMap,
    pub forms: FormStore,
}

impl ContentScope {
    /// 页面（含继承的）资源
    pub fn page(doc: &Document, page_id: ObjectId) -> Self {
        let resources = page_resources(doc, page_id);
        let fonts = resources.map(|r| resource_fonts(doc, r)).unwrap_or_default();
        let xobjects = resources.map(|r| resource_xobjects(doc, r)).unwrap_or_default();
        let forms = FormStore::load(doc, &xobjects, resources);
        Self {
            fonts,
            xobjects,
            forms,
        }
    }

    pub fn with_fonts(fonts: FontMap) -> Self {
        Self {
            fonts,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    /// 页面资源引用 Fm1，Fm1 再引用 Fm2，Fm2 引用回 Fm1
    fn nested_forms() -> (Document, ObjectId, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let fm1 = doc.new_object_id();
        let fm2 = doc.new_object_id();
        doc.objects.insert(
            fm1,
            Object::Stream(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 10.into(), 20.into()],
                    "Resources" => dictionary! {
                        "XObject" => dictionary! { "Fm2" => fm2 },
                    },
                },
                b"/Fm2 Do".to_vec(),
            )),
        );
        doc.objects.insert(
            fm2,
            Object::Stream(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "Resources" => dictionary! {
                        "XObject" => dictionary! { "Fm1" => fm1 },
                    },
                },
                b"BT /F1 12 Tf (50000) Tj ET /Fm1 Do".to_vec(),
            )),
        );
        (doc, fm1, fm2)
    }

    #[test]
    fn test_load_follows_nested_forms_once() {
        let (doc, fm1, fm2) = nested_forms();
        let roots: XObjectMap = [(b"Fm1".to_vec(), fm1)].into_iter().collect();
        let store = FormStore::load(&doc, &roots, None);
        assert_eq!(store.len(), 2);

        let outer = store.get(fm1).unwrap();
        assert_eq!(outer.matrix, [1.0, 0.0, 0.0, 1.0, 10.0, 20.0]);
        assert_eq!(outer.xobjects.get(b"Fm2".as_slice()), Some(&fm2));
        assert_eq!(store.get(fm2).unwrap().operations.len(), 5);
    }

    #[test]
    fn test_image_xobjects_are_not_forms() {
        let mut doc = Document::with_version("1.5");
        let image = doc.add_object(Stream::new(
            dictionary! { "Type" => "XObject", "Subtype" => "Image" },
            vec![0u8; 4],
        ));
        let resources = dictionary! {
            "XObject" => dictionary! { "Im1" => image },
        };
        assert!(resource_xobjects(&doc, &resources).is_empty());
    }

    #[test]
    fn test_write_back_only_touches_blanked_forms() {
        let (mut doc, fm1, fm2) = nested_forms();
        let roots: XObjectMap = [(b"Fm1".to_vec(), fm1)].into_iter().collect();
        let mut store = FormStore::load(&doc, &roots, None);
        let mut inner = store.take(fm2).unwrap();
        inner.operations[2] = Operation::new("Tj", vec![Object::string_literal("     ")]);
        inner.blanked = 5;
        store.insert(fm2, inner);

        assert_eq!(store.write_back(&mut doc).unwrap(), 1);
        let stream = doc.get_object(fm2).unwrap().as_stream().unwrap();
        let text = String::from_utf8_lossy(&stream.content).into_owned();
        assert!(!text.contains("50000"));
        let outer = doc.get_object(fm1).unwrap().as_stream().unwrap();
        assert_eq!(outer.content, b"/Fm2 Do".to_vec());
    }
}
