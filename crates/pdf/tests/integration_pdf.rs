//! PDF 处理器端到端测试
//!
//! 测试文件用 lopdf 现场构造：标准 Helvetica，不带字宽表。

use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use veil_core::{RedactContext, RedactError};
use veil_pdf::redact_pdf;

fn text_page(lines: &[(&str, i64)]) -> Vec<u8> {
    let mut operations = Vec::new();
    for (text, y) in lines {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
        operations.push(Operation::new("Td", vec![72.into(), (*y).into()]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        operations.push(Operation::new("ET", vec![]));
    }
    Content { operations }.encode().unwrap()
}

/// 第 1 页含薪资，第 2 页没有敏感内容
fn write_fixture(dir: &Path) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for lines in [
        vec![("salary: 50000", 700), ("see note seven", 650)],
        vec![("page 2 of 2", 700)],
    ] {
        let content_id = doc.add_object(Stream::new(dictionary! {}, text_page(&lines)));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => 2,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Author" => Object::string_literal("Jane Doe"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let path = dir.join("payroll.pdf");
    doc.save(&path).unwrap();
    path
}

/// 单页文档：`contents` 由回调按已建好的字体资源构造
fn write_single_page(
    dir: &Path,
    name: &str,
    contents: impl FnOnce(&mut Document, &mut Dictionary) -> Object,
) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let mut resources = dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    };
    let contents = contents(&mut doc, &mut resources);
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Resources" => resources,
        "Contents" => contents,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).unwrap();
    path
}

/// 文件里任一流（解压后）是否含有 `needle`
fn any_stream_contains(path: &Path, needle: &[u8]) -> bool {
    let doc = Document::load(path).unwrap();
    doc.objects.values().any(|obj| match obj {
        Object::Stream(stream) => {
            let data = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            data.windows(needle.len()).any(|w| w == needle)
        }
        _ => false,
    })
}

fn assert_salary_removed(input: &Path, output: &Path) {
    assert!(any_stream_contains(input, b"50000"));
    let stats = redact_pdf(input, output, &RedactContext::default()).unwrap();
    assert_eq!(stats.pages_touched, 1);
    assert!(stats.units_redacted >= 1);
    assert!(!any_stream_contains(output, b"50000"));
    assert!(!page_text(output, 1).contains("50000"));
}

fn page_text(path: &Path, page: u32) -> String {
    Document::load(path).unwrap().extract_text(&[page]).unwrap()
}

#[test]
fn test_salary_is_unrecoverable() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path());
    let output = dir.path().join("out.pdf");
    let ctx = RedactContext::default();

    assert!(page_text(&input, 1).contains("50000"));

    let stats = redact_pdf(&input, &output, &ctx).unwrap();
    assert_eq!(stats.pages_touched, 1);
    assert!(stats.units_redacted >= 2);

    let first = page_text(&output, 1);
    assert!(!first.contains("50000"), "still extractable: {}", first);
    assert!(first.contains("note"));
    assert!(page_text(&output, 2).contains("page"));

    // 区域以黑框形式落在内容流里
    let doc = Document::load(&output).unwrap();
    let pages = doc.get_pages();
    let content = Content::decode(&doc.get_page_content(pages[&1]).unwrap()).unwrap();
    assert!(content.operations.iter().any(|op| op.operator == "re"));

    let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
    let info = doc.get_dictionary(info_id).unwrap();
    assert!(info.get(b"Author").is_err());
}

#[test]
fn test_pdf_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(dir.path());
    let once = dir.path().join("once.pdf");
    let twice = dir.path().join("twice.pdf");
    let ctx = RedactContext::default();

    redact_pdf(&input, &once, &ctx).unwrap();
    let stats = redact_pdf(&once, &twice, &ctx).unwrap();
    assert_eq!(stats.units_redacted, 0);
    assert_eq!(stats.pages_touched, 0);
    assert_eq!(page_text(&once, 1), page_text(&twice, 1));
}

#[test]
fn test_pdf_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fake.pdf");
    std::fs::write(&input, "%PDF-1.5 but not really").unwrap();
    let output = dir.path().join("out.pdf");

    let err = redact_pdf(&input, &output, &RedactContext::default()).unwrap_err();
    assert!(matches!(err, RedactError::InvalidFormat { .. }));
    assert!(!output.exists());
}

#[test]
fn test_split_content_streams_are_burned() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_single_page(dir.path(), "split.pdf", |doc, _| {
        let head = doc.add_object(Stream::new(
            dictionary! {},
            b"BT /F1 12 Tf 72 700 Td".to_vec(),
        ));
        let tail = doc.add_object(Stream::new(
            dictionary! {},
            b"(salary: 50000) Tj ET".to_vec(),
        ));
        Object::Array(vec![head.into(), tail.into()])
    });
    assert_salary_removed(&input, &dir.path().join("out.pdf"));
}

#[test]
fn test_kerned_tj_array_is_burned() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_single_page(dir.path(), "kerned.pdf", |doc, _| {
        let content = b"BT /F1 12 Tf 72 700 Td [(sal) 20 (ary: 5) -15 (0000)] TJ ET".to_vec();
        doc.add_object(Stream::new(dictionary! {}, content)).into()
    });
    assert!(any_stream_contains(&input, b"0000"));
    let output = dir.path().join("out.pdf");
    assert_salary_removed(&input, &output);
    assert!(!any_stream_contains(&output, b"(0000)"));
}

#[test]
fn test_text_inside_form_xobject_is_burned() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_single_page(dir.path(), "form.pdf", |doc, resources| {
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 300.into(), 50.into()],
                "Resources" => resources.clone(),
            },
            b"BT /F1 12 Tf 0 10 Td (salary: 50000) Tj ET".to_vec(),
        ));
        let page_content = doc.add_object(Stream::new(
            dictionary! {},
            b"q 1 0 0 1 72 690 cm /Fm1 Do Q".to_vec(),
        ));
        resources.set("XObject", dictionary! { "Fm1" => form_id });
        page_content.into()
    });
    assert_salary_removed(&input, &dir.path().join("out.pdf"));
}
