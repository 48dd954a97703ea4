//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Fu.
//! The Fu project belongs to the Dunimd project team.

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use fu::attachment::FuAttachment;
use fu::errors::FuError;
use fu::pipeline::FuEngine;
use fu::registry::{FuRegistryBuilder, HandlerRecord};
use fu::FuAttachments;

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.display().to_string()
}

// ----------------------------------------------------------------------
// Universal pipeline end to end.
// ----------------------------------------------------------------------

#[test]
fn text_file_flows_through_the_universal_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "note.txt", b"hello world");

    let atts = FuAttachments::new([path]).unwrap();
    assert_eq!(atts.len(), 1);
    assert!(atts.text().starts_with("# note.txt"));
    assert!(atts.text().contains("hello world"));
    assert!(atts.images().is_empty());

    let att = &atts.attachments()[0];
    assert!(att.pipeline_trace.iter().any(|step| step == "load.text"));
    assert_eq!(att.metadata.get("object_class"), Some(&json!("PlainText")));
}

#[test]
fn csv_limit_keeps_header_and_two_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "data.csv",
        b"name,age\nAlice,30\nBob,25\nCarol,22\n",
    );

    let atts = FuAttachments::new([format!("{path}[limit:2]")]).unwrap();
    let att = &atts.attachments()[0];
    assert_eq!(att.metadata.get("csv_rows_kept"), Some(&json!(2)));

    let text = atts.text();
    assert!(text.contains("| name | age |"));
    assert!(text.contains("| Alice | 30 |"));
    assert!(text.contains("| Bob | 25 |"));
    assert!(!text.contains("Carol"));
    let data_rows = text
        .lines()
        .filter(|line| line.starts_with("| ") && !line.contains("name"))
        .count();
    assert_eq!(data_rows, 2);
}

#[test]
fn jpeg_rotation_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.jpg");
    let img = image::RgbImage::from_pixel(2, 1, image::Rgb([10, 20, 30]));
    image::DynamicImage::ImageRgb8(img).save(&path).unwrap();

    let atts = FuAttachments::new([format!("{}[rotate:90]", path.display())]).unwrap();
    let att = &atts.attachments()[0];
    assert_eq!(att.metadata.get("rotation"), Some(&json!(90)));
    assert_eq!(att.metadata.get("image_format"), Some(&json!("JPEG")));
    // 2x1 rotated clockwise becomes 1x2.
    assert_eq!(att.metadata.get("image_width"), Some(&json!(1)));
    assert_eq!(att.metadata.get("image_height"), Some(&json!(2)));
    assert_eq!(atts.images().len(), 1);
    assert!(atts.images()[0].starts_with("data:image/jpeg;base64,"));
}

#[test]
fn pdf_page_selection_end_to_end() {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.pdf");

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for n in 1..=4 {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 48.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {n}"))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(&path).unwrap();

    let atts =
        FuAttachments::new([format!("{}[pages:1-3,images:false]", path.display())]).unwrap();
    let att = &atts.attachments()[0];
    assert_eq!(att.metadata.get("pages_selected"), Some(&json!([1, 2, 3])));
    assert_eq!(att.metadata.get("page_count"), Some(&json!(4)));
    assert!(atts.text().starts_with("# PDF Document: report.pdf"));
    assert!(atts.images().is_empty());

    // Without the image filter, page rendering either produces data
    // URLs or leaves a recorded note when the Pdfium runtime is
    // absent — never a silent nothing.
    let atts = FuAttachments::new([format!("{}[pages:1-2]", path.display())]).unwrap();
    let att = &atts.attachments()[0];
    if atts.images().is_empty() {
        let errors = att.metadata.get("errors").expect("rendering must leave a trace");
        let mentions_renderer = errors
            .as_array()
            .unwrap()
            .iter()
            .any(|entry| entry["step"] == json!("present.images"));
        assert!(mentions_renderer);
    } else {
        assert!(atts.images()[0].starts_with("data:image/png;base64,"));
        assert_eq!(
            att.metadata.get("pages_rendered"),
            Some(&json!(atts.images().len()))
        );
    }
}

#[test]
fn pptx_slides_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deck.pptx");

    let file = std::fs::File::create(&path).unwrap();
    let mut archive = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    archive
        .start_file("ppt/slides/slide1.xml", options)
        .unwrap();
    archive
        .write_all(b"<p:sld><p:txBody><a:p><a:t>Hello deck</a:t></a:p></p:txBody></p:sld>")
        .unwrap();
    archive
        .start_file("ppt/slides/slide2.xml", options)
        .unwrap();
    archive
        .write_all(b"<p:sld><p:txBody><a:p><a:t>Second slide</a:t></a:p></p:txBody></p:sld>")
        .unwrap();
    archive.finish().unwrap();

    let atts = FuAttachments::new([path.display().to_string()]).unwrap();
    let att = &atts.attachments()[0];
    assert_eq!(att.metadata.get("slide_count"), Some(&json!(2)));
    let text = atts.text();
    assert!(text.starts_with("# Presentation: deck.pptx"));
    assert!(text.contains("--- Slide 1 ---\nHello deck"));
    assert!(text.contains("--- Slide 2 ---\nSecond slide"));
}

#[test]
fn html_select_narrows_the_document() {
    let dir = tempfile::tempdir().unwrap();
    let body =
        b"<html><head><title>My Page</title></head><body><h1>Hi</h1><p>World</p></body></html>";
    let path = write_file(dir.path(), "page.html", body);

    let atts = FuAttachments::new([format!("{path}[select:'p']")]).unwrap();
    let att = &atts.attachments()[0];
    assert_eq!(att.metadata.get("selector_matches"), Some(&json!(1)));
    let text = atts.text();
    assert!(text.contains("World"));
    assert!(!text.contains("Hi"));
}

#[test]
fn chunk_id_inputs_are_legal_sources() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "doc.txt", b"chunk body");

    let atts = FuAttachments::new([format!("{path}#paragraphs-1")]).unwrap();
    assert!(atts.text().contains("chunk body"));
}

#[test]
fn multiple_sources_concatenate_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_file(dir.path(), "a.txt", b"first body");
    let second = write_file(dir.path(), "b.txt", b"second body");

    let atts = FuAttachments::new([first, second]).unwrap();
    assert_eq!(atts.len(), 2);
    let text = atts.text();
    let first_at = text.find("first body").unwrap();
    let second_at = text.find("second body").unwrap();
    assert!(first_at < second_at);
}

// ----------------------------------------------------------------------
// Graceful degradation.
// ----------------------------------------------------------------------

#[test]
fn missing_file_degrades_to_a_loader_unavailable_artifact() {
    let atts = FuAttachments::new(["definitely_missing.xyz"]).unwrap();
    let att = &atts.attachments()[0];
    assert!(att.is_error_artifact());
    assert!(!atts.text().is_empty());
    assert!(atts.text().contains("LoaderUnavailable"));
}

#[test]
fn dependency_missing_falls_back_to_the_text_loader() {
    fn match_pdf(att: &FuAttachment) -> bool {
        att.extension().as_deref() == Some("pdf")
    }
    fn pdf_stub(_att: FuAttachment) -> fu::Result<FuAttachment> {
        Err(FuError::dependency(
            "load.pdf",
            "rebuild with the `pdf` cargo feature enabled to parse PDF files",
        ))
    }

    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "report.pdf", b"%PDF-1.4 not really a pdf");

    let mut builder = FuRegistryBuilder::with_defaults();
    builder.register(HandlerRecord::load("pdf", match_pdf, pdf_stub));
    let engine = FuEngine::new(Arc::new(builder.build()));

    let atts = FuAttachments::with_engine(engine, [path]).unwrap();
    let att = &atts.attachments()[0];
    let errors = att.metadata.get("errors").unwrap();
    assert_eq!(errors[0]["kind"], json!("DependencyMissing"));
    let text = atts.text();
    assert!(text.contains("DependencyMissing"));
    assert!(text.contains("load.pdf"));
    assert!(text.contains("`pdf` cargo feature"));
}

#[test]
fn directory_walks_refuse_oversized_trees_without_force() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "big.txt", &vec![b'x'; 200]);

    let atts = FuAttachments::new([format!("{}[budget:10]", dir.path().display())]).unwrap();
    let text = atts.text();
    assert!(text.contains("SizeBudgetExceeded"));
    assert!(text.contains("force"));

    let atts = FuAttachments::new([format!("{}[budget:10,force:true]", dir.path().display())])
        .unwrap();
    let att = &atts.attachments()[0];
    assert!(!att.is_error_artifact());
    assert!(atts.text().contains("# Repository:"));
    assert_eq!(att.metadata.get("repo_files"), Some(&json!(1)));
}

#[test]
fn unknown_dsl_keys_warn_with_a_suggestion() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "a.txt", b"x");

    let atts = FuAttachments::new([format!("{path}[pgaes:1-2]")]).unwrap();
    let att = &atts.attachments()[0];
    let notes = att.metadata.get("suggestions").unwrap();
    let note = notes[0].as_str().unwrap();
    assert!(note.contains("pgaes"));
    assert!(note.contains("pages"));
}

#[test]
fn dsl_syntax_errors_raise_from_the_high_level_api() {
    let err = FuAttachments::new(["a.txt[pages:1"]).unwrap_err();
    assert!(matches!(err, FuError::DslSyntax { .. }));
}

#[test]
fn dsl_value_errors_raise_from_the_high_level_api() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "data.csv", b"a,b\n1,2\n");

    let err = FuAttachments::new([format!("{path}[limit:abc]")]).unwrap_err();
    assert!(matches!(err, FuError::DslValue { .. }));
}

// ----------------------------------------------------------------------
// Processors and adapters on the combined surface.
// ----------------------------------------------------------------------

#[test]
fn named_processor_runs_instead_of_auto_selection() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "data.csv", b"a,b\n1,2\n3,4\n");

    let atts = FuAttachments::with_processor("summary", [path]).unwrap();
    let text = atts.text();
    assert!(text.contains("# CSV Summary: data.csv"));
    assert!(text.contains("2 rows x 2 columns"));
}

#[test]
fn chat_method_wraps_the_combined_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "note.txt", b"hello");

    let atts = FuAttachments::new([path]).unwrap();
    let envelope = atts.chat("summarize").unwrap();
    assert_eq!(envelope[0]["role"], json!("user"));
    let text = envelope[0]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("summarize\n\n"));
    assert!(text.contains("hello"));
}
