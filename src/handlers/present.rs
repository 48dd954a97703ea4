//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Fu.
//! The Fu project belongs to the Dunimd project team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//! http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! PRESENT handlers. Presenters only ever append — to `text`, to
//! `images`, or into metadata — so additive groups accumulate and
//! re-presenting never destroys earlier extractions. `markdown` is the
//! widest dispatch list in the crate: one variant per loaded kind.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

use crate::attachment::FuAttachment;
use crate::dispatch::{Category, FuParams, TypeDescriptor};
use crate::errors::{FuError, Result};
use crate::object::{FuObject, FuObjectKind, RasterImage};
use crate::registry::{FuRegistryBuilder, HandlerRecord};

pub fn register(builder: &mut FuRegistryBuilder) {
    // markdown: one variant per kind, registered most-specific first.
    for (descriptor, f) in [
        (
            TypeDescriptor::Kind(FuObjectKind::Pdf),
            markdown_pdf as crate::registry::PresentFn,
        ),
        (TypeDescriptor::Kind(FuObjectKind::Table), markdown_table),
        (TypeDescriptor::Kind(FuObjectKind::Image), markdown_image),
        (TypeDescriptor::Kind(FuObjectKind::Html), markdown_html),
        (TypeDescriptor::Kind(FuObjectKind::Slides), markdown_slides),
        (TypeDescriptor::Kind(FuObjectKind::Text), markdown_text),
        (
            TypeDescriptor::Kind(FuObjectKind::Repository),
            markdown_repository,
        ),
    ] {
        builder.register(HandlerRecord::present(
            "markdown",
            descriptor,
            Category::Text,
            &[],
            f,
        ));
    }

    builder.register(HandlerRecord::present(
        "text",
        TypeDescriptor::Family("Document"),
        Category::Text,
        &[],
        text_document,
    ));
    builder.register(HandlerRecord::present(
        "text",
        TypeDescriptor::Kind(FuObjectKind::Table),
        Category::Text,
        &[],
        text_table,
    ));
    builder.register(HandlerRecord::present(
        "text",
        TypeDescriptor::Kind(FuObjectKind::Image),
        Category::Text,
        &[],
        markdown_image,
    ));

    builder.register(HandlerRecord::present(
        "summary",
        TypeDescriptor::Kind(FuObjectKind::Table),
        Category::Text,
        &[],
        summary_table,
    ));
    builder.register(HandlerRecord::present(
        "html",
        TypeDescriptor::Kind(FuObjectKind::Html),
        Category::Text,
        &[],
        present_raw_html,
    ));
    builder.register(HandlerRecord::present(
        "images",
        TypeDescriptor::Kind(FuObjectKind::Image),
        Category::Image,
        &[],
        present_image,
    ));
    builder.register(HandlerRecord::present(
        "images",
        TypeDescriptor::Kind(FuObjectKind::Pdf),
        Category::Image,
        &[],
        present_pdf_images,
    ));
    builder.register(HandlerRecord::present(
        "metadata",
        TypeDescriptor::Any,
        Category::Metadata,
        &[],
        present_metadata,
    ));
}

/// Appends a block to `text`, separated by a blank line. Never
/// overwrites.
fn append_text(att: &mut FuAttachment, block: &str) {
    if block.is_empty() {
        return;
    }
    if !att.text.is_empty() {
        att.text.push_str("\n\n");
    }
    att.text.push_str(block);
}

/// Self-contained data URL for a raster image.
pub fn data_url(raster: &RasterImage) -> String {
    let mime = match raster.format.as_str() {
        "JPEG" => "image/jpeg",
        "GIF" => "image/gif",
        "BMP" => "image/bmp",
        "WEBP" => "image/webp",
        "TIFF" => "image/tiff",
        _ => "image/png",
    };
    format!("data:{mime};base64,{}", BASE64.encode(&raster.data))
}

// ----------------------------------------------------------------------
// markdown variants.
// ----------------------------------------------------------------------

fn markdown_pdf(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Pdf(doc) = &att.obj else {
        return Ok(att);
    };
    let mut block = format!("# PDF Document: {}", att.display_name());
    let body = doc
        .pages
        .iter()
        .filter(|page| !page.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n\n");
    if !body.is_empty() {
        block.push_str("\n\n");
        block.push_str(&body);
    }
    append_text(&mut att, &block);
    Ok(att)
}

fn markdown_table(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Table(table) = &att.obj else {
        return Ok(att);
    };
    let mut block = format!("# CSV Document: {}\n\n", att.display_name());
    block.push_str(&format!("| {} |\n", table.headers.join(" | ")));
    block.push_str(&format!(
        "|{}|\n",
        table.headers.iter().map(|_| "---").collect::<Vec<_>>().join("|")
    ));
    for row in &table.rows {
        block.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    append_text(&mut att, block.trim_end());
    Ok(att)
}

fn markdown_image(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Image(raster) = &att.obj else {
        return Ok(att);
    };
    let block = format!(
        "# Image: {}\n\nFormat: {}, dimensions: {}x{}.",
        att.display_name(),
        raster.format,
        raster.width,
        raster.height
    );
    append_text(&mut att, &block);
    Ok(att)
}

fn markdown_html(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Html(doc) = &att.obj else {
        return Ok(att);
    };
    let mut block = match &doc.title {
        Some(title) => format!("# {title}"),
        None => format!("# Web Page: {}", att.display_name()),
    };
    let body = html_visible_text(&doc.raw);
    if !body.is_empty() {
        block.push_str("\n\n");
        block.push_str(&body);
    }
    append_text(&mut att, &block);
    Ok(att)
}

fn markdown_slides(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Slides(deck) = &att.obj else {
        return Ok(att);
    };
    let mut block = format!("# Presentation: {}", att.display_name());
    for (idx, slide) in deck.slides.iter().enumerate() {
        block.push_str(&format!("\n\n--- Slide {} ---\n", idx + 1));
        if slide.is_empty() {
            block.push_str("[Blank Slide or No Text Content]");
        } else {
            block.push_str(slide);
        }
    }
    append_text(&mut att, &block);
    Ok(att)
}

fn markdown_text(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Text(text) = &att.obj else {
        return Ok(att);
    };
    let block = text.trim().to_string();
    append_text(&mut att, &block);
    Ok(att)
}

fn markdown_repository(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Repository(repo) = &att.obj else {
        return Ok(att);
    };
    let mut block = format!("# Repository: {}\n", repo.root);
    for file in &repo.files {
        block.push_str(&format!("\n## {}\n\n```\n{}\n```\n", file.path, file.text));
    }
    append_text(&mut att, block.trim_end());
    Ok(att)
}

// ----------------------------------------------------------------------
// text / summary / html presenters.
// ----------------------------------------------------------------------

fn text_document(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let block = match &att.obj {
        FuObject::Pdf(doc) => doc.pages.join("\n\n"),
        FuObject::Slides(deck) => deck.slides.join("\n\n"),
        FuObject::Html(doc) => html_visible_text(&doc.raw),
        FuObject::Text(text) => text.clone(),
        _ => return Ok(att),
    };
    append_text(&mut att, block.trim());
    Ok(att)
}

fn text_table(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Table(table) = &att.obj else {
        return Ok(att);
    };
    let mut block = table.headers.join("\t");
    for row in &table.rows {
        block.push('\n');
        block.push_str(&row.join("\t"));
    }
    append_text(&mut att, &block);
    Ok(att)
}

/// Brief table summary: shape, column names, and the first rows.
fn summary_table(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Table(table) = &att.obj else {
        return Ok(att);
    };
    let (rows, columns) = table.shape();
    let mut block = format!(
        "# CSV Summary: {}\n\n{rows} rows x {columns} columns.\nColumns: {}.",
        att.display_name(),
        table.headers.join(", ")
    );
    for row in table.rows.iter().take(5) {
        block.push_str(&format!("\n{}", row.join(", ")));
    }
    append_text(&mut att, &block);
    Ok(att)
}

fn present_raw_html(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Html(doc) = &att.obj else {
        return Ok(att);
    };
    let block = doc.raw.trim().to_string();
    append_text(&mut att, &block);
    Ok(att)
}

#[cfg(feature = "html")]
fn html_visible_text(raw: &str) -> String {
    let document = scraper::Html::parse_document(raw);
    let mut parts = Vec::new();
    for text in document.root_element().text() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }
    parts.join(" ")
}

#[cfg(not(feature = "html"))]
fn html_visible_text(raw: &str) -> String {
    // Without a parser, fall back to a crude tag strip.
    static TAG: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"<[^>]*>").expect("tag regex"));
    TAG.replace_all(raw, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ----------------------------------------------------------------------
// image / metadata presenters.
// ----------------------------------------------------------------------

fn present_image(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Image(raster) = &att.obj else {
        return Ok(att);
    };
    let url = data_url(raster);
    att.images.push(url);
    Ok(att)
}

/// Upper bound on rendered pages per document.
const MAX_RENDER_PAGES: usize = 10;
/// Render scale factor; 2x keeps small body text legible to a model.
const RENDER_SCALE: f32 = 2.0;

/// Renders PDF pages into base64 PNG data URLs through the Pdfium
/// runtime. Honors a prior page selection; otherwise the first pages up
/// to the cap. A missing Pdfium library degrades into a
/// DependencyMissing note instead of aborting the pipeline.
#[cfg(all(feature = "pdf", feature = "image"))]
fn present_pdf_images(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    use pdfium_render::prelude::*;

    let FuObject::Pdf(doc) = &att.obj else {
        return Ok(att);
    };
    // Split chunks carry no raw bytes; there is nothing to rasterize.
    if doc.data.is_empty() {
        return Ok(att);
    }

    let selection: Vec<usize> = att
        .metadata
        .get("pages_selected")
        .and_then(Value::as_array)
        .map(|pages| {
            pages
                .iter()
                .filter_map(Value::as_u64)
                .map(|page| page as usize)
                .collect()
        })
        .unwrap_or_else(|| (1..=doc.page_count.min(MAX_RENDER_PAGES)).collect());

    // The Pdfium document borrows the attachment's bytes; keep it in
    // its own scope so the borrow ends before the attachment mutates.
    let rendered = {
        let bindings = Pdfium::bind_to_system_library().map_err(|err| {
            FuError::dependency(
                "present.images",
                format!("install the Pdfium dynamic library to render PDF pages ({err:?})"),
            )
        })?;
        let pdfium = Pdfium::new(bindings);
        let document = pdfium
            .load_pdf_from_byte_slice(&doc.data, None)
            .map_err(|err| {
                FuError::handler("present.images", format!("cannot open pdf: {err:?}"))
            })?;

        let config = PdfRenderConfig::new().scale_page_by_factor(RENDER_SCALE);
        let pages = document.pages();
        let mut rendered = Vec::new();
        for page_number in selection.into_iter().take(MAX_RENDER_PAGES) {
            if page_number < 1 {
                continue;
            }
            let Ok(page) = pages.get((page_number - 1) as u16) else {
                continue;
            };
            let bitmap = page.render_with_config(&config).map_err(|err| {
                FuError::handler("present.images", format!("render failed: {err:?}"))
            })?;
            // Round-trip through raw RGBA so the renderer's image types
            // never leak into ours.
            let source = bitmap.as_image().to_rgba8();
            let (width, height) = source.dimensions();
            let Some(canvas) = image::RgbaImage::from_raw(width, height, source.into_raw())
            else {
                continue;
            };
            let mut buffer = std::io::Cursor::new(Vec::new());
            image::DynamicImage::ImageRgba8(canvas)
                .write_to(&mut buffer, image::ImageFormat::Png)
                .map_err(|err| FuError::handler("present.images", err.to_string()))?;
            rendered.push(format!(
                "data:image/png;base64,{}",
                BASE64.encode(buffer.into_inner())
            ));
        }
        rendered
    };

    if !rendered.is_empty() {
        att.metadata
            .insert("pages_rendered".into(), json!(rendered.len()));
        att.images.extend(rendered);
    }
    Ok(att)
}

#[cfg(not(all(feature = "pdf", feature = "image")))]
fn present_pdf_images(att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let _ = &att;
    Err(FuError::dependency(
        "present.images",
        "rebuild with the `pdf` and `image` cargo features enabled to render PDF pages",
    ))
}

/// Enriches metadata with object facts; writes nothing into `text`, so
/// it composes with any other presenter in either order.
fn present_metadata(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let class = att.obj.class_name().to_string();
    att.metadata
        .insert("object_class".into(), Value::String(class));
    let facts = match &att.obj {
        FuObject::Pdf(doc) => json!({"pages": doc.pages.len(), "page_count": doc.page_count}),
        FuObject::Table(table) => {
            let (rows, columns) = table.shape();
            json!({"rows": rows, "columns": columns})
        }
        FuObject::Image(raster) => {
            json!({"format": raster.format, "width": raster.width, "height": raster.height})
        }
        FuObject::Slides(deck) => json!({"slides": deck.slides.len()}),
        FuObject::Html(doc) => json!({"title": doc.title, "bytes": doc.raw.len()}),
        FuObject::Repository(repo) => {
            json!({"files": repo.files.len(), "bytes": repo.total_bytes})
        }
        FuObject::Text(text) => json!({"characters": text.chars().count()}),
        FuObject::Response(resp) => json!({"status": resp.status, "bytes": resp.body.len()}),
        FuObject::Bytes(bytes) => json!({"bytes": bytes.len()}),
        FuObject::None => Value::Null,
    };
    if !facts.is_null() {
        att.metadata.insert("object_facts".into(), facts);
    }
    Ok(att)
}
