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

//! LOAD handlers. Selection is the first registered loader whose match
//! predicate accepts the attachment; the text loader matches everything
//! and closes the chain. Loaders read through `input_bytes()`, so the
//! same code serves files on disk and morphed URL downloads. A loader
//! compiled out by a cargo feature registers a stub that reports the
//! missing capability instead.

use serde_json::{json, Value};

use crate::attachment::FuAttachment;
use crate::errors::{FuError, Result};
use crate::object::FuObject;
use crate::registry::{FuRegistryBuilder, HandlerRecord};

/// Default byte budget for repository walks; `force:true` or a
/// `budget:` command overrides it.
pub const DEFAULT_SIZE_BUDGET: u64 = 10 * 1024 * 1024;

/// Files a repository walk refuses to inline beyond this size.
const REPO_FILE_CAP: u64 = 512 * 1024;

pub fn register(builder: &mut FuRegistryBuilder) {
    builder.register(HandlerRecord::load("url", match_url, load_url));
    builder.register(HandlerRecord::load("pdf", match_pdf, load_pdf));
    builder.register(HandlerRecord::load("csv", match_csv, load_csv));
    builder.register(HandlerRecord::load("image", match_image, load_image));
    builder.register(HandlerRecord::load("pptx", match_pptx, load_pptx));
    builder.register(HandlerRecord::load("html", match_html, load_html));
    builder.register(HandlerRecord::load("directory", match_directory, load_directory));
    // Fallback loader; must stay registered last.
    builder.register(HandlerRecord::load("text", match_text, load_text));
}

fn fingerprint(att: &mut FuAttachment, bytes: &[u8]) {
    att.metadata.insert(
        "content_hash".into(),
        Value::String(blake3::hash(bytes).to_hex().to_string()),
    );
    att.metadata.insert("content_bytes".into(), json!(bytes.len()));
}

// ----------------------------------------------------------------------
// Match predicates. Loaders match before any object exists, so they
// look at the path, the detected extension, and the filesystem only.
// ----------------------------------------------------------------------

fn match_url(att: &FuAttachment) -> bool {
    att.path.starts_with("http://") || att.path.starts_with("https://")
}

fn has_extension(att: &FuAttachment, extensions: &[&str]) -> bool {
    att.extension()
        .map(|ext| extensions.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn match_pdf(att: &FuAttachment) -> bool {
    has_extension(att, &["pdf"])
}

fn match_csv(att: &FuAttachment) -> bool {
    has_extension(att, &["csv", "tsv"])
}

fn match_image(att: &FuAttachment) -> bool {
    has_extension(att, &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff"])
}

fn match_pptx(att: &FuAttachment) -> bool {
    has_extension(att, &["pptx"])
}

fn match_html(att: &FuAttachment) -> bool {
    has_extension(att, &["html", "htm"])
}

fn match_directory(att: &FuAttachment) -> bool {
    std::path::Path::new(&att.path).is_dir()
}

fn match_text(_att: &FuAttachment) -> bool {
    true
}

// ----------------------------------------------------------------------
// URL loader: download into an in-memory response. The morph modifier
// turns the response into something the extension-dispatched loaders
// recognize.
// ----------------------------------------------------------------------

#[cfg(feature = "http")]
fn load_url(mut att: FuAttachment) -> Result<FuAttachment> {
    let parsed = url::Url::parse(&att.path)
        .map_err(|err| FuError::Http(format!("invalid url '{}': {err}", att.path)))?;
    let response = reqwest::blocking::get(parsed.clone())
        .map_err(|err| FuError::Http(err.to_string()))?;
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = response
        .bytes()
        .map_err(|err| FuError::Http(err.to_string()))?
        .to_vec();
    if status >= 400 {
        return Err(FuError::Http(format!(
            "GET {} returned status {status}",
            att.path
        )));
    }

    fingerprint(&mut att, &body);
    att.metadata
        .insert("source_url".into(), Value::String(att.path.clone()));
    att.metadata.insert("http_status".into(), json!(status));
    att.metadata.insert(
        "fetched_at".into(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    att.obj = FuObject::Response(crate::object::HttpResponse {
        url: parsed.to_string(),
        status,
        content_type,
        body,
    });
    Ok(att)
}

#[cfg(not(feature = "http"))]
fn load_url(_att: FuAttachment) -> Result<FuAttachment> {
    Err(FuError::dependency(
        "load.url",
        "rebuild with the `http` cargo feature enabled to download URLs",
    ))
}

// ----------------------------------------------------------------------
// PDF loader: per-page text via lopdf, whole-document rescue via
// pdf-extract when page streams decode to nothing.
// ----------------------------------------------------------------------

#[cfg(feature = "pdf")]
fn load_pdf(mut att: FuAttachment) -> Result<FuAttachment> {
    let bytes = att.input_bytes()?;
    let doc = lopdf::Document::load_mem(&bytes)
        .map_err(|err| FuError::handler("load.pdf", format!("cannot open pdf: {err}")))?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut pages = Vec::with_capacity(page_numbers.len());
    for number in &page_numbers {
        let text = doc.extract_text(&[*number]).unwrap_or_default();
        pages.push(text.trim().to_string());
    }

    if pages.iter().all(String::is_empty) {
        if let Ok(text) = pdf_extract::extract_text_from_mem(&bytes) {
            let text = text.trim().to_string();
            if !text.is_empty() {
                pages = vec![text];
            }
        }
    }

    let page_count = page_numbers.len().max(pages.len());
    fingerprint(&mut att, &bytes);
    att.metadata.insert("page_count".into(), json!(page_count));
    att.obj = FuObject::Pdf(crate::object::PdfDocument {
        pages,
        page_count,
        data: bytes,
    });
    Ok(att)
}

#[cfg(not(feature = "pdf"))]
fn load_pdf(_att: FuAttachment) -> Result<FuAttachment> {
    Err(FuError::dependency(
        "load.pdf",
        "rebuild with the `pdf` cargo feature enabled (pulls in lopdf and pdf-extract) to parse PDF files",
    ))
}

// ----------------------------------------------------------------------
// CSV loader.
// ----------------------------------------------------------------------

fn load_csv(mut att: FuAttachment) -> Result<FuAttachment> {
    let bytes = att.input_bytes()?;
    let delimiter = if att.extension().as_deref() == Some("tsv") {
        b'\t'
    } else {
        b','
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let headers = reader
        .headers()
        .map_err(|err| FuError::handler("load.csv", err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        match record {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
            Err(err) => log::warn!("skipping invalid CSV row {idx}: {err}"),
        }
    }

    fingerprint(&mut att, &bytes);
    att.metadata.insert("csv_total_rows".into(), json!(rows.len()));
    att.metadata.insert("csv_columns".into(), json!(headers.len()));
    att.obj = FuObject::Table(crate::object::DataTable { headers, rows });
    Ok(att)
}

// ----------------------------------------------------------------------
// Image loader: probe dimensions, keep the bytes encoded.
// ----------------------------------------------------------------------

#[cfg(feature = "image")]
fn load_image(mut att: FuAttachment) -> Result<FuAttachment> {
    let bytes = att.input_bytes()?;
    let format = image::guess_format(&bytes)
        .map_err(|err| FuError::handler("load.image", format!("unrecognized image: {err}")))?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|err| FuError::handler("load.image", format!("cannot decode image: {err}")))?;

    let format_name = image_format_name(format);
    fingerprint(&mut att, &bytes);
    att.metadata
        .insert("image_format".into(), Value::String(format_name.to_string()));
    att.metadata.insert("image_width".into(), json!(decoded.width()));
    att.metadata.insert("image_height".into(), json!(decoded.height()));
    att.obj = FuObject::Image(crate::object::RasterImage {
        data: bytes,
        format: format_name.to_string(),
        width: decoded.width(),
        height: decoded.height(),
    });
    Ok(att)
}

#[cfg(feature = "image")]
pub(crate) fn image_format_name(format: image::ImageFormat) -> &'static str {
    match format {
        image::ImageFormat::Png => "PNG",
        image::ImageFormat::Jpeg => "JPEG",
        image::ImageFormat::Gif => "GIF",
        image::ImageFormat::Bmp => "BMP",
        image::ImageFormat::WebP => "WEBP",
        image::ImageFormat::Tiff => "TIFF",
        _ => "IMAGE",
    }
}

#[cfg(not(feature = "image"))]
fn load_image(_att: FuAttachment) -> Result<FuAttachment> {
    Err(FuError::dependency(
        "load.image",
        "rebuild with the `image` cargo feature enabled to decode raster images",
    ))
}

// ----------------------------------------------------------------------
// PPTX loader: walk the slide XML inside the zip container and pull
// every <a:t> run, one entry per slide.
// ----------------------------------------------------------------------

#[cfg(feature = "office")]
fn load_pptx(mut att: FuAttachment) -> Result<FuAttachment> {
    use std::io::Read;

    let bytes = att.input_bytes()?;
    let cursor = std::io::Cursor::new(&bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|err| FuError::handler("load.pptx", format!("cannot open archive: {err}")))?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(0)
    });

    let mut slides = Vec::with_capacity(slide_names.len());
    for name in &slide_names {
        let mut xml = String::new();
        match archive.by_name(name) {
            Ok(mut file) => {
                if file.read_to_string(&mut xml).is_err() {
                    slides.push(String::new());
                    continue;
                }
            }
            Err(err) => {
                log::warn!("skipping unreadable slide {name}: {err}");
                slides.push(String::new());
                continue;
            }
        }
        slides.push(slide_text_from_xml(&xml));
    }

    fingerprint(&mut att, &bytes);
    att.metadata.insert("slide_count".into(), json!(slides.len()));
    att.obj = FuObject::Slides(crate::object::SlideDeck { slides });
    Ok(att)
}

/// Extracts the text runs (`<a:t>`) of one slide.
#[cfg(feature = "office")]
fn slide_text_from_xml(xml: &str) -> String {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parts: Vec<String> = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(e)) if in_text => {
                if let Ok(text) = e.unescape() {
                    let trimmed = text.trim().to_string();
                    if !trimmed.is_empty() {
                        parts.push(trimmed);
                    }
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_text = false,
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    parts.join(" ")
}

#[cfg(not(feature = "office"))]
fn load_pptx(_att: FuAttachment) -> Result<FuAttachment> {
    Err(FuError::dependency(
        "load.pptx",
        "rebuild with the `office` cargo feature enabled (pulls in zip and quick-xml) to parse presentations",
    ))
}

// ----------------------------------------------------------------------
// HTML loader.
// ----------------------------------------------------------------------

#[cfg(feature = "html")]
fn load_html(mut att: FuAttachment) -> Result<FuAttachment> {
    let bytes = att.input_bytes()?;
    let raw = String::from_utf8_lossy(&bytes).to_string();
    let document = scraper::Html::parse_document(&raw);
    let title = scraper::Selector::parse("title")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .filter(|title| !title.is_empty());

    fingerprint(&mut att, &bytes);
    if let Some(title) = &title {
        att.metadata
            .insert("html_title".into(), Value::String(title.clone()));
    }
    att.obj = FuObject::Html(crate::object::HtmlDocument { raw, title });
    Ok(att)
}

#[cfg(not(feature = "html"))]
fn load_html(_att: FuAttachment) -> Result<FuAttachment> {
    Err(FuError::dependency(
        "load.html",
        "rebuild with the `html` cargo feature enabled (pulls in scraper) to parse HTML",
    ))
}

// ----------------------------------------------------------------------
// Repository loader: eager size probe before any file content is read.
// ----------------------------------------------------------------------

fn load_directory(mut att: FuAttachment) -> Result<FuAttachment> {
    let root = att.path.clone();
    let force = att
        .commands
        .get("force")
        .map(|value| value.trim() == "true")
        .unwrap_or(false);
    let budget = att
        .commands
        .get("budget")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_SIZE_BUDGET);

    // Probe sizes first; no file content is read until the walk fits
    // the budget or force is set.
    let mut total_bytes = 0u64;
    let mut file_paths = Vec::new();
    for entry in walkdir::WalkDir::new(&root).follow_links(false) {
        let entry = entry.map_err(|err| FuError::handler("load.directory", err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|err| FuError::handler("load.directory", err.to_string()))?
            .len();
        total_bytes += size;
        if size <= REPO_FILE_CAP {
            file_paths.push(entry.into_path());
        }
    }
    if total_bytes > budget && !force {
        return Err(FuError::SizeBudget {
            found: total_bytes,
            budget,
        });
    }

    let mut files = Vec::with_capacity(file_paths.len());
    for path in file_paths {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        // Skip binaries: a NUL in the probe window is decisive.
        if bytes.iter().take(512).any(|b| *b == 0) {
            continue;
        }
        files.push(crate::object::RepoFile {
            path: path.display().to_string(),
            text: String::from_utf8_lossy(&bytes).to_string(),
        });
    }

    att.metadata.insert("repo_files".into(), json!(files.len()));
    att.metadata.insert("repo_bytes".into(), json!(total_bytes));
    att.obj = FuObject::Repository(crate::object::Repository {
        root,
        files,
        total_bytes,
    });
    Ok(att)
}

// ----------------------------------------------------------------------
// Text fallback loader.
// ----------------------------------------------------------------------

fn load_text(mut att: FuAttachment) -> Result<FuAttachment> {
    let bytes = att.input_bytes()?;
    fingerprint(&mut att, &bytes);
    att.obj = FuObject::Text(String::from_utf8_lossy(&bytes).to_string());
    Ok(att)
}
