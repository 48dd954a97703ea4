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

//! MODIFY handlers: transform the loaded object in place, same kind in,
//! same kind out. `pages` is registered twice — once for PDF documents,
//! once for slide decks — which is the dispatch list at work.

use serde_json::{json, Value};

use crate::attachment::FuAttachment;
use crate::dispatch::{FuParams, ParamKind, ParamSpec, TypeDescriptor};
use crate::errors::{FuError, Result};
use crate::object::{FuObject, FuObjectKind};
use crate::registry::{FuRegistryBuilder, HandlerRecord};

const PAGES_PARAMS: &[ParamSpec] = &[ParamSpec::new("pages", ParamKind::Str)];
const LIMIT_PARAMS: &[ParamSpec] = &[ParamSpec::new("limit", ParamKind::Int)];
const SAMPLE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("sample", ParamKind::Int),
    ParamSpec::with_default("seed", ParamKind::Int, "42"),
];
const SELECT_PARAMS: &[ParamSpec] = &[ParamSpec::new("select", ParamKind::Str)];

#[cfg(feature = "image")]
const ROTATE_PARAMS: &[ParamSpec] = &[ParamSpec::new("rotate", ParamKind::Int)];
#[cfg(feature = "image")]
const RESIZE_PARAMS: &[ParamSpec] = &[ParamSpec::new("resize", ParamKind::Str)];
#[cfg(feature = "image")]
const CROP_PARAMS: &[ParamSpec] = &[ParamSpec::new("crop", ParamKind::Str)];
#[cfg(feature = "image")]
const GRAYSCALE_PARAMS: &[ParamSpec] = &[ParamSpec::with_default("grayscale", ParamKind::Bool, "true")];
#[cfg(feature = "image")]
const QUALITY_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("quality", ParamKind::Int),
    ParamSpec::enumerated(
        "format",
        &["png", "jpeg", "jpg", "gif", "bmp", "webp", "tiff"],
        None,
    ),
];

pub fn register(builder: &mut FuRegistryBuilder) {
    builder.register(HandlerRecord::modify(
        "pages",
        TypeDescriptor::Kind(FuObjectKind::Pdf),
        PAGES_PARAMS,
        pages_pdf,
    ));
    builder.register(HandlerRecord::modify(
        "pages",
        TypeDescriptor::Kind(FuObjectKind::Slides),
        PAGES_PARAMS,
        pages_slides,
    ));
    builder.register(HandlerRecord::modify(
        "limit",
        TypeDescriptor::Kind(FuObjectKind::Table),
        LIMIT_PARAMS,
        limit_rows,
    ));
    builder.register(HandlerRecord::modify(
        "sample",
        TypeDescriptor::Kind(FuObjectKind::Table),
        SAMPLE_PARAMS,
        sample_rows,
    ));
    builder.register(HandlerRecord::modify(
        "select",
        TypeDescriptor::Kind(FuObjectKind::Html),
        SELECT_PARAMS,
        select_html,
    ));
    builder.register(HandlerRecord::modify(
        "morph",
        TypeDescriptor::Kind(FuObjectKind::Response),
        &[],
        morph_response,
    ));

    #[cfg(feature = "image")]
    {
        builder.register(HandlerRecord::modify(
            "rotate",
            TypeDescriptor::Kind(FuObjectKind::Image),
            ROTATE_PARAMS,
            rotate_image,
        ));
        builder.register(HandlerRecord::modify(
            "resize",
            TypeDescriptor::Kind(FuObjectKind::Image),
            RESIZE_PARAMS,
            resize_image,
        ));
        builder.register(HandlerRecord::modify(
            "crop",
            TypeDescriptor::Kind(FuObjectKind::Image),
            CROP_PARAMS,
            crop_image,
        ));
        builder.register(HandlerRecord::modify(
            "grayscale",
            TypeDescriptor::Kind(FuObjectKind::Image),
            GRAYSCALE_PARAMS,
            grayscale_image,
        ));
        builder.register(HandlerRecord::modify(
            "quality",
            TypeDescriptor::Kind(FuObjectKind::Image),
            QUALITY_PARAMS,
            reencode_image,
        ));
        // Second name so `[format:png]` alone triggers the DSL-driven
        // modifier pass.
        builder.register(HandlerRecord::modify(
            "format",
            TypeDescriptor::Kind(FuObjectKind::Image),
            QUALITY_PARAMS,
            reencode_image,
        ));
    }
}

// ----------------------------------------------------------------------
// Page-range grammar: comma-separated terms, each `int`, `int-int`,
// `-int` (from the end), or `N` (last). 1-based, inclusive,
// deduplicated, order preserved as written. Unparseable or
// out-of-range terms are skipped with a warning.
// ----------------------------------------------------------------------

pub fn parse_page_ranges(spec: &str, total: usize) -> Vec<usize> {
    let mut selected = Vec::new();
    let mut push = |page: usize, selected: &mut Vec<usize>| {
        if page >= 1 && page <= total && !selected.contains(&page) {
            selected.push(page);
        }
    };

    for term in spec.split(',') {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }
        if term == "N" {
            push(total, &mut selected);
            continue;
        }
        if let Some(stripped) = term.strip_prefix('-') {
            // Negative indexing from the end: -1 is the last page.
            match stripped.parse::<usize>() {
                Ok(back) if back >= 1 && back <= total => {
                    push(total + 1 - back, &mut selected);
                }
                _ => log::warn!("skipping out-of-range page term '{term}'"),
            }
            continue;
        }
        if let Some((start, end)) = term.split_once('-') {
            let start = start.trim().parse::<usize>();
            let end = match end.trim() {
                "N" => Ok(total),
                other => other.parse::<usize>(),
            };
            match (start, end) {
                (Ok(start), Ok(end)) if start <= end => {
                    for page in start..=end {
                        push(page, &mut selected);
                    }
                }
                _ => log::warn!("skipping unparseable page range '{term}'"),
            }
            continue;
        }
        match term.parse::<usize>() {
            Ok(page) => push(page, &mut selected),
            Err(_) => log::warn!("skipping unparseable page term '{term}'"),
        }
    }
    selected
}

fn pages_pdf(mut att: FuAttachment, params: &FuParams) -> Result<FuAttachment> {
    let Some(spec) = params.str("pages") else {
        return Ok(att);
    };
    let FuObject::Pdf(doc) = &mut att.obj else {
        return Ok(att);
    };
    let selected = parse_page_ranges(spec, doc.page_count);
    let kept: Vec<String> = selected
        .iter()
        .filter_map(|page| doc.pages.get(page - 1).cloned())
        .collect();
    doc.pages = kept;
    att.metadata
        .insert("pages_selected".into(), json!(selected));
    Ok(att)
}

fn pages_slides(mut att: FuAttachment, params: &FuParams) -> Result<FuAttachment> {
    let Some(spec) = params.str("pages") else {
        return Ok(att);
    };
    let FuObject::Slides(deck) = &mut att.obj else {
        return Ok(att);
    };
    let total = deck.slides.len();
    let selected = parse_page_ranges(spec, total);
    let kept: Vec<String> = selected
        .iter()
        .filter_map(|slide| deck.slides.get(slide - 1).cloned())
        .collect();
    deck.slides = kept;
    att.metadata
        .insert("slides_selected".into(), json!(selected));
    Ok(att)
}

fn limit_rows(mut att: FuAttachment, params: &FuParams) -> Result<FuAttachment> {
    let Some(limit) = params.int("limit") else {
        return Ok(att);
    };
    if limit < 0 {
        return Err(FuError::handler("modify.limit", "limit must be non-negative"));
    }
    let FuObject::Table(table) = &mut att.obj else {
        return Ok(att);
    };
    table.rows.truncate(limit as usize);
    att.metadata
        .insert("csv_rows_kept".into(), json!(table.rows.len()));
    Ok(att)
}

fn sample_rows(mut att: FuAttachment, params: &FuParams) -> Result<FuAttachment> {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let Some(count) = params.int("sample") else {
        return Ok(att);
    };
    let seed = params.int("seed").unwrap_or(42) as u64;
    let FuObject::Table(table) = &mut att.obj else {
        return Ok(att);
    };
    let count = (count.max(0) as usize).min(table.rows.len());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices = rand::seq::index::sample(&mut rng, table.rows.len(), count).into_vec();
    // Sampled rows keep their original order.
    indices.sort_unstable();
    let kept: Vec<Vec<String>> = indices
        .into_iter()
        .filter_map(|idx| table.rows.get(idx).cloned())
        .collect();
    table.rows = kept;
    att.metadata
        .insert("csv_rows_sampled".into(), json!(table.rows.len()));
    att.metadata.insert("sample_seed".into(), json!(seed));
    Ok(att)
}

#[cfg(feature = "html")]
fn select_html(mut att: FuAttachment, params: &FuParams) -> Result<FuAttachment> {
    let Some(selector_str) = params.str("select") else {
        return Ok(att);
    };
    let FuObject::Html(doc) = &mut att.obj else {
        return Ok(att);
    };
    let selector = scraper::Selector::parse(selector_str)
        .map_err(|err| FuError::handler("modify.select", format!("bad selector: {err:?}")))?;
    let parsed = scraper::Html::parse_document(&doc.raw);
    let fragments: Vec<String> = parsed
        .select(&selector)
        .map(|element| element.html())
        .collect();
    att.metadata
        .insert("selector".into(), Value::String(selector_str.to_string()));
    att.metadata
        .insert("selector_matches".into(), json!(fragments.len()));
    doc.raw = fragments.join("\n");
    Ok(att)
}

#[cfg(not(feature = "html"))]
fn select_html(att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let _ = &att;
    Err(FuError::dependency(
        "modify.select",
        "rebuild with the `html` cargo feature enabled to apply CSS selectors",
    ))
}

// ----------------------------------------------------------------------
// Morph: turn a downloaded response into something the
// extension-dispatched loaders recognize. Sniff order: declared
// content type, magic bytes, URL path extension.
// ----------------------------------------------------------------------

fn morph_response(mut att: FuAttachment, _params: &FuParams) -> Result<FuAttachment> {
    let FuObject::Response(resp) = &att.obj else {
        return Ok(att);
    };

    let detected = sniff_content_type(resp.content_type.as_deref())
        .or_else(|| sniff_magic(&resp.body))
        .or_else(|| sniff_url_extension(&resp.url));

    let Some(ext) = detected else {
        return Ok(att);
    };

    // Canonical filename derived from the URL's last path segment.
    let segment = resp
        .url
        .split('#')
        .next()
        .and_then(|url| url.split('?').next())
        .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .unwrap_or("download");
    let canonical = if segment.to_ascii_lowercase().ends_with(&format!(".{ext}")) {
        segment.to_string()
    } else {
        format!("{segment}.{ext}")
    };

    att.metadata
        .insert("morphed_from".into(), Value::String(att.path.clone()));
    att.metadata
        .insert("detected_extension".into(), Value::String(ext.clone()));
    att.path = canonical;
    Ok(att)
}

fn sniff_content_type(content_type: Option<&str>) -> Option<String> {
    let ct = content_type?.split(';').next()?.trim().to_ascii_lowercase();
    // Generic byte-stream types carry no format information; defer to
    // magic bytes.
    if ct == "application/octet-stream" || ct == "binary/octet-stream" {
        return None;
    }
    let ext = match ct.as_str() {
        "application/pdf" => "pdf",
        "text/html" | "application/xhtml+xml" => "html",
        "text/csv" => "csv",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "text/plain" | "text/markdown" => "txt",
        _ => return mime_fallback(&ct),
    };
    Some(ext.to_string())
}

#[cfg(feature = "http")]
fn mime_fallback(content_type: &str) -> Option<String> {
    mime_guess::get_mime_extensions_str(content_type)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
}

#[cfg(not(feature = "http"))]
fn mime_fallback(_content_type: &str) -> Option<String> {
    None
}

fn sniff_magic(body: &[u8]) -> Option<String> {
    let ext = if body.starts_with(b"%PDF") {
        "pdf"
    } else if body.starts_with(&[0x89, b'P', b'N', b'G']) {
        "png"
    } else if body.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpg"
    } else if body.starts_with(b"GIF8") {
        "gif"
    } else if body.starts_with(b"PK\x03\x04") {
        // Office containers are zip archives; default to a deck.
        "pptx"
    } else if looks_like_html(body) {
        "html"
    } else {
        return None;
    };
    Some(ext.to_string())
}

fn looks_like_html(body: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&body[..body.len().min(256)]).to_ascii_lowercase();
    let head = head.trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

fn sniff_url_extension(url: &str) -> Option<String> {
    let path = url.split('#').next()?.split('?').next()?;
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

// ----------------------------------------------------------------------
// Raster image modifiers: decode, transform, re-encode at the boundary.
// ----------------------------------------------------------------------

#[cfg(feature = "image")]
mod raster {
    use super::*;
    use crate::object::RasterImage;

    pub(super) fn decode(raster: &RasterImage) -> Result<image::DynamicImage> {
        image::load_from_memory(&raster.data)
            .map_err(|err| FuError::handler("modify.image", format!("cannot decode image: {err}")))
    }

    pub(super) fn encode(
        img: &image::DynamicImage,
        format: &str,
    ) -> Result<(Vec<u8>, &'static str)> {
        let (target, name) = match format.to_ascii_uppercase().as_str() {
            "JPEG" | "JPG" => (image::ImageFormat::Jpeg, "JPEG"),
            "GIF" => (image::ImageFormat::Gif, "GIF"),
            "BMP" => (image::ImageFormat::Bmp, "BMP"),
            "WEBP" => (image::ImageFormat::WebP, "WEBP"),
            "TIFF" => (image::ImageFormat::Tiff, "TIFF"),
            _ => (image::ImageFormat::Png, "PNG"),
        };
        let mut buffer = std::io::Cursor::new(Vec::new());
        // JPEG has no alpha channel; flatten first.
        let owned;
        let source = if matches!(target, image::ImageFormat::Jpeg) && img.color().has_alpha() {
            owned = image::DynamicImage::ImageRgb8(img.to_rgb8());
            &owned
        } else {
            img
        };
        source
            .write_to(&mut buffer, target)
            .map_err(|err| FuError::handler("modify.image", format!("cannot encode image: {err}")))?;
        Ok((buffer.into_inner(), name))
    }

    pub(super) fn replace(att: &mut FuAttachment, img: image::DynamicImage, format: &str) -> Result<()> {
        let (data, name) = encode(&img, format)?;
        att.metadata
            .insert("image_width".into(), json!(img.width()));
        att.metadata
            .insert("image_height".into(), json!(img.height()));
        if let FuObject::Image(raster) = &mut att.obj {
            raster.width = img.width();
            raster.height = img.height();
            raster.format = name.to_string();
            raster.data = data;
        }
        Ok(())
    }
}

#[cfg(feature = "image")]
fn rotate_image(mut att: FuAttachment, params: &FuParams) -> Result<FuAttachment> {
    let Some(degrees) = params.int("rotate") else {
        return Ok(att);
    };
    let FuObject::Image(raster) = &att.obj else {
        return Ok(att);
    };
    let normalized = degrees.rem_euclid(360);
    let img = raster::decode(raster)?;
    let rotated = match normalized {
        0 => img,
        // Clockwise quarter turns.
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => {
            return Err(FuError::handler(
                "modify.rotate",
                format!("unsupported angle {degrees}; use multiples of 90"),
            ))
        }
    };
    let format = raster.format.clone();
    raster::replace(&mut att, rotated, &format)?;
    att.metadata.insert("rotation".into(), json!(degrees));
    Ok(att)
}

/// Parses `WIDTHxHEIGHT` (either side may be `auto`) or `P%`.
#[cfg(feature = "image")]
pub(crate) fn resize_spec_dimensions(spec: &str, width: u32, height: u32) -> Option<(u32, u32)> {
    let spec = spec.trim().to_ascii_lowercase();
    if let Some(percent) = spec.strip_suffix('%') {
        let factor = percent.trim().parse::<f64>().ok()? / 100.0;
        if factor <= 0.0 {
            return None;
        }
        let w = ((width as f64 * factor).round() as u32).max(1);
        let h = ((height as f64 * factor).round() as u32).max(1);
        return Some((w, h));
    }
    let (w_spec, h_spec) = spec.split_once('x')?;
    let parse_side = |side: &str| -> Option<Option<u32>> {
        if side == "auto" {
            Some(None)
        } else {
            side.parse::<u32>().ok().filter(|v| *v > 0).map(Some)
        }
    };
    match (parse_side(w_spec.trim())?, parse_side(h_spec.trim())?) {
        (Some(w), Some(h)) => Some((w, h)),
        (Some(w), None) => {
            let h = ((w as f64) * (height as f64) / (width as f64)).round() as u32;
            Some((w, h.max(1)))
        }
        (None, Some(h)) => {
            let w = ((h as f64) * (width as f64) / (height as f64)).round() as u32;
            Some((w.max(1), h))
        }
        (None, None) => None,
    }
}

#[cfg(feature = "image")]
fn resize_image(mut att: FuAttachment, params: &FuParams) -> Result<FuAttachment> {
    let Some(spec) = params.str("resize") else {
        return Ok(att);
    };
    let FuObject::Image(raster) = &att.obj else {
        return Ok(att);
    };
    let Some((w, h)) = resize_spec_dimensions(spec, raster.width, raster.height) else {
        return Err(FuError::handler(
            "modify.resize",
            format!("invalid resize spec '{spec}'; expected WIDTHxHEIGHT or P%"),
        ));
    };
    let img = raster::decode(raster)?;
    let resized = img.resize_exact(w, h, image::imageops::FilterType::Lanczos3);
    let format = raster.format.clone();
    raster::replace(&mut att, resized, &format)?;
    att.metadata
        .insert("resized_to".into(), Value::String(format!("{w}x{h}")));
    Ok(att)
}

#[cfg(feature = "image")]
fn crop_image(mut att: FuAttachment, params: &FuParams) -> Result<FuAttachment> {
    let Some(spec) = params.str("crop") else {
        return Ok(att);
    };
    let FuObject::Image(raster) = &att.obj else {
        return Ok(att);
    };
    let sides: Vec<u32> = spec
        .split(',')
        .filter_map(|side| side.trim().parse::<u32>().ok())
        .collect();
    let [x1, y1, x2, y2] = sides.as_slice() else {
        return Err(FuError::handler(
            "modify.crop",
            format!("invalid crop box '{spec}'; expected 'x1,y1,x2,y2'"),
        ));
    };
    if x2 <= x1 || y2 <= y1 || *x2 > raster.width || *y2 > raster.height {
        return Err(FuError::handler(
            "modify.crop",
            format!("crop box '{spec}' outside {}x{}", raster.width, raster.height),
        ));
    }
    let img = raster::decode(raster)?;
    let cropped = img.crop_imm(*x1, *y1, x2 - x1, y2 - y1);
    let format = raster.format.clone();
    raster::replace(&mut att, cropped, &format)?;
    att.metadata
        .insert("cropped_to".into(), Value::String(spec.to_string()));
    Ok(att)
}

#[cfg(feature = "image")]
fn grayscale_image(mut att: FuAttachment, params: &FuParams) -> Result<FuAttachment> {
    if params.flag("grayscale") != Some(true) {
        return Ok(att);
    }
    let FuObject::Image(raster) = &att.obj else {
        return Ok(att);
    };
    let img = raster::decode(raster)?.grayscale();
    let format = raster.format.clone();
    raster::replace(&mut att, img, &format)?;
    att.metadata.insert("grayscale".into(), Value::Bool(true));
    Ok(att)
}

/// Re-encode with an explicit output format and/or quality hint from
/// the DSL (`format:png`, `quality:80`). Quality is recorded; the
/// encoder's default profile is used for formats without a knob here.
#[cfg(feature = "image")]
fn reencode_image(mut att: FuAttachment, params: &FuParams) -> Result<FuAttachment> {
    let format = params.str("format").map(str::to_string);
    let quality = params.int("quality");
    let FuObject::Image(raster) = &att.obj else {
        return Ok(att);
    };
    let target = format.unwrap_or_else(|| raster.format.clone());
    let img = raster::decode(raster)?;
    raster::replace(&mut att, img, &target)?;
    if let Some(quality) = quality {
        if !(0..=100).contains(&quality) {
            return Err(FuError::handler(
                "modify.quality",
                "quality must be between 0 and 100",
            ));
        }
        att.metadata.insert("quality".into(), json!(quality));
    }
    Ok(att)
}
