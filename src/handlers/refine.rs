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

//! REFINE handlers: post-processing over extracted text and images.
//! `tile_images` is the one reducer here — it consumes a whole
//! collection and emits a single attachment carrying the grid.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::attachment::{FuAttachment, FuItem};
use crate::dispatch::{FuParams, ParamKind, ParamSpec};
use crate::errors::{FuError, Result};
use crate::registry::{FuRegistryBuilder, HandlerRecord};

const TRUNCATE_PARAMS: &[ParamSpec] =
    &[ParamSpec::with_default("truncate", ParamKind::Int, "5000")];
const TILE_PARAMS: &[ParamSpec] = &[ParamSpec::with_default("tile", ParamKind::Str, "2x2")];
const RESIZE_IMAGES_PARAMS: &[ParamSpec] = &[ParamSpec::new("resize_images", ParamKind::Str)];

pub fn register(builder: &mut FuRegistryBuilder) {
    builder.register(HandlerRecord::refine("truncate", TRUNCATE_PARAMS, truncate));
    builder.register(HandlerRecord::refine("add_headers", &[], add_headers));
    builder.register(HandlerRecord::refine("tile_images", TILE_PARAMS, tile_images).reducer());
    builder.register(HandlerRecord::refine(
        "resize_images",
        RESIZE_IMAGES_PARAMS,
        resize_images,
    ));
    builder.register(HandlerRecord::refine("clean", &[], clean));
}

fn expect_one(item: FuItem, name: &str) -> Result<FuAttachment> {
    match item {
        FuItem::One(att) => Ok(att),
        FuItem::Many(_) => Err(FuError::internal(format!(
            "refine.{name} invoked with a collection outside reducer mode"
        ))),
    }
}

/// Truncates `text` to a character budget. The default budget is a
/// manifest default, so hosts override it per call or per DSL.
fn truncate(item: FuItem, params: &FuParams) -> Result<FuItem> {
    let mut att = expect_one(item, "truncate")?;
    let budget = params.int("truncate").unwrap_or(5000).max(0) as usize;
    let total = att.text.chars().count();
    if total > budget {
        att.text = att.text.chars().take(budget).collect();
        att.text.push_str("\n\n[truncated]");
        att.metadata.insert("truncated".into(), Value::Bool(true));
        att.metadata.insert("original_chars".into(), json!(total));
    }
    Ok(FuItem::One(att))
}

/// Prefixes a generic file header when no presenter emitted one.
fn add_headers(item: FuItem, _params: &FuParams) -> Result<FuItem> {
    let mut att = expect_one(item, "add_headers")?;
    if !att.text.is_empty() && !att.text.starts_with('#') {
        att.text = format!("# {}\n\n{}", att.display_name(), att.text);
    }
    Ok(FuItem::One(att))
}

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("newline regex"));

/// Whitespace normalization: control characters dropped, runs of blank
/// lines collapsed, trailing spaces removed.
fn clean(item: FuItem, _params: &FuParams) -> Result<FuItem> {
    let mut att = expect_one(item, "clean")?;
    let stripped: String = att
        .text
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let trimmed_lines = stripped
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    att.text = EXCESS_NEWLINES.replace_all(&trimmed_lines, "\n\n").to_string();
    Ok(FuItem::One(att))
}

/// Splits a `data:<mime>;base64,` URL into its payload bytes.
pub fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    let payload = url.split("base64,").nth(1)?;
    BASE64.decode(payload).ok()
}

#[cfg(feature = "image")]
fn parse_grid(spec: &str) -> (u32, u32) {
    let fallback = (2, 2);
    let Some((cols, rows)) = spec.trim().split_once('x') else {
        return fallback;
    };
    match (cols.trim().parse::<u32>(), rows.trim().parse::<u32>()) {
        (Ok(cols), Ok(rows)) if cols >= 1 && rows >= 1 => (cols, rows),
        _ => fallback,
    }
}

/// Reducer: composes every collected image into one grid so a
/// multi-page render costs a single image slot downstream.
#[cfg(feature = "image")]
fn tile_images(item: FuItem, params: &FuParams) -> Result<FuItem> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use image::imageops;

    let grid_spec = params.str("tile").unwrap_or("2x2").to_string();
    let (cols, rows) = parse_grid(&grid_spec);
    let mut att = item.fold();

    let decoded: Vec<image::DynamicImage> = att
        .images
        .iter()
        .filter_map(|url| decode_data_url(url))
        .filter_map(|bytes| image::load_from_memory(&bytes).ok())
        .collect();
    if decoded.len() < 2 {
        return Ok(FuItem::One(att));
    }

    const CELL: u32 = 512;
    let per_grid = (cols * rows) as usize;
    let mut tiles = Vec::new();
    for group in decoded.chunks(per_grid) {
        let mut canvas = image::RgbaImage::from_pixel(
            CELL * cols,
            CELL * rows.min(((group.len() as u32) + cols - 1) / cols),
            image::Rgba([255, 255, 255, 255]),
        );
        for (idx, img) in group.iter().enumerate() {
            let thumb = img.resize(CELL, CELL, imageops::FilterType::Triangle);
            let x = (idx as u32 % cols) * CELL + (CELL - thumb.width()) / 2;
            let y = (idx as u32 / cols) * CELL + (CELL - thumb.height()) / 2;
            imageops::overlay(&mut canvas, &thumb.to_rgba8(), x.into(), y.into());
        }
        let mut buffer = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(canvas)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .map_err(|err| FuError::handler("refine.tile_images", err.to_string()))?;
        tiles.push(format!(
            "data:image/png;base64,{}",
            BASE64.encode(buffer.into_inner())
        ));
    }

    att.metadata
        .insert("tiled_images".into(), json!(decoded.len()));
    att.metadata
        .insert("tile_grid".into(), Value::String(grid_spec));
    att.images = tiles;
    Ok(FuItem::One(att))
}

#[cfg(not(feature = "image"))]
fn tile_images(item: FuItem, _params: &FuParams) -> Result<FuItem> {
    let _ = &item;
    Err(FuError::dependency(
        "refine.tile_images",
        "rebuild with the `image` cargo feature enabled to tile images",
    ))
}

/// Shrinks every collected image, keeping them as self-contained PNG
/// data URLs. Accepts `WIDTHxHEIGHT` or `P%`.
#[cfg(feature = "image")]
fn resize_images(item: FuItem, params: &FuParams) -> Result<FuItem> {
    let mut att = expect_one(item, "resize_images")?;
    let Some(spec) = params.str("resize_images").map(str::to_string) else {
        return Ok(FuItem::One(att));
    };
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    let mut resized = Vec::with_capacity(att.images.len());
    for url in &att.images {
        let Some(bytes) = decode_data_url(url) else {
            resized.push(url.clone());
            continue;
        };
        let Ok(img) = image::load_from_memory(&bytes) else {
            resized.push(url.clone());
            continue;
        };
        let target = super::modify::resize_spec_dimensions(&spec, img.width(), img.height());
        let Some((w, h)) = target else {
            return Err(FuError::handler(
                "refine.resize_images",
                format!("invalid resize spec '{spec}'"),
            ));
        };
        let out = img.resize_exact(w, h, image::imageops::FilterType::Lanczos3);
        let mut buffer = std::io::Cursor::new(Vec::new());
        out.write_to(&mut buffer, image::ImageFormat::Png)
            .map_err(|err| FuError::handler("refine.resize_images", err.to_string()))?;
        resized.push(format!(
            "data:image/png;base64,{}",
            BASE64.encode(buffer.into_inner())
        ));
    }
    att.images = resized;
    att.metadata
        .insert("images_resized_to".into(), Value::String(spec));
    Ok(FuItem::One(att))
}

#[cfg(not(feature = "image"))]
fn resize_images(item: FuItem, _params: &FuParams) -> Result<FuItem> {
    let _ = &item;
    Err(FuError::dependency(
        "refine.resize_images",
        "rebuild with the `image` cargo feature enabled to resize images",
    ))
}
