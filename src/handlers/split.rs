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

//! SPLIT handlers. Text splitters emit purely textual chunks (object
//! left empty); document and data splitters hand each chunk a
//! format-specific subunit. Chunk ids, copied commands and the
//! chunk-index metadata are stamped by the engine.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::attachment::FuAttachment;
use crate::dispatch::{FuParams, ParamKind, ParamSpec, TypeDescriptor};
use crate::errors::Result;
use crate::object::{DataTable, FuObject, HtmlDocument, PdfDocument, SlideDeck};
use crate::registry::{FuRegistryBuilder, HandlerRecord};

const TOKENS_PARAMS: &[ParamSpec] = &[ParamSpec::with_default("tokens", ParamKind::Int, "500")];
const CHARACTERS_PARAMS: &[ParamSpec] =
    &[ParamSpec::with_default("characters", ParamKind::Int, "1000")];
const CUSTOM_PARAMS: &[ParamSpec] =
    &[ParamSpec::with_default("separator", ParamKind::Str, "\n---\n")];
const ROWS_PARAMS: &[ParamSpec] = &[ParamSpec::with_default("rows", ParamKind::Int, "100")];

pub fn register(builder: &mut FuRegistryBuilder) {
    builder.register(HandlerRecord::split(
        "paragraphs",
        TypeDescriptor::Any,
        &[],
        split_paragraphs,
    ));
    builder.register(HandlerRecord::split(
        "sentences",
        TypeDescriptor::Any,
        &[],
        split_sentences,
    ));
    builder.register(HandlerRecord::split(
        "tokens",
        TypeDescriptor::Any,
        TOKENS_PARAMS,
        split_tokens,
    ));
    builder.register(HandlerRecord::split(
        "characters",
        TypeDescriptor::Any,
        CHARACTERS_PARAMS,
        split_characters,
    ));
    builder.register(HandlerRecord::split(
        "lines",
        TypeDescriptor::Any,
        &[],
        split_lines,
    ));
    builder.register(HandlerRecord::split(
        "custom",
        TypeDescriptor::Any,
        CUSTOM_PARAMS,
        split_custom,
    ));
    builder.register(HandlerRecord::split(
        "pages",
        TypeDescriptor::Kind(crate::object::FuObjectKind::Pdf),
        &[],
        split_pages,
    ));
    builder.register(HandlerRecord::split(
        "slides",
        TypeDescriptor::Kind(crate::object::FuObjectKind::Slides),
        &[],
        split_slides,
    ));
    builder.register(HandlerRecord::split(
        "sections",
        TypeDescriptor::Kind(crate::object::FuObjectKind::Html),
        &[],
        split_sections,
    ));
    builder.register(HandlerRecord::split(
        "rows",
        TypeDescriptor::Kind(crate::object::FuObjectKind::Table),
        ROWS_PARAMS,
        split_rows,
    ));
    builder.register(HandlerRecord::split(
        "columns",
        TypeDescriptor::Kind(crate::object::FuObjectKind::Table),
        &[],
        split_columns,
    ));
}

/// Text a splitter slices: the loaded plain text when present,
/// otherwise whatever presenters extracted so far.
fn source_text(att: &FuAttachment) -> String {
    match &att.obj {
        FuObject::Text(text) => text.clone(),
        _ => att.text.clone(),
    }
}

fn text_chunk(text: String) -> FuAttachment {
    FuAttachment {
        text,
        ..Default::default()
    }
}

// ----------------------------------------------------------------------
// Text splitters.
// ----------------------------------------------------------------------

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("paragraph regex"));

fn split_paragraphs(att: FuAttachment, _params: &FuParams) -> Result<Vec<FuAttachment>> {
    let text = source_text(&att);
    Ok(PARAGRAPH_BREAK
        .split(&text)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| text_chunk(chunk.to_string()))
        .collect())
}

/// A sentence runs up to `.`, `!` or `?`; Unicode letters inside stay
/// untouched because the boundary only looks at the terminator.
static SENTENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?]*[.!?]+").expect("sentence regex"));

fn split_sentences(att: FuAttachment, _params: &FuParams) -> Result<Vec<FuAttachment>> {
    let text = source_text(&att);
    let mut chunks = Vec::new();
    let mut consumed = 0;
    for m in SENTENCE.find_iter(&text) {
        let sentence = m.as_str().trim();
        if !sentence.is_empty() {
            chunks.push(text_chunk(sentence.to_string()));
        }
        consumed = m.end();
    }
    let tail = text[consumed..].trim();
    if !tail.is_empty() {
        chunks.push(text_chunk(tail.to_string()));
    }
    Ok(chunks)
}

fn chunk_by_chars(text: &str, width: usize) -> Vec<FuAttachment> {
    if width == 0 {
        return vec![text_chunk(text.to_string())];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width)
        .map(|chunk| text_chunk(chunk.iter().collect()))
        .collect()
}

fn split_tokens(att: FuAttachment, params: &FuParams) -> Result<Vec<FuAttachment>> {
    let tokens = params.int("tokens").unwrap_or(500).max(1) as usize;
    // Approximation used throughout: one token every four characters.
    let width = tokens.saturating_mul(4);
    Ok(chunk_by_chars(&source_text(&att), width))
}

fn split_characters(att: FuAttachment, params: &FuParams) -> Result<Vec<FuAttachment>> {
    let width = params.int("characters").unwrap_or(1000).max(1) as usize;
    Ok(chunk_by_chars(&source_text(&att), width))
}

fn split_lines(att: FuAttachment, _params: &FuParams) -> Result<Vec<FuAttachment>> {
    Ok(source_text(&att)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| text_chunk(line.to_string()))
        .collect())
}

fn split_custom(att: FuAttachment, params: &FuParams) -> Result<Vec<FuAttachment>> {
    let separator = params.str("separator").unwrap_or("\n---\n").to_string();
    let text = source_text(&att);
    Ok(text
        .split(separator.as_str())
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| text_chunk(chunk.to_string()))
        .collect())
}

// ----------------------------------------------------------------------
// Document splitters: each chunk carries a single-unit subdocument.
// ----------------------------------------------------------------------

fn split_pages(att: FuAttachment, _params: &FuParams) -> Result<Vec<FuAttachment>> {
    let FuObject::Pdf(doc) = &att.obj else {
        return Ok(Vec::new());
    };
    Ok(doc
        .pages
        .iter()
        .map(|page| FuAttachment {
            // Chunks are textual subunits; the raw document bytes stay
            // with the source attachment.
            obj: FuObject::Pdf(PdfDocument {
                pages: vec![page.clone()],
                page_count: doc.page_count,
                data: Vec::new(),
            }),
            ..Default::default()
        })
        .collect())
}

fn split_slides(att: FuAttachment, _params: &FuParams) -> Result<Vec<FuAttachment>> {
    let FuObject::Slides(deck) = &att.obj else {
        return Ok(Vec::new());
    };
    Ok(deck
        .slides
        .iter()
        .map(|slide| FuAttachment {
            obj: FuObject::Slides(SlideDeck {
                slides: vec![slide.clone()],
            }),
            ..Default::default()
        })
        .collect())
}

static SECTION_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<h[1-3][^>]*>").expect("section regex"));

fn split_sections(att: FuAttachment, _params: &FuParams) -> Result<Vec<FuAttachment>> {
    let FuObject::Html(doc) = &att.obj else {
        return Ok(Vec::new());
    };
    let mut boundaries: Vec<usize> = SECTION_HEADING
        .find_iter(&doc.raw)
        .map(|m| m.start())
        .collect();
    if boundaries.first() != Some(&0) {
        boundaries.insert(0, 0);
    }
    boundaries.push(doc.raw.len());

    let mut chunks = Vec::new();
    for window in boundaries.windows(2) {
        let fragment = doc.raw[window[0]..window[1]].trim();
        if fragment.is_empty() {
            continue;
        }
        chunks.push(FuAttachment {
            obj: FuObject::Html(HtmlDocument {
                raw: fragment.to_string(),
                title: None,
            }),
            ..Default::default()
        });
    }
    Ok(chunks)
}

// ----------------------------------------------------------------------
// Data splitters.
// ----------------------------------------------------------------------

fn split_rows(att: FuAttachment, params: &FuParams) -> Result<Vec<FuAttachment>> {
    let size = params.int("rows").unwrap_or(100).max(1) as usize;
    let FuObject::Table(table) = &att.obj else {
        return Ok(Vec::new());
    };
    Ok(table
        .rows
        .chunks(size)
        .map(|rows| FuAttachment {
            obj: FuObject::Table(DataTable {
                headers: table.headers.clone(),
                rows: rows.to_vec(),
            }),
            ..Default::default()
        })
        .collect())
}

fn split_columns(att: FuAttachment, _params: &FuParams) -> Result<Vec<FuAttachment>> {
    let FuObject::Table(table) = &att.obj else {
        return Ok(Vec::new());
    };
    Ok(table
        .headers
        .iter()
        .enumerate()
        .map(|(idx, header)| FuAttachment {
            obj: FuObject::Table(DataTable {
                headers: vec![header.clone()],
                rows: table
                    .rows
                    .iter()
                    .map(|row| vec![row.get(idx).cloned().unwrap_or_default()])
                    .collect(),
            }),
            ..Default::default()
        })
        .collect())
}
