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

//! # Loaded Object Module
//!
//! `FuObject` is the tagged sum over everything a loader can produce: a
//! parsed PDF, a table, a raster image, an HTTP response, and so on. The
//! object is exclusively owned by its attachment and transferred by move;
//! handlers that need to cross-reference another attachment's content go
//! through metadata instead.
//!
//! Dispatch descriptors match against three views of an object:
//! its exact kind (`FuObjectKind`), its unqualified class name
//! (`"PdfDocument"`), and its family (`"Document"`, `"Dataset"`,
//! `"Media"`). Regex descriptors match the qualified name
//! (`"fu::object::PdfDocument"`).

use serde::{Deserialize, Serialize};

/// A parsed PDF with per-page extracted text.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PdfDocument {
    /// Extracted text per retained page, in page order.
    pub pages: Vec<String>,
    /// Page count of the source document before any page selection.
    pub page_count: usize,
    /// The original document bytes, kept so presenters can render pages
    /// to images. Empty for purely textual chunks produced by a split.
    pub data: Vec<u8>,
}

/// A small in-memory table parsed from CSV.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.headers.len())
    }
}

/// A raster image kept in its encoded form.
///
/// The bytes stay encoded so the variant is independent of the `image`
/// feature; handlers that transform pixels decode, transform, and
/// re-encode at the boundary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RasterImage {
    pub data: Vec<u8>,
    /// Upper-case short format name, e.g. "PNG", "JPEG".
    pub format: String,
    pub width: u32,
    pub height: u32,
}

/// An in-memory HTTP response awaiting morphing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Raw HTML with an optional extracted title.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HtmlDocument {
    pub raw: String,
    pub title: Option<String>,
}

/// Slide text extracted from a presentation, one entry per slide.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SlideDeck {
    pub slides: Vec<String>,
}

/// One readable file discovered under a repository root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepoFile {
    pub path: String,
    pub text: String,
}

/// A directory tree gathered by the repository loader.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Repository {
    pub root: String,
    pub files: Vec<RepoFile>,
    pub total_bytes: u64,
}

/// The loaded in-memory object carried by an attachment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum FuObject {
    /// Nothing loaded yet (pre-LOAD, or a purely textual chunk).
    #[default]
    None,
    /// Plain UTF-8 text from the fallback loader.
    Text(String),
    /// Unclassified raw bytes.
    Bytes(Vec<u8>),
    Pdf(PdfDocument),
    Table(DataTable),
    Image(RasterImage),
    Response(HttpResponse),
    Html(HtmlDocument),
    Slides(SlideDeck),
    Repository(Repository),
}

/// Fieldless mirror of `FuObject` used for exact-kind dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuObjectKind {
    None,
    Text,
    Bytes,
    Pdf,
    Table,
    Image,
    Response,
    Html,
    Slides,
    Repository,
}

impl FuObject {
    pub fn kind(&self) -> FuObjectKind {
        match self {
            FuObject::None => FuObjectKind::None,
            FuObject::Text(_) => FuObjectKind::Text,
            FuObject::Bytes(_) => FuObjectKind::Bytes,
            FuObject::Pdf(_) => FuObjectKind::Pdf,
            FuObject::Table(_) => FuObjectKind::Table,
            FuObject::Image(_) => FuObjectKind::Image,
            FuObject::Response(_) => FuObjectKind::Response,
            FuObject::Html(_) => FuObjectKind::Html,
            FuObject::Slides(_) => FuObjectKind::Slides,
            FuObject::Repository(_) => FuObjectKind::Repository,
        }
    }

    /// Unqualified class name used by name-level dispatch.
    pub fn class_name(&self) -> &'static str {
        match self {
            FuObject::None => "Nothing",
            FuObject::Text(_) => "PlainText",
            FuObject::Bytes(_) => "RawBytes",
            FuObject::Pdf(_) => "PdfDocument",
            FuObject::Table(_) => "DataTable",
            FuObject::Image(_) => "RasterImage",
            FuObject::Response(_) => "HttpResponse",
            FuObject::Html(_) => "HtmlDocument",
            FuObject::Slides(_) => "SlideDeck",
            FuObject::Repository(_) => "Repository",
        }
    }

    /// Family name used by subtype-level dispatch. Page-oriented and
    /// prose-like objects share the "Document" family.
    pub fn family(&self) -> Option<&'static str> {
        match self {
            FuObject::Pdf(_) | FuObject::Html(_) | FuObject::Slides(_) | FuObject::Text(_) => {
                Some("Document")
            }
            FuObject::Table(_) => Some("Dataset"),
            FuObject::Image(_) => Some("Media"),
            FuObject::None
            | FuObject::Bytes(_)
            | FuObject::Response(_)
            | FuObject::Repository(_) => None,
        }
    }

    /// Qualified name matched by regex descriptors.
    pub fn qualified_name(&self) -> String {
        format!("fu::object::{}", self.class_name())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FuObject::None)
    }
}
