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

//! # Attachment Module
//!
//! `FuAttachment` is the fundamental unit of data that flows through Fu
//! pipelines: one source string in, one bundle of extracted text, images
//! and metadata out. `FuCollection` is the ordered sequence of chunks a
//! SPLIT produces, and `FuItem` is the polymorphic value the engine
//! threads between steps.
//!
//! ## Design Principles
//!
//! - **Flexibility**: metadata uses JSON (`serde_json::Map`) so handlers
//!   can attach structured values without a schema
//! - **Exclusive ownership**: the loaded object moves with its
//!   attachment; cross-references go through metadata
//! - **Append-only trace**: only the pipeline engine writes
//!   `pipeline_trace`

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::errors::{FuError, Result};
use crate::object::FuObject;

/// Generic metadata map that accompanies an attachment.
pub type FuMetadata = Map<String, Value>;

/// Ordered DSL command map; keys are unique, values stay raw strings
/// until a handler manifest coerces them.
pub type FuCommands = IndexMap<String, String>;

/// Single in-flight content item.
#[derive(Clone, Debug, Default)]
pub struct FuAttachment {
    /// Original source string including any DSL bracket group.
    pub input: String,
    /// Source with DSL stripped: a file path, a URL, or a chunk id such
    /// as `"report.pdf#pages-3"`.
    pub path: String,
    /// Parsed DSL commands in written order.
    pub commands: FuCommands,
    /// Loaded in-memory object, exclusively owned.
    pub obj: FuObject,
    /// Extracted text. Presenters append; only sequential non-presenter
    /// steps may replace.
    pub text: String,
    /// Base64 data URLs (`data:<mime>;base64,<payload>`), self-contained.
    pub images: Vec<String>,
    /// Arbitrary typed metadata.
    pub metadata: FuMetadata,
    /// Names of handlers applied, in application order.
    pub pipeline_trace: Vec<String>,
}

impl FuAttachment {
    /// Constructs an attachment from an already-parsed source.
    pub fn new(input: impl Into<String>, path: impl Into<String>, commands: FuCommands) -> Self {
        FuAttachment {
            input: input.into(),
            path: path.into(),
            commands,
            ..Default::default()
        }
    }

    /// Parses a source string (path plus optional DSL) into an
    /// attachment. Fails only on the two fatal DSL error kinds.
    pub fn from_source(source: &str) -> Result<Self> {
        let parsed = crate::dsl::parse(source)?;
        let mut att = FuAttachment::new(source, parsed.path, parsed.commands);
        for warning in parsed.warnings {
            log::warn!("{warning}");
            att.push_note("dsl_warnings", Value::String(warning));
        }
        Ok(att)
    }

    /// File-name portion of the path, without any chunk suffix.
    pub fn display_name(&self) -> &str {
        let base = self.path.split('#').next().unwrap_or(&self.path);
        base.rsplit(['/', '\\']).next().unwrap_or(base)
    }

    /// Extension of the path, folding in `metadata.detected_extension`
    /// set by the morph modifier for downloaded content.
    pub fn extension(&self) -> Option<String> {
        if let Some(ext) = self.metadata.get("detected_extension").and_then(Value::as_str) {
            return Some(ext.to_ascii_lowercase());
        }
        let base = self.path.split('#').next().unwrap_or(&self.path);
        let name = base.rsplit(['/', '\\']).next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Raw bytes of the source: a downloaded response body when present,
    /// otherwise the file on disk. Loaders go through this so the same
    /// code serves files and morphed URLs.
    pub fn input_bytes(&self) -> Result<Vec<u8>> {
        match &self.obj {
            FuObject::Response(resp) => Ok(resp.body.clone()),
            FuObject::Bytes(bytes) => Ok(bytes.clone()),
            _ => {
                let base = self.path.split('#').next().unwrap_or(&self.path);
                std::fs::read(base).map_err(FuError::from)
            }
        }
    }

    /// Returns a mutable reference to a named array note in metadata,
    /// creating it if necessary.
    fn note_array(&mut self, key: &str) -> &mut Vec<Value> {
        let entry = self
            .metadata
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        entry.as_array_mut().expect("note array missing")
    }

    /// Appends a value to a named array note.
    pub fn push_note(&mut self, key: &str, value: Value) {
        self.note_array(key).push(value);
    }

    /// Captures a non-fatal error under `metadata.errors`.
    pub fn record_error(&mut self, step: &str, err: &FuError) {
        self.push_note(
            "errors",
            json!({"step": step, "kind": err.kind(), "message": err.to_string()}),
        );
    }

    /// Records that dispatch found no applicable handler variant.
    pub fn record_skip(&mut self, handler: &str) {
        let class = self.obj.class_name();
        self.push_note(
            "skipped_handlers",
            json!({"handler": handler, "object": class}),
        );
    }

    /// Whether a degradation artifact replaced this attachment's content.
    pub fn is_error_artifact(&self) -> bool {
        self.metadata.contains_key("error_kind")
    }

    /// Removes any temp files recorded under `metadata.temp_paths`.
    /// Idempotent. Cleanup stays explicit: attachments are `Clone`, so a
    /// drop-time sweep could delete files a sibling clone still reads.
    pub fn cleanup(&mut self) {
        let paths: Vec<String> = self
            .metadata
            .get("temp_paths")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        for path in paths {
            if let Err(err) = std::fs::remove_file(&path) {
                log::warn!("failed to remove temp file {path}: {err}");
            }
        }
        self.metadata.remove("temp_paths");
    }
}

/// Ordered sequence of attachments produced by a SPLIT.
#[derive(Clone, Debug, Default)]
pub struct FuCollection {
    items: Vec<FuAttachment>,
}

impl FuCollection {
    pub fn new(items: Vec<FuAttachment>) -> Self {
        FuCollection { items }
    }

    /// Builds the collection for one split: chunk ids, copied commands,
    /// and the chunk metadata every member must carry.
    pub fn from_split(source: &FuAttachment, kind: &str, chunks: Vec<FuAttachment>) -> Self {
        let total = chunks.len();
        let items = chunks
            .into_iter()
            .enumerate()
            .map(|(idx, mut chunk)| {
                chunk.path = format!("{}#{}-{}", source.path, kind, idx + 1);
                chunk.input = source.input.clone();
                chunk.commands = source.commands.clone();
                chunk
                    .metadata
                    .insert("original_path".into(), Value::String(source.path.clone()));
                chunk.metadata.insert("chunk_index".into(), json!(idx));
                chunk.metadata.insert("total_chunks".into(), json!(total));
                chunk
            })
            .collect();
        FuCollection { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[FuAttachment] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut Vec<FuAttachment> {
        &mut self.items
    }

    pub fn into_items(self) -> Vec<FuAttachment> {
        self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FuAttachment> {
        self.items.iter()
    }

    /// Collapses the collection into one attachment: texts joined with
    /// chunk headers, images flattened, chunk order preserved.
    pub fn fold(&self) -> FuAttachment {
        let mut combined = FuAttachment::default();
        if let Some(first) = self.items.first() {
            combined.input = first.input.clone();
            combined.path = first
                .metadata
                .get("original_path")
                .and_then(Value::as_str)
                .unwrap_or(&first.path)
                .to_string();
            combined.commands = first.commands.clone();
        }
        let mut parts = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if item.text.is_empty() {
                continue;
            }
            parts.push(format!("## {}\n\n{}", item.path, item.text));
        }
        combined.text = parts.join("\n\n");
        for item in &self.items {
            combined.images.extend(item.images.iter().cloned());
        }
        combined
            .metadata
            .insert("folded_chunks".into(), json!(self.items.len()));
        combined
    }
}

impl IntoIterator for FuCollection {
    type Item = FuAttachment;
    type IntoIter = std::vec::IntoIter<FuAttachment>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl std::ops::Index<usize> for FuCollection {
    type Output = FuAttachment;

    fn index(&self, index: usize) -> &FuAttachment {
        &self.items[index]
    }
}

/// Value threaded through a pipeline: one attachment or one collection.
#[derive(Clone, Debug)]
pub enum FuItem {
    One(FuAttachment),
    Many(FuCollection),
}

impl FuItem {
    /// Borrow every attachment in order, single or collection alike.
    pub fn attachments(&self) -> Vec<&FuAttachment> {
        match self {
            FuItem::One(att) => vec![att],
            FuItem::Many(coll) => coll.iter().collect(),
        }
    }

    /// Collapses to a single attachment; collections fold with chunk
    /// headers.
    pub fn fold(self) -> FuAttachment {
        match self {
            FuItem::One(att) => att,
            FuItem::Many(coll) => coll.fold(),
        }
    }

    pub fn is_error_artifact(&self) -> bool {
        match self {
            FuItem::One(att) => att.is_error_artifact(),
            // An empty collection is a valid (if unhelpful) result, not
            // a failure.
            FuItem::Many(coll) => {
                !coll.is_empty() && coll.iter().all(|a| a.is_error_artifact())
            }
        }
    }
}

impl From<FuAttachment> for FuItem {
    fn from(att: FuAttachment) -> Self {
        FuItem::One(att)
    }
}

impl From<FuCollection> for FuItem {
    fn from(coll: FuCollection) -> Self {
        FuItem::Many(coll)
    }
}
