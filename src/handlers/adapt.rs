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

//! ADAPT handlers: provider-specific message envelopes. Every adapter
//! is a reducer — a collection concatenates its chunk texts under
//! chunk headers and flattens its images — and each emits its own wire
//! shape; adapters never call one another.

use serde_json::{json, Value};

use crate::attachment::FuAttachment;
use crate::dispatch::{FuParams, ParamKind, ParamSpec};
use crate::errors::Result;
use crate::registry::{FuRegistryBuilder, HandlerRecord};

/// Content-filter knobs shared by every adapter: `[text:false]` or
/// `[images:false]` in the DSL, or the same keys as call-site
/// overrides, drop that part of the payload. `audio` is reserved for
/// plugin-contributed audio parts and binds like the others.
const ADAPTER_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("text", ParamKind::Bool),
    ParamSpec::new("images", ParamKind::Bool),
    ParamSpec::new("audio", ParamKind::Bool),
];

pub fn register(builder: &mut FuRegistryBuilder) {
    builder.register(HandlerRecord::adapt("chat", ADAPTER_PARAMS, adapt_chat));
    builder.register(HandlerRecord::adapt(
        "responses",
        ADAPTER_PARAMS,
        adapt_responses,
    ));
    builder.register(HandlerRecord::adapt("claude", ADAPTER_PARAMS, adapt_claude));
}

/// Concatenated text and flattened images for one or many attachments.
/// Collections get one `## <chunk path>` header per chunk.
fn assemble(atts: &[&FuAttachment]) -> (String, Vec<String>) {
    let text = if atts.len() == 1 {
        atts[0].text.clone()
    } else {
        atts.iter()
            .filter(|att| !att.text.is_empty())
            .map(|att| format!("## {}\n\n{}", att.path, att.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    let images = atts
        .iter()
        .flat_map(|att| att.images.iter().cloned())
        .collect();
    (text, images)
}

/// Prompt goes first, then the assembled text, separated by one blank
/// line. An empty side drops silently.
fn prompt_text(prompt: &str, assembled: &str) -> String {
    match (prompt.is_empty(), assembled.is_empty()) {
        (true, _) => assembled.to_string(),
        (_, true) => prompt.to_string(),
        _ => format!("{prompt}\n\n{assembled}"),
    }
}

fn filtered(atts: &[&FuAttachment], params: &FuParams, prompt: &str) -> (String, Vec<String>) {
    let (assembled, images) = assemble(atts);
    let text = if params.flag("text") == Some(false) {
        prompt.to_string()
    } else {
        prompt_text(prompt, &assembled)
    };
    let images = if params.flag("images") == Some(false) {
        Vec::new()
    } else {
        images
    };
    (text, images)
}

/// Chat-style envelope: one user message with a content array of
/// `text` and `image_url` parts.
fn adapt_chat(atts: &[&FuAttachment], params: &FuParams, prompt: &str) -> Result<Value> {
    let (text, images) = filtered(atts, params, prompt);
    let mut content = vec![json!({"type": "text", "text": text})];
    for url in images {
        content.push(json!({"type": "image_url", "image_url": {"url": url}}));
    }
    Ok(json!([{"role": "user", "content": content}]))
}

/// Responses-style envelope: `input_text` / `input_image` items.
fn adapt_responses(atts: &[&FuAttachment], params: &FuParams, prompt: &str) -> Result<Value> {
    let (text, images) = filtered(atts, params, prompt);
    let mut content = vec![json!({"type": "input_text", "text": text})];
    for url in images {
        content.push(json!({"type": "input_image", "image_url": url}));
    }
    Ok(json!([{"role": "user", "content": content}]))
}

/// Claude-style envelope: same top-level shape as chat, but images are
/// base64 source blocks.
fn adapt_claude(atts: &[&FuAttachment], params: &FuParams, prompt: &str) -> Result<Value> {
    let (text, images) = filtered(atts, params, prompt);
    let mut content = vec![json!({"type": "text", "text": text})];
    for url in images {
        let (media_type, data) = split_data_url(&url);
        content.push(json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data}
        }));
    }
    Ok(json!([{"role": "user", "content": content}]))
}

/// Splits `data:<mime>;base64,<payload>` into mime and payload.
fn split_data_url(url: &str) -> (String, String) {
    let mime = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .filter(|mime| !mime.is_empty())
        .unwrap_or("image/png")
        .to_string();
    let payload = url.split("base64,").nth(1).unwrap_or("").to_string();
    (mime, payload)
}
