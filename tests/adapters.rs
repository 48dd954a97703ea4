//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Fu.
//! The Fu project belongs to the Dunimd project team.

use std::sync::Arc;

use serde_json::json;

use fu::attachment::{FuAttachment, FuCollection, FuItem};
use fu::dispatch::{FuParams, ParamValue};
use fu::pipeline::FuEngine;
use fu::registry::FuRegistryBuilder;

fn engine() -> FuEngine {
    FuEngine::new(Arc::new(FuRegistryBuilder::with_defaults().build()))
}

fn attachment_with(text: &str, images: &[&str]) -> FuAttachment {
    let mut att = FuAttachment::new("doc.txt", "doc.txt", Default::default());
    att.text = text.to_string();
    att.images = images.iter().map(|s| s.to_string()).collect();
    att
}

const PNG_URL: &str = "data:image/png;base64,iVBORw0KGgo=";

#[test]
fn chat_envelope_is_bit_exact() {
    let engine = engine();
    let item = FuItem::One(attachment_with("hello", &[PNG_URL]));
    let envelope = engine.adapt(&item, "chat", "caption?", &FuParams::new()).unwrap();

    assert_eq!(
        envelope,
        json!([{
            "role": "user",
            "content": [
                {"type": "text", "text": "caption?\n\nhello"},
                {"type": "image_url", "image_url": {"url": PNG_URL}},
            ]
        }])
    );
}

#[test]
fn chat_envelope_without_prompt_uses_text_alone() {
    let engine = engine();
    let item = FuItem::One(attachment_with("hello", &[]));
    let envelope = engine.adapt(&item, "chat", "", &FuParams::new()).unwrap();
    assert_eq!(envelope[0]["content"][0]["text"], json!("hello"));
}

#[test]
fn responses_envelope_uses_input_items() {
    let engine = engine();
    let item = FuItem::One(attachment_with("hello", &[PNG_URL]));
    let envelope = engine.adapt(&item, "responses", "", &FuParams::new()).unwrap();

    assert_eq!(
        envelope,
        json!([{
            "role": "user",
            "content": [
                {"type": "input_text", "text": "hello"},
                {"type": "input_image", "image_url": PNG_URL},
            ]
        }])
    );
}

#[test]
fn claude_envelope_decomposes_data_urls() {
    let engine = engine();
    let item = FuItem::One(attachment_with("hello", &[PNG_URL]));
    let envelope = engine.adapt(&item, "claude", "", &FuParams::new()).unwrap();

    assert_eq!(
        envelope,
        json!([{
            "role": "user",
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "image", "source": {
                    "type": "base64",
                    "media_type": "image/png",
                    "data": "iVBORw0KGgo=",
                }},
            ]
        }])
    );
}

#[test]
fn collections_concatenate_with_chunk_headers_and_flatten_images() {
    let engine = engine();
    let mut first = attachment_with("one", &[PNG_URL]);
    first.path = "doc.txt#pages-1".into();
    let mut second = attachment_with("two", &[PNG_URL]);
    second.path = "doc.txt#pages-2".into();

    let item = FuItem::Many(FuCollection::new(vec![first, second]));
    let envelope = engine.adapt(&item, "chat", "", &FuParams::new()).unwrap();

    let text = envelope[0]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("## doc.txt#pages-1\n\none"));
    assert!(text.contains("## doc.txt#pages-2\n\ntwo"));
    let parts = envelope[0]["content"].as_array().unwrap();
    assert_eq!(parts.len(), 3, "one text part plus two images");
}

#[test]
fn dsl_content_filter_drops_images() {
    let engine = engine();
    let mut att = attachment_with("hello", &[PNG_URL]);
    att.commands.insert("images".into(), "false".into());

    let envelope = engine
        .adapt(&FuItem::One(att), "chat", "", &FuParams::new())
        .unwrap();
    let parts = envelope[0]["content"].as_array().unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0]["type"], json!("text"));
}

#[test]
fn call_site_overrides_beat_dsl_commands() {
    let engine = engine();
    // DSL says keep images; the call site disables them.
    let mut att = attachment_with("hello", &[PNG_URL]);
    att.commands.insert("images".into(), "true".into());

    let mut overrides = FuParams::new();
    overrides.insert("images", ParamValue::Bool(false));

    let envelope = engine
        .adapt(&FuItem::One(att), "chat", "", &overrides)
        .unwrap();
    let parts = envelope[0]["content"].as_array().unwrap();
    assert_eq!(parts.len(), 1);
}

#[test]
fn text_filter_keeps_only_the_prompt() {
    let engine = engine();
    let mut att = attachment_with("secret body", &[]);
    att.commands.insert("text".into(), "false".into());

    let envelope = engine
        .adapt(&FuItem::One(att), "chat", "caption?", &FuParams::new())
        .unwrap();
    assert_eq!(envelope[0]["content"][0]["text"], json!("caption?"));
}

#[test]
fn unknown_adapter_is_an_error() {
    let engine = engine();
    let item = FuItem::One(attachment_with("x", &[]));
    assert!(engine.adapt(&item, "nonexistent", "", &FuParams::new()).is_err());
}
