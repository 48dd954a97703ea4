//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Fu.
//! The Fu project belongs to the Dunimd project team.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use fu::attachment::{FuAttachment, FuCollection, FuItem};
use fu::dispatch::{Category, FuParams, TypeDescriptor};
use fu::object::FuObject;
use fu::pipeline::FuEngine;
use fu::registry::{FuRegistryBuilder, FuVerb, HandlerRecord};
use fu::verbs::{load, present, split, FuStep};

fn text_attachment(path: &str, body: &str) -> FuAttachment {
    let mut att = FuAttachment::new(path, path, Default::default());
    att.obj = FuObject::Text(body.to_string());
    att
}

static REDUCER_CALLS: AtomicUsize = AtomicUsize::new(0);

fn counting_reducer(item: FuItem, _p: &FuParams) -> fu::Result<FuItem> {
    REDUCER_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(FuItem::One(item.fold()))
}

fn stamp_presenter(mut att: FuAttachment, _p: &FuParams) -> fu::Result<FuAttachment> {
    let stamped = format!("[{}]", att.text);
    att.text = stamped;
    Ok(att)
}

fn engine_with_probes() -> FuEngine {
    let mut builder = FuRegistryBuilder::with_defaults();
    builder.register(HandlerRecord::refine("tally", &[], counting_reducer).reducer());
    builder.register(HandlerRecord::present(
        "stamp",
        TypeDescriptor::Any,
        Category::Text,
        &[],
        stamp_presenter,
    ));
    FuEngine::new(Arc::new(builder.build()))
}

#[test]
fn split_stamps_chunk_ids_commands_and_metadata() {
    let engine = engine_with_probes();
    let mut att = text_attachment("doc.txt", "A\n\nB\n\nC");
    att.commands.insert("tokens".into(), "100".into());

    let result = engine
        .run_step(&split::paragraphs(), FuItem::One(att))
        .unwrap();
    let FuItem::Many(coll) = result else {
        panic!("split must produce a collection");
    };
    assert_eq!(coll.len(), 3);

    for (idx, chunk) in coll.iter().enumerate() {
        assert_eq!(chunk.path, format!("doc.txt#paragraphs-{}", idx + 1));
        assert_eq!(chunk.metadata.get("original_path"), Some(&json!("doc.txt")));
        assert_eq!(chunk.metadata.get("chunk_index"), Some(&json!(idx)));
        assert_eq!(chunk.metadata.get("total_chunks"), Some(&json!(3)));
        // Commands are copied by value into each chunk.
        assert_eq!(chunk.commands.get("tokens").map(String::as_str), Some("100"));
    }
    let texts: Vec<&str> = coll.iter().map(|chunk| chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["A", "B", "C"]);
}

#[test]
fn elementwise_lift_preserves_chunk_order() {
    let engine = engine_with_probes();
    let att = text_attachment("doc.txt", "A\n\nB\n\nC");

    let split_out = engine
        .run_step(&split::paragraphs(), FuItem::One(att))
        .unwrap();
    let lifted = engine
        .run_step(&FuStep::new(FuVerb::Present, "stamp"), split_out)
        .unwrap();

    let FuItem::Many(coll) = lifted else {
        panic!("non-reducer over a collection must stay a collection");
    };
    let texts: Vec<&str> = coll.iter().map(|chunk| chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["[A]", "[B]", "[C]"]);
    for (idx, chunk) in coll.iter().enumerate() {
        assert_eq!(chunk.metadata.get("chunk_index"), Some(&json!(idx)));
    }
}

#[test]
fn vectorization_law_holds_for_stamping() {
    let engine = engine_with_probes();

    // Pipeline path: split then elementwise op, folded.
    let item = FuItem::One(text_attachment("doc.txt", "A\n\nB"));
    let via_pipeline = engine
        .run_step(&split::paragraphs(), item)
        .and_then(|coll| engine.run_step(&FuStep::new(FuVerb::Present, "stamp"), coll))
        .unwrap()
        .fold();

    // Manual path: split, map by hand, fold.
    let manual_chunks: Vec<FuAttachment> = {
        let item = FuItem::One(text_attachment("doc.txt", "A\n\nB"));
        let FuItem::Many(coll) = engine.run_step(&split::paragraphs(), item).unwrap() else {
            panic!("expected collection");
        };
        coll.into_items()
            .into_iter()
            .map(|mut chunk| {
                chunk.text = format!("[{}]", chunk.text);
                chunk
            })
            .collect()
    };
    let manual = FuItem::Many(FuCollection::new(manual_chunks)).fold();

    assert_eq!(via_pipeline.text, manual.text);
}

#[test]
fn reducers_see_the_whole_collection_exactly_once() {
    let engine = engine_with_probes();
    let coll = FuCollection::new(vec![
        text_attachment("a.txt", "one"),
        text_attachment("b.txt", "two"),
        text_attachment("c.txt", "three"),
    ]);

    REDUCER_CALLS.store(0, Ordering::SeqCst);
    let result = engine
        .run_step(&FuStep::new(FuVerb::Refine, "tally"), FuItem::Many(coll))
        .unwrap();

    assert_eq!(REDUCER_CALLS.load(Ordering::SeqCst), 1);
    assert!(matches!(result, FuItem::One(_)));
}

#[test]
fn members_that_split_to_nothing_are_dropped() {
    let engine = engine_with_probes();
    let coll = FuCollection::new(vec![
        text_attachment("a.txt", "A\n\nB"),
        text_attachment("empty.txt", "   "),
    ]);

    let FuItem::Many(out) = engine
        .run_step(&split::paragraphs(), FuItem::Many(coll))
        .unwrap()
    else {
        panic!("expected collection");
    };
    let texts: Vec<&str> = out.iter().map(|chunk| chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["A", "B"]);
}

#[test]
fn fold_concatenates_with_chunk_headers_and_flattens_images() {
    let mut first = text_attachment("doc.txt#pages-1", "one");
    first.text = "one".into();
    first.images.push("data:image/png;base64,AA==".into());
    first
        .metadata
        .insert("original_path".into(), json!("doc.txt"));
    let mut second = text_attachment("doc.txt#pages-2", "two");
    second.text = "two".into();
    second.images.push("data:image/png;base64,BB==".into());

    let folded = FuCollection::new(vec![first, second]).fold();
    assert!(folded.text.contains("## doc.txt#pages-1"));
    assert!(folded.text.contains("one"));
    assert!(folded.text.contains("## doc.txt#pages-2"));
    assert_eq!(folded.images.len(), 2);
    assert_eq!(folded.path, "doc.txt");
}

#[test]
fn splitting_a_collection_flattens_in_order() {
    let engine = engine_with_probes();
    let coll = FuCollection::new(vec![
        text_attachment("a.txt", "A1\n\nA2"),
        text_attachment("b.txt", "B1"),
    ]);

    let FuItem::Many(out) = engine
        .run_step(&split::paragraphs(), FuItem::Many(coll))
        .unwrap()
    else {
        panic!("expected collection");
    };
    let paths: Vec<&str> = out.iter().map(|chunk| chunk.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["a.txt#paragraphs-1", "a.txt#paragraphs-2", "b.txt#paragraphs-1"]
    );
}

#[test]
fn composed_load_split_present_pipeline_chunks_a_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.txt");
    std::fs::write(&path, "A\n\nB\n\nC").unwrap();

    let engine = engine_with_probes();
    let pipeline = load::text() >> split::paragraphs() >> present::markdown();
    let att = FuAttachment::new(
        path.display().to_string(),
        path.display().to_string(),
        Default::default(),
    );

    let FuItem::Many(coll) = engine.run(&pipeline, FuItem::One(att)).unwrap() else {
        panic!("expected collection");
    };
    assert_eq!(coll.len(), 3);
    let texts: Vec<&str> = coll.iter().map(|chunk| chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["A", "B", "C"]);
    for (idx, chunk) in coll.iter().enumerate() {
        assert_eq!(chunk.metadata.get("chunk_index"), Some(&json!(idx)));
        assert_eq!(chunk.metadata.get("total_chunks"), Some(&json!(3)));
    }
}

#[test]
fn presenters_are_importable_as_namespace_steps() {
    // Namespace constructors are plain values; composition is tested in
    // the pipeline suite. This pins the public surface.
    let markdown = present::markdown();
    assert_eq!(markdown.name, "markdown");
    assert_eq!(markdown.verb, FuVerb::Present);
}
