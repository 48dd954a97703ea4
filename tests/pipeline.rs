//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Fu.
//! The Fu project belongs to the Dunimd project team.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;

use fu::attachment::{FuAttachment, FuItem};
use fu::dispatch::{Category, FuParams, TypeDescriptor};
use fu::errors::FuError;
use fu::object::FuObject;
use fu::pipeline::{FuEngine, FuPipeline};
use fu::registry::{FuRegistryBuilder, FuVerb, HandlerRecord};
use fu::verbs::FuStep;

fn text_attachment(body: &str) -> FuAttachment {
    let mut att = FuAttachment::new("mem.txt", "mem.txt", Default::default());
    att.obj = FuObject::Text(body.to_string());
    att
}

fn append_alpha(mut att: FuAttachment, _p: &FuParams) -> fu::Result<FuAttachment> {
    if !att.text.is_empty() {
        att.text.push('\n');
    }
    att.text.push_str("alpha");
    att.images.push("data:image/png;base64,AA==".into());
    Ok(att)
}

fn append_beta(mut att: FuAttachment, _p: &FuParams) -> fu::Result<FuAttachment> {
    if !att.text.is_empty() {
        att.text.push('\n');
    }
    att.text.push_str("beta");
    att.images.push("data:image/png;base64,BB==".into());
    Ok(att)
}

fn failing_modify(_att: FuAttachment, _p: &FuParams) -> fu::Result<FuAttachment> {
    Err(FuError::handler("modify.boom", "intentional failure"))
}

fn loader_boom(_att: FuAttachment) -> fu::Result<FuAttachment> {
    Err(FuError::dependency(
        "load.boom",
        "install nothing; this loader always reports a missing capability",
    ))
}

fn loader_ok(mut att: FuAttachment) -> fu::Result<FuAttachment> {
    att.obj = FuObject::Text("loaded".into());
    att.text = "loaded".into();
    Ok(att)
}

fn builder_with_probes() -> FuRegistryBuilder {
    let mut builder = FuRegistryBuilder::new();
    builder.register(HandlerRecord::present(
        "alpha",
        TypeDescriptor::Any,
        Category::Text,
        &[],
        append_alpha,
    ));
    builder.register(HandlerRecord::present(
        "beta",
        TypeDescriptor::Any,
        Category::Text,
        &[],
        append_beta,
    ));
    builder.register(HandlerRecord::modify(
        "boom",
        TypeDescriptor::Any,
        &[],
        failing_modify,
    ));
    builder.register(HandlerRecord::load("boomload", |_| true, loader_boom));
    builder.register(HandlerRecord::load("okload", |_| true, loader_ok));
    builder
}

fn engine() -> FuEngine {
    FuEngine::new(Arc::new(builder_with_probes().build()))
}

fn step(verb: FuVerb, name: &str) -> FuStep {
    FuStep::new(verb, name)
}

fn one(item: FuItem) -> FuAttachment {
    match item {
        FuItem::One(att) => att,
        FuItem::Many(_) => panic!("expected single attachment"),
    }
}

#[test]
fn sequential_composition_runs_in_textual_order() {
    let pipeline = step(FuVerb::Present, "alpha") >> step(FuVerb::Present, "beta");
    let att = one(engine().run(&pipeline, text_attachment("").into()).unwrap());
    assert_eq!(att.text, "alpha\nbeta");
    assert_eq!(
        att.pipeline_trace,
        vec!["present.alpha".to_string(), "present.beta".to_string()]
    );
}

#[test]
fn additive_presenters_commute_as_multisets() {
    let ab = step(FuVerb::Present, "alpha") + step(FuVerb::Present, "beta");
    let ba = step(FuVerb::Present, "beta") + step(FuVerb::Present, "alpha");

    let att_ab = one(engine().run(&ab, text_attachment("").into()).unwrap());
    let att_ba = one(engine().run(&ba, text_attachment("").into()).unwrap());

    let mut lines_ab: Vec<&str> = att_ab.text.lines().collect();
    let mut lines_ba: Vec<&str> = att_ba.text.lines().collect();
    lines_ab.sort_unstable();
    lines_ba.sort_unstable();
    assert_eq!(lines_ab, lines_ba);

    let mut images_ab = att_ab.images.clone();
    let mut images_ba = att_ba.images.clone();
    images_ab.sort();
    images_ba.sort();
    assert_eq!(images_ab, images_ba);
}

#[test]
fn additive_distributes_over_sequential_on_the_right() {
    let pipeline =
        step(FuVerb::Present, "alpha") >> (step(FuVerb::Present, "alpha") + step(FuVerb::Present, "beta"));
    let att = one(engine().run(&pipeline, text_attachment("").into()).unwrap());
    // alpha, then both branches applied to alpha's result, accumulating.
    assert_eq!(att.text, "alpha\nalpha\nbeta");
}

#[test]
fn handler_failure_is_captured_and_previous_value_flows() {
    let pipeline = step(FuVerb::Present, "alpha") >> step(FuVerb::Modify, "boom");
    let att = one(engine().run(&pipeline, text_attachment("").into()).unwrap());
    assert_eq!(att.text, "alpha");
    let errors = att.metadata.get("errors").unwrap();
    assert_eq!(errors[0]["kind"], json!("HandlerFailure"));
    assert_eq!(errors[0]["step"], json!("modify.boom"));
}

#[test]
fn unknown_handler_records_error_and_passes_through() {
    let pipeline = FuPipeline::step(step(FuVerb::Modify, "no_such"));
    let att = one(engine().run(&pipeline, text_attachment("body").into()).unwrap());
    let errors = att.metadata.get("errors").unwrap();
    assert_eq!(errors[0]["kind"], json!("HandlerFailure"));
}

#[test]
fn fallback_chain_recovers_from_flagged_artifacts() {
    let primary = FuPipeline::step(step(FuVerb::Load, "boomload"));
    let pipeline = primary.with_fallback(FuPipeline::step(step(FuVerb::Load, "okload")));

    let att = one(engine().run(&pipeline, text_attachment("").into()).unwrap());
    assert_eq!(att.text, "loaded");
    assert!(!att.is_error_artifact());
}

#[test]
fn exhausted_fallbacks_return_the_error_artifact() {
    let primary = FuPipeline::step(step(FuVerb::Load, "boomload"));
    let pipeline = primary.with_fallback(FuPipeline::step(step(FuVerb::Load, "boomload")));

    let att = one(engine().run(&pipeline, text_attachment("").into()).unwrap());
    assert!(att.is_error_artifact());
    assert!(att.text.contains("DependencyMissing"));
    assert!(att.text.contains("load.boom"));
}

#[test]
fn cancellation_is_observed_between_steps() {
    let flag = Arc::new(AtomicBool::new(true));
    let engine = FuEngine::new(Arc::new(builder_with_probes().build()))
        .with_cancel_flag(flag.clone());

    let pipeline = step(FuVerb::Present, "alpha") >> step(FuVerb::Present, "beta");
    let att = one(engine.run(&pipeline, text_attachment("body").into()).unwrap());
    // Flag was set before the first step; nothing ran.
    assert!(att.text.is_empty() || att.text == "body");
    assert_eq!(att.metadata.get("cancelled"), Some(&json!(true)));
    assert!(att.pipeline_trace.is_empty());

    flag.store(false, Ordering::Relaxed);
    let att = one(engine.run(&pipeline, text_attachment("").into()).unwrap());
    assert_eq!(att.text, "alpha\nbeta");
}
