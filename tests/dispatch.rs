//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Fu.
//! The Fu project belongs to the Dunimd project team.

use serde_json::json;

use fu::attachment::{FuAttachment, FuItem};
use fu::dispatch::{FuParams, ParamKind, ParamSpec, TypeDescriptor};
use fu::errors::FuError;
use fu::object::{FuObject, FuObjectKind};
use fu::pipeline::FuEngine;
use fu::registry::{FuRegistryBuilder, FuVerb, HandlerRecord};
use fu::verbs::FuStep;

fn text_attachment(body: &str) -> FuAttachment {
    let mut att = FuAttachment::new("mem.txt", "mem.txt", Default::default());
    att.obj = FuObject::Text(body.to_string());
    att
}

fn mark(att: &mut FuAttachment, tag: &str) {
    att.metadata.insert("probe".into(), json!(tag));
}

fn probe_exact(mut att: FuAttachment, _p: &FuParams) -> fu::Result<FuAttachment> {
    mark(&mut att, "exact");
    Ok(att)
}

fn probe_class(mut att: FuAttachment, _p: &FuParams) -> fu::Result<FuAttachment> {
    mark(&mut att, "class");
    Ok(att)
}

fn probe_family(mut att: FuAttachment, _p: &FuParams) -> fu::Result<FuAttachment> {
    mark(&mut att, "family");
    Ok(att)
}

fn probe_regex_a(mut att: FuAttachment, _p: &FuParams) -> fu::Result<FuAttachment> {
    mark(&mut att, "regex-a");
    Ok(att)
}

fn probe_regex_b(mut att: FuAttachment, _p: &FuParams) -> fu::Result<FuAttachment> {
    mark(&mut att, "regex-b");
    Ok(att)
}

fn run_probe(builder: FuRegistryBuilder, att: FuAttachment) -> FuAttachment {
    let engine = FuEngine::new(std::sync::Arc::new(builder.build()));
    let step = FuStep::new(FuVerb::Modify, "probe");
    match engine.run_step(&step, FuItem::One(att)).unwrap() {
        FuItem::One(att) => att,
        FuItem::Many(_) => panic!("modify produced a collection"),
    }
}

#[test]
fn exact_kind_beats_family_regardless_of_registration_order() {
    let mut builder = FuRegistryBuilder::new();
    builder.register(HandlerRecord::modify(
        "probe",
        TypeDescriptor::Family("Document"),
        &[],
        probe_family,
    ));
    builder.register(HandlerRecord::modify(
        "probe",
        TypeDescriptor::Kind(FuObjectKind::Text),
        &[],
        probe_exact,
    ));

    let att = run_probe(builder, text_attachment("hello"));
    assert_eq!(att.metadata.get("probe"), Some(&json!("exact")));
}

#[test]
fn class_name_beats_family_and_regex() {
    let mut builder = FuRegistryBuilder::new();
    builder.register(HandlerRecord::modify(
        "probe",
        TypeDescriptor::regex("Plain.*").unwrap(),
        &[],
        probe_regex_a,
    ));
    builder.register(HandlerRecord::modify(
        "probe",
        TypeDescriptor::Family("Document"),
        &[],
        probe_family,
    ));
    builder.register(HandlerRecord::modify(
        "probe",
        TypeDescriptor::ClassName("PlainText"),
        &[],
        probe_class,
    ));

    let att = run_probe(builder, text_attachment("hello"));
    assert_eq!(att.metadata.get("probe"), Some(&json!("class")));
}

#[test]
fn same_level_ties_break_by_registration_order() {
    let mut builder = FuRegistryBuilder::new();
    builder.register(HandlerRecord::modify(
        "probe",
        TypeDescriptor::regex("Plain.*").unwrap(),
        &[],
        probe_regex_a,
    ));
    builder.register(HandlerRecord::modify(
        "probe",
        TypeDescriptor::regex(".*Text").unwrap(),
        &[],
        probe_regex_b,
    ));

    let att = run_probe(builder, text_attachment("hello"));
    assert_eq!(att.metadata.get("probe"), Some(&json!("regex-a")));
}

#[test]
fn unresolved_dispatch_records_a_note_and_passes_through() {
    let mut builder = FuRegistryBuilder::new();
    builder.register(HandlerRecord::modify(
        "probe",
        TypeDescriptor::Kind(FuObjectKind::Table),
        &[],
        probe_exact,
    ));

    let att = run_probe(builder, text_attachment("hello"));
    assert!(att.metadata.get("probe").is_none());
    let skipped = att.metadata.get("skipped_handlers").unwrap();
    assert_eq!(skipped[0]["handler"], json!("modify.probe"));
    assert_eq!(skipped[0]["object"], json!("PlainText"));
}

// ----------------------------------------------------------------------
// Parameter binding.
// ----------------------------------------------------------------------

const BIND_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("count", ParamKind::Int),
    ParamSpec::with_default("ratio", ParamKind::Float, "0.5"),
    ParamSpec::new("flag", ParamKind::Bool),
    ParamSpec::enumerated("mode", &["fast", "slow"], Some("fast")),
];

fn record_params(mut att: FuAttachment, params: &FuParams) -> fu::Result<FuAttachment> {
    att.metadata.insert(
        "bound".into(),
        json!({
            "count": params.int("count"),
            "ratio": params.float("ratio"),
            "flag": params.flag("flag"),
            "mode": params.str("mode"),
        }),
    );
    Ok(att)
}

fn param_builder() -> FuRegistryBuilder {
    let mut builder = FuRegistryBuilder::new();
    builder.register(HandlerRecord::modify(
        "probe",
        TypeDescriptor::Any,
        BIND_PARAMS,
        record_params,
    ));
    builder
}

#[test]
fn params_coerce_from_commands_with_defaults() {
    let mut att = text_attachment("x");
    att.commands.insert("count".into(), "7".into());
    att.commands.insert("flag".into(), "yes".into());
    att.commands.insert("unrelated".into(), "kept".into());

    let att = run_probe(param_builder(), att);
    let bound = att.metadata.get("bound").unwrap();
    assert_eq!(bound["count"], json!(7));
    assert_eq!(bound["ratio"], json!(0.5));
    assert_eq!(bound["flag"], json!(true));
    assert_eq!(bound["mode"], json!("fast"));
    // Unknown command keys stay on the attachment for later handlers.
    assert_eq!(att.commands.get("unrelated").map(String::as_str), Some("kept"));
}

#[test]
fn bad_int_value_is_fatal() {
    let engine = FuEngine::new(std::sync::Arc::new(param_builder().build()));
    let mut att = text_attachment("x");
    att.commands.insert("count".into(), "many".into());
    let err = engine
        .run_step(&FuStep::new(FuVerb::Modify, "probe"), FuItem::One(att))
        .unwrap_err();
    assert!(matches!(err, FuError::DslValue { .. }));
}

#[test]
fn unknown_enum_value_carries_a_suggestion() {
    let engine = FuEngine::new(std::sync::Arc::new(param_builder().build()));
    let mut att = text_attachment("x");
    att.commands.insert("mode".into(), "fsat".into());
    let err = engine
        .run_step(&FuStep::new(FuVerb::Modify, "probe"), FuItem::One(att))
        .unwrap_err();
    match err {
        FuError::DslValue { key, suggestion, .. } => {
            assert_eq!(key, "mode");
            assert_eq!(suggestion.as_deref(), Some("fast"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
