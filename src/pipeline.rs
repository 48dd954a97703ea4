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

//! # Pipeline Module
//!
//! The composition engine. A `FuPipeline` is a tree of nodes — steps in
//! sequence plus additive groups — with an optional chain of fallback
//! pipelines. `FuEngine` executes a pipeline over a `FuItem` against an
//! immutable registry snapshot: it resolves each step's handler variant
//! by object type, binds DSL parameters from the manifest, lifts
//! non-reducer operations elementwise over collections, captures
//! non-fatal handler errors into metadata, and checks the host
//! cancellation flag between steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::attachment::{FuAttachment, FuCollection, FuItem};
use crate::dispatch::{bind_params, category_enabled, FuParams};
use crate::errors::{FuError, Result};
use crate::registry::{FuRegistry, FuVerb, HandlerBody};
use crate::verbs::FuStep;

/// One node of a pipeline tree.
#[derive(Clone, Debug)]
pub enum FuNode {
    /// A single verb step.
    Step(FuStep),
    /// An additive group: every branch runs against the running item,
    /// and branches accumulate by appending rather than replacing.
    Additive(Vec<FuPipeline>),
}

/// A composed pipeline plus its fallback chain.
#[derive(Clone, Debug, Default)]
pub struct FuPipeline {
    pub nodes: Vec<FuNode>,
    pub fallbacks: Vec<FuPipeline>,
}

impl FuPipeline {
    pub fn new(nodes: Vec<FuNode>) -> Self {
        FuPipeline {
            nodes,
            fallbacks: Vec::new(),
        }
    }

    /// Pipeline of a single step.
    pub fn step(step: FuStep) -> Self {
        FuPipeline::new(vec![FuNode::Step(step)])
    }

    /// Appends a fallback tried when this pipeline fails or yields an
    /// error artifact. Fallbacks run against the original input, in
    /// declared order.
    pub fn with_fallback(mut self, fallback: FuPipeline) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    /// Appends a step in sequence.
    pub fn then(mut self, step: FuStep) -> Self {
        self.nodes.push(FuNode::Step(step));
        self
    }
}

/// Executes pipelines against an immutable registry snapshot.
///
/// The engine is single-threaded and synchronous; the only shared state
/// is the read-only registry, so engines are cheap to clone across
/// threads if the host wants one attachment per worker. Policy knobs
/// (truncation budget, repository byte budget) live in the handler
/// manifests and the DSL, not here.
#[derive(Clone, Debug)]
pub struct FuEngine {
    registry: Arc<FuRegistry>,
    cancel: Option<Arc<AtomicBool>>,
}

impl FuEngine {
    pub fn new(registry: Arc<FuRegistry>) -> Self {
        FuEngine {
            registry,
            cancel: None,
        }
    }

    /// Installs a host cancellation flag, inspected between steps.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn registry(&self) -> &FuRegistry {
        &self.registry
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Runs a pipeline. Fatal DSL errors propagate; every other failure
    /// either degrades in place or, after the fallback chain is
    /// exhausted, comes back as an error artifact.
    pub fn run(&self, pipeline: &FuPipeline, item: FuItem) -> Result<FuItem> {
        let mut attempt = self.run_nodes(&pipeline.nodes, item.clone());
        match &attempt {
            Ok(result) if !pipeline_failed(result) => return attempt,
            Err(err) if err.is_fatal() => return attempt,
            _ => {}
        }

        for fallback in &pipeline.fallbacks {
            let next = self.run(fallback, item.clone());
            match &next {
                Ok(result) if !pipeline_failed(result) => return next,
                Err(err) if err.is_fatal() => return next,
                _ => attempt = next,
            }
        }

        // All alternatives exhausted: surface an artifact, not an Err.
        match attempt {
            Ok(result) => Ok(result),
            Err(err) => Ok(error_artifact(&item, &err)),
        }
    }

    fn run_nodes(&self, nodes: &[FuNode], mut item: FuItem) -> Result<FuItem> {
        for node in nodes {
            if self.cancelled() {
                return Ok(mark_cancelled(item));
            }
            item = match node {
                FuNode::Step(step) => self.run_step(step, item)?,
                FuNode::Additive(branches) => {
                    let mut current = item;
                    for branch in branches {
                        current = self.run(branch, current)?;
                    }
                    current
                }
            };
        }
        Ok(item)
    }

    /// Executes one step, lifting elementwise over collections unless
    /// the resolved handler is a reducer.
    pub fn run_step(&self, step: &FuStep, item: FuItem) -> Result<FuItem> {
        match (step.verb, step.name.as_str()) {
            (FuVerb::Load, "auto") => return self.load_auto(item),
            (FuVerb::Modify, "auto") => return self.modify_auto(item),
            (FuVerb::Present, "auto") => return self.present_auto(item),
            (FuVerb::Refine, "auto") => return self.refine_auto(item),
            _ => {}
        }

        match step.verb {
            FuVerb::Load => self.each(item, |att| self.run_loader(&step.name, att)),
            FuVerb::Modify | FuVerb::Present => {
                self.each(item, |att| self.run_dispatched(step, att))
            }
            FuVerb::Split => self.run_split(&step.name, item),
            FuVerb::Refine => self.run_refine(&step.name, item),
            FuVerb::Adapt => self.run_adapt_step(&step.name, item),
        }
    }

    /// Elementwise application preserving chunk order; single
    /// attachments pass straight through.
    fn each<F>(&self, item: FuItem, mut f: F) -> Result<FuItem>
    where
        F: FnMut(FuAttachment) -> Result<FuAttachment>,
    {
        match item {
            FuItem::One(att) => Ok(FuItem::One(f(att)?)),
            FuItem::Many(coll) => {
                let mut out = Vec::with_capacity(coll.len());
                for att in coll {
                    out.push(f(att)?);
                }
                Ok(FuItem::Many(FuCollection::new(out)))
            }
        }
    }

    /// Invokes a loader by name with per-step error capture.
    fn run_loader(&self, name: &str, att: FuAttachment) -> Result<FuAttachment> {
        let step_name = format!("load.{name}");
        let Some(record) = self.registry.loader(name) else {
            let mut att = att;
            att.record_error(&step_name, &FuError::handler(name, "unknown loader"));
            return Ok(att);
        };
        let HandlerBody::Load(f) = record.body else {
            return Err(FuError::internal("loader record with non-loader body"));
        };
        let before = att.clone();
        match f(att) {
            Ok(mut loaded) => {
                loaded.pipeline_trace.push(step_name);
                Ok(loaded)
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                let mut att = before;
                att.record_error(&step_name, &err);
                if matches!(err, FuError::DependencyMissing { .. } | FuError::SizeBudget { .. }) {
                    degrade_in_place(&mut att, &err);
                }
                Ok(att)
            }
        }
    }

    /// Invokes a dispatching handler (modify/present) resolved against
    /// the attachment's object type.
    fn run_dispatched(&self, step: &FuStep, mut att: FuAttachment) -> Result<FuAttachment> {
        let step_name = format!("{}.{}", step.verb.as_str(), step.name);
        if !self.registry.has_name(step.verb, &step.name) {
            att.record_error(&step_name, &FuError::handler(&step.name, "unknown handler"));
            return Ok(att);
        }
        let Some(record) = self.registry.resolve(step.verb, &step.name, &att.obj) else {
            att.record_skip(&step_name);
            return Ok(att);
        };
        if let Some(category) = record.category {
            if !category_enabled(category, &att.commands) {
                return Ok(att);
            }
        }
        let params = bind_params(&record.params, &att.commands)?;
        let before = att.clone();
        let outcome = match record.body {
            HandlerBody::Modify(f) => f(att, &params),
            HandlerBody::Present(f) => f(att, &params),
            _ => return Err(FuError::internal("mismatched handler body")),
        };
        match outcome {
            Ok(mut next) => {
                next.pipeline_trace.push(step_name);
                Ok(next)
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                let mut att = before;
                att.record_error(&step_name, &err);
                Ok(att)
            }
        }
    }

    /// Splits each attachment and flattens the chunks into one ordered
    /// collection.
    fn run_split(&self, name: &str, item: FuItem) -> Result<FuItem> {
        let step_name = format!("split.{name}");
        let sources = match item {
            FuItem::One(att) => vec![att],
            FuItem::Many(coll) => coll.into_items(),
        };
        let mut out: Vec<FuAttachment> = Vec::new();
        for mut att in sources {
            if !self.registry.has_name(FuVerb::Split, name) {
                att.record_error(&step_name, &FuError::handler(name, "unknown splitter"));
                out.push(att);
                continue;
            }
            let Some(record) = self.registry.resolve(FuVerb::Split, name, &att.obj) else {
                att.record_skip(&step_name);
                out.push(att);
                continue;
            };
            let HandlerBody::Split(f) = record.body else {
                return Err(FuError::internal("mismatched handler body"));
            };
            let params = bind_params(&record.params, &att.commands)?;
            let before = att.clone();
            match f(att, &params) {
                Ok(chunks) => {
                    let mut coll = FuCollection::from_split(&before, name, chunks);
                    for chunk in coll.items_mut() {
                        chunk.pipeline_trace = before.pipeline_trace.clone();
                        chunk.pipeline_trace.push(step_name.clone());
                    }
                    out.extend(coll.into_items());
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    let mut att = before;
                    att.record_error(&step_name, &err);
                    out.push(att);
                }
            }
        }
        Ok(FuItem::Many(FuCollection::new(out)))
    }

    /// Runs a refiner: reducers see the whole item once, everything
    /// else lifts elementwise.
    fn run_refine(&self, name: &str, item: FuItem) -> Result<FuItem> {
        let step_name = format!("refine.{name}");
        let Some(record) = self.registry.refiner(name) else {
            return self.each(item, |mut att| {
                att.record_error(&step_name, &FuError::handler(name, "unknown refiner"));
                Ok(att)
            });
        };
        let HandlerBody::Refine(f) = record.body else {
            return Err(FuError::internal("mismatched handler body"));
        };
        if record.is_reducer {
            let params = match &item {
                FuItem::One(att) => bind_params(&record.params, &att.commands)?,
                FuItem::Many(coll) => match coll.items().first() {
                    Some(att) => bind_params(&record.params, &att.commands)?,
                    None => FuParams::new(),
                },
            };
            let before = item.clone();
            return match f(item, &params) {
                Ok(mut next) => {
                    if let FuItem::One(att) = &mut next {
                        att.pipeline_trace.push(step_name);
                    }
                    Ok(next)
                }
                Err(err) if err.is_fatal() => Err(err),
                Err(err) => {
                    let mut recovered = before;
                    match &mut recovered {
                        FuItem::One(att) => att.record_error(&step_name, &err),
                        FuItem::Many(coll) => {
                            for att in coll.items_mut() {
                                att.record_error(&step_name, &err);
                            }
                        }
                    }
                    Ok(recovered)
                }
            };
        }
        let params_record = record.clone();
        self.each(item, move |att| {
            let params = bind_params(&params_record.params, &att.commands)?;
            let before = att.clone();
            match f(FuItem::One(att), &params) {
                Ok(FuItem::One(mut next)) => {
                    next.pipeline_trace.push(step_name.clone());
                    Ok(next)
                }
                Ok(FuItem::Many(_)) => Err(FuError::internal(
                    "non-reducer refiner returned a collection",
                )),
                Err(err) if err.is_fatal() => Err(err),
                Err(err) => {
                    let mut att = before;
                    att.record_error(&step_name.clone(), &err);
                    Ok(att)
                }
            }
        })
    }

    /// An ADAPT step inside a pipeline stores its envelope under
    /// `metadata.envelope`; the high-level API calls `adapt` directly.
    fn run_adapt_step(&self, name: &str, item: FuItem) -> Result<FuItem> {
        let envelope = self.adapt(&item, name, "", &FuParams::new())?;
        let mut att = item.fold();
        att.metadata.insert("envelope".into(), envelope);
        att.pipeline_trace.push(format!("adapt.{name}"));
        Ok(FuItem::One(att))
    }

    /// Invokes an adapter. Precedence: call-site overrides beat DSL
    /// commands, which beat manifest defaults.
    pub fn adapt(
        &self,
        item: &FuItem,
        name: &str,
        prompt: &str,
        overrides: &FuParams,
    ) -> Result<Value> {
        let Some(record) = self.registry.adapter(name) else {
            return Err(FuError::handler(name, "unknown adapter"));
        };
        let HandlerBody::Adapt(f) = record.body else {
            return Err(FuError::internal("mismatched handler body"));
        };
        let atts = item.attachments();
        let mut params = match atts.first() {
            Some(att) => bind_params(&record.params, &att.commands)?,
            None => FuParams::new(),
        };
        merge_params(&mut params, overrides);
        f(&atts, &params, prompt)
    }

    // ------------------------------------------------------------------
    // Auto steps: the universal pipeline's smart stages.
    // ------------------------------------------------------------------

    /// Loader preference chain: URL download and morph first, then the
    /// registered loaders in order, with capability failures degrading
    /// into explanatory artifacts instead of aborting.
    fn load_auto(&self, item: FuItem) -> Result<FuItem> {
        self.each(item, |att| self.load_one(att))
    }

    fn load_one(&self, mut att: FuAttachment) -> Result<FuAttachment> {
        if att.path.starts_with("http://") || att.path.starts_with("https://") {
            att = self.run_loader("url", att)?;
            if !att.obj.is_none() {
                att = self.run_dispatched(
                    &FuStep::new(FuVerb::Modify, "morph"),
                    att,
                )?;
            }
        }

        if !att.obj.is_none() && !matches!(att.obj, crate::object::FuObject::Response(_)) {
            return Ok(att);
        }

        for record in self.registry.loaders() {
            if record.name == "url" {
                continue;
            }
            let Some(matcher) = record.matcher else {
                continue;
            };
            if !matcher(&att) {
                continue;
            }
            att = self.run_loader(&record.name, att)?;
            if !att.obj.is_none() && !matches!(att.obj, crate::object::FuObject::Response(_)) {
                return Ok(att);
            }
        }

        if att.obj.is_none() || matches!(att.obj, crate::object::FuObject::Response(_)) {
            if !att.is_error_artifact() {
                let err = FuError::LoaderUnavailable {
                    path: att.path.clone(),
                };
                att.record_error("load.auto", &err);
                degrade_in_place(&mut att, &err);
            }
        }
        Ok(att)
    }

    /// DSL-driven modifier pass: a modifier participates iff its name
    /// appears as a command key and its descriptor matches the object.
    fn modify_auto(&self, item: FuItem) -> Result<FuItem> {
        let names: Vec<String> = self
            .registry
            .modifier_names()
            .map(str::to_string)
            .collect();
        self.each(item, |mut att| {
            for name in &names {
                if !att.commands.contains_key(name.as_str()) {
                    continue;
                }
                att = self.run_dispatched(&FuStep::new(FuVerb::Modify, name.clone()), att)?;
            }
            Ok(att)
        })
    }

    /// Category-aware additive present: the first matching presenter of
    /// each category runs, honoring `[text:false]` / `[images:false]` /
    /// `[metadata:false]`.
    fn present_auto(&self, item: FuItem) -> Result<FuItem> {
        let names: Vec<String> = self
            .registry
            .presenter_names()
            .map(str::to_string)
            .collect();
        self.each(item, |mut att| {
            let mut seen: Vec<crate::dispatch::Category> = Vec::new();
            for name in &names {
                let Some(record) = self.registry.resolve(FuVerb::Present, name, &att.obj) else {
                    continue;
                };
                let Some(category) = record.category else {
                    continue;
                };
                if seen.contains(&category) {
                    continue;
                }
                if !category_enabled(category, &att.commands) {
                    continue;
                }
                seen.push(category);
                att = self.run_dispatched(&FuStep::new(FuVerb::Present, name.clone()), att)?;
            }
            Ok(att)
        })
    }

    /// Finishing refiners: optional tiling, header decoration, optional
    /// truncation — each only when its command or content calls for it.
    fn refine_auto(&self, item: FuItem) -> Result<FuItem> {
        let mut item = item;
        let wants = |item: &FuItem, key: &str| {
            item.attachments()
                .first()
                .map(|att| att.commands.contains_key(key))
                .unwrap_or(false)
        };
        if wants(&item, "tile") {
            item = self.run_refine("tile_images", item)?;
        }
        item = self.run_refine("add_headers", item)?;
        if wants(&item, "truncate") {
            item = self.run_refine("truncate", item)?;
        }
        Ok(item)
    }
}

/// A pipeline outcome that warrants trying the fallback chain: a
/// flagged error artifact, or an attachment that captured errors and
/// still carries no object and no content.
fn pipeline_failed(item: &FuItem) -> bool {
    fn failed(att: &FuAttachment) -> bool {
        att.is_error_artifact()
            || (att.obj.is_none()
                && att.text.is_empty()
                && att.images.is_empty()
                && att.metadata.contains_key("errors"))
    }
    match item {
        FuItem::One(att) => failed(att),
        FuItem::Many(coll) => !coll.is_empty() && coll.iter().all(failed),
    }
}

fn merge_params(base: &mut FuParams, overrides: &FuParams) {
    for (name, value) in overrides.entries() {
        base.insert(name.clone(), value.clone());
    }
}

fn mark_cancelled(item: FuItem) -> FuItem {
    match item {
        FuItem::One(mut att) => {
            att.metadata.insert("cancelled".into(), Value::Bool(true));
            FuItem::One(att)
        }
        FuItem::Many(mut coll) => {
            for att in coll.items_mut() {
                att.metadata.insert("cancelled".into(), Value::Bool(true));
            }
            FuItem::Many(coll)
        }
    }
}

/// Rewrites an attachment into a content-carrying degradation artifact.
/// The artifact text always contains the classification keyword so the
/// condition stays visible to the model consuming it.
pub fn degrade_in_place(att: &mut FuAttachment, err: &FuError) {
    let kind = err.kind();
    att.metadata
        .insert("error_kind".into(), Value::String(kind.to_string()));
    let explanation = match err {
        FuError::DependencyMissing { handler, hint } => format!(
            "# Could not process: {}\n\n[{kind}] The '{handler}' handler is unavailable. {hint}\n",
            att.display_name(),
        ),
        FuError::SizeBudget { found, budget } => format!(
            "# Skipped: {}\n\n[{kind}] Discovered {found} bytes, over the {budget}-byte budget. \
             Pass [force:true] to process anyway.\n",
            att.display_name(),
        ),
        FuError::LoaderUnavailable { path } => format!(
            "# Could not load: {}\n\n[{kind}] No loader matched '{path}' and the text fallback \
             could not read it.\n",
            att.display_name(),
        ),
        other => format!(
            "# Processing issue: {}\n\n[{kind}] {other}\n",
            att.display_name(),
        ),
    };
    if !att.text.is_empty() && !att.text.ends_with('\n') {
        att.text.push('\n');
    }
    att.text.push_str(&explanation);
}

/// Builds a standalone error artifact from an input item and the error
/// that exhausted its pipeline.
pub fn error_artifact(item: &FuItem, err: &FuError) -> FuItem {
    let mut att = match item {
        FuItem::One(att) => att.clone(),
        FuItem::Many(coll) => coll.fold(),
    };
    att.record_error("pipeline", err);
    degrade_in_place(&mut att, err);
    FuItem::One(att)
}
