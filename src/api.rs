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

//! # High-level API
//!
//! `FuAttachments` is the 90% surface: one constructor that takes any
//! number of sources, routes each through its primary processor or the
//! universal pipeline, and exposes the combined text, the combined
//! images, and the per-adapter envelope methods. Only the two fatal DSL
//! error kinds ever raise from here; every other failure comes back as
//! an attachment whose text explains the condition.

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::attachment::{FuAttachment, FuCollection, FuItem};
use crate::dispatch::FuParams;
use crate::errors::{FuError, Result};
use crate::pipeline::FuEngine;
use crate::processor::universal_pipeline;
use crate::registry::{FuRegistry, FuRegistryBuilder};
use crate::suggest;

/// Process-wide default registry: bundled handlers, bundled processors,
/// plugins from `FU_PLUGIN_PATH`. Built once, read-only afterwards.
static DEFAULT_REGISTRY: Lazy<Arc<FuRegistry>> = Lazy::new(|| {
    let mut builder = FuRegistryBuilder::with_defaults();
    let loaded = crate::plugin::discover_plugins(&mut builder);
    if loaded > 0 {
        log::info!("loaded {loaded} fu plugin(s)");
    }
    Arc::new(builder.build())
});

/// Shared snapshot of the default registry.
pub fn default_registry() -> Arc<FuRegistry> {
    DEFAULT_REGISTRY.clone()
}

/// A batch of processed attachments.
#[derive(Debug)]
pub struct FuAttachments {
    engine: FuEngine,
    items: Vec<FuAttachment>,
}

impl FuAttachments {
    /// Processes each source with the default engine.
    pub fn new<I, S>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_engine(FuEngine::new(default_registry()), sources)
    }

    /// Processes each source with a caller-built engine (custom
    /// registry or cancellation flag).
    pub fn with_engine<I, S>(engine: FuEngine, sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut items = Vec::new();
        for source in sources {
            let mut att = FuAttachment::from_source(source.as_ref())?;
            warn_unknown_commands(&engine, &mut att);
            let item = process_one(&engine, att)?;
            match item {
                FuItem::One(att) => items.push(att),
                FuItem::Many(coll) => items.extend(coll.into_items()),
            }
        }
        Ok(FuAttachments { engine, items })
    }

    /// Runs one named processor over every source instead of the
    /// automatic selection.
    pub fn with_processor<I, S>(name: &str, sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let engine = FuEngine::new(default_registry());
        let processor = engine
            .registry()
            .processors()
            .iter()
            .find(|processor| processor.name == name)
            .cloned()
            .ok_or_else(|| FuError::handler(name, "unknown processor"))?;

        let mut items = Vec::new();
        for source in sources {
            let mut att = FuAttachment::from_source(source.as_ref())?;
            warn_unknown_commands(&engine, &mut att);
            match engine.run(&processor.pipeline, FuItem::One(att))? {
                FuItem::One(att) => items.push(att),
                FuItem::Many(coll) => items.extend(coll.into_items()),
            }
        }
        Ok(FuAttachments { engine, items })
    }

    pub fn attachments(&self) -> &[FuAttachment] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Combined text of every attachment, joined by blank lines.
    pub fn text(&self) -> String {
        self.items
            .iter()
            .map(|att| att.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Every base64 image, in attachment order.
    pub fn images(&self) -> Vec<String> {
        self.items
            .iter()
            .flat_map(|att| att.images.iter().cloned())
            .collect()
    }

    /// Runs a registered adapter over the combined content.
    pub fn adapt(&self, name: &str, prompt: &str) -> Result<Value> {
        self.adapt_with(name, prompt, &FuParams::new())
    }

    /// Adapter invocation with call-site parameter overrides, which
    /// take precedence over DSL commands and manifest defaults.
    pub fn adapt_with(&self, name: &str, prompt: &str, overrides: &FuParams) -> Result<Value> {
        let item = self.as_item();
        self.engine.adapt(&item, name, prompt, overrides)
    }

    /// Chat-style envelope.
    pub fn chat(&self, prompt: &str) -> Result<Value> {
        self.adapt("chat", prompt)
    }

    /// Responses-style envelope.
    pub fn responses(&self, prompt: &str) -> Result<Value> {
        self.adapt("responses", prompt)
    }

    /// Claude-style envelope.
    pub fn claude(&self, prompt: &str) -> Result<Value> {
        self.adapt("claude", prompt)
    }

    fn as_item(&self) -> FuItem {
        if self.items.len() == 1 {
            FuItem::One(self.items[0].clone())
        } else {
            FuItem::Many(FuCollection::new(self.items.clone()))
        }
    }
}

/// Routes one attachment: first matching primary processor, otherwise
/// the universal pipeline. Processor pipelines carry their own
/// fallbacks, so a mismatched specialization degrades instead of
/// failing.
fn process_one(engine: &FuEngine, att: FuAttachment) -> Result<FuItem> {
    for processor in engine.registry().processors() {
        if processor.primary && processor.matches(&att) {
            return engine.run(&processor.pipeline, FuItem::One(att));
        }
    }
    engine.run(&universal_pipeline(), FuItem::One(att))
}

/// Unknown DSL keys warn but never block: the key may belong to a
/// handler registered later or in another process.
fn warn_unknown_commands(engine: &FuEngine, att: &mut FuAttachment) {
    let known = engine.registry().known_command_keys();
    let keys: Vec<String> = att.commands.keys().cloned().collect();
    for key in keys {
        if known.iter().any(|candidate| candidate == &key) {
            continue;
        }
        let note = match suggest::suggest(&key, known.iter().map(String::as_str)) {
            Some(candidate) => {
                format!("unknown DSL command '{key}'; did you mean '{candidate}'?")
            }
            None => format!("unknown DSL command '{key}'"),
        };
        log::warn!("{note}");
        att.push_note("suggestions", Value::String(note));
    }
}
