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

//! # Registry Module
//!
//! Six keyed handler tables plus the processor table, built once by
//! `FuRegistryBuilder` and immutable afterwards. A modifier, splitter or
//! presenter name may hold several records distinguished by dispatch
//! descriptor; loaders, refiners and adapters hold exactly one record
//! per name. Registration order is preserved everywhere because it
//! breaks dispatch ties and drives loader preference.

use indexmap::IndexMap;
use serde_json::Value;

use crate::attachment::{FuAttachment, FuItem};
use crate::dispatch::{Category, FuParams, ParamSpec, TypeDescriptor, DISPATCH_LEVELS};
use crate::errors::Result;
use crate::object::FuObject;
use crate::processor::FuProcessor;

/// The six verb kinds of the pipeline algebra.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FuVerb {
    Load,
    Modify,
    Split,
    Present,
    Refine,
    Adapt,
}

impl FuVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuVerb::Load => "load",
            FuVerb::Modify => "modify",
            FuVerb::Split => "split",
            FuVerb::Present => "present",
            FuVerb::Refine => "refine",
            FuVerb::Adapt => "adapt",
        }
    }
}

/// Loader selection predicate; runs before any object exists.
pub type MatchFn = fn(&FuAttachment) -> bool;
/// LOAD: populate `obj` (or return a degradation artifact).
pub type LoadFn = fn(FuAttachment) -> Result<FuAttachment>;
/// MODIFY: transform `obj` in place, same kind out.
pub type ModifyFn = fn(FuAttachment, &FuParams) -> Result<FuAttachment>;
/// SPLIT: break one attachment into ordered chunks.
pub type SplitFn = fn(FuAttachment, &FuParams) -> Result<Vec<FuAttachment>>;
/// PRESENT: append to text/images/metadata; never overwrite.
pub type PresentFn = fn(FuAttachment, &FuParams) -> Result<FuAttachment>;
/// REFINE: post-process an item; reducers see whole collections.
pub type RefineFn = fn(FuItem, &FuParams) -> Result<FuItem>;
/// ADAPT: emit a provider envelope from one or many attachments.
pub type AdaptFn = fn(&[&FuAttachment], &FuParams, &str) -> Result<Value>;

/// The callable part of a handler registration.
#[derive(Clone, Copy, Debug)]
pub enum HandlerBody {
    Load(LoadFn),
    Modify(ModifyFn),
    Split(SplitFn),
    Present(PresentFn),
    Refine(RefineFn),
    Adapt(AdaptFn),
}

/// One registered handler.
#[derive(Clone, Debug)]
pub struct HandlerRecord {
    pub kind: FuVerb,
    pub name: String,
    /// Loader predicate; absent for every other verb.
    pub matcher: Option<MatchFn>,
    /// Declared object-type descriptor (MODIFY/SPLIT/PRESENT).
    pub dispatch: Option<TypeDescriptor>,
    /// Presenter sub-kind for content-filter commands.
    pub category: Option<Category>,
    /// Declared DSL-consumable parameters.
    pub params: Vec<ParamSpec>,
    /// Explicit reducer flag; never inferred from the name.
    pub is_reducer: bool,
    pub body: HandlerBody,
}

impl HandlerRecord {
    pub fn load(name: impl Into<String>, matcher: MatchFn, f: LoadFn) -> Self {
        HandlerRecord {
            kind: FuVerb::Load,
            name: name.into(),
            matcher: Some(matcher),
            dispatch: None,
            category: None,
            params: Vec::new(),
            is_reducer: false,
            body: HandlerBody::Load(f),
        }
    }

    pub fn modify(
        name: impl Into<String>,
        dispatch: TypeDescriptor,
        params: &[ParamSpec],
        f: ModifyFn,
    ) -> Self {
        HandlerRecord {
            kind: FuVerb::Modify,
            name: name.into(),
            matcher: None,
            dispatch: Some(dispatch),
            category: None,
            params: params.to_vec(),
            is_reducer: false,
            body: HandlerBody::Modify(f),
        }
    }

    pub fn split(
        name: impl Into<String>,
        dispatch: TypeDescriptor,
        params: &[ParamSpec],
        f: SplitFn,
    ) -> Self {
        HandlerRecord {
            kind: FuVerb::Split,
            name: name.into(),
            matcher: None,
            dispatch: Some(dispatch),
            category: None,
            params: params.to_vec(),
            is_reducer: false,
            body: HandlerBody::Split(f),
        }
    }

    pub fn present(
        name: impl Into<String>,
        dispatch: TypeDescriptor,
        category: Category,
        params: &[ParamSpec],
        f: PresentFn,
    ) -> Self {
        HandlerRecord {
            kind: FuVerb::Present,
            name: name.into(),
            matcher: None,
            dispatch: Some(dispatch),
            category: Some(category),
            params: params.to_vec(),
            is_reducer: false,
            body: HandlerBody::Present(f),
        }
    }

    pub fn refine(name: impl Into<String>, params: &[ParamSpec], f: RefineFn) -> Self {
        HandlerRecord {
            kind: FuVerb::Refine,
            name: name.into(),
            matcher: None,
            dispatch: None,
            category: None,
            params: params.to_vec(),
            is_reducer: false,
            body: HandlerBody::Refine(f),
        }
    }

    pub fn adapt(name: impl Into<String>, params: &[ParamSpec], f: AdaptFn) -> Self {
        HandlerRecord {
            kind: FuVerb::Adapt,
            name: name.into(),
            matcher: None,
            dispatch: None,
            category: None,
            params: params.to_vec(),
            // Adapters always consume the collection as a whole.
            is_reducer: true,
            body: HandlerBody::Adapt(f),
        }
    }

    pub fn reducer(mut self) -> Self {
        self.is_reducer = true;
        self
    }
}

/// Immutable handler registry shared by engines.
#[derive(Debug, Default)]
pub struct FuRegistry {
    loaders: IndexMap<String, HandlerRecord>,
    modifiers: IndexMap<String, Vec<HandlerRecord>>,
    splitters: IndexMap<String, Vec<HandlerRecord>>,
    presenters: IndexMap<String, Vec<HandlerRecord>>,
    refiners: IndexMap<String, HandlerRecord>,
    adapters: IndexMap<String, HandlerRecord>,
    processors: Vec<FuProcessor>,
    /// Plugin libraries stay loaded for as long as their handlers are
    /// registered.
    plugins: Vec<libloading::Library>,
}

impl FuRegistry {
    /// Loaders in registration (preference) order.
    pub fn loaders(&self) -> impl Iterator<Item = &HandlerRecord> {
        self.loaders.values()
    }

    pub fn loader(&self, name: &str) -> Option<&HandlerRecord> {
        self.loaders.get(name)
    }

    pub fn refiner(&self, name: &str) -> Option<&HandlerRecord> {
        self.refiners.get(name)
    }

    pub fn refiners(&self) -> impl Iterator<Item = &HandlerRecord> {
        self.refiners.values()
    }

    pub fn adapter(&self, name: &str) -> Option<&HandlerRecord> {
        self.adapters.get(name)
    }

    pub fn adapter_names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn processors(&self) -> &[FuProcessor] {
        &self.processors
    }

    pub fn modifier_names(&self) -> impl Iterator<Item = &str> {
        self.modifiers.keys().map(String::as_str)
    }

    pub fn presenter_variants(&self, name: &str) -> Option<&[HandlerRecord]> {
        self.presenters.get(name).map(Vec::as_slice)
    }

    pub fn presenter_names(&self) -> impl Iterator<Item = &str> {
        self.presenters.keys().map(String::as_str)
    }

    fn dispatch_table(&self, verb: FuVerb) -> Option<&IndexMap<String, Vec<HandlerRecord>>> {
        match verb {
            FuVerb::Modify => Some(&self.modifiers),
            FuVerb::Split => Some(&self.splitters),
            FuVerb::Present => Some(&self.presenters),
            _ => None,
        }
    }

    /// Resolves the handler variant for `name` against a loaded object,
    /// walking the four precedence levels; first-registered wins inside
    /// a level. `None` when the name is unknown or nothing matches.
    pub fn resolve(&self, verb: FuVerb, name: &str, obj: &FuObject) -> Option<&HandlerRecord> {
        let variants = self.dispatch_table(verb)?.get(name)?;
        Self::resolve_in(variants, obj)
    }

    /// Precedence walk over an explicit variant list.
    pub fn resolve_in<'a>(
        variants: &'a [HandlerRecord],
        obj: &FuObject,
    ) -> Option<&'a HandlerRecord> {
        for level in 0..DISPATCH_LEVELS {
            for record in variants {
                if let Some(descriptor) = &record.dispatch {
                    if descriptor.matches_at_level(obj, level) {
                        return Some(record);
                    }
                }
            }
        }
        None
    }

    /// Whether a name is registered at all for a dispatching verb.
    pub fn has_name(&self, verb: FuVerb, name: &str) -> bool {
        match verb {
            FuVerb::Load => self.loaders.contains_key(name),
            FuVerb::Refine => self.refiners.contains_key(name),
            FuVerb::Adapt => self.adapters.contains_key(name),
            _ => self
                .dispatch_table(verb)
                .map(|table| table.contains_key(name))
                .unwrap_or(false),
        }
    }

    /// Every DSL command key the registry understands: declared
    /// parameter names, content-filter keys, and the loader knobs read
    /// directly from commands. Used for "did you mean" on unknown keys.
    pub fn known_command_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = vec![
            "text".into(),
            "images".into(),
            "metadata".into(),
            "force".into(),
            "budget".into(),
        ];
        let mut push_params = |records: &HandlerRecord| {
            for spec in &records.params {
                if !keys.iter().any(|k| k == spec.name) {
                    keys.push(spec.name.to_string());
                }
            }
        };
        for record in self.loaders.values() {
            push_params(record);
        }
        for variants in self.modifiers.values() {
            variants.iter().for_each(&mut push_params);
        }
        for variants in self.splitters.values() {
            variants.iter().for_each(&mut push_params);
        }
        for variants in self.presenters.values() {
            variants.iter().for_each(&mut push_params);
        }
        for record in self.refiners.values() {
            push_params(record);
        }
        for record in self.adapters.values() {
            push_params(record);
        }
        keys
    }
}

/// Builder that accepts a registration list and returns an immutable
/// registry. Re-registering a `(kind, name)` replaces the earlier entry
/// atomically; that path exists for test scaffolding, production
/// registration happens once at engine construction.
#[derive(Debug, Default)]
pub struct FuRegistryBuilder {
    registry: FuRegistry,
}

impl FuRegistryBuilder {
    pub fn new() -> Self {
        FuRegistryBuilder::default()
    }

    /// Builder pre-loaded with the bundled Fu handlers and processors.
    pub fn with_defaults() -> Self {
        let mut builder = Self::new();
        crate::handlers::register_defaults(&mut builder);
        crate::processor::register_defaults(&mut builder);
        builder
    }

    /// Registers one handler. Dispatching verbs accumulate variants
    /// under the same name unless the descriptor duplicates an earlier
    /// registration, in which case the earlier one is replaced.
    pub fn register(&mut self, record: HandlerRecord) -> &mut Self {
        let registry = &mut self.registry;
        match record.kind {
            FuVerb::Load => {
                registry.loaders.insert(record.name.clone(), record);
            }
            FuVerb::Refine => {
                registry.refiners.insert(record.name.clone(), record);
            }
            FuVerb::Adapt => {
                registry.adapters.insert(record.name.clone(), record);
            }
            FuVerb::Modify | FuVerb::Split | FuVerb::Present => {
                let table = match record.kind {
                    FuVerb::Modify => &mut registry.modifiers,
                    FuVerb::Split => &mut registry.splitters,
                    _ => &mut registry.presenters,
                };
                let variants = table.entry(record.name.clone()).or_default();
                let new_key = record.dispatch.as_ref().map(descriptor_key);
                let duplicate = variants
                    .iter()
                    .position(|existing| existing.dispatch.as_ref().map(descriptor_key) == new_key);
                match duplicate {
                    Some(idx) => variants[idx] = record,
                    None => variants.push(record),
                }
            }
        }
        self
    }

    pub fn register_processor(&mut self, processor: FuProcessor) -> &mut Self {
        self.registry
            .processors
            .retain(|existing| existing.name != processor.name);
        self.registry.processors.push(processor);
        self
    }

    /// Keeps a plugin library alive alongside the handlers it
    /// registered.
    pub fn retain_plugin(&mut self, library: libloading::Library) {
        self.registry.plugins.push(library);
    }

    pub fn build(self) -> FuRegistry {
        self.registry
    }
}

/// Stable identity of a descriptor for replace-on-reregister.
fn descriptor_key(descriptor: &TypeDescriptor) -> String {
    match descriptor {
        TypeDescriptor::Kind(kind) => format!("kind:{kind:?}"),
        TypeDescriptor::ClassName(name) => format!("class:{name}"),
        TypeDescriptor::Family(family) => format!("family:{family}"),
        TypeDescriptor::Regex(re) => format!("regex:{}", re.as_str()),
        TypeDescriptor::Any => "any".to_string(),
    }
}
