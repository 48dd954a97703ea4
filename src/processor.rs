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

//! # Processor Module
//!
//! Pre-composed pipelines bound to match predicates. A *primary*
//! processor is auto-selected by the high-level API when its predicate
//! accepts the attachment; *named* processors are invoked explicitly.
//! Every default processor falls back to the universal pipeline, so a
//! mismatched specialization degrades instead of failing.

use crate::attachment::FuAttachment;
use crate::pipeline::FuPipeline;
use crate::registry::{FuRegistryBuilder, MatchFn};
use crate::verbs::{load, modify, present, refine};

/// A pre-composed pipeline with its selection predicate.
#[derive(Clone, Debug)]
pub struct FuProcessor {
    pub name: String,
    pub matcher: MatchFn,
    pub pipeline: FuPipeline,
    /// Primary processors are auto-selected; named ones are explicit.
    pub primary: bool,
}

impl FuProcessor {
    pub fn primary(name: impl Into<String>, matcher: MatchFn, pipeline: FuPipeline) -> Self {
        FuProcessor {
            name: name.into(),
            matcher,
            pipeline,
            primary: true,
        }
    }

    pub fn named(name: impl Into<String>, matcher: MatchFn, pipeline: FuPipeline) -> Self {
        FuProcessor {
            name: name.into(),
            matcher,
            pipeline,
            primary: false,
        }
    }

    pub fn matches(&self, att: &FuAttachment) -> bool {
        (self.matcher)(att)
    }
}

/// The universal fallback pipeline: loader preference chain, DSL-driven
/// modifiers, category-aware presenters, finishing refiners.
pub fn universal_pipeline() -> FuPipeline {
    load::auto() >> modify::auto() >> present::auto() >> refine::auto()
}

fn has_extension(att: &FuAttachment, extensions: &[&str]) -> bool {
    att.extension()
        .map(|ext| extensions.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn match_pdf(att: &FuAttachment) -> bool {
    has_extension(att, &["pdf"])
}

fn match_csv(att: &FuAttachment) -> bool {
    has_extension(att, &["csv", "tsv"])
}

fn match_image(att: &FuAttachment) -> bool {
    has_extension(att, &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff"])
}

fn match_pptx(att: &FuAttachment) -> bool {
    has_extension(att, &["pptx"])
}

fn match_html(att: &FuAttachment) -> bool {
    has_extension(att, &["html", "htm"])
}

fn match_url(att: &FuAttachment) -> bool {
    att.path.starts_with("http://") || att.path.starts_with("https://")
}

fn match_directory(att: &FuAttachment) -> bool {
    std::path::Path::new(&att.path).is_dir()
}

fn match_table(att: &FuAttachment) -> bool {
    match_csv(att)
}

/// One specialized pipeline per major format. Each starts from its
/// dedicated loader so processor selection, not loader probing, decides
/// the route; the universal pipeline backs every one of them up.
fn format_processor(name: &str, matcher: MatchFn, loader: crate::verbs::FuStep) -> FuProcessor {
    let pipeline = (loader >> modify::auto() >> present::auto() >> refine::auto())
        .with_fallback(universal_pipeline());
    FuProcessor::primary(name, matcher, pipeline)
}

/// Registers the bundled processors.
pub fn register_defaults(builder: &mut FuRegistryBuilder) {
    builder.register_processor(format_processor("pdf", match_pdf, load::pdf()));
    builder.register_processor(format_processor("csv", match_csv, load::csv()));
    builder.register_processor(format_processor("image", match_image, load::image()));
    builder.register_processor(format_processor("pptx", match_pptx, load::pptx()));
    builder.register_processor(format_processor("html", match_html, load::html()));
    builder.register_processor(FuProcessor::primary(
        "web",
        match_url,
        universal_pipeline(),
    ));
    builder.register_processor(FuProcessor::primary(
        "directory",
        match_directory,
        (load::directory() >> modify::auto() >> present::auto() >> refine::auto())
            .with_fallback(universal_pipeline()),
    ));

    // Named processors, invoked explicitly.
    builder.register_processor(FuProcessor::named(
        "summary",
        match_table,
        load::auto() >> modify::auto() >> present::summary() + present::metadata()
            >> refine::add_headers(),
    ));
    builder.register_processor(FuProcessor::named(
        "text_only",
        |_att| true,
        load::auto() >> modify::auto() >> present::text(),
    ));
}
