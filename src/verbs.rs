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

//! # Verb Namespaces
//!
//! First-class pipeline steps, one constructor per registered handler,
//! grouped by verb: `load::pdf() >> modify::pages() >> present::markdown()`.
//! Steps compose with `>>` (sequential) and `+` (additive); `+` binds
//! tighter, so `a >> b + c` reads as `a >> (b + c)`, which is the
//! distribution the algebra wants.

use crate::pipeline::{FuNode, FuPipeline};
use crate::registry::FuVerb;

/// A reference to one registered handler, usable as a pipeline step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuStep {
    pub verb: FuVerb,
    pub name: String,
}

impl FuStep {
    pub fn new(verb: FuVerb, name: impl Into<String>) -> Self {
        FuStep {
            verb,
            name: name.into(),
        }
    }
}

macro_rules! step_fns {
    ($verb:expr, $( $(#[$doc:meta])* $name:ident => $handler:literal ),+ $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name() -> super::FuStep {
                super::FuStep::new($verb, $handler)
            }
        )+

        /// Step for a handler registered under a non-built-in name,
        /// e.g. one contributed by a plugin.
        pub fn named(name: &str) -> super::FuStep {
            super::FuStep::new($verb, name)
        }
    };
}

pub mod load {
    use crate::registry::FuVerb;
    step_fns!(
        FuVerb::Load,
        /// Loader preference chain: URL, morph, specialized by
        /// extension, text fallback.
        auto => "auto",
        url => "url",
        pdf => "pdf",
        csv => "csv",
        image => "image",
        pptx => "pptx",
        html => "html",
        directory => "directory",
        text => "text",
    );
}

pub mod modify {
    use crate::registry::FuVerb;
    step_fns!(
        FuVerb::Modify,
        /// Runs every modifier whose name appears as a command key.
        auto => "auto",
        pages => "pages",
        limit => "limit",
        sample => "sample",
        rotate => "rotate",
        resize => "resize",
        crop => "crop",
        grayscale => "grayscale",
        select => "select",
        morph => "morph",
    );
}

pub mod split {
    use crate::registry::FuVerb;
    step_fns!(
        FuVerb::Split,
        paragraphs => "paragraphs",
        sentences => "sentences",
        tokens => "tokens",
        characters => "characters",
        lines => "lines",
        custom => "custom",
        pages => "pages",
        slides => "slides",
        sections => "sections",
        rows => "rows",
        columns => "columns",
    );
}

pub mod present {
    use crate::registry::FuVerb;
    step_fns!(
        FuVerb::Present,
        /// Category-aware additive composition of the matching
        /// presenters.
        auto => "auto",
        markdown => "markdown",
        text => "text",
        images => "images",
        metadata => "metadata",
        summary => "summary",
        html => "html",
    );
}

pub mod refine {
    use crate::registry::FuVerb;
    step_fns!(
        FuVerb::Refine,
        /// Finishing chain: tiling, header decoration, truncation,
        /// each driven by the DSL.
        auto => "auto",
        truncate => "truncate",
        add_headers => "add_headers",
        tile_images => "tile_images",
        resize_images => "resize_images",
        clean => "clean",
    );
}

pub mod adapt {
    use crate::registry::FuVerb;
    step_fns!(
        FuVerb::Adapt,
        chat => "chat",
        responses => "responses",
        claude => "claude",
    );
}

// ----------------------------------------------------------------------
// Composition operators.
// ----------------------------------------------------------------------

impl std::ops::Shr<FuStep> for FuStep {
    type Output = FuPipeline;

    fn shr(self, rhs: FuStep) -> FuPipeline {
        FuPipeline::new(vec![FuNode::Step(self), FuNode::Step(rhs)])
    }
}

impl std::ops::Shr<FuPipeline> for FuStep {
    type Output = FuPipeline;

    fn shr(self, rhs: FuPipeline) -> FuPipeline {
        let mut nodes = vec![FuNode::Step(self)];
        nodes.extend(rhs.nodes);
        FuPipeline {
            nodes,
            fallbacks: rhs.fallbacks,
        }
    }
}

impl std::ops::Shr<FuStep> for FuPipeline {
    type Output = FuPipeline;

    fn shr(mut self, rhs: FuStep) -> FuPipeline {
        self.nodes.push(FuNode::Step(rhs));
        self
    }
}

impl std::ops::Shr<FuPipeline> for FuPipeline {
    type Output = FuPipeline;

    fn shr(mut self, rhs: FuPipeline) -> FuPipeline {
        if rhs.fallbacks.is_empty() {
            self.nodes.extend(rhs.nodes);
        } else {
            // A suffix with its own fallback chain stays one unit.
            self.nodes.push(FuNode::Additive(vec![rhs]));
        }
        self
    }
}

impl std::ops::Add<FuStep> for FuStep {
    type Output = FuPipeline;

    fn add(self, rhs: FuStep) -> FuPipeline {
        FuPipeline::new(vec![FuNode::Additive(vec![
            FuPipeline::step(self),
            FuPipeline::step(rhs),
        ])])
    }
}

impl std::ops::Add<FuStep> for FuPipeline {
    type Output = FuPipeline;

    fn add(mut self, rhs: FuStep) -> FuPipeline {
        // Left-associative accumulation: extend an existing additive
        // group in place, otherwise the whole pipeline becomes the
        // first branch.
        if self.fallbacks.is_empty() && self.nodes.len() == 1 {
            if let Some(FuNode::Additive(branches)) = self.nodes.first_mut() {
                branches.push(FuPipeline::step(rhs));
                return self;
            }
        }
        FuPipeline::new(vec![FuNode::Additive(vec![self, FuPipeline::step(rhs)])])
    }
}

impl std::ops::Add<FuPipeline> for FuPipeline {
    type Output = FuPipeline;

    fn add(mut self, rhs: FuPipeline) -> FuPipeline {
        if self.fallbacks.is_empty() && self.nodes.len() == 1 {
            if let Some(FuNode::Additive(branches)) = self.nodes.first_mut() {
                branches.push(rhs);
                return self;
            }
        }
        FuPipeline::new(vec![FuNode::Additive(vec![self, rhs])])
    }
}

impl From<FuStep> for FuPipeline {
    fn from(step: FuStep) -> FuPipeline {
        FuPipeline::step(step)
    }
}
