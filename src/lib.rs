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

//! Fu turns file paths and URLs — plus an embedded `[key:value]`
//! micro-DSL — into model-ready bundles of text, base64 images and
//! metadata, then into provider message envelopes.
//!
//! ```no_run
//! use fu::FuAttachments;
//!
//! let atts = FuAttachments::new(["report.pdf[pages:1-3]", "photo.jpg[rotate:90]"])?;
//! println!("{}", atts.text());
//! let envelope = atts.chat("summarize these")?;
//! # Ok::<(), fu::FuError>(())
//! ```

pub mod api;
pub mod attachment;
pub mod dispatch;
pub mod dsl;
pub mod errors;
pub mod handlers;
pub mod object;
pub mod pipeline;
pub mod plugin;
pub mod processor;
pub mod registry;
pub mod suggest;
pub mod verbs;

pub use api::{default_registry, FuAttachments};
pub use attachment::{FuAttachment, FuCollection, FuCommands, FuItem, FuMetadata};
pub use dispatch::{Category, FuParams, ParamKind, ParamSpec, ParamValue, TypeDescriptor};
pub use errors::{FuError, Result};
pub use object::{FuObject, FuObjectKind};
pub use pipeline::{FuEngine, FuNode, FuPipeline};
pub use processor::{universal_pipeline, FuProcessor};
pub use registry::{FuRegistry, FuRegistryBuilder, FuVerb, HandlerBody, HandlerRecord};
pub use verbs::{adapt, load, modify, present, refine, split, FuStep};
