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

//! Bundled handlers for the six verbs. Format readers stay thin: each
//! loader hands its off-the-shelf parser's output to the shared object
//! model and lets presenters and refiners do the shaping.

pub mod adapt;
pub mod load;
pub mod modify;
pub mod present;
pub mod refine;
pub mod split;

use crate::registry::FuRegistryBuilder;

/// Registers every bundled handler, in the order dispatch and loader
/// preference depend on.
pub fn register_defaults(builder: &mut FuRegistryBuilder) {
    load::register(builder);
    modify::register(builder);
    split::register(builder);
    present::register(builder);
    refine::register(builder);
    adapt::register(builder);
}
