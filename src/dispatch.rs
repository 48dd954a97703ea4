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

//! # Dispatch Module
//!
//! Type-driven handler resolution and DSL parameter binding.
//!
//! Every non-loader handler declares a `TypeDescriptor`; resolution
//! walks four precedence levels until one matches — exact kind, then
//! unqualified class name, then family, then regex over the qualified
//! name — with registration order breaking ties inside a level. No
//! reflection: descriptors are declared explicitly at registration.
//!
//! Parameters are declared as an explicit manifest. The dispatcher
//! coerces matching DSL command values to the declared kind and passes
//! them by name; unknown command keys stay on the attachment for later
//! handlers.

use std::collections::HashMap;

use crate::attachment::FuCommands;
use crate::errors::{FuError, Result};
use crate::object::{FuObject, FuObjectKind};
use crate::suggest;

/// Declared object-type descriptor for MODIFY/SPLIT/PRESENT/REFINE.
#[derive(Clone, Debug)]
pub enum TypeDescriptor {
    /// Exact kind identity, highest precedence.
    Kind(FuObjectKind),
    /// Unqualified class-name equality, e.g. `"PdfDocument"`.
    ClassName(&'static str),
    /// Family membership, e.g. `"Document"` covers PDFs, HTML, slides
    /// and plain text.
    Family(&'static str),
    /// Regex over the qualified class name, lowest precedence before
    /// the wildcard.
    Regex(regex::Regex),
    /// Applies to every object; resolved only when nothing narrower
    /// matched.
    Any,
}

/// Number of precedence levels scanned during resolution.
pub const DISPATCH_LEVELS: usize = 5;

impl TypeDescriptor {
    /// Compiles a regex descriptor, rejecting invalid patterns at
    /// registration time.
    pub fn regex(pattern: &str) -> Result<Self> {
        regex::Regex::new(pattern)
            .map(TypeDescriptor::Regex)
            .map_err(|err| FuError::internal(format!("invalid dispatch regex: {err}")))
    }

    /// Whether this descriptor matches `obj` at the given precedence
    /// level. A descriptor only matches at its own level.
    pub fn matches_at_level(&self, obj: &FuObject, level: usize) -> bool {
        match (level, self) {
            (0, TypeDescriptor::Kind(kind)) => obj.kind() == *kind,
            (1, TypeDescriptor::ClassName(name)) => obj.class_name() == *name,
            (2, TypeDescriptor::Family(family)) => obj.family() == Some(*family),
            (3, TypeDescriptor::Regex(re)) => re.is_match(&obj.qualified_name()),
            (4, TypeDescriptor::Any) => true,
            _ => false,
        }
    }
}

/// Value kinds a DSL parameter can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    Str,
    /// Closed value set; unknown values are fatal and carry a
    /// suggestion.
    Enum,
}

/// One entry of a handler's parameter manifest.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: Option<&'static str>,
    pub enum_values: &'static [&'static str],
}

impl ParamSpec {
    pub const fn new(name: &'static str, kind: ParamKind) -> Self {
        ParamSpec {
            name,
            kind,
            default: None,
            enum_values: &[],
        }
    }

    pub const fn with_default(name: &'static str, kind: ParamKind, default: &'static str) -> Self {
        ParamSpec {
            name,
            kind,
            default: Some(default),
            enum_values: &[],
        }
    }

    pub const fn enumerated(
        name: &'static str,
        enum_values: &'static [&'static str],
        default: Option<&'static str>,
    ) -> Self {
        ParamSpec {
            name,
            kind: ParamKind::Enum,
            default,
            enum_values,
        }
    }
}

/// A coerced parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

/// Named parameters handed to a handler invocation.
#[derive(Clone, Debug, Default)]
pub struct FuParams {
    values: HashMap<String, ParamValue>,
}

impl FuParams {
    pub fn new() -> Self {
        FuParams::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            ParamValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }
}

fn coerce(key: &str, value: &str, spec: &ParamSpec) -> Result<ParamValue> {
    let invalid = |suggestion: Option<String>| FuError::DslValue {
        key: key.to_string(),
        value: value.to_string(),
        suggestion,
    };
    match spec.kind {
        ParamKind::Int => value
            .trim()
            .parse::<i64>()
            .map(ParamValue::Int)
            .map_err(|_| invalid(None)),
        ParamKind::Float => value
            .trim()
            .parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|_| invalid(None)),
        ParamKind::Bool => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(ParamValue::Bool(true)),
            "false" | "no" | "0" => Ok(ParamValue::Bool(false)),
            _ => Err(invalid(None)),
        },
        ParamKind::Str => Ok(ParamValue::Str(value.to_string())),
        ParamKind::Enum => {
            if spec.enum_values.contains(&value) {
                Ok(ParamValue::Str(value.to_string()))
            } else {
                Err(invalid(suggest::suggest(
                    value,
                    spec.enum_values.iter().copied(),
                )))
            }
        }
    }
}

/// Binds a handler's manifest against the attachment commands.
///
/// Commands not named by the manifest are left alone for later
/// handlers; manifest entries absent from the commands fall back to
/// their declared default.
pub fn bind_params(specs: &[ParamSpec], commands: &FuCommands) -> Result<FuParams> {
    let mut params = FuParams::new();
    for spec in specs {
        if let Some(raw) = commands.get(spec.name) {
            params.insert(spec.name, coerce(spec.name, raw, spec)?);
        } else if let Some(default) = spec.default {
            // Manifest defaults are authored in-crate and must coerce.
            let value = coerce(spec.name, default, spec)
                .map_err(|_| FuError::internal(format!("bad manifest default for '{}'", spec.name)))?;
            params.insert(spec.name, value);
        }
    }
    Ok(params)
}

/// Presenter sub-kind used by content-filter commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Text,
    Image,
    Metadata,
}

impl Category {
    /// The DSL command key controlling this category.
    pub fn command_key(&self) -> &'static str {
        match self {
            Category::Text => "text",
            Category::Image => "images",
            Category::Metadata => "metadata",
        }
    }
}

/// Content-filter check: `[images:false]` suppresses image presenters,
/// `[text:false]` textual ones. Anything but a literal "false" leaves
/// the category enabled.
pub fn category_enabled(category: Category, commands: &FuCommands) -> bool {
    commands
        .get(category.command_key())
        .map(|value| value.trim() != "false")
        .unwrap_or(true)
}
