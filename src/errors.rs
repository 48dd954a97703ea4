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

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type used throughout Fu Core.
pub type Result<T> = std::result::Result<T, FuError>;

/// Canonical error enumeration for Fu Core.
///
/// Only the two DSL variants are fatal for an attachment; every other
/// kind is captured into `metadata.errors` by the pipeline engine and
/// processing continues with the previous value.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum FuError {
    /// Unparseable bracket content in a source string.
    #[error("DSL syntax error at offset {offset}: {message}")]
    DslSyntax { offset: usize, message: String },

    /// Known DSL key, unknown or uncoercible value.
    #[error("invalid value '{value}' for DSL command '{key}'{}", suggestion_suffix(.suggestion))]
    DslValue {
        key: String,
        value: String,
        suggestion: Option<String>,
    },

    /// No loader matched and the text fallback also failed.
    #[error("no loader available for '{path}'")]
    LoaderUnavailable { path: String },

    /// A handler aborted for want of an optional capability.
    #[error("handler '{handler}' needs a missing capability: {hint}")]
    DependencyMissing { handler: String, hint: String },

    /// Any failure raised inside a handler implementation.
    #[error("handler '{handler}' failed: {message}")]
    Handler { handler: String, message: String },

    /// A repository or response exceeded the configured byte budget.
    #[error("size budget exceeded: found {found} bytes, budget {budget} bytes")]
    SizeBudget { found: u64, budget: u64 },

    /// The host cancellation flag was observed between steps.
    #[error("cancelled by host")]
    Cancelled,

    /// Errors originating from filesystem IO.
    #[error("io error: {0}")]
    Io(String),

    /// Errors originating from network IO.
    #[error("http error: {0}")]
    Http(String),

    /// Catch-all variant for unexpected situations.
    #[error("internal error: {0}")]
    Internal(String),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{s}'?)"),
        None => String::new(),
    }
}

impl From<io::Error> for FuError {
    fn from(err: io::Error) -> Self {
        FuError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FuError {
    fn from(err: serde_json::Error) -> Self {
        FuError::Internal(err.to_string())
    }
}

impl FuError {
    /// Helper to construct handler errors.
    pub fn handler(name: impl Into<String>, message: impl Into<String>) -> Self {
        FuError::Handler {
            handler: name.into(),
            message: message.into(),
        }
    }

    /// Helper to construct missing-capability errors.
    pub fn dependency(handler: impl Into<String>, hint: impl Into<String>) -> Self {
        FuError::DependencyMissing {
            handler: handler.into(),
            hint: hint.into(),
        }
    }

    /// Helper to construct internal errors.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        FuError::Internal(message.into())
    }

    /// Classification keyword recorded in `metadata.errors[].kind` and
    /// embedded in degradation artifacts.
    pub fn kind(&self) -> &'static str {
        match self {
            FuError::DslSyntax { .. } => "DSLSyntaxError",
            FuError::DslValue { .. } => "DSLValueError",
            FuError::LoaderUnavailable { .. } => "LoaderUnavailable",
            FuError::DependencyMissing { .. } => "DependencyMissing",
            FuError::SizeBudget { .. } => "SizeBudgetExceeded",
            FuError::Cancelled => "Cancelled",
            // IO and network failures inside a handler surface as handler
            // failures to the caller.
            FuError::Handler { .. }
            | FuError::Io(_)
            | FuError::Http(_)
            | FuError::Internal(_) => "HandlerFailure",
        }
    }

    /// Fatal errors abort the affected attachment; everything else is
    /// captured and processing continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FuError::DslSyntax { .. } | FuError::DslValue { .. })
    }
}
