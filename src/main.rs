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

//! Command-line front end. Exit codes: 0 success, 1 every fallback
//! exhausted, 2 DSL syntax/value error, 3 unrecoverable I/O error.

use clap::Parser;
use fu::{FuAttachments, FuError};

#[derive(Parser, Debug)]
#[command(name = "fu", version, about = "Convert files and URLs into model-ready content bundles")]
struct Args {
    /// Sources: paths or URLs, each with an optional [key:value,...] suffix
    #[arg(required = true)]
    sources: Vec<String>,

    /// Emit a provider envelope (chat, responses, claude) instead of text
    #[arg(long)]
    adapter: Option<String>,

    /// Prompt placed before the assembled text in the envelope
    #[arg(long, default_value = "")]
    prompt: String,

    /// Run one named processor over every source
    #[arg(long)]
    processor: Option<String>,

    /// Print a JSON object with text, images and metadata
    #[arg(long)]
    json: bool,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args = Args::parse();

    let outcome = match &args.processor {
        Some(name) => FuAttachments::with_processor(name, &args.sources),
        None => FuAttachments::new(&args.sources),
    };

    let atts = match outcome {
        Ok(atts) => atts,
        Err(err @ (FuError::DslSyntax { .. } | FuError::DslValue { .. })) => {
            eprintln!("fu: {err}");
            return 2;
        }
        Err(err @ FuError::Io(_)) => {
            eprintln!("fu: {err}");
            return 3;
        }
        Err(err) => {
            eprintln!("fu: {err}");
            return 1;
        }
    };

    let exhausted = !atts.is_empty()
        && atts
            .attachments()
            .iter()
            .all(|att| att.is_error_artifact());

    if let Some(adapter) = &args.adapter {
        match atts.adapt(adapter, &args.prompt) {
            Ok(envelope) => match serde_json::to_string_pretty(&envelope) {
                Ok(rendered) => println!("{rendered}"),
                Err(err) => {
                    eprintln!("fu: {err}");
                    return 1;
                }
            },
            Err(err) => {
                eprintln!("fu: {err}");
                return 1;
            }
        }
    } else if args.json {
        let summary = serde_json::json!({
            "text": atts.text(),
            "images": atts.images(),
            "attachments": atts
                .attachments()
                .iter()
                .map(|att| serde_json::json!({
                    "path": att.path,
                    "metadata": att.metadata,
                    "trace": att.pipeline_trace,
                }))
                .collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => {
                eprintln!("fu: {err}");
                return 1;
            }
        }
    } else {
        println!("{}", atts.text());
    }

    if exhausted {
        1
    } else {
        0
    }
}
