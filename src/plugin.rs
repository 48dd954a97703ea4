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

//! # Plugin Module
//!
//! External handler discovery. `FU_PLUGIN_PATH` names a directory or a
//! `:`-separated list of dynamic libraries; each library exports
//! `fu_register_handlers`, which receives a registration callback and a
//! context pointer and self-registers its handler records. Libraries
//! stay loaded for the registry's lifetime.

use std::ffi::c_void;
use std::path::Path;

use libloading::Library;

use crate::errors::{FuError, Result};
use crate::registry::{FuRegistryBuilder, HandlerRecord};

/// Bumped whenever `HandlerRecord` or the callback protocol changes.
pub const FU_PLUGIN_ABI_VERSION: u32 = 1;

/// Environment variable naming plugin libraries or a directory of them.
pub const FU_PLUGIN_ENV: &str = "FU_PLUGIN_PATH";

/// Factory a plugin hands to the registration callback.
#[allow(improper_ctypes_definitions)]
pub type FuHandlerFactory = fn() -> Vec<HandlerRecord>;

#[allow(improper_ctypes_definitions)]
type RegisterCallback = unsafe extern "C" fn(FuHandlerFactory, *mut c_void);

#[allow(improper_ctypes_definitions)]
type PluginRegisterFn = unsafe extern "C" fn(RegisterCallback, *mut c_void) -> bool;

type PluginAbiFn = unsafe extern "C" fn() -> u32;

struct PluginContext {
    builder: *mut FuRegistryBuilder,
}

#[allow(improper_ctypes_definitions)]
unsafe extern "C" fn register_handlers_callback(factory: FuHandlerFactory, user_data: *mut c_void) {
    let ctx = &mut *(user_data as *mut PluginContext);
    for record in factory() {
        (*ctx.builder).register(record);
    }
}

/// Loads one plugin library and registers whatever it contributes.
pub fn load_plugin(builder: &mut FuRegistryBuilder, path: &Path) -> Result<()> {
    unsafe {
        let library = Library::new(path)
            .map_err(|err| FuError::internal(format!("failed to load plugin: {err}")))?;

        // Optional ABI probe: absent means the plugin predates
        // versioning and is accepted as version 1.
        if let Ok(abi) = library.get::<PluginAbiFn>(b"fu_plugin_abi_version\0") {
            let version = abi();
            if version != FU_PLUGIN_ABI_VERSION {
                return Err(FuError::internal(format!(
                    "plugin {} has ABI version {version}, expected {FU_PLUGIN_ABI_VERSION}",
                    path.display()
                )));
            }
        }

        let register: libloading::Symbol<PluginRegisterFn> =
            library.get(b"fu_register_handlers\0").map_err(|err| {
                FuError::internal(format!(
                    "plugin missing symbol 'fu_register_handlers': {err}"
                ))
            })?;

        let mut ctx = PluginContext {
            builder: builder as *mut FuRegistryBuilder,
        };
        let success = register(register_handlers_callback, &mut ctx as *mut _ as *mut c_void);
        if !success {
            return Err(FuError::internal(
                "plugin registration reported failure".to_string(),
            ));
        }

        builder.retain_plugin(library);
    }
    Ok(())
}

fn is_dynamic_library(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("so") | Some("dylib") | Some("dll")
    )
}

/// Walks `FU_PLUGIN_PATH` and loads every plugin it names. A plugin
/// that fails to load is skipped with a warning; discovery itself never
/// aborts startup.
pub fn discover_plugins(builder: &mut FuRegistryBuilder) -> usize {
    let Some(value) = std::env::var_os(FU_PLUGIN_ENV) else {
        return 0;
    };
    let value = value.to_string_lossy().to_string();

    let mut loaded = 0;
    for entry in value.split(':').filter(|entry| !entry.is_empty()) {
        let path = Path::new(entry);
        if path.is_dir() {
            let Ok(dir) = std::fs::read_dir(path) else {
                log::warn!("cannot read plugin directory {entry}");
                continue;
            };
            let mut candidates: Vec<_> = dir
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| is_dynamic_library(path))
                .collect();
            candidates.sort();
            for candidate in candidates {
                match load_plugin(builder, &candidate) {
                    Ok(()) => loaded += 1,
                    Err(err) => log::warn!("skipping plugin {}: {err}", candidate.display()),
                }
            }
        } else {
            match load_plugin(builder, path) {
                Ok(()) => loaded += 1,
                Err(err) => log::warn!("skipping plugin {entry}: {err}"),
            }
        }
    }
    loaded
}
