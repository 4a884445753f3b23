// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module.
//!
//! Loads the integrations file from, in order of precedence:
//! - An explicit path (the `--config` flag)
//! - The workspace: `.omnix/integrations.json`, `.omnix/integrations.yaml`,
//!   or `omnix.integrations.json`
//! - Global config: `~/.omnix/integrations.json`
//!
//! The first file found wins; files are not merged.

mod loader;
mod types;

pub use loader::{
    find_workspace_root, get_global_config_dir, get_global_config_path, load_config_file,
    load_global_config, load_workspace_config, save_config_file, CONFIG_FILES, GLOBAL_CONFIG_DIR,
    GLOBAL_CONFIG_FILE,
};
pub use types::IntegrationsConfig;

use crate::error::ConfigError;
use std::path::Path;

/// Load the integrations configuration for a workspace.
///
/// Falls back to [`IntegrationsConfig::default`] (built-in servers only) when
/// no file is found. An explicit path that does not exist is an error.
pub fn load_config(
    workspace_root: &Path,
    explicit: Option<&Path>,
) -> Result<IntegrationsConfig, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        return load_config_file(path);
    }

    if let Some(config) = load_workspace_config(workspace_root)? {
        return Ok(config);
    }

    Ok(load_global_config()?.unwrap_or_default())
}
