// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Integrations file loading.
//!
//! Handles loading the integrations file from JSON and YAML files in the
//! workspace or the user's home directory.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::IntegrationsConfig;

/// Workspace integrations files to search for (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".omnix/integrations.json",
    ".omnix/integrations.yaml",
    "omnix.integrations.json",
];

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".omnix";

/// Global integrations file name.
pub const GLOBAL_CONFIG_FILE: &str = "integrations.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global integrations file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load ~/.omnix/integrations.json, if present.
pub fn load_global_config() -> Result<Option<IntegrationsConfig>, ConfigError> {
    let path = match get_global_config_path() {
        Some(p) => p,
        None => return Ok(None),
    };

    if !path.exists() {
        return Ok(None);
    }

    load_config_file(&path).map(Some)
}

/// Load the first integrations file found under the workspace root.
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<IntegrationsConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load and validate an integrations file (JSON or YAML by extension).
pub fn load_config_file(path: &Path) -> Result<IntegrationsConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let config: IntegrationsConfig = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };

    config.validate()?;
    tracing::debug!(path = %path.display(), servers = config.servers.len(), "Loaded integrations file");
    Ok(config)
}

/// Save an integrations file as pretty JSON.
pub fn save_config_file(path: &Path, config: &IntegrationsConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Find the workspace root by searching for integrations files.
///
/// Walks up the directory tree from `start` until it finds a directory
/// containing one or reaches the filesystem root.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if CONFIG_FILES.iter().any(|f| current.join(f).exists()) {
            return Some(current);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_global_config_dir() {
        let dir = get_global_config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with(".omnix"));
    }

    #[test]
    fn test_load_workspace_config_not_found() {
        let temp = TempDir::new().unwrap();
        let result = load_workspace_config(temp.path());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_load_workspace_config_json() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".omnix")).unwrap();
        std::fs::write(
            temp.path().join(".omnix/integrations.json"),
            r#"{"servers": [{"id": "notion", "name": "Notion", "command": "npx",
                "args": ["-y", "@notionhq/notion-mcp-server"]}]}"#,
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].args[1], "@notionhq/notion-mcp-server");
    }

    #[test]
    fn test_load_workspace_config_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".omnix")).unwrap();
        std::fs::write(
            temp.path().join(".omnix/integrations.yaml"),
            "servers:\n  - id: fs\n    name: Files\n    command: fs-server\n    enabled: false\ncredentials:\n  fs: [FS_TOKEN]\n",
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.servers[0].id, "fs");
        assert!(!config.servers[0].enabled);
        assert_eq!(config.credentials["fs"], vec!["FS_TOKEN".to_string()]);
    }

    #[test]
    fn test_json_takes_precedence_over_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".omnix")).unwrap();
        std::fs::write(
            temp.path().join(".omnix/integrations.json"),
            r#"{"servers": [{"id": "from-json", "name": "J", "command": "j"}]}"#,
        )
        .unwrap();
        std::fs::write(
            temp.path().join(".omnix/integrations.yaml"),
            "servers:\n  - id: from-yaml\n    name: Y\n    command: y\n",
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.servers[0].id, "from-json");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("omnix.integrations.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            load_config_file(&path),
            Err(ConfigError::JsonError(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".omnix").join("integrations.json");
        let config: IntegrationsConfig = serde_json::from_str(
            r#"{"servers": [{"id": "a", "name": "A", "command": "a-server"}]}"#,
        )
        .unwrap();

        save_config_file(&path, &config).unwrap();
        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(reloaded.servers, config.servers);
    }

    #[test]
    fn test_find_workspace_root() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("a").join("b");
        std::fs::create_dir_all(&subdir).unwrap();
        std::fs::write(temp.path().join("omnix.integrations.json"), "{}").unwrap();

        assert_eq!(find_workspace_root(&subdir).unwrap(), temp.path());
    }
}
