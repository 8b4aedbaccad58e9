//! Optional capabilities.
//!
//! Some features only work when a companion package is installed
//! (svelte CSF stories, component docgen). Instead of probing at the point
//! of use, capabilities are registered once at startup, either listed in
//! `plugins = [...]` or detected in `node_modules`, and checked with
//! [`PluginRegistry::has`].

use std::path::Path;

use indexmap::IndexSet;
use serde::Serialize;

use crate::config::Settings;
use crate::entries::find_package;

pub const SVELTE_CSF: &str = "svelte-csf";
pub const SVELTE_DOCGEN: &str = "svelte-docgen";
pub const REACT_DOCGEN: &str = "react-docgen";
pub const REACT_DOCGEN_TYPESCRIPT: &str = "react-docgen-typescript";

/// Capability name and the package whose presence enables it.
pub const KNOWN_PLUGINS: &[(&str, &str)] = &[
    (SVELTE_CSF, "@storybook/addon-svelte-csf"),
    (SVELTE_DOCGEN, "sveltedoc-parser"),
    (REACT_DOCGEN, "react-docgen"),
    (REACT_DOCGEN_TYPESCRIPT, "react-docgen-typescript"),
];

/// Registered capabilities, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PluginRegistry {
    plugins: IndexSet<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit plugins from settings, then whatever is detected from the
    /// working directory.
    pub fn from_settings(settings: &Settings, working_dir: &Path) -> Self {
        let mut registry = Self::new();
        for name in &settings.plugins {
            registry.register(name);
        }
        registry.detect(working_dir);
        crate::log_event!("plugins", "registered", "{}", registry.names().join(", "));
        registry
    }

    /// Register `name`; returns false if it was already present.
    pub fn register(&mut self, name: impl Into<String>) -> bool {
        self.plugins.insert(name.into())
    }

    /// Register every known capability whose package is installed.
    pub fn detect(&mut self, working_dir: &Path) -> usize {
        let mut found = 0;
        for (name, package) in KNOWN_PLUGINS {
            if let Some(dir) = find_package(package, working_dir) {
                crate::debug_event!("plugins", "detected", "{name} ({})", dir.display());
                if self.register(*name) {
                    found += 1;
                }
            }
        }
        found
    }

    pub fn has(&self, name: &str) -> bool {
        self.plugins.contains(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn install(root: &Path, package: &str) {
        let dir = root.join("node_modules").join(package);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), "{}").unwrap();
    }

    #[test]
    fn test_detects_installed_packages() {
        let temp_dir = TempDir::new().unwrap();
        install(temp_dir.path(), "@storybook/addon-svelte-csf");

        let mut registry = PluginRegistry::new();
        assert_eq!(registry.detect(temp_dir.path()), 1);
        assert!(registry.has(SVELTE_CSF));
        assert!(!registry.has(REACT_DOCGEN));
    }

    #[test]
    fn test_explicit_plugins_come_first_and_dedupe() {
        let temp_dir = TempDir::new().unwrap();
        install(temp_dir.path(), "react-docgen");

        let settings = Settings {
            plugins: vec![REACT_DOCGEN.to_string(), "custom".to_string()],
            ..Settings::default()
        };
        let registry = PluginRegistry::from_settings(&settings, temp_dir.path());

        assert_eq!(registry.names(), vec![REACT_DOCGEN.to_string(), "custom".to_string()]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_absence_is_normal() {
        let temp_dir = TempDir::new().unwrap();
        let registry = PluginRegistry::from_settings(&Settings::default(), temp_dir.path());
        assert!(registry.is_empty());
        assert!(!registry.has(SVELTE_CSF));
    }
}
