//! Virtual entry synthesis.
//!
//! Bundlers are handed in-memory modules that bootstrap the preview: a
//! stories module exporting `importFn` plus a config entry (consolidated
//! strategy), or one init entry, one entry per preview annotation and a
//! `require.context` stories entry (legacy strategy).

mod runtime;
mod template;
mod transform;

pub use runtime::{CLIENT_API, CLIENT_LOGGER, RuntimePaths, RuntimeResolver, find_package, package_dir};
pub use template::interpolate;
pub use transform::{to_import_fn, to_require_context_string};

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::config::BuilderOptions;
use crate::stories::NormalizedStoriesSpecifier;
use crate::stories::paths::absolutize;
use template::{LEGACY_CONFIG_ENTRY, LEGACY_STORIES_ENTRY, MODERN_ENTRY};

pub const STORIES_FILENAME: &str = "storybook-stories.js";
pub const CONFIG_ENTRY_FILENAME: &str = "storybook-config-entry.js";
pub const FRAMEWORK_INIT_FILENAME: &str = "storybook-init-framework-entry.mjs";
pub const GENERATED_STORIES_FILENAME: &str = "generated-stories-entry.cjs";
pub const CONFIG_ENTRY_SUFFIX: &str = "-generated-config-entry.js";

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("Virtual entry '{path}' generated twice")]
    Duplicate { path: String },
}

pub type EntryResult<T> = Result<T, EntryError>;

/// Generated modules keyed by synthetic path, plus the bundler entry list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VirtualEntries {
    pub mapping: IndexMap<String, String>,
    /// Original entries first, synthesized ones appended
    pub entries: Vec<String>,
}

impl VirtualEntries {
    fn seeded(original: &[String]) -> Self {
        Self {
            mapping: IndexMap::new(),
            entries: original.to_vec(),
        }
    }

    fn insert(&mut self, path: String, source: String) -> EntryResult<()> {
        if self.mapping.contains_key(&path) {
            return Err(EntryError::Duplicate { path });
        }
        self.mapping.insert(path, source);
        Ok(())
    }
}

/// Produces virtual entries for one config directory.
#[derive(Debug)]
pub struct EntrySynthesizer {
    config_dir: PathBuf,
    runtime: RuntimeResolver,
}

impl EntrySynthesizer {
    /// `config_dir` is resolved against `working_dir`, which is also where
    /// runtime package lookup starts.
    pub fn new(config_dir: &Path, working_dir: &Path) -> Self {
        Self {
            config_dir: absolutize(config_dir, working_dir),
            runtime: RuntimeResolver::new(working_dir),
        }
    }

    fn resolve(&self, file_name: &str) -> String {
        self.config_dir.join(file_name).display().to_string()
    }

    /// Consolidated strategy: a stories module and a config entry.
    pub fn modern_virtual_entries(
        &self,
        specifiers: &[NormalizedStoriesSpecifier],
        preview_annotations: &[Option<String>],
        builder_options: &BuilderOptions,
        is_prod: bool,
        original_entries: &[String],
    ) -> EntryResult<VirtualEntries> {
        let mut out = VirtualEntries::seeded(original_entries);

        let need_pipelined_import = builder_options.lazy_compilation && !is_prod;
        out.insert(
            self.resolve(STORIES_FILENAME),
            to_import_fn(specifiers, need_pipelined_import),
        )?;

        let annotations: Vec<&str> = preview_annotations.iter().flatten().map(String::as_str).collect();
        let requires = annotations
            .iter()
            .map(|path| format!("require('{path}')"))
            .collect::<Vec<_>>()
            .join(", ");
        let paths = annotations
            .iter()
            .map(|path| format!("'{path}'"))
            .collect::<Vec<_>>()
            .join(", ");

        let config_entry = interpolate(
            MODERN_ENTRY,
            &[
                ("storiesFilename", STORIES_FILENAME),
                ("previewAnnotations", requires.as_str()),
                ("previewAnnotationPaths", paths.as_str()),
            ],
        )
        // The bundler unescapes once more; Windows paths carry backslashes
        .replace('\\', "\\\\");

        let config_entry_path = self.resolve(CONFIG_ENTRY_FILENAME);
        out.insert(config_entry_path.clone(), config_entry)?;
        out.entries.push(config_entry_path);

        crate::debug_event!("entries", "modern", "{} modules", out.mapping.len());
        Ok(out)
    }

    /// Legacy strategy: framework init, per-annotation config entries and a
    /// `require.context` stories entry when there are specifiers.
    pub fn legacy_virtual_entries(
        &self,
        specifiers: &[NormalizedStoriesSpecifier],
        preview_annotations: &[Option<String>],
        framework_name: &str,
        original_entries: &[String],
    ) -> EntryResult<VirtualEntries> {
        let mut out = VirtualEntries::seeded(original_entries);

        let init_entry = self.resolve(FRAMEWORK_INIT_FILENAME);
        out.insert(init_entry.clone(), format!("import '{framework_name}';"))?;
        out.entries.push(init_entry);

        let runtime = self.runtime.paths();
        for annotation in preview_annotations.iter().flatten() {
            let source = interpolate(
                LEGACY_CONFIG_ENTRY,
                &[
                    ("previewAnnotationFilename", annotation.as_str()),
                    ("clientApi", runtime.client_api.as_str()),
                    ("clientLogger", runtime.client_logger.as_str()),
                ],
            );
            let file_name = format!("{annotation}{CONFIG_ENTRY_SUFFIX}");
            out.insert(file_name.clone(), source)?;
            out.entries.push(file_name);
        }

        if !specifiers.is_empty() {
            let contexts = specifiers
                .iter()
                .map(to_require_context_string)
                .collect::<Vec<_>>()
                .join(",");
            let source = interpolate(LEGACY_STORIES_ENTRY, &[("frameworkName", framework_name)])
                .replacen("'{{stories}}'", &contexts, 1);

            let stories_entry = self.resolve(GENERATED_STORIES_FILENAME);
            out.insert(stories_entry.clone(), source)?;
            out.entries.push(stories_entry);
        }

        crate::debug_event!("entries", "legacy", "{} modules", out.mapping.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, EntrySynthesizer, Vec<NormalizedStoriesSpecifier>) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".storybook")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();

        let synthesizer = EntrySynthesizer::new(Path::new(".storybook"), root);
        let specifiers = vec![
            NormalizedStoriesSpecifier::new(root.join("src"), "**/*.stories.tsx", "", root)
                .unwrap(),
        ];
        (temp_dir, synthesizer, specifiers)
    }

    #[test]
    fn test_modern_entries_order_and_names() {
        let (temp_dir, synthesizer, specifiers) = setup();
        let original = vec!["./polyfills.js".to_string()];

        let out = synthesizer
            .modern_virtual_entries(
                &specifiers,
                &[Some("./preview.js".to_string()), None],
                &BuilderOptions::default(),
                false,
                &original,
            )
            .unwrap();

        let config_dir = temp_dir.path().join(".storybook");
        let stories_path = config_dir.join(STORIES_FILENAME).display().to_string();
        let config_path = config_dir.join(CONFIG_ENTRY_FILENAME).display().to_string();

        assert_eq!(out.mapping.len(), 2);
        assert_eq!(out.entries, vec!["./polyfills.js".to_string(), config_path.clone()]);
        assert!(out.mapping[&stories_path].contains("const pipeline = (x) => x();"));

        let config_entry = &out.mapping[&config_path];
        assert!(config_entry.contains("import { importFn } from './storybook-stories.js';"));
        assert!(config_entry.contains("composeConfigs([require('./preview.js')])"));
    }

    #[test]
    fn test_modern_pipelined_only_in_dev_with_lazy_compilation() {
        let (temp_dir, synthesizer, specifiers) = setup();
        let options = BuilderOptions {
            lazy_compilation: true,
            ..BuilderOptions::default()
        };
        let stories_path = temp_dir
            .path()
            .join(".storybook")
            .join(STORIES_FILENAME)
            .display()
            .to_string();

        let dev = synthesizer
            .modern_virtual_entries(&specifiers, &[], &options, false, &[])
            .unwrap();
        assert!(dev.mapping[&stories_path].contains("importPipeline()"));

        let prod = synthesizer
            .modern_virtual_entries(&specifiers, &[], &options, true, &[])
            .unwrap();
        assert!(!prod.mapping[&stories_path].contains("importPipeline()"));
    }

    #[test]
    fn test_legacy_stories_entry_replaces_quoted_placeholder() {
        let (temp_dir, synthesizer, specifiers) = setup();

        let out = synthesizer
            .legacy_virtual_entries(
                &specifiers,
                &[Some("/app/.storybook/preview.js".to_string())],
                "@storybook/react",
                &[],
            )
            .unwrap();

        let stories_path = temp_dir
            .path()
            .join(".storybook")
            .join(GENERATED_STORIES_FILENAME)
            .display()
            .to_string();
        let source = &out.mapping[&stories_path];
        assert!(source.contains("require('@storybook/react')"));
        assert!(source.contains("configure([require.context('./src', true, /"));
        assert!(!source.contains("{{stories}}"));

        let annotation_entry = &out.mapping["/app/.storybook/preview.js-generated-config-entry.js"];
        assert!(annotation_entry.contains("import * as config from '/app/.storybook/preview.js';"));
        assert!(annotation_entry.contains("from '@storybook/client-api';"));
        assert_eq!(out.entries.len(), 3);
    }
}
