//! The story index generator.
//!
//! Owns the canonical [`StoryIndex`]. The first [`get_index`] scans every
//! specifier root; afterwards [`invalidate`] patches single files. Readers
//! always receive an `Arc` snapshot: mutations build a new map and swap the
//! pointer, so a reader never sees a half-applied invalidation.
//!
//! [`get_index`]: StoryIndexGenerator::get_index
//! [`invalidate`]: StoryIndexGenerator::invalidate

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use super::csf::extract_entries;
use super::error::{IndexError, IndexResult};
use super::paths::to_import_path;
use super::specifier::NormalizedStoriesSpecifier;
use super::types::{StoryIndex, StoryIndexEntry};

type Stories = IndexMap<String, StoryIndexEntry>;

/// Maintains the versioned story index.
#[derive(Debug)]
pub struct StoryIndexGenerator {
    specifiers: Vec<NormalizedStoriesSpecifier>,
    working_dir: PathBuf,
    /// `None` until the first build completes
    state: RwLock<Option<Arc<StoryIndex>>>,
    /// Serializes the build and every invalidation; readers never take it
    writer: Mutex<()>,
}

impl StoryIndexGenerator {
    pub fn new(specifiers: Vec<NormalizedStoriesSpecifier>, working_dir: PathBuf) -> Self {
        Self {
            specifiers,
            working_dir,
            state: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    pub fn specifiers(&self) -> &[NormalizedStoriesSpecifier] {
        &self.specifiers
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Latest snapshot without triggering a build.
    pub fn snapshot(&self) -> Option<Arc<StoryIndex>> {
        self.state.read().clone()
    }

    /// Build the index on first call, return the cached snapshot afterwards.
    pub fn get_index(&self) -> IndexResult<Arc<StoryIndex>> {
        if let Some(index) = self.snapshot() {
            return Ok(index);
        }

        let _writer = self.writer.lock();
        // Another caller may have finished the build while we waited
        if let Some(index) = self.snapshot() {
            return Ok(index);
        }

        let index = Arc::new(StoryIndex {
            v: 1,
            stories: self.scan()?,
        });
        crate::log_event!(
            "index",
            "built",
            "{} entries from {} specifiers",
            index.story_count(),
            self.specifiers.len()
        );
        *self.state.write() = Some(index.clone());
        Ok(index)
    }

    /// Patch the entries of one file.
    ///
    /// `removed` drops every entry whose import path is `path`'s; otherwise
    /// the file is re-extracted under `specifier` and replaces its previous
    /// entries. Before the first build this is a no-op: the build will read
    /// the file as it is then. An invalidation arriving during the build
    /// waits for it and applies on top.
    ///
    /// Blocks on file I/O; call it off the async workers.
    pub fn invalidate(&self, specifier: &NormalizedStoriesSpecifier, path: &Path, removed: bool) {
        let _writer = self.writer.lock();
        let Some(current) = self.snapshot() else {
            crate::debug_event!("index", "invalidate before build", "{}", path.display());
            return;
        };

        let import_path = to_import_path(path, &self.working_dir);
        let mut stories = current.stories.clone();
        let before = stories.len();
        stories.retain(|_, entry| entry.import_path != import_path);
        let dropped = before - stories.len();

        let added = if removed {
            crate::debug_event!("index", "removed", "{import_path} ({dropped} entries)");
            0
        } else {
            match extract_entries(path, specifier, &self.working_dir)
                .and_then(|entries| insert_file_entries(&mut stories, &import_path, entries))
            {
                Ok(added) => {
                    crate::debug_event!("index", "updated", "{import_path} ({added} entries)");
                    added
                }
                Err(e) => {
                    tracing::warn!("[index] skipping {import_path}: {e}");
                    0
                }
            }
        };

        if dropped == 0 && added == 0 {
            crate::debug_event!("index", "unchanged", "{import_path}");
            return;
        }

        *self.state.write() = Some(Arc::new(StoryIndex {
            v: current.v + 1,
            stories,
        }));
    }

    /// Walk every specifier root and extract all matching files.
    fn scan(&self) -> IndexResult<Stories> {
        let files = self.discover()?;

        // Extraction is independent per file; insertion order stays deterministic
        let extracted: Vec<_> = files
            .par_iter()
            .map(|(index, path)| {
                let specifier = &self.specifiers[*index];
                (path, extract_entries(path, specifier, &self.working_dir))
            })
            .collect();

        let mut stories = Stories::new();
        for (path, result) in extracted {
            let import_path = to_import_path(path, &self.working_dir);
            if let Err(e) =
                result.and_then(|entries| insert_file_entries(&mut stories, &import_path, entries))
            {
                tracing::warn!("[index] skipping {import_path}: {e}");
            }
        }
        Ok(stories)
    }

    /// Files paired with the index of the first specifier that claims them.
    fn discover(&self) -> IndexResult<Vec<(usize, PathBuf)>> {
        let mut seen = std::collections::HashSet::new();
        let mut files = Vec::new();

        for (index, specifier) in self.specifiers.iter().enumerate() {
            if !specifier.root().is_dir() {
                return Err(IndexError::MissingDirectory {
                    specifier: format!("{}/{}", specifier.directory, specifier.files),
                    directory: specifier.root().to_path_buf(),
                });
            }

            let walker = WalkBuilder::new(specifier.root())
                .hidden(true)
                .git_ignore(false)
                .git_global(false)
                .git_exclude(false)
                .ignore(false)
                .follow_links(false)
                .sort_by_file_name(|a, b| a.cmp(b))
                .filter_entry(|entry| entry.file_name() != "node_modules")
                .build();

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!("[index] walk error: {e}");
                        continue;
                    }
                };
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    continue;
                }
                let path = entry.into_path();
                if specifier.matches(&path) && seen.insert(path.clone()) {
                    files.push((index, path));
                }
            }
        }

        crate::debug_event!("index", "discovered", "{} files", files.len());
        Ok(files)
    }
}

/// Insert one file's entries, all or nothing.
///
/// An id already owned by a different file rejects the whole file.
fn insert_file_entries(
    stories: &mut Stories,
    import_path: &str,
    entries: Vec<StoryIndexEntry>,
) -> IndexResult<usize> {
    for entry in &entries {
        if let Some(existing) = stories.get(&entry.id) {
            if existing.import_path != import_path {
                return Err(IndexError::DuplicateId {
                    id: entry.id.clone(),
                    import_path: import_path.to_string(),
                    existing: existing.import_path.clone(),
                });
            }
        }
    }

    let count = entries.len();
    for entry in entries {
        stories.insert(entry.id.clone(), entry);
    }
    Ok(count)
}
