//! Story specifiers: where story files live.
//!
//! Raw entries come from configuration either as a single glob
//! (`"../src/**/*.stories.@(js|tsx)"`) or as an explicit table with a
//! directory, a files glob and an optional title prefix. Normalization
//! splits globs into a static directory plus a files pattern, resolves the
//! directory against the config directory and compiles a matcher.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use super::error::{IndexError, IndexResult};
use super::paths::{absolutize, slash, to_import_path};

/// Files glob used when a specifier names only a directory.
pub const DEFAULT_FILES: &str = "**/*.@(mdx|stories.@(js|jsx|mjs|ts|tsx))";

const GLOB_CHARS: &[char] = &['*', '?', '[', ']', '{', '}', '(', ')', '!'];

/// A story specifier as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoriesEntry {
    Glob(String),
    Specifier {
        directory: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        files: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title_prefix: Option<String>,
    },
}

impl StoriesEntry {
    fn describe(&self) -> String {
        match self {
            StoriesEntry::Glob(glob) => glob.clone(),
            StoriesEntry::Specifier {
                directory, files, ..
            } => format!("{directory}/{}", files.as_deref().unwrap_or(DEFAULT_FILES)),
        }
    }
}

/// A resolved specifier with a compiled matcher.
#[derive(Debug, Clone)]
pub struct NormalizedStoriesSpecifier {
    /// Prepended to every title derived under this specifier
    pub title_prefix: String,
    /// Root directory as an import path (`./src`)
    pub directory: String,
    /// Files glob relative to `directory`, brace-alternation form
    pub files: String,
    root: PathBuf,
    matcher: GlobSet,
}

impl NormalizedStoriesSpecifier {
    /// Build a specifier from an absolute root and a files glob.
    pub fn new(
        root: PathBuf,
        files: &str,
        title_prefix: &str,
        working_dir: &Path,
    ) -> IndexResult<Self> {
        let files = extglob_to_braces(files);
        let invalid = |e: globset::Error| IndexError::InvalidPattern {
            pattern: files.clone(),
            reason: e.to_string(),
        };

        // globset rejects nested alternation, so match against the expanded set
        let mut builder = GlobSetBuilder::new();
        for pattern in expand_braces(&files) {
            builder.add(
                GlobBuilder::new(&pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(invalid)?,
            );
        }
        let matcher = builder.build().map_err(invalid)?;

        Ok(Self {
            title_prefix: title_prefix.trim_end_matches('/').to_string(),
            directory: to_import_path(&root, working_dir),
            files,
            root,
            matcher,
        })
    }

    /// Absolute root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `path` relative to the root, if it lies below it.
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok()
    }

    /// Whether an absolute path is a story file of this specifier.
    ///
    /// Anything under `node_modules` or a hidden entry below the root is
    /// never a story file, whatever the glob says.
    pub fn matches(&self, path: &Path) -> bool {
        self.relative(path).is_some_and(|relative| {
            !relative.components().any(|component| is_excluded(component.as_os_str()))
                && self.matcher.is_match(relative)
        })
    }

    /// JavaScript regex source matching import paths of this specifier.
    ///
    /// Matches `./src/Button.stories.tsx` style paths, leading `./` optional
    /// for a `.` directory.
    pub fn import_path_regex(&self) -> String {
        let directory = self.directory.trim_end_matches('/');
        format!(
            "^{}\\/{}$",
            escape_js_regex(directory),
            glob_to_js_regex(&self.files)
        )
    }

    /// JavaScript regex source for a `require.context` rooted at `directory`.
    pub fn context_regex(&self) -> String {
        format!("^\\.\\/{}$", glob_to_js_regex(&self.files))
    }
}

impl PartialEq for NormalizedStoriesSpecifier {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.files == other.files
            && self.title_prefix == other.title_prefix
    }
}

/// Normalize raw configuration entries.
///
/// Every directory must exist; the first missing one aborts normalization.
pub fn normalize_stories(
    entries: &[StoriesEntry],
    config_dir: &Path,
    working_dir: &Path,
) -> IndexResult<Vec<NormalizedStoriesSpecifier>> {
    let config_dir = absolutize(config_dir, working_dir);

    entries
        .iter()
        .map(|entry| normalize_entry(entry, &config_dir, working_dir))
        .collect()
}

fn normalize_entry(
    entry: &StoriesEntry,
    config_dir: &Path,
    working_dir: &Path,
) -> IndexResult<NormalizedStoriesSpecifier> {
    let missing = |directory: PathBuf| IndexError::MissingDirectory {
        specifier: entry.describe(),
        directory,
    };

    let (root, files, title_prefix) = match entry {
        StoriesEntry::Glob(glob) => {
            let (base, files) = split_glob(glob);
            let resolved = absolutize(Path::new(&base), config_dir);
            match files {
                Some(files) => (resolved, files, String::new()),
                None if resolved.is_dir() => (resolved, DEFAULT_FILES.to_string(), String::new()),
                None => {
                    // A single file: its directory is the root
                    let file_name = resolved
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .ok_or_else(|| missing(resolved.clone()))?;
                    let parent = resolved
                        .parent()
                        .map(Path::to_path_buf)
                        .ok_or_else(|| missing(resolved.clone()))?;
                    (parent, file_name, String::new())
                }
            }
        }
        StoriesEntry::Specifier {
            directory,
            files,
            title_prefix,
        } => (
            absolutize(Path::new(directory), config_dir),
            files.clone().unwrap_or_else(|| DEFAULT_FILES.to_string()),
            title_prefix.clone().unwrap_or_default(),
        ),
    };

    if !root.is_dir() {
        return Err(missing(root));
    }

    NormalizedStoriesSpecifier::new(root, &files, &title_prefix, working_dir)
}

/// Split a glob into its static directory prefix and the pattern remainder.
///
/// Returns `None` for the pattern when the glob has no metacharacters.
pub fn split_glob(glob: &str) -> (String, Option<String>) {
    let normalized = glob.replace('\\', "/");
    let segments: Vec<&str> = normalized.split('/').collect();

    match segments
        .iter()
        .position(|segment| segment.contains(GLOB_CHARS))
    {
        Some(index) => {
            let base = segments[..index].join("/");
            let base = if base.is_empty() { ".".to_string() } else { base };
            (base, Some(segments[index..].join("/")))
        }
        None => (normalized, None),
    }
}

/// Rewrite extglob alternation `@(a|b)` into brace alternation `{a,b}`.
///
/// Plain parentheses and `|` outside an extglob group are left alone.
pub fn extglob_to_braces(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len());
    // true for groups opened by `@(`
    let mut groups: Vec<bool> = Vec::new();
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '@' if chars.peek() == Some(&'(') => {
                chars.next();
                groups.push(true);
                out.push('{');
            }
            '(' => {
                groups.push(false);
                out.push('(');
            }
            ')' => match groups.pop() {
                Some(true) => out.push('}'),
                _ => out.push(')'),
            },
            '|' if groups.last() == Some(&true) => out.push(','),
            other => out.push(other),
        }
    }

    out
}

/// Expand every `{a,b}` group into separate patterns, nested groups included.
pub fn expand_braces(glob: &str) -> Vec<String> {
    let Some(open) = glob.find('{') else {
        return vec![glob.to_string()];
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut alternatives = Vec::new();
    let mut start = open + 1;
    for (offset, c) in glob[open..].char_indices() {
        let index = open + offset;
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    alternatives.push(&glob[start..index]);
                    close = Some(index);
                    break;
                }
            }
            ',' if depth == 1 => {
                alternatives.push(&glob[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }

    // Unbalanced: leave it for the glob compiler to reject
    let Some(close) = close else {
        return vec![glob.to_string()];
    };

    let prefix = &glob[..open];
    let suffix = &glob[close + 1..];
    alternatives
        .into_iter()
        .flat_map(|alternative| expand_braces(&format!("{prefix}{alternative}{suffix}")))
        .collect()
}

/// `node_modules` and dot-entries, skipped by both the scan and the watcher.
fn is_excluded(name: &OsStr) -> bool {
    name == "node_modules" || name.to_str().is_some_and(|name| name.starts_with('.'))
}

fn escape_js_regex(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len() * 2);
    for c in literal.chars() {
        if "\\^$.|?*+()[]{}/".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Translate a brace-form glob into JavaScript regex source (no anchors).
pub fn glob_to_js_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    let mut brace_depth = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:[^/]*\\/)*");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                out.push(')');
            }
            ',' if brace_depth > 0 => out.push('|'),
            '[' => {
                // Copy character classes verbatim
                let end = chars[i..].iter().position(|&ch| ch == ']').map(|p| p + i);
                match end {
                    Some(end) => {
                        out.extend(&chars[i..=end]);
                        i = end + 1;
                        continue;
                    }
                    None => out.push_str("\\["),
                }
            }
            other => out.push_str(&escape_js_regex(&other.to_string())),
        }
        i += 1;
    }

    out
}

/// Compact display form of a specifier root for logs.
pub fn display_root(specifier: &NormalizedStoriesSpecifier) -> String {
    slash(specifier.root())
}
