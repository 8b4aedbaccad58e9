//! Which directories to watch and which specifier owns a path.

use std::path::{Path, PathBuf};

use crate::stories::NormalizedStoriesSpecifier;

/// Minimal set of directories covering every specifier root.
///
/// Roots nested inside another root are dropped since the outer one is
/// watched recursively. Output is sorted.
pub fn watch_roots(specifiers: &[NormalizedStoriesSpecifier]) -> Vec<PathBuf> {
    let mut candidates: Vec<&Path> = specifiers.iter().map(|s| s.root()).collect();
    candidates.sort_by_key(|path| path.components().count());

    let mut roots: Vec<PathBuf> = Vec::new();
    for candidate in candidates {
        if !roots.iter().any(|root| candidate.starts_with(root)) {
            roots.push(candidate.to_path_buf());
        }
    }
    roots.sort();
    roots
}

/// First specifier, in declaration order, whose root contains `path` and
/// whose files glob matches it.
pub fn owning_specifier<'a>(
    specifiers: &'a [NormalizedStoriesSpecifier],
    path: &Path,
) -> Option<&'a NormalizedStoriesSpecifier> {
    specifiers.iter().find(|specifier| specifier.matches(path))
}
