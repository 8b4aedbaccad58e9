//! Path utilities for import path computation
//!
//! Import paths are what the preview uses to load a story file: relative to the
//! working directory, `./`-prefixed and `/`-separated on every platform.
//! All functions use `Path` APIs for the structural work and only switch to
//! strings for the final rendering.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Make `path` absolute against `base` and normalize it.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_lexically(path)
    } else {
        normalize_lexically(&base.join(path))
    }
}

/// Relative path from directory `from` to `to`. Both must be absolute.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component.as_os_str());
    }
    out
}

/// Render a path with forward slashes.
pub fn slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}

/// Import path of a file as seen from the working directory.
///
/// ```text
/// /work/src/Button.stories.tsx  ->  ./src/Button.stories.tsx
/// /elsewhere/x.stories.js       ->  ../elsewhere/x.stories.js
/// ```
pub fn to_import_path(path: &Path, working_dir: &Path) -> String {
    let absolute = absolutize(path, working_dir);
    let relative = relative_path(&normalize_lexically(working_dir), &absolute);
    let rendered = slash(&relative);

    if rendered.is_empty() {
        ".".to_string()
    } else if rendered.starts_with("..") {
        rendered
    } else {
        format!("./{rendered}")
    }
}
