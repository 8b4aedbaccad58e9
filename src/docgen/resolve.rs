//! Module request resolution with TypeScript-aware extension fallback.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions tried in priority order when a request has none that exists.
pub const RESOLVE_EXTENSIONS: &[&str] = &[
    ".js", ".cts", ".mts", ".ctsx", ".mtsx", ".ts", ".tsx", ".mjs", ".cjs", ".jsx",
];

/// Errors from module resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Bare package requests are not followed.
    #[error("'{0}' was ignored by docgen.")]
    Ignored(String),

    #[error("Cannot resolve '{request}' from {basedir}")]
    NotFound { request: String, basedir: PathBuf },
}

impl ResolveError {
    /// Code docgen uses to recognize an ignored module.
    pub fn code(&self) -> &'static str {
        "MODULE_NOT_FOUND"
    }
}

/// Resolve `request` relative to `basedir`.
///
/// ES modules written in TypeScript import siblings with `.js` extensions;
/// when the literal request fails, `.js/.mjs/.cjs` are retried as
/// `.ts/.mts/.cts` and `.jsx` as `.tsx`.
pub fn lookup_module(request: &str, basedir: &Path) -> Result<PathBuf, ResolveError> {
    let is_relative = request.starts_with("./") || request.starts_with("../");
    if !is_relative && !Path::new(request).is_absolute() {
        return Err(ResolveError::Ignored(request.to_string()));
    }

    if let Some(found) = resolve_file(request, basedir) {
        return Ok(found);
    }

    let fallback = if let Some(stem) = request.strip_suffix(".jsx") {
        Some(format!("{stem}.tsx"))
    } else if request.ends_with(".js") || request.ends_with(".mjs") || request.ends_with(".cjs") {
        // Drop the trailing `js`: `.js` -> `.ts`, `.mjs` -> `.mts`, `.cjs` -> `.cts`
        Some(format!("{}ts", &request[..request.len() - 2]))
    } else {
        None
    };

    fallback
        .and_then(|fallback| resolve_file(&fallback, basedir))
        .ok_or_else(|| ResolveError::NotFound {
            request: request.to_string(),
            basedir: basedir.to_path_buf(),
        })
}

fn resolve_file(request: &str, basedir: &Path) -> Option<PathBuf> {
    let candidate = basedir.join(request);
    if candidate.is_file() {
        return Some(candidate);
    }

    let with_extension = RESOLVE_EXTENSIONS.iter().find_map(|ext| {
        let mut os = candidate.clone().into_os_string();
        os.push(ext);
        let path = PathBuf::from(os);
        path.is_file().then_some(path)
    });
    if with_extension.is_some() {
        return with_extension;
    }

    if candidate.is_dir() {
        return RESOLVE_EXTENSIONS.iter().find_map(|ext| {
            let index = candidate.join(format!("index{ext}"));
            index.is_file().then_some(index)
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolves_extension_in_priority_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("Button.tsx"), "").unwrap();
        fs::write(root.join("Button.ts"), "").unwrap();

        let resolved = lookup_module("./Button", root).unwrap();
        assert_eq!(resolved, root.join("./Button.ts"));
    }

    #[test]
    fn test_js_request_falls_back_to_typescript() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("Card.ts"), "").unwrap();
        fs::write(root.join("Badge.tsx"), "").unwrap();
        fs::write(root.join("util.mts"), "").unwrap();

        assert_eq!(lookup_module("./Card.js", root).unwrap(), root.join("./Card.ts"));
        assert_eq!(lookup_module("./Badge.jsx", root).unwrap(), root.join("./Badge.tsx"));
        assert_eq!(lookup_module("./util.mjs", root).unwrap(), root.join("./util.mts"));
    }

    #[test]
    fn test_directory_index() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Menu")).unwrap();
        fs::write(root.join("Menu/index.tsx"), "").unwrap();

        assert_eq!(
            lookup_module("./Menu", root).unwrap(),
            root.join("./Menu").join("index.tsx")
        );
    }

    #[test]
    fn test_bare_request_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let error = lookup_module("react", temp_dir.path()).unwrap_err();
        assert!(matches!(error, ResolveError::Ignored(_)));
        assert_eq!(error.code(), "MODULE_NOT_FOUND");
    }

    #[test]
    fn test_missing_module() {
        let temp_dir = TempDir::new().unwrap();
        let error = lookup_module("./Nope.js", temp_dir.path()).unwrap_err();
        assert!(matches!(error, ResolveError::NotFound { .. }));
    }
}
