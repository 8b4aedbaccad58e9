//! Locations of the client runtime packages the legacy entries import.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::stories::slash;

pub const CLIENT_API: &str = "@storybook/client-api";
pub const CLIENT_LOGGER: &str = "@storybook/client-logger";

/// Resolved package directories, looked up on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub client_api: String,
    pub client_logger: String,
}

/// Resolves [`RuntimePaths`] once per instance.
#[derive(Debug)]
pub struct RuntimeResolver {
    working_dir: PathBuf,
    paths: OnceLock<RuntimePaths>,
}

impl RuntimeResolver {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            paths: OnceLock::new(),
        }
    }

    pub fn paths(&self) -> &RuntimePaths {
        self.paths.get_or_init(|| {
            let paths = RuntimePaths {
                client_api: package_dir(CLIENT_API, &self.working_dir),
                client_logger: package_dir(CLIENT_LOGGER, &self.working_dir),
            };
            crate::debug_event!("entries", "runtime paths", "{paths:?}");
            paths
        })
    }
}

/// Directory of `package` as found by walking up from `from` through
/// `node_modules` folders. Falls back to the bare package name so the
/// bundler can try its own resolution.
pub fn package_dir(package: &str, from: &Path) -> String {
    find_package(package, from)
        .map(|dir| slash(&dir))
        .unwrap_or_else(|| package.to_string())
}

/// Nearest `node_modules/<package>` with a `package.json`, from `from` upwards.
pub fn find_package(package: &str, from: &Path) -> Option<PathBuf> {
    from.ancestors()
        .map(|dir| dir.join("node_modules").join(package))
        .find(|candidate| candidate.join("package.json").is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_package_dir_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let package = root.join("node_modules/@storybook/client-api");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join("package.json"), "{}").unwrap();
        fs::create_dir_all(root.join("packages/app")).unwrap();

        assert_eq!(
            package_dir(CLIENT_API, &root.join("packages/app")),
            slash(&package)
        );
    }

    #[test]
    fn test_unresolved_package_falls_back_to_name() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = RuntimeResolver::new(temp_dir.path());

        assert_eq!(resolver.paths().client_logger, CLIENT_LOGGER);
        // Cached: creating the package afterwards changes nothing
        let package = temp_dir.path().join("node_modules/@storybook/client-logger");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join("package.json"), "{}").unwrap();
        assert_eq!(resolver.paths().client_logger, CLIENT_LOGGER);
    }
}
