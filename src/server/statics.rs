//! User static directories.
//!
//! Each configured entry is `dir` (served at the site root) or
//! `dir:/mount` (served below `/mount`).

use std::path::{Path, PathBuf};

use thiserror::Error;
use tower_http::services::ServeDir;

use super::DevRouter;
use crate::stories::paths::absolutize;

#[derive(Error, Debug)]
pub enum StaticDirError {
    #[error("Failed to load static files, no such directory: {path}")]
    Missing { path: PathBuf },
}

/// One parsed static directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMount {
    pub dir: PathBuf,
    /// `/` for the site root, otherwise `/segment[/segment]` without a trailing slash
    pub mount: String,
}

/// Split `dir:/mount`. A colon only separates when followed by `/`, so
/// Windows drive letters stay part of the directory.
pub fn parse_static_dir(entry: &str, working_dir: &Path) -> StaticMount {
    let (dir, mount) = match entry.rfind(":/") {
        Some(at) if at > 1 || !entry.starts_with(|c: char| c.is_ascii_alphabetic()) => {
            (&entry[..at], &entry[at + 1..])
        }
        _ => (entry, "/"),
    };

    let mount = mount.trim_end_matches('/');
    StaticMount {
        dir: absolutize(Path::new(dir), working_dir),
        mount: if mount.is_empty() {
            "/".to_string()
        } else {
            mount.to_string()
        },
    }
}

/// Mount every static directory on `router`. Missing directories are an error.
pub fn mount_static_dirs(
    router: &DevRouter,
    static_dirs: &[PathBuf],
    working_dir: &Path,
) -> Result<Vec<StaticMount>, StaticDirError> {
    let mut mounts = Vec::with_capacity(static_dirs.len());
    for entry in static_dirs {
        let parsed = parse_static_dir(&entry.to_string_lossy(), working_dir);
        if !parsed.dir.is_dir() {
            return Err(StaticDirError::Missing { path: parsed.dir });
        }
        mounts.push(parsed);
    }

    for mount in &mounts {
        crate::log_event!(
            "server",
            "static",
            "{} at {}",
            mount.dir.display(),
            mount.mount
        );
        if mount.mount == "/" {
            router.serve_root(mount.dir.clone());
        } else {
            router.nest_service(&mount.mount, ServeDir::new(&mount.dir));
        }
    }
    Ok(mounts)
}
