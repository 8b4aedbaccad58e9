//! Bundler adapters.
//!
//! The dev server drives two builders, one per [`Target`], through the
//! [`Builder`] trait. [`CommandBuilder`] is the shipped implementation; tests
//! and embedders provide their own.

mod command;

pub use command::{CommandBuilder, ENV_MANIFEST, ENV_PORT, ENV_TARGET};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::channel::ServerChannel;
use crate::config::{BuilderOptions, Settings, SvelteOptions};
use crate::entries::{EntryError, VirtualEntries};
use crate::server::DevRouter;
use crate::stories::IndexError;

/// Which bundle a builder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Renders stories in isolation
    Preview,
    /// The UI shell around the preview
    Manager,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Preview => "preview",
            Target::Manager => "manager",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from builder operations.
#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("No {target} builder command configured")]
    NotConfigured { target: Target },

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{target} builder exited with {}", exit_status(.code))]
    Exited { target: Target, code: Option<i32> },

    #[error("{target} build was bailed")]
    Bailed { target: Target },

    #[error("Invalid ready pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to write manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Entries(#[from] EntryError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{target} build failed: {reason}")]
    Failed { target: Target, reason: String },
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Everything a builder gets to start with.
#[derive(Debug, Clone)]
pub struct StartContext {
    pub start_time: Instant,
    pub options: Arc<Settings>,
    /// Routes added here are served immediately
    pub router: DevRouter,
    pub channel: ServerChannel,
    /// Port the dev server actually listens on
    pub port: u16,
}

/// Result of a successful start.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderOutput {
    pub target: Target,
    /// Time from dev server start until this builder was ready
    pub elapsed: Duration,
    /// Builder-specific detail, e.g. the line that signalled readiness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BuilderOutput {
    pub fn new(target: Target, start_time: Instant) -> Self {
        Self {
            target,
            elapsed: start_time.elapsed(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Resolved configuration handed to a bundler.
///
/// Written as the `STORYDEV_MANIFEST` JSON file for command builders and
/// printed with `debug_config`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderConfig {
    pub target: Target,
    pub config_dir: PathBuf,
    pub working_dir: PathBuf,
    pub framework: String,
    pub builder_options: BuilderOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svelte: Option<SvelteOptions>,
    pub plugins: Vec<String>,
    pub static_dirs: Vec<PathBuf>,
    /// Preview only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_entries: Option<VirtualEntries>,
}

/// A bundler adapter for one target.
#[async_trait]
pub trait Builder: Send + Sync {
    fn target(&self) -> Target;

    /// Start compiling; resolves once the bundle is being served.
    async fn start(&self, ctx: StartContext) -> Result<BuilderOutput, BuilderError>;

    /// Configuration this builder would run with.
    async fn config(&self, options: &Settings) -> Result<BuilderConfig, BuilderError>;

    /// Abort an in-flight build because of `error` elsewhere.
    async fn bail(&self, error: &BuilderError);
}
