//! Builder backed by an external bundler process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

use super::{Builder, BuilderConfig, BuilderError, BuilderOutput, StartContext, Target};
use crate::config::{CommandConfig, Settings};
use crate::entries::EntrySynthesizer;
use crate::stories::normalize_stories;
use crate::stories::paths::absolutize;

/// Target name (`preview` or `manager`).
pub const ENV_TARGET: &str = "STORYDEV_TARGET";
/// Port of the dev server.
pub const ENV_PORT: &str = "STORYDEV_PORT";
/// Path of the JSON `BuilderConfig` written before spawning.
pub const ENV_MANIFEST: &str = "STORYDEV_MANIFEST";

type StdoutLines = Lines<BufReader<ChildStdout>>;

/// Spawns the configured bundler and reports ready when its output says so.
///
/// With a `ready_pattern`, `start` resolves on the first stdout line that
/// matches and the process keeps running in the background. Without one,
/// `start` waits for the process to exit successfully.
pub struct CommandBuilder {
    target: Target,
    command: Option<CommandConfig>,
    plugins: Vec<String>,
    synthesizer: OnceLock<EntrySynthesizer>,
    token: CancellationToken,
}

impl CommandBuilder {
    pub fn new(target: Target, command: Option<CommandConfig>, plugins: Vec<String>) -> Self {
        Self {
            target,
            command,
            plugins,
            synthesizer: OnceLock::new(),
            token: CancellationToken::new(),
        }
    }

    /// Builder for `target` as configured in `settings.builders`.
    pub fn from_settings(target: Target, settings: &Settings, plugins: Vec<String>) -> Self {
        let command = match target {
            Target::Preview => settings.builders.preview.clone(),
            Target::Manager => settings.builders.manager.clone(),
        };
        Self::new(target, command, plugins)
    }

    fn write_manifest(
        &self,
        options: &Settings,
        config: &BuilderConfig,
    ) -> Result<PathBuf, BuilderError> {
        let cache_dir = absolutize(&options.core.cache_dir, &options.working_dir());
        let path = cache_dir.join(format!("{}-manifest.json", self.target));

        let json = serde_json::to_vec_pretty(config)?;
        std::fs::create_dir_all(&cache_dir)
            .and_then(|_| std::fs::write(&path, json))
            .map_err(|source| BuilderError::Manifest {
                path: path.clone(),
                source,
            })?;

        crate::debug_event!(self.target.as_str(), "manifest", "{}", path.display());
        Ok(path)
    }

    fn spawn(
        &self,
        command: &CommandConfig,
        ctx: &StartContext,
        manifest: &Path,
    ) -> Result<Child, BuilderError> {
        let cwd = command
            .cwd
            .as_ref()
            .map(|cwd| absolutize(cwd, &ctx.options.working_dir()))
            .unwrap_or_else(|| ctx.options.working_dir());

        let child = Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .env(ENV_TARGET, self.target.as_str())
            .env(ENV_PORT, ctx.port.to_string())
            .env(ENV_MANIFEST, manifest)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuilderError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        crate::log_event!(
            self.target.as_str(),
            "spawned",
            "{} (pid {})",
            command.program,
            child.id().unwrap_or_default()
        );
        Ok(child)
    }
}

#[async_trait]
impl Builder for CommandBuilder {
    fn target(&self) -> Target {
        self.target
    }

    async fn start(&self, ctx: StartContext) -> Result<BuilderOutput, BuilderError> {
        let target = self.target;
        let command = self
            .command
            .as_ref()
            .ok_or(BuilderError::NotConfigured { target })?;

        let ready = command
            .ready_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| BuilderError::InvalidPattern {
                pattern: command.ready_pattern.clone().unwrap_or_default(),
                reason: e.to_string(),
            })?;

        let config = self.config(&ctx.options).await?;
        let manifest = self.write_manifest(&ctx.options, &config)?;
        let mut child = self.spawn(command, &ctx, &manifest)?;

        let stdout = child.stdout.take().ok_or_else(|| BuilderError::Failed {
            target,
            reason: "stdout was not captured".to_string(),
        })?;
        let mut lines = BufReader::new(stdout).lines();

        let ready_line = tokio::select! {
            // Dropping the child kills it
            _ = self.token.cancelled() => return Err(BuilderError::Bailed { target }),
            outcome = wait_ready(&mut child, &mut lines, ready.as_ref(), target) => outcome?,
        };

        let output = BuilderOutput::new(target, ctx.start_time);
        match ready_line {
            Some(line) => {
                tokio::spawn(supervise(child, lines, self.token.clone(), target));
                crate::log_event!(target.as_str(), "ready", "{line}");
                Ok(output.with_detail(line))
            }
            None => {
                crate::log_event!(target.as_str(), "finished");
                Ok(output)
            }
        }
    }

    async fn config(&self, options: &Settings) -> Result<BuilderConfig, BuilderError> {
        let working_dir = options.working_dir();
        let config_dir = options.resolved_config_dir();

        let virtual_entries = match self.target {
            Target::Preview => {
                let specifiers = normalize_stories(&options.stories, &config_dir, &working_dir)?;
                let synthesizer = self
                    .synthesizer
                    .get_or_init(|| EntrySynthesizer::new(&config_dir, &working_dir));
                let annotations: Vec<Option<String>> =
                    options.preview_annotations.iter().cloned().map(Some).collect();

                let entries = if options.features.story_store_v7 {
                    synthesizer.modern_virtual_entries(
                        &specifiers,
                        &annotations,
                        &options.builder,
                        false,
                        &[],
                    )?
                } else {
                    synthesizer.legacy_virtual_entries(
                        &specifiers,
                        &annotations,
                        &options.framework.name,
                        &[],
                    )?
                };
                Some(entries)
            }
            Target::Manager => None,
        };

        Ok(BuilderConfig {
            target: self.target,
            config_dir,
            working_dir,
            framework: options.framework.name.clone(),
            builder_options: options.builder.clone(),
            svelte: options.svelte_options(),
            plugins: self.plugins.clone(),
            static_dirs: options.server.static_dirs.clone(),
            virtual_entries,
        })
    }

    async fn bail(&self, error: &BuilderError) {
        tracing::warn!("[{}] bailing: {error}", self.target);
        self.token.cancel();
    }
}

impl Drop for CommandBuilder {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Read stdout until the ready line, or until exit when there is no pattern.
///
/// `Some(line)` means the process is still running.
async fn wait_ready(
    child: &mut Child,
    lines: &mut StdoutLines,
    ready: Option<&Regex>,
    target: Target,
) -> Result<Option<String>, BuilderError> {
    let read_failed = |e: std::io::Error| BuilderError::Failed {
        target,
        reason: e.to_string(),
    };

    while let Some(line) = lines.next_line().await.map_err(read_failed)? {
        crate::debug_event!(target.as_str(), "stdout", "{line}");
        if ready.is_some_and(|pattern| pattern.is_match(&line)) {
            return Ok(Some(line));
        }
    }

    let status = child.wait().await.map_err(read_failed)?;
    if status.success() {
        Ok(None)
    } else {
        Err(BuilderError::Exited {
            target,
            code: status.code(),
        })
    }
}

/// Keep draining output of a ready process until it exits or is cancelled.
async fn supervise(mut child: Child, mut lines: StdoutLines, token: CancellationToken, target: Target) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("[{target}] failed to stop bundler: {e}");
                }
                crate::debug_event!(target.as_str(), "stopped");
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => crate::debug_event!(target.as_str(), "stdout", "{line}"),
                _ => break,
            },
        }
    }

    match child.wait().await {
        Ok(status) if status.success() => crate::log_event!(target.as_str(), "exited"),
        Ok(status) => tracing::warn!("[{target}] bundler exited with {status}"),
        Err(e) => tracing::warn!("[{target}] bundler wait failed: {e}"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::channel::ServerChannel;
    use crate::server::DevRouter;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn settings(temp_dir: &TempDir) -> Settings {
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join(".storybook")).unwrap();
        Settings {
            working_dir: Some(root.to_path_buf()),
            ..Settings::default()
        }
    }

    fn context(settings: Settings) -> StartContext {
        StartContext {
            start_time: Instant::now(),
            options: Arc::new(settings),
            router: DevRouter::new(),
            channel: ServerChannel::default(),
            port: 4321,
        }
    }

    fn shell(script: &str, ready_pattern: Option<&str>) -> Option<CommandConfig> {
        Some(CommandConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: Default::default(),
            ready_pattern: ready_pattern.map(str::to_string),
            cwd: None,
        })
    }

    #[tokio::test]
    async fn test_ready_pattern_resolves_start() {
        let temp_dir = TempDir::new().unwrap();
        let builder = CommandBuilder::new(
            Target::Manager,
            shell(
                "echo compiling; echo \"ready on $STORYDEV_PORT ($STORYDEV_TARGET)\"; sleep 5",
                Some(r"^ready on \d+"),
            ),
            Vec::new(),
        );

        let output = builder.start(context(settings(&temp_dir))).await.unwrap();
        assert_eq!(output.target, Target::Manager);
        assert_eq!(output.detail.as_deref(), Some("ready on 4321 (manager)"));
    }

    #[tokio::test]
    async fn test_failing_process_is_exited_error() {
        let temp_dir = TempDir::new().unwrap();
        let builder = CommandBuilder::new(Target::Preview, shell("exit 3", None), Vec::new());

        let error = builder.start(context(settings(&temp_dir))).await.unwrap_err();
        assert!(matches!(
            error,
            BuilderError::Exited {
                target: Target::Preview,
                code: Some(3)
            }
        ));
    }

    #[tokio::test]
    async fn test_bail_interrupts_start() {
        let temp_dir = TempDir::new().unwrap();
        let builder = Arc::new(CommandBuilder::new(
            Target::Preview,
            shell("sleep 10", Some("never printed")),
            Vec::new(),
        ));

        let running = {
            let builder = builder.clone();
            let ctx = context(settings(&temp_dir));
            tokio::spawn(async move { builder.start(ctx).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let cause = BuilderError::Failed {
            target: Target::Manager,
            reason: "boom".to_string(),
        };
        builder.bail(&cause).await;

        let result = running.await.unwrap();
        assert!(matches!(result, Err(BuilderError::Bailed { .. })));
    }

    #[tokio::test]
    async fn test_manifest_carries_virtual_entries() {
        let temp_dir = TempDir::new().unwrap();
        let builder = CommandBuilder::new(
            Target::Preview,
            shell("test -f \"$STORYDEV_MANIFEST\"", None),
            vec!["svelte-csf".to_string()],
        );

        builder.start(context(settings(&temp_dir))).await.unwrap();

        let manifest_path = temp_dir
            .path()
            .join("node_modules/.cache/storydev/preview-manifest.json");
        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(manifest_path).unwrap()).unwrap();
        assert_eq!(manifest["target"], "preview");
        assert_eq!(manifest["plugins"][0], "svelte-csf");
        assert_eq!(manifest["virtualEntries"]["entries"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_command() {
        let temp_dir = TempDir::new().unwrap();
        let builder = CommandBuilder::new(Target::Manager, None, Vec::new());

        let error = builder.start(context(settings(&temp_dir))).await.unwrap_err();
        assert!(matches!(error, BuilderError::NotConfigured { .. }));
    }
}
