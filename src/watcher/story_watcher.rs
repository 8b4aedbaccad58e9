//! Filesystem watcher feeding changes into the story index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::WatchError;
use super::roots::{owning_specifier, watch_roots};
use crate::stories::{NormalizedStoriesSpecifier, StoryIndexGenerator};
use crate::stories::paths::absolutize;

/// Callback run after the generator has been invalidated.
///
/// Arguments: owning specifier, changed path, whether the file is gone.
pub type OnChange = dyn Fn(&NormalizedStoriesSpecifier, &Path, bool) + Send + Sync;

/// Watches every specifier root recursively.
///
/// Each matching change invalidates the generator and then runs the
/// callback. Events are neither buffered nor reordered. Watching stops
/// when the watcher is dropped or [`stop`](Self::stop) is called.
pub struct StoryWatcher {
    /// Kept alive for the lifetime of the watch
    _watcher: notify::RecommendedWatcher,
    roots: Vec<PathBuf>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl StoryWatcher {
    /// Start watching. Must be called inside a tokio runtime.
    pub fn watch(
        generator: Arc<StoryIndexGenerator>,
        working_dir: &Path,
        on_change: impl Fn(&NormalizedStoriesSpecifier, &Path, bool) + Send + Sync + 'static,
    ) -> Result<Self, WatchError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

        let (tx, rx) = mpsc::channel(100);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver gone means the watcher is shutting down
            let _ = tx.blocking_send(res);
        })?;

        let roots = watch_roots(generator.specifiers());
        for root in &roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: root.clone(),
                    reason: e.to_string(),
                })?;
            crate::debug_event!("watcher", "watching", "{}", root.display());
        }
        crate::log_event!("watcher", "started", "{} directories", roots.len());

        let token = CancellationToken::new();
        let event_loop = EventLoop {
            generator,
            working_dir: working_dir.to_path_buf(),
            on_change: Box::new(on_change),
        };
        let task = handle.spawn(Arc::new(event_loop).run(rx, token.clone()));

        Ok(Self {
            _watcher: watcher,
            roots,
            token,
            task,
        })
    }

    /// Directories being watched.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.task.is_finished()
    }
}

impl Drop for StoryWatcher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for StoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryWatcher")
            .field("roots", &self.roots)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

struct EventLoop {
    generator: Arc<StoryIndexGenerator>,
    working_dir: PathBuf,
    on_change: Box<OnChange>,
}

impl EventLoop {
    async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<notify::Result<Event>>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                res = rx.recv() => match res {
                    // Invalidation reads files; awaiting keeps events in order
                    Some(Ok(event)) => {
                        let this = self.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || this.handle_event(event)).await {
                            tracing::error!("[watcher] event handler failed: {e}");
                        }
                    }
                    Some(Err(e)) => tracing::error!("[watcher] file watch error: {e}"),
                    None => break,
                },
            }
        }
        crate::debug_event!("watcher", "stopped");
    }

    fn handle_event(&self, event: Event) {
        // Reads would otherwise echo every scan back as a change
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }

        let is_remove = matches!(event.kind, EventKind::Remove(_));
        for path in &event.paths {
            let path = absolutize(path, &self.working_dir);
            let Some(specifier) = owning_specifier(self.generator.specifiers(), &path) else {
                crate::debug_event!(
                    "watcher",
                    "unmatched",
                    "{:?} {}",
                    event.kind,
                    path.display()
                );
                continue;
            };

            // Renames and atomic saves surface as modify events on vanished paths
            let removed = is_remove || !path.exists();
            crate::debug_event!(
                "watcher",
                if removed { "removed" } else { "changed" },
                "{}",
                path.display()
            );

            self.generator.invalidate(specifier, &path, removed);
            (self.on_change)(specifier, &path, removed);
        }
    }
}
