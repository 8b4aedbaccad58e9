//! Dev server startup.
//!
//! [`DevServer::start`] binds the listener, builds the story index when the
//! feature set needs one, reports telemetry and then starts the preview and
//! manager builders concurrently. A failing manager bails the preview before
//! the error is returned.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builder::{Builder, BuilderError, BuilderOutput, StartContext, Target};
use crate::channel::{InvalidationNotifier, ServerChannel};
use crate::config::Settings;
use crate::plugins::PluginRegistry;
use crate::server::{
    DevRouter, StaticDirError, mount_index_routes, mount_project_route, mount_static_dirs,
    open_in_browser, server_addresses,
};
use crate::stories::{IndexError, StoryIndexGenerator, normalize_stories};
use crate::telemetry::{self, IndexSummary, ProjectMetadata, Telemetry, TelemetryEvent};
use crate::watcher::{StoryWatcher, WatchError};

#[derive(Error, Debug)]
pub enum DevServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Static(#[from] StaticDirError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("{target} builder failed: {source}")]
    Builder {
        target: Target,
        #[source]
        source: BuilderError,
    },

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Configured dev server, ready to start.
pub struct DevServer {
    settings: Arc<Settings>,
    preview: Arc<dyn Builder>,
    manager: Arc<dyn Builder>,
    telemetry: Arc<dyn Telemetry>,
    plugins: PluginRegistry,
}

/// What a successful start produced.
#[derive(Debug)]
pub struct DevServerOutput {
    pub start_time: Instant,
    /// `None` when the preview was skipped
    pub preview: Option<BuilderOutput>,
    pub manager: BuilderOutput,
    pub address: String,
    pub network_address: String,
    pub handle: DevServerHandle,
}

/// Keeps the running server alive.
///
/// Dropping the handle stops the file watcher and releases the builders,
/// but the server task runs until the runtime shuts down; call
/// [`shutdown`](Self::shutdown) to stop everything.
pub struct DevServerHandle {
    local_addr: SocketAddr,
    channel: ServerChannel,
    router: DevRouter,
    generator: Option<Arc<StoryIndexGenerator>>,
    token: CancellationToken,
    server: JoinHandle<std::io::Result<()>>,
    _watcher: Option<StoryWatcher>,
    /// Builders own their processes
    _builders: [Arc<dyn Builder>; 2],
}

/// Index state set up during startup.
struct IndexStage {
    generator: Arc<StoryIndexGenerator>,
    watcher: Option<StoryWatcher>,
    summary: IndexSummary,
}

impl DevServer {
    pub fn new(settings: Settings, preview: Arc<dyn Builder>, manager: Arc<dyn Builder>) -> Self {
        let telemetry = telemetry::from_config(&settings.core);
        Self {
            settings: Arc::new(settings),
            preview,
            manager,
            telemetry,
            plugins: PluginRegistry::new(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start serving and building.
    ///
    /// Resolves once both builders report started. Any error stops the
    /// listener again.
    pub async fn start(self) -> Result<DevServerOutput, DevServerError> {
        let start_time = Instant::now();
        let settings = self.settings.clone();
        let working_dir = settings.working_dir();

        let host = settings.server.host.as_deref().unwrap_or("0.0.0.0");
        let addr = format!("{host}:{}", settings.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| DevServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| DevServerError::Bind { addr, source })?;

        let router = DevRouter::new();
        let channel = ServerChannel::new(settings.server.channel_capacity.get());
        let token = CancellationToken::new();

        mount_static_dirs(&router, &settings.server.static_dirs, &working_dir)?;
        let server = tokio::spawn(serve(listener, router.clone(), token.clone()));
        crate::log_event!("server", "listening", "{local_addr}");

        match self
            .run(start_time, local_addr, &working_dir, &router, &channel)
            .await
        {
            Ok((preview, manager, index)) => {
                let addresses = server_addresses(
                    local_addr.port(),
                    settings.server.host.as_deref(),
                    "http",
                );
                if !settings.server.ci && !settings.server.smoke_test && settings.server.open {
                    let target = if settings.server.host.is_some() {
                        &addresses.network_address
                    } else {
                        &addresses.address
                    };
                    open_in_browser(target);
                }

                crate::log_event!(
                    "server",
                    "started",
                    "{} in {:.2?}",
                    addresses.address,
                    start_time.elapsed()
                );

                let (generator, watcher) = match index {
                    Some(stage) => (Some(stage.generator), stage.watcher),
                    None => (None, None),
                };
                Ok(DevServerOutput {
                    start_time,
                    preview,
                    manager,
                    address: addresses.address,
                    network_address: addresses.network_address,
                    handle: DevServerHandle {
                        local_addr,
                        channel,
                        router,
                        generator,
                        token,
                        server,
                        _watcher: watcher,
                        _builders: [self.preview.clone(), self.manager.clone()],
                    },
                })
            }
            Err(e) => {
                token.cancel();
                Err(e)
            }
        }
    }

    /// Everything after the listener is up.
    async fn run(
        &self,
        start_time: Instant,
        local_addr: SocketAddr,
        working_dir: &Path,
        router: &DevRouter,
        channel: &ServerChannel,
    ) -> Result<(Option<BuilderOutput>, BuilderOutput, Option<IndexStage>), DevServerError> {
        let settings = &self.settings;
        let report = !settings.core.disable_telemetry;

        let index = if settings.features.needs_index() {
            match self.build_index(working_dir, router, channel).await {
                Ok(stage) => Some(stage),
                Err(e) => {
                    if report {
                        self.telemetry.report(TelemetryEvent::start(None));
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        if report {
            self.telemetry
                .report(TelemetryEvent::start(index.as_ref().map(|stage| stage.summary)));
            mount_project_route(router, ProjectMetadata::new(settings, &self.plugins));
        }

        if settings.server.debug_config {
            self.log_builder_configs().await;
        }

        let ctx = StartContext {
            start_time,
            options: settings.clone(),
            router: router.clone(),
            channel: channel.clone(),
            port: local_addr.port(),
        };

        let preview = async {
            if settings.server.ignore_preview {
                crate::log_event!("preview", "skipped");
                return Ok(None);
            }
            self.preview
                .start(ctx.clone())
                .await
                .map(Some)
                .map_err(|source| DevServerError::Builder {
                    target: Target::Preview,
                    source,
                })
        };

        let manager = async {
            match self.manager.start(ctx.clone()).await {
                Ok(output) => Ok(output),
                Err(source) => {
                    tracing::error!("[manager] build failed: {source}");
                    self.preview.bail(&source).await;
                    Err(DevServerError::Builder {
                        target: Target::Manager,
                        source,
                    })
                }
            }
        };

        let (preview, manager) = tokio::try_join!(preview, manager)?;
        Ok((preview, manager, index))
    }

    /// Normalize specifiers, wire watcher and notifier, build the index and
    /// mount the index routes.
    async fn build_index(
        &self,
        working_dir: &Path,
        router: &DevRouter,
        channel: &ServerChannel,
    ) -> Result<IndexStage, DevServerError> {
        let settings = &self.settings;
        let specifiers = normalize_stories(&settings.stories, &settings.config_dir, working_dir)?;
        let generator = Arc::new(StoryIndexGenerator::new(
            specifiers,
            working_dir.to_path_buf(),
        ));

        let watcher = if settings.file_watch.enabled {
            let notifier = InvalidationNotifier::new(channel.clone(), &settings.file_watch);
            let watcher = StoryWatcher::watch(generator.clone(), working_dir, move |_, path, removed| {
                crate::debug_event!("watcher", "changed", "{} (removed: {removed})", path.display());
                notifier.notify();
            })?;
            Some(watcher)
        } else {
            None
        };

        let index = {
            let generator = generator.clone();
            tokio::task::spawn_blocking(move || generator.get_index())
                .await
                .map_err(|e| DevServerError::Task(e.to_string()))??
        };
        mount_index_routes(router, generator.clone());

        Ok(IndexStage {
            generator,
            watcher,
            summary: IndexSummary {
                story_count: index.story_count(),
                version: index.v,
            },
        })
    }

    async fn log_builder_configs(&self) {
        for builder in [&self.preview, &self.manager] {
            let target = builder.target();
            match builder.config(&self.settings).await {
                Ok(config) => match serde_json::to_string_pretty(&config) {
                    Ok(json) => crate::log_event!(target.as_str(), "config", "\n{json}"),
                    Err(e) => tracing::warn!("[{target}] config not serializable: {e}"),
                },
                Err(e) => tracing::warn!("[{target}] config unavailable: {e}"),
            }
        }
    }
}

async fn serve(
    listener: TcpListener,
    router: DevRouter,
    token: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router.into_app())
        .with_graceful_shutdown(token.cancelled_owned())
        .await
}

impl DevServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn channel(&self) -> &ServerChannel {
        &self.channel
    }

    pub fn router(&self) -> &DevRouter {
        &self.router
    }

    /// The story index, when the feature set needed one.
    pub fn generator(&self) -> Option<&Arc<StoryIndexGenerator>> {
        self.generator.as_ref()
    }

    /// Run until Ctrl+C or until the server stops on its own.
    pub async fn wait(mut self) -> Result<(), DevServerError> {
        tokio::select! {
            result = &mut self.server => {
                return flatten(result);
            }
            _ = tokio::signal::ctrl_c() => {
                crate::log_event!("server", "shutting down");
            }
        }
        self.shutdown().await
    }

    /// Stop the server, the watcher and any running builders.
    pub async fn shutdown(self) -> Result<(), DevServerError> {
        self.token.cancel();
        let result = flatten(self.server.await);
        crate::log_event!("server", "stopped");
        result
    }
}

fn flatten(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), DevServerError> {
    result
        .map_err(|e| DevServerError::Task(e.to_string()))?
        .map_err(DevServerError::Server)
}

impl std::fmt::Debug for DevServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServerHandle")
            .field("local_addr", &self.local_addr)
            .field("indexed", &self.generator.is_some())
            .field("watcher", &self._watcher)
            .finish_non_exhaustive()
    }
}
