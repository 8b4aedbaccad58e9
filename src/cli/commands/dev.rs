//! Dev command: run the dev server until interrupted.

use std::sync::Arc;

use anyhow::Context;

use crate::builder::{CommandBuilder, Target};
use crate::cli::DevArgs;
use crate::config::Settings;
use crate::dev_server::DevServer;
use crate::plugins::PluginRegistry;

/// Fold command-line overrides into the loaded settings.
pub fn apply_overrides(settings: &mut Settings, args: &DevArgs) {
    let server = &mut settings.server;
    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(host) = &args.host {
        server.host = Some(host.clone());
    }
    server.static_dirs.extend(args.static_dirs.iter().cloned());
    server.ci |= args.ci;
    server.smoke_test |= args.smoke_test;
    server.ignore_preview |= args.ignore_preview;
    server.debug_config |= args.debug_config;
    if args.no_open {
        server.open = false;
    }
    settings.core.disable_telemetry |= args.disable_telemetry;
}

pub async fn run(args: DevArgs, mut settings: Settings) -> anyhow::Result<()> {
    apply_overrides(&mut settings, &args);

    let working_dir = settings.working_dir();
    let plugins = PluginRegistry::from_settings(&settings, &working_dir);
    let preview = Arc::new(CommandBuilder::from_settings(
        Target::Preview,
        &settings,
        plugins.names(),
    ));
    let manager = Arc::new(CommandBuilder::from_settings(
        Target::Manager,
        &settings,
        plugins.names(),
    ));
    let smoke_test = settings.server.smoke_test;

    let output = DevServer::new(settings, preview, manager)
        .with_plugins(plugins)
        .start()
        .await
        .context("dev server failed to start")?;

    println!("storydev {} started", env!("CARGO_PKG_VERSION"));
    if let Some(preview) = &output.preview {
        println!("  preview  {:.2?}", preview.elapsed);
    }
    println!("  manager  {:.2?}", output.manager.elapsed);
    println!();
    println!("  Local:            {}", output.address);
    println!("  On your network:  {}", output.network_address);

    if smoke_test {
        return output.handle.shutdown().await.map_err(Into::into);
    }
    output.handle.wait().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_overrides() {
        let mut settings = Settings::default();
        settings.server.static_dirs.push(PathBuf::from("./public"));
        let args = DevArgs {
            port: Some(7007),
            no_open: true,
            static_dirs: vec![PathBuf::from("./assets:/static")],
            disable_telemetry: true,
            ..DevArgs::default()
        };

        apply_overrides(&mut settings, &args);
        assert_eq!(settings.server.port, 7007);
        assert!(!settings.server.open);
        assert_eq!(settings.server.static_dirs.len(), 2);
        assert!(settings.core.disable_telemetry);
        assert!(settings.server.host.is_none());
    }
}
