//! # veto-agent
//!
//! Map veto server binary: loads settings, initializes logging and metrics,
//! and serves the overlay/control-panel sync server until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use veto_core::SessionStore;
use veto_server::config::ServerConfig;
use veto_server::server::VetoServer;
use veto_settings::VetoSettings;

/// Map veto session server.
#[derive(Parser, Debug)]
#[command(name = "veto", about = "Map veto session sync server", version)]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.veto/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory of static overlay assets; empty disables serving.
    #[arg(long)]
    static_dir: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut VetoSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.static_dir {
            settings.server.static_dir = (!dir.trim().is_empty()).then(|| dir.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(veto_settings::settings_path);
    let mut settings = veto_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    veto_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics_handle =
        veto_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let store = Arc::new(SessionStore::new(settings.session.clone()));
    let config = ServerConfig::from(&settings.server);
    if let Some(dir) = config.static_dir.as_ref().filter(|d| !d.is_dir()) {
        tracing::warn!(path = %dir.display(), "static asset directory not found");
    }

    let server = VetoServer::new(config, store).with_metrics(metrics_handle);
    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!(
        %addr,
        settings = %settings_path.display(),
        organization = %settings.session.organization_name,
        "veto server ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    server.shutdown().graceful_shutdown(Some(handle), None).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_untouched() {
        let cli = Cli::parse_from(["veto"]);
        let mut settings = VetoSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 11201);
        assert_eq!(settings.server.static_dir.as_deref(), Some("public"));
    }

    #[test]
    fn cli_overrides() {
        let cli = Cli::parse_from([
            "veto",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--static-dir",
            "/srv/overlay",
        ]);
        let mut settings = VetoSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.static_dir.as_deref(), Some("/srv/overlay"));
    }

    #[test]
    fn empty_static_dir_disables_assets() {
        let cli = Cli::parse_from(["veto", "--static-dir", ""]);
        let mut settings = VetoSettings::default();
        cli.apply(&mut settings);
        assert!(settings.server.static_dir.is_none());
    }

    #[test]
    fn settings_flag_parses_path() {
        let cli = Cli::parse_from(["veto", "--settings", "/tmp/veto.json"]);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/veto.json")));
    }

    #[test]
    fn settings_file_feeds_server_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"port":4000,"maxConnections":8}}"#).unwrap();
        let settings = veto_settings::load_settings_from_path(&path).unwrap();
        let config = ServerConfig::from(&settings.server);
        assert_eq!(config.port, 4000);
        assert_eq!(config.max_connections, 8);
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(Cli::try_parse_from(["veto", "--port", "70000"]).is_err());
    }
}
