//! CLI bootstrap - load settings, set up logging, pick a transport.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::session::{HttpTransport, RecordedTransport, SessionConfig, Transport};
use crate::settings::{resolve_base_url, BackendSettings, MonitorSettings, SettingsManager};

use super::args::Args;

/// Context for CLI execution.
pub struct CliContext {
    /// Settings manager
    pub settings_manager: Arc<SettingsManager>,

    /// Settings as loaded (env references resolved)
    pub settings: MonitorSettings,

    /// Command-line arguments
    pub args: Args,
}

impl CliContext {
    /// Backend settings with command line overrides applied.
    ///
    /// URL priority: `--url`, settings file, `SPARKPLUG_MONITOR_URL`, default.
    /// Token priority: `--token`, settings file, `SPARKPLUG_MONITOR_TOKEN`.
    pub fn backend(&self) -> BackendSettings {
        let mut backend = self.settings.backend.clone();

        backend.base_url = Some(match &self.args.url {
            Some(url) => url.clone(),
            None => resolve_base_url(&backend),
        });

        if let Some(token) = &self.args.token {
            backend.bearer_token = Some(token.clone());
        }
        backend
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from(&self.settings.session)
    }

    /// The transport for this run: recorded files with `--replay`, HTTP otherwise.
    pub fn transport(&self) -> Result<Arc<dyn Transport>> {
        if let Some(replay) = &self.args.replay {
            let transport = RecordedTransport::from_files(self.args.snapshot.as_deref(), replay)?;
            return Ok(transport.into_shared());
        }

        let backend = self.backend();
        let transport = HttpTransport::from_settings(&backend)
            .with_context(|| format!("Invalid backend URL '{}'", resolve_base_url(&backend)))?;
        if self.args.verbose {
            eprintln!("[cli] Backend: {}", transport.base_url());
        }
        Ok(Arc::new(transport))
    }

    /// Bind address and port for `--serve`.
    #[cfg(feature = "server")]
    pub fn server_addr(&self) -> (String, u16) {
        (
            self.settings.server.bind.clone(),
            self.args.port.unwrap_or(self.settings.server.port),
        )
    }
}

/// Initialize the CLI context.
pub async fn initialize(args: &Args) -> Result<CliContext> {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is fine
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("[cli] Failed to load .env file: {}", e);
        }
    }

    let settings_manager = match &args.config {
        Some(path) => SettingsManager::with_path(path.clone()).await,
        None => SettingsManager::new().await,
    }
    .context("Failed to initialize settings manager")?;

    let settings = settings_manager.get().await;
    init_logging(&settings.logging.filter, args.verbose);

    if args.config.is_none() {
        if let Err(e) = settings_manager.ensure_settings_file().await {
            tracing::warn!("[settings] could not write template: {}", e);
        }
    }

    if args.verbose {
        eprintln!(
            "[cli] Settings loaded from {}",
            settings_manager.path().display()
        );
    }

    Ok(CliContext {
        settings_manager: Arc::new(settings_manager),
        settings,
        args: args.clone(),
    })
}

/// Install the global subscriber. Logs go to stderr.
///
/// `--verbose` forces debug output; otherwise `RUST_LOG` wins over the
/// configured filter.
fn init_logging(filter: &str, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("sparkplug_monitor=debug,sparkplug_sse=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
