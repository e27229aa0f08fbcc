//! TOML-based settings for the monitor.
//!
//! Settings are loaded from `~/.sparkplug-monitor/settings.toml` with
//! environment variable interpolation support. Values missing from the file
//! can still come from the environment through `get_with_env_fallback`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sparkplug_monitor::settings::{get_with_env_fallback, SettingsManager, TOKEN_ENV_VARS};
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get().await;
//!
//! let token = get_with_env_fallback(&settings.backend.bearer_token, TOKEN_ENV_VARS, None);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{
    get_with_env_fallback, resolve_base_url, settings_path, SettingsManager, TOKEN_ENV_VARS,
    URL_ENV_VARS,
};
pub use schema::{
    BackendSettings, LoggingSettings, MonitorSettings, ServerSettings, SessionSettings,
    DEFAULT_BASE_URL,
};
