//! Settings loading and environment variable interpolation.
//!
//! Settings live in `~/.sparkplug-monitor/settings.toml` unless `--config`
//! names another file. String values of the form `$VAR` or `${VAR}` are
//! replaced by the environment variable when it is set. A commented template
//! is written on first run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use super::schema::{BackendSettings, MonitorSettings, DEFAULT_BASE_URL};

/// Written by `ensure_settings_file` when no settings file exists yet.
const TEMPLATE: &str = include_str!("template.toml");

/// Environment variables consulted when no backend URL is configured.
pub const URL_ENV_VARS: &[&str] = &["SPARKPLUG_MONITOR_URL"];

/// Environment variables consulted when no bearer token is configured.
pub const TOKEN_ENV_VARS: &[&str] = &["SPARKPLUG_MONITOR_TOKEN"];

/// Default settings location under the home directory.
pub fn settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sparkplug-monitor")
        .join("settings.toml")
}

/// Owns the settings file path and the parsed, env-resolved settings.
pub struct SettingsManager {
    /// Parsed settings, `$VAR` references already substituted
    settings: RwLock<MonitorSettings>,

    path: PathBuf,
}

impl SettingsManager {
    /// Load from [`settings_path`]. A missing file yields defaults.
    pub async fn new() -> Result<Self> {
        Self::with_path(settings_path()).await
    }

    /// Load from an explicit file (`--config`).
    pub async fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = Self::load_from_path(&path).await?;

        Ok(Self {
            settings: RwLock::new(settings),
            path,
        })
    }

    async fn load_from_path(path: &Path) -> Result<MonitorSettings> {
        if !path.exists() {
            tracing::debug!("[settings] {:?} missing, using defaults", path);
            return Ok(MonitorSettings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings file {:?}", path))?;

        let mut settings: MonitorSettings =
            toml::from_str(&contents).with_context(|| format!("Invalid settings in {:?}", path))?;

        Self::resolve_env_vars(&mut settings);

        tracing::info!("[settings] loaded {:?}", path);
        Ok(settings)
    }

    /// Substitute `$VAR` references in every string field that may hold one.
    fn resolve_env_vars(settings: &mut MonitorSettings) {
        fn resolve(value: &mut String) {
            if let Some(resolved) = resolve_env_ref(value) {
                *value = resolved;
            }
        }

        if let Some(url) = &mut settings.backend.base_url {
            resolve(url);
        }
        resolve(&mut settings.backend.snapshot_path);
        resolve(&mut settings.backend.stream_path);
        if let Some(token) = &mut settings.backend.bearer_token {
            resolve(token);
        }
        resolve(&mut settings.server.bind);
        resolve(&mut settings.logging.filter);
    }

    /// Snapshot of the current settings.
    pub async fn get(&self) -> MonitorSettings {
        self.settings.read().await.clone()
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the commented template if the file is missing.
    ///
    /// Returns whether a file was written.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        tokio::fs::write(&self.path, TEMPLATE).await?;
        tracing::info!("[settings] wrote template to {:?}", self.path);
        Ok(true)
    }

    /// Re-read the file and replace the cached settings.
    pub async fn reload(&self) -> Result<()> {
        let settings = Self::load_from_path(&self.path).await?;
        *self.settings.write().await = settings;
        Ok(())
    }
}

/// Value of the variable named by a `$VAR` / `${VAR}` string, if it is set.
fn resolve_env_ref(value: &str) -> Option<String> {
    let reference = value.trim().strip_prefix('$')?;

    let var_name = reference
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(reference);

    std::env::var(var_name).ok()
}

/// First non-empty value of: the setting, the listed environment variables
/// in order, then `default`.
pub fn get_with_env_fallback(
    setting: &Option<String>,
    env_vars: &[&str],
    default: Option<String>,
) -> Option<String> {
    setting
        .iter()
        .filter(|v| !v.is_empty())
        .cloned()
        .chain(
            env_vars
                .iter()
                .filter_map(|name| std::env::var(name).ok())
                .filter(|v| !v.is_empty()),
        )
        .next()
        .or(default)
}

/// Backend URL: the configured value, then [`URL_ENV_VARS`], then
/// [`DEFAULT_BASE_URL`].
pub fn resolve_base_url(backend: &BackendSettings) -> String {
    get_with_env_fallback(&backend.base_url, URL_ENV_VARS, None)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_ref_forms() {
        std::env::set_var("SPM_REF_HOST", "http://plant-gw:9000");

        assert_eq!(
            resolve_env_ref("$SPM_REF_HOST").as_deref(),
            Some("http://plant-gw:9000")
        );
        assert_eq!(
            resolve_env_ref("  ${SPM_REF_HOST} ").as_deref(),
            Some("http://plant-gw:9000")
        );

        std::env::remove_var("SPM_REF_HOST");
    }

    #[test]
    fn test_env_ref_ignores_plain_and_unset_values() {
        assert_eq!(resolve_env_ref("http://localhost:8080"), None);
        assert_eq!(resolve_env_ref("$SPM_REF_NEVER_SET"), None);
        assert_eq!(resolve_env_ref("${SPM_REF_NEVER_SET}"), None);
    }

    #[test]
    fn test_fallback_prefers_setting() {
        std::env::set_var("SPM_FALLBACK_URL_A", "http://env:1");
        let result = get_with_env_fallback(
            &Some("http://file:2".to_string()),
            &["SPM_FALLBACK_URL_A"],
            None,
        );
        assert_eq!(result.as_deref(), Some("http://file:2"));
        std::env::remove_var("SPM_FALLBACK_URL_A");
    }

    #[test]
    fn test_fallback_walks_env_vars_in_order() {
        std::env::set_var("SPM_FALLBACK_URL_C", "");
        std::env::set_var("SPM_FALLBACK_URL_D", "http://env:4");

        // Empty setting and empty variables are skipped
        let result = get_with_env_fallback(
            &Some(String::new()),
            &["SPM_FALLBACK_URL_B", "SPM_FALLBACK_URL_C", "SPM_FALLBACK_URL_D"],
            None,
        );
        assert_eq!(result.as_deref(), Some("http://env:4"));

        std::env::remove_var("SPM_FALLBACK_URL_C");
        std::env::remove_var("SPM_FALLBACK_URL_D");
    }

    #[test]
    fn test_fallback_default() {
        let result = get_with_env_fallback(
            &None,
            &["SPM_FALLBACK_URL_UNSET"],
            Some("http://localhost:8080".to_string()),
        );
        assert_eq!(result.as_deref(), Some("http://localhost:8080"));
        assert_eq!(get_with_env_fallback(&None, &[], None), None);
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::with_path(dir.path().join("settings.toml"))
            .await
            .unwrap();

        assert!(!manager.exists());
        assert_eq!(manager.get().await, MonitorSettings::default());
    }

    #[tokio::test]
    async fn test_load_resolves_env_refs() {
        std::env::set_var("SPM_LOADER_TOKEN", "secret-token");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r#"
                [backend]
                base_url = "http://gateway:9000"
                bearer_token = "${SPM_LOADER_TOKEN}"
            "#,
        )
        .unwrap();

        let settings = SettingsManager::with_path(&path).await.unwrap().get().await;
        assert_eq!(settings.backend.base_url.as_deref(), Some("http://gateway:9000"));
        assert_eq!(settings.backend.bearer_token.as_deref(), Some("secret-token"));
        assert_eq!(settings.backend.snapshot_path, "/api/groups");

        std::env::remove_var("SPM_LOADER_TOKEN");
    }

    #[test]
    fn test_resolve_base_url_priority() {
        let configured = BackendSettings {
            base_url: Some("http://file:2".to_string()),
            ..BackendSettings::default()
        };
        assert_eq!(resolve_base_url(&configured), "http://file:2");

        // an empty value counts as unset
        let empty = BackendSettings {
            base_url: Some(String::new()),
            ..BackendSettings::default()
        };
        assert!(!resolve_base_url(&empty).is_empty());
    }

    #[tokio::test]
    async fn test_ensure_settings_file_writes_template_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let manager = SettingsManager::with_path(&path).await.unwrap();

        assert!(manager.ensure_settings_file().await.unwrap());
        assert!(!manager.ensure_settings_file().await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), TEMPLATE);
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let manager = SettingsManager::with_path(&path).await.unwrap();

        std::fs::write(&path, "[session]\nmessage_log_capacity = 5\n").unwrap();
        manager.reload().await.unwrap();

        assert_eq!(manager.get().await.session.message_log_capacity, 5);
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[backend\nbase_url = 1").unwrap();

        assert!(SettingsManager::with_path(&path).await.is_err());
    }
}
