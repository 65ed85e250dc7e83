//! Layered configuration loading with figment.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. Programmatic defaults passed to [`ConfigLoader::merge`]
//! 3. Profile file, e.g. `courier.production.toml`
//! 4. Main file, `courier.toml` (or `courier.yaml` / `courier.yml` with `yaml-config`)
//! 5. `COURIER_*` environment variables, nested with `__`
//!
//! Files are searched in the working directory, then in the user config
//! directory (`~/.config/courier` on Linux), unless search paths are given.
//! The first directory holding a main file wins.
//!
//! ```text
//! COURIER_CLIENT__TIMEOUT_MS=5000          client.timeout_ms = 5000
//! COURIER_SCHEDULER__BACKPRESSURE=reject   scheduler.backpressure = "reject"
//! COURIER_DISPATCH__BOT_USERNAME=shop_bot  dispatch.bot_username = "shop_bot"
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::CourierConfig;

const ENV_PREFIX: &str = "COURIER_";
const PROFILE_VAR: &str = "COURIER_PROFILE";
const DEFAULT_PROFILE: &str = "development";

/// File extensions searched for, in order.
const EXTENSIONS: &[&str] = &[
    #[cfg(feature = "toml-config")]
    "toml",
    #[cfg(feature = "yaml-config")]
    "yaml",
    #[cfg(feature = "yaml-config")]
    "yml",
];

/// Canonical profile name: `prod` and `dev` are accepted as short forms.
fn profile_name(raw: &str) -> String {
    match raw.trim().to_lowercase().as_str() {
        "prod" | "production" => "production".to_string(),
        "" | "dev" | "development" => DEFAULT_PROFILE.to_string(),
        other => other.to_string(),
    }
}

/// Loads a [`CourierConfig`].
///
/// ```rust,ignore
/// let config = ConfigLoader::new()
///     .profile("production")
///     .file("deploy/courier.toml")
///     .load()?;
/// ```
pub struct ConfigLoader {
    overrides: Figment,
    profile: String,
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    load_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Profile comes from `COURIER_PROFILE`, defaulting to `development`.
    pub fn new() -> Self {
        let profile = std::env::var(PROFILE_VAR)
            .map(|p| profile_name(&p))
            .unwrap_or_else(|_| DEFAULT_PROFILE.to_string());
        Self {
            overrides: Figment::new(),
            profile,
            search_paths: Vec::new(),
            file: None,
            load_env: true,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = profile_name(profile.as_ref());
        self
    }

    pub fn profile_name(&self) -> &str {
        &self.profile
    }

    /// Searches `path` for config files. Replaces the default locations.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching. It must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Layers `config` over the built-in defaults. Files and env vars still
    /// take precedence.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    pub fn load(mut self) -> ConfigResult<CourierConfig> {
        let overrides = std::mem::take(&mut self.overrides);
        let mut figment =
            Figment::from(Serialized::defaults(CourierConfig::default())).merge(overrides);

        figment = match &self.file {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration file");
                merge_file(figment, path)?
            }
            Some(path) => return Err(ConfigError::FileNotFound(path.clone())),
            None => self.merge_found_files(figment)?,
        };

        if self.load_env {
            figment = figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .split("__")
                    .ignore(&["PROFILE"]),
            );
        }

        let config: CourierConfig = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        debug!(
            profile = %self.profile,
            level = %config.logging.level,
            workers = config.scheduler.workers,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("courier")))
            .collect()
    }

    /// Merges the profile file and main file of the first directory that
    /// has a main file.
    fn merge_found_files(&self, figment: Figment) -> ConfigResult<Figment> {
        for dir in self.search_paths() {
            for ext in EXTENSIONS {
                let main = dir.join(format!("courier.{ext}"));
                if !main.exists() {
                    continue;
                }

                let mut figment = figment;
                let profile = dir.join(format!("courier.{}.{ext}", self.profile));
                if profile.exists() {
                    debug!(path = %profile.display(), profile = %self.profile, "Loading profile file");
                    figment = merge_file(figment, &profile)?;
                }
                info!(path = %main.display(), "Loading configuration file");
                return merge_file(figment, &main);
            }
        }

        warn!("No configuration file found, using defaults");
        Ok(figment)
    }
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}
