//! Layered configuration loading.
//!
//! Sources, later ones winning:
//!
//! 1. [`AppConfig::default`]
//! 2. one config file: the path given to [`ConfigLoader::file`], or else the
//!    first `wschannel.<ext>` or `config.<ext>` found in the search
//!    directories (the working directory, then `<config dir>/wschannel`)
//! 3. `WSCHANNEL_*` environment variables, with `__` between nested keys, so
//!    `WSCHANNEL_SERVER__PORT=9000` sets `server.port`
//! 4. providers passed to [`ConfigLoader::merge`]
//!
//! TOML needs the `toml-config` feature (enabled by default) and YAML needs
//! `yaml-config`.
//!
//! ```rust,ignore
//! use figment::providers::Serialized;
//! use wschannel_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .maybe_file(args.config)
//!     .merge(Serialized::default("server.port", 9000))
//!     .load_validated()?;
//! ```

use std::path::{Path, PathBuf};

use figment::providers::{Env, Serialized};
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
use figment::{Figment, Provider};
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::AppConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "WSCHANNEL_";

const FILE_STEMS: &[&str] = &["wschannel", "config"];

/// Recognised file extensions, in search order.
const EXTENSIONS: &[&str] = &[
    #[cfg(feature = "toml-config")]
    "toml",
    #[cfg(feature = "yaml-config")]
    "yaml",
    #[cfg(feature = "yaml-config")]
    "yml",
];

/// Where the config file comes from.
enum FileSource {
    /// Search these directories, or the default ones when empty.
    Search(Vec<PathBuf>),
    /// Exactly this file, which must exist.
    Explicit(PathBuf),
}

/// Builder over the configuration sources of a program.
pub struct ConfigLoader {
    file: FileSource,
    env: bool,
    overrides: Vec<Figment>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: FileSource::Search(Vec::new()),
            env: true,
            overrides: Vec::new(),
        }
    }

    /// Searches `dir` for a config file instead of the default directories.
    ///
    /// May be called several times. Has no effect once [`file`](Self::file)
    /// was set.
    pub fn search_path(mut self, dir: impl AsRef<Path>) -> Self {
        if let FileSource::Search(dirs) = &mut self.file {
            dirs.push(dir.as_ref().to_path_buf());
        }
        self
    }

    /// Loads exactly this file. Loading fails if it does not exist.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = FileSource::Explicit(path.as_ref().to_path_buf());
        self
    }

    /// [`file`](Self::file) when `path` is `Some`, the search otherwise.
    pub fn maybe_file(self, path: Option<impl AsRef<Path>>) -> Self {
        match path {
            Some(path) => self.file(path),
            None => self,
        }
    }

    /// Ignores `WSCHANNEL_*` environment variables.
    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Adds a provider that overrides every other source.
    pub fn merge(mut self, provider: impl Provider) -> Self {
        self.overrides.push(Figment::from(provider));
        self
    }

    /// Extracts the merged configuration without validating it.
    pub fn load(self) -> ConfigResult<AppConfig> {
        let config: AppConfig = self.figment()?.extract().map_err(Box::new)?;

        debug!(
            logging_level = %config.logging.level,
            server_addr = %config.server.bind_addr(),
            client_url = %config.client.url,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// [`load`](Self::load) followed by [`validate_config`].
    pub fn load_validated(self) -> ConfigResult<AppConfig> {
        let config = self.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        match self.file.resolve()? {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                figment = merge_file(figment, &path)?;
            }
            None => warn!("No configuration file found, using defaults"),
        }

        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(self
            .overrides
            .into_iter()
            .fold(figment, |figment, layer| figment.merge(layer)))
    }
}

impl FileSource {
    fn resolve(&self) -> ConfigResult<Option<PathBuf>> {
        match self {
            Self::Explicit(path) if path.exists() => Ok(Some(path.clone())),
            Self::Explicit(path) => Err(ConfigError::FileNotFound(path.clone())),
            Self::Search(dirs) if dirs.is_empty() => Ok(find_file(&default_dirs())),
            Self::Search(dirs) => Ok(find_file(dirs)),
        }
    }
}

fn default_dirs() -> Vec<PathBuf> {
    std::env::current_dir()
        .ok()
        .into_iter()
        .chain(dirs::config_dir().map(|dir| dir.join("wschannel")))
        .collect()
}

/// First existing `<dir>/<stem>.<ext>`; directories take precedence over
/// stems, stems over extensions.
fn find_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| {
            FILE_STEMS.iter().flat_map(move |stem| {
                EXTENSIONS
                    .iter()
                    .map(move |ext| dir.join(format!("{stem}.{ext}")))
            })
        })
        .find(|path| path.is_file())
}

#[cfg_attr(
    not(any(feature = "toml-config", feature = "yaml-config")),
    allow(unused_variables)
)]
fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    match path.extension().and_then(|ext| ext.to_str()) {
        #[cfg(feature = "toml-config")]
        Some("toml") => Ok(figment.merge(figment::providers::Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        Some("yaml" | "yml") => Ok(figment.merge(figment::providers::Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Loads and validates the configuration from the default locations.
pub fn load_config() -> ConfigResult<AppConfig> {
    ConfigLoader::new().load_validated()
}

/// Loads and validates the configuration from `path`.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<AppConfig> {
    ConfigLoader::new().file(path).load_validated()
}
