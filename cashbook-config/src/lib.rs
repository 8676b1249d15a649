//! Typed settings for the Cashbook binary.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `CASHBOOK_*` environment variables (`__` separates nested keys, e.g.
//! `CASHBOOK_STORE__PATH`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cashbook_core::CurrencyCode;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "CASHBOOK";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub ledger: LedgerSettings,
    pub logging: LoggingConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local and empty at startup; everything is lost on exit. Each
    /// CLI invocation gets a fresh store, so only read-only previews are useful.
    Memory,
    #[default]
    Sqlite,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from("cashbook.db"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Currency profit totals are reported in.
    pub reference_currency: CurrencyCode,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            reference_currency: CurrencyCode::cad(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load settings from `path` (if given and present) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        let settings = builder
            .add_source(env)
            .build()
            .context("failed to assemble configuration sources")?;
        settings
            .try_deserialize()
            .context("invalid cashbook configuration")
    }

    /// Render the effective settings back as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
