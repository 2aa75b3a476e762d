use anyhow::{Context, Result};
use consumo_classify::{DEFAULT_CONCURRENCY, OracleSettings};
use consumo_core::DEFAULT_SOURCE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// `~/.consumo`, unless overridden (`--home` / `CONSUMO_HOME`).
pub fn consumo_home(overridden: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = overridden {
        return Ok(p.to_path_buf());
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".consumo"))
}

pub fn ensure_home(home: &Path) -> Result<()> {
    fs::create_dir_all(home).with_context(|| format!("create {}", home.display()))
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.toml")
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub oracle: OracleSettings,
    pub pipeline: PipelineSection,
    pub server: ServerSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// `bcp` or `financiero`
    pub profile: String,
    pub concurrency: usize,
    /// Label written to `metadata.fuente`.
    pub source: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            profile: "bcp".to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            source: DEFAULT_SOURCE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Export classified by `GET /clasificar-archivo-default`.
    pub default_export: PathBuf,
    /// Where the latest summary is persisted and reloaded from.
    pub summary_path: PathBuf,
    pub batch_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            default_export: PathBuf::from("bcp-consumos-ultimos-7-dias.json"),
            summary_path: PathBuf::from("consumos_clasificados.json"),
            batch_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Load `config.toml` from `home`; a missing file means all defaults.
    pub fn load(home: &Path) -> Result<Config> {
        let p = config_path(home);
        if !p.exists() {
            return Ok(Config::default());
        }
        let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
        toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
    }

    pub fn save(&self, home: &Path) -> Result<PathBuf> {
        ensure_home(home)?;
        let p = config_path(home);
        let s = toml::to_string_pretty(self).context("serialize config")?;
        fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
        Ok(p)
    }
}

/// Write the default config unless one exists. Returns the path and whether it was written.
pub fn init_config(home: &Path) -> Result<(PathBuf, bool)> {
    let p = config_path(home);
    if p.exists() {
        return Ok((p, false));
    }
    let p = Config::default().save(home)?;
    Ok((p, true))
}
