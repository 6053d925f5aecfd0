//! Per-user settings in `~/.name_that_yankee.json`.

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::gemini::DEFAULT_MODEL;

const CONFIG_FILE_NAME: &str = ".name_that_yankee.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_project_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub request_interval_secs: u64,
    pub headless: bool,
    pub settle_delay_ms: u64,
    pub navigation_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            last_project_path: None,
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            request_interval_secs: 5,
            headless: true,
            settle_delay_ms: 2000,
            navigation_timeout_secs: 30,
            max_attempts: 3,
            retry_backoff_secs: 5,
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("could not locate home directory")?;
        Ok(home.join(CONFIG_FILE_NAME))
    }

    /// Load from the user's home directory, falling back to defaults.
    pub fn load() -> Self {
        match Self::path() {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                warn!("{:#}; using default settings", e);
                Self::default()
            }
        }
    }

    /// A missing or unreadable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        let parsed: Result<Self> = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from));
        match parsed {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), "could not read config ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save failures are logged, never fatal.
    pub fn save(&self) {
        match Self::path() {
            Ok(path) => self.save_to(&path),
            Err(e) => warn!("{:#}; settings not saved", e),
        }
    }

    pub fn save_to(&self, path: &Path) {
        let result = serde_json::to_string_pretty(self)
            .map_err(anyhow::Error::from)
            .and_then(|json| fs::write(path, json + "\n").map_err(anyhow::Error::from));
        if let Err(e) = result {
            warn!(path = %path.display(), "could not save config: {}", e);
        }
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_secs(self.request_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

/// Find the Gemini API key: environment, then config, then ask.
///
/// A key typed at the prompt is stored in `config`; the caller decides
/// whether to save it.
pub fn resolve_api_key<R, W>(
    config: &mut Config,
    env: impl Fn(&str) -> Option<String>,
    input: &mut R,
    output: &mut W,
) -> Result<String>
where
    R: BufRead,
    W: Write,
{
    let from_env = ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .iter()
        .find_map(|var| env(*var).filter(|v| !v.trim().is_empty()));
    if let Some(key) = from_env {
        return Ok(key.trim().to_string());
    }

    if let Some(key) = config.gemini_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        return Ok(key.trim().to_string());
    }

    write!(output, "Enter your Gemini API key: ")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("no Gemini API key provided");
    }
    let key = line.trim();
    if key.is_empty() {
        bail!("no Gemini API key provided");
    }
    config.gemini_api_key = Some(key.to_string());
    Ok(key.to_string())
}
