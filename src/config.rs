//! Configuration for the `rawline` binary.
//!
//! Read from `~/.rawline.toml` unless `--config` names another file:
//!
//! ```toml
//! prompt = "> "
//! history_file = "~/.rawline_history"
//! exit_keyword = "exit"
//!
//! [terminal]
//! cbreak = true
//! enable_vt = true
//! install_signal_handlers = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::line::Options;

const CONFIG_FILE: &str = ".rawline.toml";
const HISTORY_FILE: &str = ".rawline_history";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub prompt: String,
    /// `None` keeps history in memory only.
    pub history_file: Option<String>,
    /// Typing this line ends the program.
    pub exit_keyword: Option<String>,
    pub terminal: Options,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: "> ".to_string(),
            history_file: Some(format!("~/{HISTORY_FILE}")),
            exit_keyword: Some("exit".to_string()),
            // Ctrl-C and Ctrl-Z keep raising signals
            terminal: Options {
                cbreak: true,
                install_signal_handlers: true,
                ..Options::default()
            },
        }
    }
}

impl Config {
    /// Loads `path`, or the default file when `path` is `None`. Only a
    /// missing default file falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE))
    }

    /// History file with a leading `~/` expanded.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history_file.as_deref().map(expand_home)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
