//! Session configuration stored as TOML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::Budget;
use crate::driver::DriverConfig;

/// Session configuration (TOML).
///
/// Intended to be edited by humans; missing fields default to sensible
/// values and a missing file means "all defaults".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Root budget, a power of ten. Omit for an unlimited session.
    pub budget: Option<u64>,

    /// Deepest machine nesting an `ask` may create.
    pub max_depth: u32,

    /// Ancestor frames abandoned before a recursion error is reported.
    pub unwind_frames: u32,

    /// Whether to consult and fill the response caches.
    pub use_cache: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            budget: None,
            max_depth: 64,
            unwind_frames: 8,
            use_cache: true,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(budget) = self.budget {
            if !Budget::Finite(budget).is_power_of_ten() {
                return Err(anyhow!("budget must be a power of ten, got {budget}"));
            }
        }
        if self.max_depth == 0 {
            return Err(anyhow!("max_depth must be > 0"));
        }
        if self.unwind_frames == 0 {
            return Err(anyhow!("unwind_frames must be > 0"));
        }
        Ok(())
    }

    pub fn effective_budget(&self) -> Budget {
        match self.budget {
            Some(n) => Budget::Finite(n),
            None => Budget::Unlimited,
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            max_depth: self.max_depth,
            unwind_frames: self.unwind_frames,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SessionConfig::default()`.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        let cfg = SessionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SessionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SessionConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
