//! Engine configuration stored as TOML.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::context::ContextConfig;
use crate::planner::PlannerConfig;

/// Engine configuration (TOML).
///
/// Missing sections and fields fall back to their defaults, so an empty file
/// is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HtnConfig {
    pub context: ContextConfig,
    pub planner: PlannerConfig,
}

impl HtnConfig {
    /// Read `path`, or fall back to the defaults when no file exists there.
    pub fn load(path: &Path) -> Result<Self> {
        let config = match fs::read_to_string(path) {
            Ok(text) => toml::from_str::<Self>(&text)
                .with_context(|| format!("parse {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => Self::default(),
            Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Write to a sibling `.partial` file, then rename it over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let text = toml::to_string_pretty(self).context("serialize htn config")?;

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        let staging = staging_path(path);
        fs::write(&staging, text).with_context(|| format!("write {}", staging.display()))?;
        fs::rename(&staging, path)
            .with_context(|| format!("move {} into place", staging.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.context.decomposition_log_limit == 0 {
            bail!("context.decomposition_log_limit must be > 0");
        }
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
