//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::fs::FileSystem;

/// Name of the per-workspace override file.
pub const WORKSPACE_CONFIG_FILE: &str = ".lintserve.toml";

/// Configuration fixed for the lifetime of one server instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum number of analyses alive at once
    pub max_jobs: usize,

    /// Worker threads running analyses
    pub max_workers: usize,

    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_jobs: 2,
            max_workers: 2,
            engine: EngineConfig::default(),
        }
    }
}

/// How to invoke the analysis engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub program: String,

    /// Arguments placed before the analysed filename
    pub args: Vec<String>,

    /// Value of the `source` field on published diagnostics
    pub source: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "coala".to_string(),
            args: vec![
                "--json".to_string(),
                "--find-config".to_string(),
                "--limit-files".to_string(),
            ],
            source: "coala".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load config from file
    pub fn load(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// `CoreError::InvalidCapacity` or `CoreError::InvalidWorkers` for a
    /// zero limit, `CoreError::Config` for an empty engine program.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_jobs < 1 {
            return Err(CoreError::InvalidCapacity(self.max_jobs));
        }
        if self.max_workers < 1 {
            return Err(CoreError::InvalidWorkers(self.max_workers));
        }
        self.engine.validate()
    }
}

impl EngineConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.program.trim().is_empty() {
            return Err(CoreError::Config("engine program must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct WorkspaceConfig {
    engine: Option<EngineConfig>,
}

/// Read the `[engine]` table of the workspace's `.lintserve.toml`.
///
/// `Ok(None)` when the file or the table is absent.
///
/// # Errors
///
/// `CoreError::Config` when the file exists but is not valid.
pub fn load_workspace_engine(root: &Path, fs: &dyn FileSystem) -> CoreResult<Option<EngineConfig>> {
    let path = root.join(WORKSPACE_CONFIG_FILE);
    if !fs.is_file(&path) {
        return Ok(None);
    }

    let content = fs.read_to_string(&path)?;
    let config: WorkspaceConfig = toml::from_str(&content)
        .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
    if let Some(engine) = &config.engine {
        engine.validate()?;
    }
    Ok(config.engine)
}
