use anyhow::{anyhow, Context};
use draftlens_engine::{EngineConfig, DEFAULT_CONFIG_NAME};
use std::path::{Path, PathBuf};

/// Config file to use: the explicit `--config` path, or the default name in `cwd`
pub fn config_path(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => cwd.join(DEFAULT_CONFIG_NAME),
    }
}

/// Load the engine config.
///
/// A missing default config yields defaults; a missing explicit one is an error.
pub fn load(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<EngineConfig> {
    let path = config_path(explicit, cwd);

    if explicit.is_some() && !path.exists() {
        return Err(anyhow!("Config file does not exist: {}", path.display()));
    }

    EngineConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}
