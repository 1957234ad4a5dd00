use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use lambo_runtime::RuntimeConfig;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "lambo.toml";

/// Contents of `lambo.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LamboConfig {
    pub runtime: RuntimeConfig,
    pub entry: EntryConfig,
    pub function: FunctionConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    pub kind: String,
    pub listen_addr: String,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            kind: "gateway".into(),
            listen_addr: "127.0.0.1:3000".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FunctionConfig {
    pub working_dir: Option<PathBuf>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Max duration used when neither the command line nor a config file sets one.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(30);

impl LamboConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// An explicit path, else `./lambo.toml`, else `<config dir>/lambo/lambo.toml`.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from(CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("lambo").join(CONFIG_FILE))
            .filter(|path| path.is_file())
    }
}
