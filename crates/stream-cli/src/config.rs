use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use stream_player::PlayerConfig;

/// Contents of the `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    pub player: PlayerConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<FileConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}
