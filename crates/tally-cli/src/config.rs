use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tally_ledger::LedgerConfig;
use tally_store::{JournalConfig, SyncMode};

/// Contents of `tally.toml`. Every section and key is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub storage: StorageConfig,
    pub device: DeviceConfig,
    pub ledger: LedgerSection,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub journal_path: PathBuf,
    pub sync_mode: SyncMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            journal_path: PathBuf::from("tally.journal"),
            sync_mode: SyncMode::EveryWrite,
        }
    }
}

/// The software signing device keeps its key and counters here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub state_path: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("tse-state.json"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub device_timeout_secs: u64,
    pub stale_after_secs: u64,
    pub writer_queue: usize,
    /// Run a recovery pass before executing any command.
    pub recover_on_start: bool,
}

impl Default for LedgerSection {
    fn default() -> Self {
        let defaults = LedgerConfig::default();
        Self {
            device_timeout_secs: defaults.device_timeout.as_secs(),
            stale_after_secs: defaults.stale_after.as_secs(),
            writer_queue: defaults.writer_queue,
            recover_on_start: true,
        }
    }
}

impl TallyConfig {
    /// Read the config at `path`, falling back to defaults when the file
    /// does not exist. Relative paths inside the file are resolved against
    /// the file's directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.storage.journal_path, &mut self.device.state_path] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn journal(&self) -> JournalConfig {
        JournalConfig {
            sync_mode: self.storage.sync_mode,
        }
    }

    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig {
            device_timeout: Duration::from_secs(self.ledger.device_timeout_secs),
            stale_after: Duration::from_secs(self.ledger.stale_after_secs),
            writer_queue: self.ledger.writer_queue,
        }
    }
}
