use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

use crate::types::{AutoScanConfig, ScanAggregate};

const CONFIG_FILE: &str = "config.json";
const RESULTS_FILE: &str = "results.json";

/// Durable home for the config and the last scan aggregate.
///
/// Loads never fail: missing or unreadable data yields `None` and the caller
/// substitutes its default. Saves report errors so the caller can log them.
pub trait StateStore: Send + Sync {
    fn load_config(&self) -> Option<AutoScanConfig>;
    fn save_config(&self, cfg: &AutoScanConfig) -> Result<()>;
    fn load_aggregate(&self) -> Option<ScanAggregate>;
    fn save_aggregate(&self, agg: &ScanAggregate) -> Result<()>;
}

/// Pretty JSON files in a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create the store, making sure the directory exists.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data dir: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.dir.join(name);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable state file, using fallback");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid JSON in state file, using fallback");
                None
            }
        }
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let file = File::create(&path)
            .with_context(|| format!("failed to create state file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .with_context(|| format!("failed to write state file: {}", path.display()))?;
        writer.flush()?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load_config(&self) -> Option<AutoScanConfig> {
        self.read(CONFIG_FILE)
    }

    fn save_config(&self, cfg: &AutoScanConfig) -> Result<()> {
        self.write(CONFIG_FILE, cfg)
    }

    fn load_aggregate(&self) -> Option<ScanAggregate> {
        self.read(RESULTS_FILE)
    }

    fn save_aggregate(&self, agg: &ScanAggregate) -> Result<()> {
        self.write(RESULTS_FILE, agg)
    }
}

/// Volatile store, handy for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: Mutex<Option<AutoScanConfig>>,
    aggregate: Mutex<Option<ScanAggregate>>,
    aggregate_saves: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save_aggregate` calls so far.
    pub fn aggregate_saves(&self) -> u64 {
        *lock(&self.aggregate_saves)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StateStore for MemoryStore {
    fn load_config(&self) -> Option<AutoScanConfig> {
        lock(&self.config).clone()
    }

    fn save_config(&self, cfg: &AutoScanConfig) -> Result<()> {
        *lock(&self.config) = Some(cfg.clone());
        Ok(())
    }

    fn load_aggregate(&self) -> Option<ScanAggregate> {
        lock(&self.aggregate).clone()
    }

    fn save_aggregate(&self, agg: &ScanAggregate) -> Result<()> {
        *lock(&self.aggregate) = Some(agg.clone());
        *lock(&self.aggregate_saves) += 1;
        Ok(())
    }
}
