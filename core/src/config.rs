use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::*;

const DEFAULT_MAX_AREA: u32 = 10_000;
const DEFAULT_BUDGET_SECS: f64 = 30.0;
const DEFAULT_ARTIFACT_STEM: &str = "mineproof-layout";

/// Where search workers leave their winning layout.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffKind {
    #[default]
    Memory,
    Files,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SearchConfig {
    pub workers: usize,
    pub budget_secs: f64,
    pub handoff: HandoffKind,
    pub artifact_dir: PathBuf,
    pub artifact_stem: String,
    /// Fixed seed for reproducible searches, fresh entropy otherwise.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            budget_secs: DEFAULT_BUDGET_SECS,
            handoff: HandoffKind::default(),
            artifact_dir: std::env::temp_dir(),
            artifact_stem: DEFAULT_ARTIFACT_STEM.into(),
            seed: None,
        }
    }
}

impl SearchConfig {
    pub fn budget(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.budget_secs)
            .ok()
            .filter(|budget| !budget.is_zero())
            .ok_or_else(|| {
                GameError::InvalidConfig(format!(
                    "search.budget-secs must be a positive number of seconds, got {}",
                    self.budget_secs
                ))
            })
    }

    pub fn handoff(&self) -> Box<dyn Handoff> {
        match self.handoff {
            HandoffKind::Memory => Box::new(MemoryHandoff::new()),
            HandoffKind::Files => Box::new(FileHandoff::new(
                self.artifact_dir.clone(),
                self.artifact_stem.clone(),
            )),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(GameError::InvalidConfig("search.workers must be at least 1".into()));
        }
        self.budget()?;
        if self.artifact_stem.is_empty()
            || self.artifact_stem.contains(std::path::is_separator)
        {
            return Err(GameError::InvalidConfig(format!(
                "search.artifact-stem must be a plain file name, got {:?}",
                self.artifact_stem
            )));
        }
        Ok(())
    }
}

/// Everything the engine reads from its configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Largest accepted `width * height`.
    pub max_area: u32,
    pub search: SearchConfig,
    pub ledger: Option<LedgerConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_area: DEFAULT_MAX_AREA,
            search: SearchConfig::default(),
            ledger: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|err| GameError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|err| GameError::io("read engine config", &err))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        if let Some(ledger) = &self.ledger {
            ledger.validate()?;
        }
        Ok(())
    }

    /// Refuses fields larger than `max_area` before any work is done on them.
    pub fn check_area(&self, size: Coord2) -> Result<()> {
        let area = u32::from(size.0) * u32::from(size.1);
        if area > self.max_area {
            log::error!("Refusing {}x{} field, area cap is {}", size.0, size.1, self.max_area);
            return Err(SecurityFault::AreaTooLarge {
                area,
                max: self.max_area,
            }
            .into());
        }
        Ok(())
    }
}
