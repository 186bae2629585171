// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for parsing configuration files for the dump collector.

use crate::logging::LogConfig;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use parallel_task_set::DEFAULT_MAX_PARALLELISM;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Largest failing unit position accepted unless configured otherwise.
pub const DEFAULT_MAX_FAILING_UNIT: u32 = 0xFF;

/// Configuration for the dump collector.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// Directory under which each dump gets its own `<id>/` directory.
    pub collection_root: Utf8PathBuf,
    /// Maximum number of targets collected at once within a pass.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
    /// Upper bound, in seconds, on a single SBE chip-op. No bound when
    /// absent.
    #[serde(default)]
    pub target_timeout_secs: Option<u64>,
    /// Largest `FailingUnitId` a creation request may name.
    #[serde(default = "default_max_failing_unit")]
    pub max_failing_unit: u32,
    /// Where FFDC scratch files are created; the system temporary directory
    /// when absent.
    #[serde(default)]
    pub ffdc_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_max_parallelism() -> usize {
    DEFAULT_MAX_PARALLELISM
}

fn default_max_failing_unit() -> u32 {
    DEFAULT_MAX_FAILING_UNIT
}

impl Config {
    /// A configuration with defaults for everything but the collection root.
    pub fn new(collection_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            collection_root: collection_root.into(),
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            target_timeout_secs: None,
            max_failing_unit: DEFAULT_MAX_FAILING_UNIT,
            ffdc_dir: None,
            log: LogConfig::default(),
        }
    }

    /// Load a `Config` from the given TOML file
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        Ok(config_parsed)
    }

    pub fn target_timeout(&self) -> Option<Duration> {
        self.target_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}
