// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Root logger construction.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use slog::{o, Drain, Level, Logger};
use thiserror::Error;

/// Logging configuration, shaped like the `[log]` table of our other
/// services:
///
/// ```toml
/// [log]
/// level = "info"
/// mode = "file"
/// path = "/var/log/dump-collector.log"
/// if_exists = "append"
/// ```
///
/// Every key is optional. `mode` defaults to `"stderr-terminal"`; `path` is
/// required when it is `"file"`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "RawLogConfig", into = "RawLogConfig")]
pub struct LogConfig {
    pub level: LogLevel,
    pub mode: LogMode,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: LogLevel::default(), mode: LogMode::StderrTerminal }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Level {
        match level {
            LogLevel::Trace => Level::Trace,
            LogLevel::Debug => Level::Debug,
            LogLevel::Info => Level::Info,
            LogLevel::Warn => Level::Warning,
            LogLevel::Error => Level::Error,
            LogLevel::Critical => Level::Critical,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogMode {
    StderrTerminal,
    File { path: Utf8PathBuf, if_exists: IfExists },
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
enum LogModeKind {
    #[default]
    StderrTerminal,
    File,
}

/// The `[log]` table as written, before the mode is checked.
#[derive(Debug, Deserialize, Serialize)]
struct RawLogConfig {
    #[serde(default)]
    level: LogLevel,
    #[serde(default)]
    mode: LogModeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<Utf8PathBuf>,
    #[serde(default)]
    if_exists: IfExists,
}

#[derive(Debug, Error)]
pub enum LogConfigError {
    #[error("log mode \"file\" requires a path")]
    MissingPath,
}

impl TryFrom<RawLogConfig> for LogConfig {
    type Error = LogConfigError;

    fn try_from(raw: RawLogConfig) -> Result<Self, Self::Error> {
        let mode = match raw.mode {
            LogModeKind::StderrTerminal => LogMode::StderrTerminal,
            LogModeKind::File => LogMode::File {
                path: raw.path.ok_or(LogConfigError::MissingPath)?,
                if_exists: raw.if_exists,
            },
        };
        Ok(Self { level: raw.level, mode })
    }
}

impl From<LogConfig> for RawLogConfig {
    fn from(config: LogConfig) -> Self {
        match config.mode {
            LogMode::StderrTerminal => Self {
                level: config.level,
                mode: LogModeKind::StderrTerminal,
                path: None,
                if_exists: IfExists::default(),
            },
            LogMode::File { path, if_exists } => Self {
                level: config.level,
                mode: LogModeKind::File,
                path: Some(path),
                if_exists,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    #[default]
    Append,
    Truncate,
    Fail,
}

#[derive(Debug, Error)]
pub enum LogSetupError {
    #[error("failed to open log file {path}")]
    Open {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Build the root logger described by `config`, tagged with `name`.
pub fn setup_logger(
    config: &LogConfig,
    name: &'static str,
) -> Result<Logger, LogSetupError> {
    let level: Level = config.level.into();
    let log = match &config.mode {
        LogMode::StderrTerminal => {
            let decorator = slog_term::TermDecorator::new().stderr().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            Logger::root(drain, o!("name" => name))
        }
        LogMode::File { path, if_exists } => {
            let mut options = std::fs::OpenOptions::new();
            options.write(true);
            match if_exists {
                IfExists::Append => options.create(true).append(true),
                IfExists::Truncate => options.create(true).truncate(true),
                IfExists::Fail => options.create_new(true),
            };
            let file = options.open(path).map_err(|err| LogSetupError::Open {
                path: path.clone(),
                err,
            })?;
            let decorator = slog_term::PlainDecorator::new(file);
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog::LevelFilter::new(drain, level).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            Logger::root(drain, o!("name" => name))
        }
    };
    Ok(log)
}
