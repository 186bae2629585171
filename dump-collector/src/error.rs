// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for dump collection.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors returned to the caller of a dump creation request.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("invalid argument {argument}: {value:?}")]
    InvalidArgument { argument: &'static str, value: String },
    #[error("dump {0} is already being collected")]
    DuplicateDump(u32),
    #[error("internal failure: {0}")]
    InternalFailure(String),
    #[error("failed to create dump entry")]
    EntryService(#[from] EntryServiceError),
}

impl CreateError {
    pub(crate) fn missing(argument: &'static str) -> Self {
        CreateError::InvalidArgument { argument, value: "MISSING".to_string() }
    }
}

/// Errors from the target registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("target registry unavailable: {0}")]
    Unavailable(String),
}

/// Errors from an SBE chip-op.
#[derive(Debug, Error)]
pub enum ChipOpError {
    #[error("chip-op failed (rc {rc})")]
    Failed {
        rc: i32,
        /// First-failure data returned alongside the failure, if any.
        ffdc: Option<serde_json::Value>,
    },
    #[error("chip-op timed out")]
    Timeout,
    #[error("SBE is not ready to accept chip-ops")]
    NotAllowed,
}

/// Errors writing the dump directory or its files.
#[derive(Debug, Error)]
pub enum FileIoError {
    #[error("failed to create dump directory {path}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to open {path} for writing")]
    Open {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to write {path}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

impl FileIoError {
    pub fn path(&self) -> &Utf8PathBuf {
        match self {
            FileIoError::CreateDir { path, .. }
            | FileIoError::Open { path, .. }
            | FileIoError::Write { path, .. } => path,
        }
    }

    /// OS error number behind the failure, or 0 if there was none.
    pub fn errno(&self) -> i32 {
        let err = match self {
            FileIoError::CreateDir { err, .. }
            | FileIoError::Open { err, .. }
            | FileIoError::Write { err, .. } => err,
        };
        err.raw_os_error().unwrap_or(0)
    }
}

/// Errors building an FFDC scratch file.
#[derive(Debug, Error)]
pub enum FfdcFileError {
    #[error("failed to serialize FFDC payload")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to create FFDC file")]
    Create(#[source] std::io::Error),
    #[error("failed to write FFDC file {path}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to seek FFDC file {path} to the beginning")]
    Seek {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Errors from the event-log collaborator.
#[derive(Debug, Error)]
#[error("failed to create event log {message:?}: {reason}")]
pub struct EventLogError {
    pub message: String,
    pub reason: String,
}

/// Errors from the dump-entry collaborator.
#[derive(Debug, Error)]
pub enum EntryServiceError {
    #[error("dump manager call {method} failed: {reason}")]
    CallFailed { method: &'static str, reason: String },
}
