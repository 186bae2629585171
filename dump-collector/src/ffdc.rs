// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scratch files carrying first-failure data capture (FFDC) to the event log.

use crate::error::FfdcFileError;
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::NamedUtf8TempFile;
use display_error_chain::DisplayErrorChain;
use serde::Serialize;
use slog::{warn, Logger};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

/// Format of the data in an FFDC file, as understood by the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfdcFormat {
    Json,
}

/// A write-once temporary file holding a JSON payload.
///
/// The file is positioned at offset 0 once constructed so a reader handed
/// the descriptor consumes it from the beginning. Dropping the value closes
/// the descriptor and deletes the file.
#[derive(Debug)]
pub struct FfdcFile {
    log: Logger,
    // Only `None` once dropped.
    file: Option<NamedUtf8TempFile>,
}

impl FfdcFile {
    /// Serialize `payload` into a new file under `dir`, or under the system
    /// temporary directory if `dir` is `None`.
    pub fn new<T: Serialize + ?Sized>(
        log: &Logger,
        dir: Option<&Utf8Path>,
        payload: &T,
    ) -> Result<Self, FfdcFileError> {
        let data =
            serde_json::to_vec(payload).map_err(FfdcFileError::Serialize)?;

        let mut builder = camino_tempfile::Builder::new();
        builder.prefix("ffdc-").suffix(".json");
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(FfdcFileError::Create)?;
        let path = file.path().to_owned();

        let written = file
            .as_file_mut()
            .write(&data)
            .map_err(|err| FfdcFileError::Write { path: path.clone(), err })?;
        if written != data.len() {
            warn!(
                log,
                "could not write all FFDC data";
                "path" => %path,
                "written" => written,
                "total" => data.len(),
            );
        }

        file.as_file_mut()
            .seek(SeekFrom::Start(0))
            .map_err(|err| FfdcFileError::Seek { path, err })?;

        Ok(Self { log: log.clone(), file: Some(file) })
    }

    pub fn path(&self) -> &Utf8Path {
        self.temp_file().path()
    }

    /// The open handle, positioned wherever the last reader left it.
    pub fn file(&self) -> &File {
        self.temp_file().as_file()
    }

    fn temp_file(&self) -> &NamedUtf8TempFile {
        // Only taken in `drop`.
        self.file.as_ref().expect("FFDC file is live until dropped")
    }
}

impl Drop for FfdcFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let path: Utf8PathBuf = file.path().to_owned();
            if let Err(err) = file.close() {
                warn!(
                    self.log,
                    "failed to remove FFDC file";
                    "path" => %path,
                    "error" => %DisplayErrorChain::new(&err),
                );
            }
        }
    }
}

/// An FFDC file along with the metadata the event log needs to decode it.
#[derive(Debug)]
pub struct FfdcEntry {
    pub format: FfdcFormat,
    pub sub_type: u8,
    pub version: u8,
    pub file: FfdcFile,
}

impl FfdcEntry {
    /// Sub-type and version used for JSON callout data.
    pub const JSON_CALLOUT_SUB_TYPE: u8 = 0xCA;
    pub const JSON_CALLOUT_VERSION: u8 = 0x01;

    pub fn json_callouts(file: FfdcFile) -> Self {
        Self {
            format: FfdcFormat::Json,
            sub_type: Self::JSON_CALLOUT_SUB_TYPE,
            version: Self::JSON_CALLOUT_VERSION,
            file,
        }
    }
}
