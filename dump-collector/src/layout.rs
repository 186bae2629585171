// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-disk layout of a collected dump.
//!
//! ```text
//! <collection_root>/<id>/ErrorLog
//! <collection_root>/<id>/<id:08>.SbeDataClocks<On|Off>.node0.proc<position>
//! ```
//!
//! Packaging tools downstream depend on these names byte for byte.

use crate::error::FileIoError;
use crate::types::ClockState;
use camino::{Utf8Path, Utf8PathBuf};
use tokio::io::AsyncWriteExt;

/// Name of the file holding the error log id that triggered the dump.
pub const ERROR_LOG_FILE_NAME: &str = "ErrorLog";

/// All processors live on node 0.
pub const NODE_NUMBER: u32 = 0;

/// Directory holding everything collected for dump `id`.
pub fn dump_dir(collection_root: &Utf8Path, id: u32) -> Utf8PathBuf {
    collection_root.join(id.to_string())
}

/// Name of the data file for one target at one clock state.
pub fn data_file_name(
    id: u32,
    clock_state: ClockState,
    position: u32,
) -> String {
    format!(
        "{id:08}.SbeDataClocks{}.node{NODE_NUMBER}.proc{position}",
        clock_state.as_str()
    )
}

/// Create the dump directory, including any missing parents.
pub async fn create_dump_dir(
    collection_root: &Utf8Path,
    id: u32,
) -> Result<Utf8PathBuf, FileIoError> {
    let path = dump_dir(collection_root, id);
    tokio::fs::create_dir_all(&path)
        .await
        .map_err(|err| FileIoError::CreateDir { path: path.clone(), err })?;
    Ok(path)
}

/// Write the raw error log id into `<dump_dir>/ErrorLog`.
pub async fn write_error_log(
    dump_dir: &Utf8Path,
    error_log_id: &str,
) -> Result<(), FileIoError> {
    write_file(&dump_dir.join(ERROR_LOG_FILE_NAME), error_log_id.as_bytes())
        .await
        .map(|_| ())
}

/// Create (or truncate) `path` and write all of `data` to it, returning the
/// number of bytes written.
pub async fn write_file(
    path: &Utf8Path,
    data: &[u8],
) -> Result<u64, FileIoError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|err| FileIoError::Open { path: path.to_owned(), err })?;
    let write = async {
        file.write_all(data).await?;
        // tokio files buffer writes on a background thread; flush so that
        // errors surface here rather than on drop.
        file.flush().await
    };
    write
        .await
        .map_err(|err| FileIoError::Write { path: path.to_owned(), err })?;
    Ok(data.len() as u64)
}
