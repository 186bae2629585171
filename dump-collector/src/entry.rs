// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The dump manager that owns dump entries.

use crate::error::EntryServiceError;
use crate::types::DumpType;
use async_trait::async_trait;

/// Progress status this service sets on a dump entry. A completed
/// collection is reported through
/// [DumpEntryService::notify_collection_complete] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Failed,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Failed => {
                "xyz.openbmc_project.Common.Progress.OperationStatus.Failed"
            }
        }
    }
}

/// Client for the dump manager.
#[async_trait]
pub trait DumpEntryService: Send + Sync {
    /// Create a new, in-progress entry for a dump of `dump_type` and return
    /// its object path (`<manager path>/entry/<id>`).
    async fn create_entry(
        &self,
        dump_type: DumpType,
    ) -> Result<String, EntryServiceError>;

    /// Tell the manager that the data for dump `id` is ready for packaging.
    async fn notify_collection_complete(
        &self,
        dump_type: DumpType,
        id: u32,
        size: u64,
    ) -> Result<(), EntryServiceError>;

    async fn set_progress_status(
        &self,
        entry_path: &str,
        status: ProgressStatus,
    ) -> Result<(), EntryServiceError>;
}

/// Extract the numeric dump id from the final segment of an entry path.
pub fn parse_entry_id(entry_path: &str) -> Option<u32> {
    let (_, id) = entry_path.rsplit_once('/')?;
    id.parse().ok()
}
