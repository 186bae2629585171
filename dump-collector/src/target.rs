// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Access to the host processors: discovery and the SBE chip-ops.

use crate::error::{ChipOpError, RegistryError};
use crate::types::{ClockState, DumpType, Target};
use async_trait::async_trait;

/// Source of the processor targets in the system.
///
/// Implementations must report the hardware state as of the call; callers
/// invoke [TargetRegistry::list_targets] once per clock-state pass.
pub trait TargetRegistry: Send + Sync {
    fn list_targets(&self) -> Result<Vec<Target>, RegistryError>;
}

/// Data returned by a successful get-dump chip-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DumpData {
    pub data: Vec<u8>,
    /// FFDC the SBE attached about its own state rather than about the
    /// chip-op. The data is still good.
    pub internal_ffdc: Option<serde_json::Value>,
}

impl From<Vec<u8>> for DumpData {
    fn from(data: Vec<u8>) -> Self {
        Self { data, internal_ffdc: None }
    }
}

/// The low-level chip-ops against one processor's SBE.
#[async_trait]
pub trait ChipAccess: Send + Sync {
    /// Stop instruction execution on every thread of `target`. Issued once
    /// per processor before a hostboot dump is collected.
    async fn stop_instructions(&self, target: &Target)
        -> Result<(), ChipOpError>;

    /// Retrieve the dump data for `target`. An empty buffer is a successful,
    /// data-less answer.
    async fn retrieve_dump(
        &self,
        target: &Target,
        dump_type: DumpType,
        clock_state: ClockState,
        collect_fast_array: bool,
    ) -> Result<DumpData, ChipOpError>;
}
