// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core value types shared by the collection pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of the fully qualified dump type names used by creation requests.
pub const DUMP_TYPE_PREFIX: &str = "com.ibm.Dump.Create.DumpType.";

/// The kinds of SBE dump this service knows how to collect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
pub enum DumpType {
    Hostboot,
    Hardware,
    #[serde(rename = "SBE")]
    Sbe,
    #[serde(rename = "MSBE")]
    Msbe,
    Performance,
}

impl DumpType {
    pub const ALL: [DumpType; 5] = [
        DumpType::Hostboot,
        DumpType::Hardware,
        DumpType::Sbe,
        DumpType::Msbe,
        DumpType::Performance,
    ];

    /// Short name, as it appears after [DUMP_TYPE_PREFIX].
    pub fn as_str(self) -> &'static str {
        match self {
            DumpType::Hostboot => "Hostboot",
            DumpType::Hardware => "Hardware",
            DumpType::Sbe => "SBE",
            DumpType::Msbe => "MSBE",
            DumpType::Performance => "Performance",
        }
    }

    /// Whether a creation request of this type must name a failing unit.
    pub fn requires_failing_unit(self) -> bool {
        matches!(self, DumpType::Hardware | DumpType::Sbe | DumpType::Msbe)
    }

    /// Whether processor instructions are stopped before collection.
    pub fn requires_thread_stop(self) -> bool {
        self == DumpType::Hostboot
    }

    /// Clock states collected for this dump type, in collection order.
    ///
    /// Performance data is only meaningful with clocks running, so those
    /// dumps are a single pass.
    pub fn clock_states(self) -> &'static [ClockState] {
        match self {
            DumpType::Performance => &[ClockState::On],
            _ => &[ClockState::On, ClockState::Off],
        }
    }

    /// Object path of the dump manager that owns entries of this type.
    pub fn entry_manager_path(self) -> &'static str {
        match self {
            DumpType::Hostboot => "/xyz/openbmc_project/dump/hostboot",
            DumpType::Hardware => "/xyz/openbmc_project/dump/hardware",
            DumpType::Sbe => "/xyz/openbmc_project/dump/sbe",
            DumpType::Msbe => "/xyz/openbmc_project/dump/msbe",
            DumpType::Performance => "/xyz/openbmc_project/dump/performance",
        }
    }
}

impl fmt::Display for DumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dump type {0:?}")]
pub struct UnknownDumpType(pub String);

impl FromStr for DumpType {
    type Err = UnknownDumpType;

    /// Accepts either the fully qualified name
    /// (`com.ibm.Dump.Create.DumpType.Hostboot`) or the short name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s.strip_prefix(DUMP_TYPE_PREFIX).unwrap_or(s);
        DumpType::ALL
            .into_iter()
            .find(|t| t.as_str() == short)
            .ok_or_else(|| UnknownDumpType(s.to_string()))
    }
}

/// Whether the chip clocks are running while the dump is extracted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
pub enum ClockState {
    On,
    Off,
}

impl ClockState {
    pub fn as_str(self) -> &'static str {
        match self {
            ClockState::On => "On",
            ClockState::Off => "Off",
        }
    }
}

impl fmt::Display for ClockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processor role within the system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
pub enum Role {
    /// The boot-controlling socket.
    Primary,
    Secondary,
}

/// A processor as reported by the target registry for a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub position: u32,
    /// The target is present and enabled.
    pub enabled: bool,
    pub functional: bool,
    pub role: Role,
}

impl Target {
    pub fn is_functional(&self) -> bool {
        self.functional
    }

    pub fn is_primary(&self) -> bool {
        self.role == Role::Primary
    }
}

/// An accepted request to collect one dump.
///
/// Fields are private so a request cannot change once it is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRequest {
    dump_type: DumpType,
    id: u32,
    error_log_id: String,
    failing_unit: Option<u32>,
}

impl DumpRequest {
    pub fn new(
        dump_type: DumpType,
        id: u32,
        error_log_id: impl Into<String>,
        failing_unit: Option<u32>,
    ) -> Self {
        Self { dump_type, id, error_log_id: error_log_id.into(), failing_unit }
    }

    pub fn dump_type(&self) -> DumpType {
        self.dump_type
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn error_log_id(&self) -> &str {
        &self.error_log_id
    }

    pub fn failing_unit(&self) -> Option<u32> {
        self.failing_unit
    }
}

/// Why a target produced no data without that being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    NotEnabled,
    NotFunctional,
    /// The SBE refused the chip-op because it is not ready to accept one.
    ChipOpNotAllowed,
    /// The processor's instructions could not be stopped before a hostboot
    /// dump, so its SBE is left alone.
    InstructionsNotStopped,
}

/// The category of a per-target error, used by the failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The chip-access primitive returned an error.
    ChipOp,
    /// The chip-access primitive did not answer in time.
    Timeout,
    /// The dump data could not be written to disk.
    FileIo,
    /// The isolation unit terminated without producing an outcome.
    Abnormal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    EmptyData,
    Error(FailureKind),
    Skipped(SkipReason),
}

/// Result of collecting one target at one clock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOutcome {
    pub position: u32,
    pub role: Role,
    pub clock_state: ClockState,
    pub status: OutcomeStatus,
    pub bytes_written: u64,
}

impl CollectionOutcome {
    pub(crate) fn new(
        target: &Target,
        clock_state: ClockState,
        status: OutcomeStatus,
    ) -> Self {
        Self {
            position: target.position,
            role: target.role,
            clock_state,
            status,
            bytes_written: 0,
        }
    }

    pub(crate) fn written(
        target: &Target,
        clock_state: ClockState,
        bytes_written: u64,
    ) -> Self {
        Self {
            bytes_written,
            ..Self::new(target, clock_state, OutcomeStatus::Success)
        }
    }
}
