// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Merging per-target outcomes into pass and run results.
//!
//! [FailurePolicy] is the only place that decides whether a target's failure
//! sinks the run.

use crate::types::{
    ClockState, CollectionOutcome, DumpType, FailureKind, OutcomeStatus, Role,
};
use serde::Serialize;
use std::ops::ControlFlow;

/// Decides which per-target failures are fatal for a dump type.
#[derive(Debug, Clone, Copy)]
pub struct FailurePolicy {
    dump_type: DumpType,
}

impl FailurePolicy {
    pub fn new(dump_type: DumpType) -> Self {
        Self { dump_type }
    }

    /// Secondary processors are not expected to hold hostboot data, so
    /// their failures are recorded but tolerated.
    fn tolerates(&self, role: Role) -> bool {
        role == Role::Secondary && self.dump_type == DumpType::Hostboot
    }

    pub fn is_fatal(&self, outcome: &CollectionOutcome) -> bool {
        match outcome.status {
            OutcomeStatus::Success
            | OutcomeStatus::Skipped(_)
            | OutcomeStatus::Error(FailureKind::FileIo) => false,
            OutcomeStatus::Error(FailureKind::Abnormal) => true,
            OutcomeStatus::EmptyData
            | OutcomeStatus::Error(FailureKind::ChipOp)
            | OutcomeStatus::Error(FailureKind::Timeout) => {
                !self.tolerates(outcome.role)
            }
        }
    }
}

/// Outcomes of every target in one clock-state pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassResult {
    pub clock_state: ClockState,
    pub outcomes: Vec<CollectionOutcome>,
}

impl PassResult {
    /// Positions whose outcome is fatal under `policy`.
    pub fn fatal_positions(&self, policy: &FailurePolicy) -> Vec<u32> {
        self.outcomes
            .iter()
            .filter(|outcome| policy.is_fatal(outcome))
            .map(|outcome| outcome.position)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Success,
    Failed,
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunFailure {
    /// Targets could not be enumerated before the given pass.
    RegistryUnavailable { clock_state: ClockState, reason: String },
    /// Targets failed fatally during the given pass.
    FatalTargets { clock_state: ClockState, positions: Vec<u32> },
}

/// Aggregate result of a whole collection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    /// Outcomes in pass order, and by position within a pass.
    pub outcomes: Vec<CollectionOutcome>,
    /// Clock states whose pass ran to completion.
    pub passes: Vec<ClockState>,
    pub failure: Option<RunFailure>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Total bytes of dump data written across all passes.
    pub fn total_bytes(&self) -> u64 {
        self.outcomes.iter().map(|outcome| outcome.bytes_written).sum()
    }
}

/// Accumulates pass results and stops the run at the first failed pass.
#[derive(Debug)]
pub struct RunAggregator {
    policy: FailurePolicy,
    outcomes: Vec<CollectionOutcome>,
    passes: Vec<ClockState>,
    failure: Option<RunFailure>,
}

impl RunAggregator {
    pub fn new(dump_type: DumpType) -> Self {
        Self {
            policy: FailurePolicy::new(dump_type),
            outcomes: Vec::new(),
            passes: Vec::new(),
            failure: None,
        }
    }

    /// Merge a completed pass. Returns `Break` if the pass failed and no
    /// further clock states should be collected.
    pub fn record_pass(&mut self, mut pass: PassResult) -> ControlFlow<()> {
        pass.outcomes.sort_by_key(|outcome| outcome.position);
        let fatal = pass.fatal_positions(&self.policy);
        self.passes.push(pass.clock_state);
        self.outcomes.append(&mut pass.outcomes);

        if fatal.is_empty() {
            ControlFlow::Continue(())
        } else {
            self.failure = Some(RunFailure::FatalTargets {
                clock_state: pass.clock_state,
                positions: fatal,
            });
            ControlFlow::Break(())
        }
    }

    /// Record that targets could not be listed for `clock_state`.
    pub fn registry_unavailable(
        &mut self,
        clock_state: ClockState,
        reason: String,
    ) {
        self.failure =
            Some(RunFailure::RegistryUnavailable { clock_state, reason });
    }

    pub fn finish(self) -> RunResult {
        let status = if self.failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        RunResult {
            status,
            outcomes: self.outcomes,
            passes: self.passes,
            failure: self.failure,
        }
    }
}
