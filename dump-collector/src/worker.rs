// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collection of one target at one clock state.

use crate::aggregate::FailurePolicy;
use crate::error::ChipOpError;
use crate::event_log::{EventReporter, Severity};
use crate::layout;
use crate::target::{ChipAccess, DumpData};
use crate::types::{
    ClockState, CollectionOutcome, DumpRequest, DumpType, FailureKind,
    OutcomeStatus, SkipReason, Target,
};
use camino::Utf8PathBuf;
use display_error_chain::DisplayErrorChain;
use slog::{error, info, o, Logger};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Why `target` is not collected at all, if it is not.
pub fn skip_reason(target: &Target) -> Option<SkipReason> {
    if !target.enabled {
        Some(SkipReason::NotEnabled)
    } else if !target.is_functional() {
        Some(SkipReason::NotFunctional)
    } else {
        None
    }
}

/// Fast-array data is only gathered with clocks stopped: from every
/// processor for a hostboot dump, and from the failing unit alone for a
/// hardware dump.
pub fn collect_fast_array(
    request: &DumpRequest,
    clock_state: ClockState,
    position: u32,
) -> bool {
    clock_state == ClockState::Off
        && match request.dump_type() {
            DumpType::Hostboot => true,
            DumpType::Hardware => request.failing_unit() == Some(position),
            _ => false,
        }
}

/// Everything a worker needs that is shared by all targets of a run.
pub struct CollectionWorker {
    log: Logger,
    request: DumpRequest,
    dump_dir: Utf8PathBuf,
    chip: Arc<dyn ChipAccess>,
    events: Arc<EventReporter>,
    target_timeout: Option<Duration>,
    policy: FailurePolicy,
}

impl CollectionWorker {
    pub fn new(
        log: &Logger,
        request: DumpRequest,
        dump_dir: Utf8PathBuf,
        chip: Arc<dyn ChipAccess>,
        events: Arc<EventReporter>,
        target_timeout: Option<Duration>,
    ) -> Self {
        let policy = FailurePolicy::new(request.dump_type());
        Self {
            log: log.new(o!("component" => "CollectionWorker")),
            request,
            dump_dir,
            chip,
            events,
            target_timeout,
            policy,
        }
    }

    /// Outcome for a target that is not eligible for collection, after
    /// logging why.
    pub fn skipped(
        &self,
        target: &Target,
        clock_state: ClockState,
        reason: SkipReason,
    ) -> CollectionOutcome {
        if reason == SkipReason::NotFunctional && target.is_primary() {
            info!(
                self.log,
                "primary processor is not functional";
                "position" => target.position,
            );
        }
        CollectionOutcome::new(
            target,
            clock_state,
            OutcomeStatus::Skipped(reason),
        )
    }

    /// Whether instructions are stopped on each processor before its dump
    /// is collected.
    pub fn stops_instructions(&self) -> bool {
        self.request.dump_type().requires_thread_stop()
    }

    /// Stop instruction execution on `target` ahead of a hostboot dump.
    /// Returns why the target has to be left out of the dump, if it does.
    pub async fn stop_instructions(
        &self,
        target: &Target,
    ) -> Option<SkipReason> {
        let log = self.log.new(o!("position" => target.position));
        info!(log, "stopping instructions");

        match self.with_timeout(self.chip.stop_instructions(target)).await {
            Ok(()) => None,
            Err(ChipOpError::NotAllowed) => {
                info!(
                    log,
                    "SBE not ready to accept chip-ops; leaving processor \
                     out of the dump"
                );
                Some(SkipReason::ChipOpNotAllowed)
            }
            Err(err) => {
                error!(
                    log,
                    "failed to stop instructions";
                    "error" => %DisplayErrorChain::new(&err),
                );
                self.events
                    .thread_stop_failure(&self.request, target, &err)
                    .await;
                // A processor that did not answer in time is left alone;
                // any other failure still gets its dump collected.
                match err {
                    ChipOpError::Timeout => {
                        Some(SkipReason::InstructionsNotStopped)
                    }
                    _ => None,
                }
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        op: impl Future<Output = Result<T, ChipOpError>>,
    ) -> Result<T, ChipOpError> {
        match self.target_timeout {
            Some(timeout) => tokio::time::timeout(timeout, op)
                .await
                .unwrap_or(Err(ChipOpError::Timeout)),
            None => op.await,
        }
    }

    /// Collect the dump from `target`. All failures are encoded in the
    /// returned outcome.
    pub async fn collect(
        &self,
        target: Target,
        clock_state: ClockState,
    ) -> CollectionOutcome {
        if let Some(reason) = skip_reason(&target) {
            return self.skipped(&target, clock_state, reason);
        }

        let log = self.log.new(o!(
            "position" => target.position,
            "clock_state" => clock_state.as_str(),
        ));
        let fast_array =
            collect_fast_array(&self.request, clock_state, target.position);
        info!(
            log,
            "collecting dump from SBE";
            "collect_fast_array" => fast_array,
        );

        let retrieve = self.chip.retrieve_dump(
            &target,
            self.request.dump_type(),
            clock_state,
            fast_array,
        );
        let result = self.with_timeout(retrieve).await;
        let DumpData { data, internal_ffdc } = match result {
            Ok(dump) => dump,
            Err(ChipOpError::NotAllowed) => {
                info!(log, "SBE not ready to accept chip-ops; skipping");
                return CollectionOutcome::new(
                    &target,
                    clock_state,
                    OutcomeStatus::Skipped(SkipReason::ChipOpNotAllowed),
                );
            }
            Err(err) => {
                let kind = match err {
                    ChipOpError::Timeout => FailureKind::Timeout,
                    _ => FailureKind::ChipOp,
                };
                let outcome = CollectionOutcome::new(
                    &target,
                    clock_state,
                    OutcomeStatus::Error(kind),
                );
                let severity = if self.policy.is_fatal(&outcome) {
                    error!(
                        log,
                        "failed to collect dump";
                        "error" => %DisplayErrorChain::new(&err),
                    );
                    Severity::Error
                } else {
                    info!(
                        log,
                        "failed to collect dump from secondary; skipping";
                        "error" => %DisplayErrorChain::new(&err),
                    );
                    Severity::Informational
                };
                self.events
                    .chip_op_failure(
                        &self.request,
                        &target,
                        clock_state,
                        &err,
                        severity,
                    )
                    .await;
                return outcome;
            }
        };

        if let Some(ffdc) = &internal_ffdc {
            info!(log, "SBE returned FFDC not related to the chip-op");
            self.events
                .internal_ffdc(&self.request, &target, clock_state, ffdc)
                .await;
        }

        if data.is_empty() {
            let outcome = CollectionOutcome::new(
                &target,
                clock_state,
                OutcomeStatus::EmptyData,
            );
            if self.policy.is_fatal(&outcome) {
                error!(log, "no data returned while collecting the dump");
            } else {
                info!(log, "no dump data received from secondary; skipping");
            }
            return outcome;
        }

        let path = self.dump_dir.join(layout::data_file_name(
            self.request.id(),
            clock_state,
            target.position,
        ));
        match layout::write_file(&path, &data).await {
            Ok(bytes_written) => {
                info!(
                    log,
                    "wrote dump file";
                    "path" => %path,
                    "size" => bytes_written,
                );
                CollectionOutcome::written(&target, clock_state, bytes_written)
            }
            Err(err) => {
                // Keep going: what the other SBEs returned can still be
                // packaged.
                error!(
                    log,
                    "failed to write dump file";
                    "errno" => err.errno(),
                    "error" => %DisplayErrorChain::new(&err),
                );
                self.events.file_error(&err).await;
                CollectionOutcome::new(
                    &target,
                    clock_state,
                    OutcomeStatus::Error(FailureKind::FileIo),
                )
            }
        }
    }
}
