// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runs the clock-state passes of a dump collection.
//!
//! Each pass enumerates the targets afresh, collects every eligible target in
//! its own task, and waits for all of them before the next pass starts. For a
//! hostboot dump, instructions are stopped on each processor the first time
//! it shows up, before any collection from it.

use crate::aggregate::{PassResult, RunAggregator, RunResult};
use crate::event_log::EventReporter;
use crate::target::{ChipAccess, TargetRegistry};
use crate::types::{
    ClockState, CollectionOutcome, DumpRequest, FailureKind, OutcomeStatus,
    SkipReason, Target,
};
use crate::worker::{skip_reason, CollectionWorker};
use camino::Utf8Path;
use display_error_chain::DisplayErrorChain;
use parallel_task_set::ParallelTaskSet;
use slog::{error, info, o, warn, Logger};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub struct ClockStateController {
    log: Logger,
    registry: Arc<dyn TargetRegistry>,
    chip: Arc<dyn ChipAccess>,
    events: Arc<EventReporter>,
    max_parallelism: usize,
    target_timeout: Option<Duration>,
}

impl ClockStateController {
    pub fn new(
        log: &Logger,
        registry: Arc<dyn TargetRegistry>,
        chip: Arc<dyn ChipAccess>,
        events: Arc<EventReporter>,
        max_parallelism: usize,
        target_timeout: Option<Duration>,
    ) -> Self {
        Self {
            log: log.new(o!("component" => "ClockStateController")),
            registry,
            chip,
            events,
            max_parallelism,
            target_timeout,
        }
    }

    /// Collect `request` into `dump_dir`, which must already exist.
    pub async fn run(
        &self,
        request: &DumpRequest,
        dump_dir: &Utf8Path,
    ) -> RunResult {
        let log = self.log.new(o!(
            "dump_id" => request.id(),
            "dump_type" => request.dump_type().as_str(),
        ));
        info!(
            log,
            "starting dump collection";
            "failing_unit" => ?request.failing_unit(),
            "path" => %dump_dir,
        );

        let worker = Arc::new(CollectionWorker::new(
            &log,
            request.clone(),
            dump_dir.to_owned(),
            Arc::clone(&self.chip),
            Arc::clone(&self.events),
            self.target_timeout,
        ));
        let mut aggregator = RunAggregator::new(request.dump_type());
        // Outcome of stopping instructions, by position.
        let mut stopped: BTreeMap<u32, Option<SkipReason>> = BTreeMap::new();

        for &clock_state in request.dump_type().clock_states() {
            let targets = match self.registry.list_targets() {
                Ok(targets) => targets,
                Err(err) => {
                    error!(
                        log,
                        "failed to enumerate targets";
                        "clock_state" => clock_state.as_str(),
                        "error" => %DisplayErrorChain::new(&err),
                    );
                    aggregator.registry_unavailable(
                        clock_state,
                        DisplayErrorChain::new(&err).to_string(),
                    );
                    break;
                }
            };

            let pass = self
                .run_pass(&log, &worker, clock_state, targets, &mut stopped)
                .await;
            info!(
                log,
                "dump collection completed for clock state";
                "clock_state" => clock_state.as_str(),
                "targets" => pass.outcomes.len(),
            );
            if aggregator.record_pass(pass).is_break() {
                error!(
                    log,
                    "critical failure collecting dump; not collecting \
                     remaining clock states";
                    "clock_state" => clock_state.as_str(),
                );
                break;
            }
        }

        let result = aggregator.finish();
        if result.is_success() {
            info!(
                log,
                "dump collection completed";
                "bytes" => result.total_bytes(),
            );
        } else {
            error!(
                log,
                "failed to collect the dump";
                "failure" => ?result.failure,
            );
        }
        result
    }

    async fn run_pass(
        &self,
        log: &Logger,
        worker: &Arc<CollectionWorker>,
        clock_state: ClockState,
        targets: Vec<Target>,
        stopped: &mut BTreeMap<u32, Option<SkipReason>>,
    ) -> PassResult {
        let mut outcomes = Vec::with_capacity(targets.len());
        let mut eligible: BTreeMap<u32, Target> = BTreeMap::new();

        for target in targets {
            if let Some(reason) = skip_reason(&target) {
                outcomes.push(worker.skipped(&target, clock_state, reason));
                continue;
            }
            if eligible.contains_key(&target.position) {
                warn!(
                    log,
                    "target registry reported a position twice; ignoring \
                     the duplicate";
                    "position" => target.position,
                );
                continue;
            }
            eligible.insert(target.position, target);
        }

        if worker.stops_instructions() {
            for (position, target) in &eligible {
                if !stopped.contains_key(position) {
                    let excluded = worker.stop_instructions(target).await;
                    stopped.insert(*position, excluded);
                }
            }
        }

        let mut set =
            ParallelTaskSet::new_with_parallelism(self.max_parallelism);
        let mut spawned: BTreeMap<u32, Target> = BTreeMap::new();
        for (position, target) in eligible {
            if let Some(Some(reason)) = stopped.get(&position) {
                outcomes.push(worker.skipped(&target, clock_state, *reason));
                continue;
            }
            spawned.insert(position, target);

            let worker = Arc::clone(worker);
            set.spawn(target.position, async move {
                worker.collect(target, clock_state).await
            });
        }

        for (position, result) in set.join_all().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(failure) => {
                    error!(
                        log,
                        "collection task terminated abnormally";
                        "position" => position,
                        "clock_state" => clock_state.as_str(),
                        "error" => %failure,
                    );
                    if let Some(target) = spawned.get(&position) {
                        outcomes.push(CollectionOutcome::new(
                            target,
                            clock_state,
                            OutcomeStatus::Error(FailureKind::Abnormal),
                        ));
                    }
                }
            }
        }

        PassResult { clock_state, outcomes }
    }
}
