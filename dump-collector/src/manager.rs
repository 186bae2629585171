// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lifecycle of dump creation requests.
//!
//! A request is validated and given a dump entry synchronously; everything
//! after that runs in the background. Each request has a supervisor task
//! that owns the collection task, so a collection that panics is still
//! reported to the dump manager as failed.

use crate::aggregate::RunResult;
use crate::config::Config;
use crate::controller::ClockStateController;
use crate::entry::{parse_entry_id, DumpEntryService, ProgressStatus};
use crate::error::CreateError;
use crate::event_log::{EventLog, EventReporter};
use crate::layout;
use crate::params::{parse_create_params, DumpCreateParams, ERROR_LOG_ID_KEY};
use crate::target::{ChipAccess, TargetRegistry};
use crate::types::{DumpRequest, DumpType};
use display_error_chain::DisplayErrorChain;
use slog::{debug, error, info, o, warn, Logger};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Where a dump request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Validated,
    DirectoryPrepared,
    CollectionInFlight,
    Completed,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

/// Returned to the requester of an accepted dump.
#[derive(Debug, Clone)]
pub struct DumpHandle {
    id: u32,
    entry_path: String,
    dump_type: DumpType,
    state: watch::Receiver<RequestState>,
}

impl DumpHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn entry_path(&self) -> &str {
        &self.entry_path
    }

    pub fn dump_type(&self) -> DumpType {
        self.dump_type
    }

    pub fn state(&self) -> RequestState {
        *self.state.borrow()
    }

    /// Wait until the request has completed or failed.
    pub async fn wait_for_terminal_state(&mut self) -> RequestState {
        match self.state.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // The supervisor always publishes a terminal state before it
            // goes away.
            Err(_) => RequestState::Failed,
        }
    }
}

/// Accepts dump creation requests and drives them to completion.
pub struct DumpManager {
    inner: Arc<Inner>,
}

struct Inner {
    log: Logger,
    config: Config,
    entries: Arc<dyn DumpEntryService>,
    events: Arc<EventReporter>,
    controller: ClockStateController,
    // Ids with a collection in flight.
    active: Mutex<BTreeSet<u32>>,
}

impl DumpManager {
    pub fn new(
        log: &Logger,
        config: Config,
        registry: Arc<dyn TargetRegistry>,
        chip: Arc<dyn ChipAccess>,
        entries: Arc<dyn DumpEntryService>,
        event_log: Arc<dyn EventLog>,
    ) -> Self {
        let log = log.new(o!("component" => "DumpManager"));
        let events = Arc::new(EventReporter::new(
            &log,
            event_log,
            config.ffdc_dir.clone(),
        ));
        let controller = ClockStateController::new(
            &log,
            registry,
            chip,
            Arc::clone(&events),
            config.max_parallelism,
            config.target_timeout(),
        );
        Self {
            inner: Arc::new(Inner {
                log,
                config,
                entries,
                events,
                controller,
                active: Mutex::new(BTreeSet::new()),
            }),
        }
    }

    /// Ids of the dumps currently being collected.
    pub fn active_dumps(&self) -> Vec<u32> {
        self.inner.active.lock().unwrap().iter().copied().collect()
    }

    /// Validate `params`, create the dump entry, and start collecting in the
    /// background. Returns as soon as collection has been started.
    pub async fn create_dump(
        &self,
        params: DumpCreateParams,
    ) -> Result<DumpHandle, CreateError> {
        let inner = &self.inner;
        let (state_tx, state_rx) = watch::channel(RequestState::Received);

        let parsed =
            match parse_create_params(&params, inner.config.max_failing_unit) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(
                        inner.log,
                        "rejecting dump request";
                        "error" => %DisplayErrorChain::new(&err),
                    );
                    return Err(err);
                }
            };
        for key in &parsed.ignored_keys {
            warn!(
                inner.log,
                "ignoring unrecognized creation parameter";
                "key" => key,
            );
        }
        if let Some(value) = &parsed.rejected_error_log_id {
            warn!(
                inner.log,
                "error log id out of range; using 0";
                "error_log_id" => value,
            );
            inner.events.invalid_argument(ERROR_LOG_ID_KEY, value).await;
        }
        state_tx.send_replace(RequestState::Validated);

        let entry_path = inner.entries.create_entry(parsed.dump_type).await?;
        let Some(id) = parse_entry_id(&entry_path) else {
            error!(
                inner.log,
                "dump manager returned an entry path without a numeric id";
                "entry_path" => &entry_path,
            );
            let reason = format!("invalid dump entry path {entry_path:?}");
            inner.events.internal_failure(&reason).await;
            inner.set_progress_failed(&inner.log, &entry_path).await;
            return Err(CreateError::InternalFailure(reason));
        };

        let inserted = inner.active.lock().unwrap().insert(id);
        if !inserted {
            warn!(
                inner.log,
                "dump is already being collected";
                "dump_id" => id,
            );
            inner.set_progress_failed(&inner.log, &entry_path).await;
            return Err(CreateError::DuplicateDump(id));
        }

        let request = DumpRequest::new(
            parsed.dump_type,
            id,
            parsed.error_log_id,
            parsed.failing_unit,
        );
        let log = inner.log.new(o!(
            "dump_id" => id,
            "dump_type" => parsed.dump_type.as_str(),
        ));
        info!(
            log,
            "accepted dump request";
            "entry_path" => &entry_path,
            "error_log_id" => request.error_log_id(),
            "failing_unit" => ?request.failing_unit(),
        );

        tokio::spawn(Arc::clone(inner).supervise(
            log,
            request,
            entry_path.clone(),
            state_tx,
        ));

        Ok(DumpHandle {
            id,
            entry_path,
            dump_type: parsed.dump_type,
            state: state_rx,
        })
    }
}

impl Inner {
    async fn supervise(
        self: Arc<Self>,
        log: Logger,
        request: DumpRequest,
        entry_path: String,
        state_tx: watch::Sender<RequestState>,
    ) {
        let id = request.id();
        let dump_type = request.dump_type();
        let state_tx = Arc::new(state_tx);

        let collection = tokio::spawn({
            let inner = Arc::clone(&self);
            let log = log.clone();
            let state_tx = Arc::clone(&state_tx);
            async move { inner.collect(&log, &request, &state_tx).await }
        });

        let terminal = match collection.await {
            Ok(Some(result)) if result.is_success() => {
                let total_bytes = result.total_bytes();
                if let Err(err) = self
                    .entries
                    .notify_collection_complete(dump_type, id, total_bytes)
                    .await
                {
                    error!(
                        log,
                        "failed to notify dump manager of completed collection";
                        "error" => %DisplayErrorChain::new(&err),
                    );
                }
                RequestState::Completed
            }
            Ok(_) => {
                self.set_progress_failed(&log, &entry_path).await;
                RequestState::Failed
            }
            Err(err) => {
                error!(
                    log,
                    "dump collection task terminated abnormally";
                    "error" => %DisplayErrorChain::new(&err),
                );
                self.set_progress_failed(&log, &entry_path).await;
                RequestState::Failed
            }
        };

        self.active.lock().unwrap().remove(&id);
        info!(log, "dump request finished"; "state" => ?terminal);
        state_tx.send_replace(terminal);
    }

    /// Prepare the dump directory and run the collection. Returns `None` if
    /// collection never started.
    async fn collect(
        &self,
        log: &Logger,
        request: &DumpRequest,
        state_tx: &watch::Sender<RequestState>,
    ) -> Option<RunResult> {
        let created =
            layout::create_dump_dir(&self.config.collection_root, request.id())
                .await;
        let dump_dir = match created {
            Ok(dump_dir) => dump_dir,
            Err(err) => {
                error!(
                    log,
                    "failed to create dump directory";
                    "error" => %DisplayErrorChain::new(&err),
                );
                self.events.file_error(&err).await;
                return None;
            }
        };

        // The collection is still worth having without the error log id.
        if let Err(err) =
            layout::write_error_log(&dump_dir, request.error_log_id()).await
        {
            error!(
                log,
                "failed to write error log id";
                "error" => %DisplayErrorChain::new(&err),
            );
            self.events.file_error(&err).await;
        }
        transition(log, state_tx, RequestState::DirectoryPrepared);

        transition(log, state_tx, RequestState::CollectionInFlight);
        Some(self.controller.run(request, &dump_dir).await)
    }

    async fn set_progress_failed(&self, log: &Logger, entry_path: &str) {
        if let Err(err) = self
            .entries
            .set_progress_status(entry_path, ProgressStatus::Failed)
            .await
        {
            error!(
                log,
                "failed to mark dump entry as failed";
                "entry_path" => entry_path,
                "error" => %DisplayErrorChain::new(&err),
            );
        }
    }
}

fn transition(
    log: &Logger,
    state_tx: &watch::Sender<RequestState>,
    state: RequestState,
) {
    debug!(log, "dump request state change"; "state" => ?state);
    state_tx.send_replace(state);
}
