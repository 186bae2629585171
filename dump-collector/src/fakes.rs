// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory collaborators for exercising dump collection without hardware.

use crate::entry::{DumpEntryService, ProgressStatus};
use crate::error::{
    ChipOpError, EntryServiceError, EventLogError, RegistryError,
};
use crate::event_log::{EventLog, EventRecord, Severity};
use crate::target::{ChipAccess, DumpData, TargetRegistry};
use crate::types::{ClockState, DumpType, Role, Target};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// An enabled, functional processor.
pub fn functional_target(position: u32, role: Role) -> Target {
    Target { position, enabled: true, functional: true, role }
}

/// Registry that hands out a scripted target list per call.
pub struct FakeRegistry {
    passes: Mutex<VecDeque<Result<Vec<Target>, String>>>,
    calls: AtomicUsize,
}

impl FakeRegistry {
    /// Every call returns `targets`.
    pub fn new(targets: Vec<Target>) -> Self {
        Self::with_passes(vec![Ok(targets)])
    }

    /// Successive calls return successive entries; the last one repeats.
    pub fn with_passes(passes: Vec<Result<Vec<Target>, String>>) -> Self {
        Self { passes: Mutex::new(passes.into()), calls: AtomicUsize::new(0) }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self::with_passes(vec![Err(reason.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TargetRegistry for FakeRegistry {
    fn list_targets(&self) -> Result<Vec<Target>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut passes = self.passes.lock().unwrap();
        let next = if passes.len() > 1 {
            passes.pop_front()
        } else {
            passes.front().cloned()
        };
        match next {
            Some(Ok(targets)) => Ok(targets),
            Some(Err(reason)) => Err(RegistryError::Unavailable(reason)),
            None => Ok(Vec::new()),
        }
    }
}

/// How the fake SBE answers a chip-op.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Data(Vec<u8>),
    /// Good data plus FFDC about the SBE itself.
    DataWithFfdc(Vec<u8>, serde_json::Value),
    Empty,
    Fail(i32),
    FailWithFfdc(i32, serde_json::Value),
    Timeout,
    NotAllowed,
    Panic,
    /// Never answer.
    Hang,
}

impl FakeResponse {
    async fn answer(self, position: u32) -> Result<DumpData, ChipOpError> {
        match self {
            FakeResponse::Data(data) => Ok(data.into()),
            FakeResponse::DataWithFfdc(data, ffdc) => {
                Ok(DumpData { data, internal_ffdc: Some(ffdc) })
            }
            FakeResponse::Empty => Ok(DumpData::default()),
            FakeResponse::Fail(rc) => {
                Err(ChipOpError::Failed { rc, ffdc: None })
            }
            FakeResponse::FailWithFfdc(rc, ffdc) => {
                Err(ChipOpError::Failed { rc, ffdc: Some(ffdc) })
            }
            FakeResponse::Timeout => Err(ChipOpError::Timeout),
            FakeResponse::NotAllowed => Err(ChipOpError::NotAllowed),
            FakeResponse::Panic => panic!("SBE on proc{position} went away"),
            FakeResponse::Hang => futures::future::pending().await,
        }
    }
}

/// One recorded get-dump chip-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipOpCall {
    pub position: u32,
    pub dump_type: DumpType,
    pub clock_state: ClockState,
    pub collect_fast_array: bool,
}

/// Chip access that answers from a response table.
///
/// Targets without a configured response return [expected_data].
#[derive(Default)]
pub struct FakeChipAccess {
    responses: Mutex<BTreeMap<(u32, ClockState), FakeResponse>>,
    stop_responses: Mutex<BTreeMap<u32, FakeResponse>>,
    calls: Mutex<Vec<ChipOpCall>>,
    stop_calls: Mutex<Vec<u32>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// The data the fake SBE returns by default for `position` at `clock_state`.
pub fn expected_data(position: u32, clock_state: ClockState) -> Vec<u8> {
    format!("sbe dump proc{position} clocks {clock_state}").into_bytes()
}

impl FakeChipAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn respond(
        &self,
        position: u32,
        clock_state: ClockState,
        response: FakeResponse,
    ) {
        self.responses
            .lock()
            .unwrap()
            .insert((position, clock_state), response);
    }

    /// How `position` answers stop-instructions. Unconfigured targets
    /// succeed.
    pub fn respond_stop(&self, position: u32, response: FakeResponse) {
        self.stop_responses.lock().unwrap().insert(position, response);
    }

    pub fn calls(&self) -> Vec<ChipOpCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Positions sent a stop-instructions chip-op, in call order.
    pub fn stop_calls(&self) -> Vec<u32> {
        self.stop_calls.lock().unwrap().clone()
    }

    /// Highest number of chip-ops observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChipAccess for FakeChipAccess {
    async fn stop_instructions(
        &self,
        target: &Target,
    ) -> Result<(), ChipOpError> {
        self.stop_calls.lock().unwrap().push(target.position);
        let response =
            self.stop_responses.lock().unwrap().get(&target.position).cloned();
        match response {
            None => Ok(()),
            Some(response) => {
                response.answer(target.position).await.map(|_| ())
            }
        }
    }

    async fn retrieve_dump(
        &self,
        target: &Target,
        dump_type: DumpType,
        clock_state: ClockState,
        collect_fast_array: bool,
    ) -> Result<DumpData, ChipOpError> {
        self.calls.lock().unwrap().push(ChipOpCall {
            position: target.position,
            dump_type,
            clock_state,
            collect_fast_array,
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = self
            .responses
            .lock()
            .unwrap()
            .get(&(target.position, clock_state))
            .cloned();
        match response {
            None => Ok(expected_data(target.position, clock_state).into()),
            Some(response) => response.answer(target.position).await,
        }
    }
}

/// An event as received by [RecordingEventLog], with FFDC files read back.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub message: String,
    pub severity: Severity,
    pub additional_data: BTreeMap<String, String>,
    pub ffdc_contents: Vec<serde_json::Value>,
}

/// Event log that keeps every record in memory.
#[derive(Default)]
pub struct RecordingEventLog {
    records: Mutex<Vec<RecordedEvent>>,
    fail: bool,
}

impl RecordingEventLog {
    /// An event log whose every create call fails.
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn records(&self) -> Vec<RecordedEvent> {
        self.records.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }
}

#[async_trait]
impl EventLog for RecordingEventLog {
    async fn create(&self, record: EventRecord) -> Result<u32, EventLogError> {
        if self.fail {
            return Err(EventLogError {
                message: record.message,
                reason: "event log unavailable".to_string(),
            });
        }

        let mut ffdc_contents = Vec::with_capacity(record.ffdc.len());
        for entry in &record.ffdc {
            let mut file = entry.file.file();
            let mut contents = String::new();
            file.seek(SeekFrom::Start(0))
                .and_then(|_| file.read_to_string(&mut contents))
                .map_err(|err| EventLogError {
                    message: record.message.clone(),
                    reason: err.to_string(),
                })?;
            let value = serde_json::from_str(&contents).map_err(|err| {
                EventLogError {
                    message: record.message.clone(),
                    reason: err.to_string(),
                }
            })?;
            ffdc_contents.push(value);
        }

        let mut records = self.records.lock().unwrap();
        records.push(RecordedEvent {
            message: record.message,
            severity: record.severity,
            additional_data: record.additional_data,
            ffdc_contents,
        });
        // Platform log ids start at 1.
        Ok(u32::try_from(records.len()).unwrap_or(u32::MAX))
    }
}

/// Dump manager that hands out sequential entry ids.
pub struct FakeEntryService {
    next_id: AtomicUsize,
    fail_create: bool,
    fixed_path: Option<String>,
    completions: Mutex<Vec<(DumpType, u32, u64)>>,
    progress: Mutex<Vec<(String, ProgressStatus)>>,
}

impl Default for FakeEntryService {
    fn default() -> Self {
        Self {
            next_id: AtomicUsize::new(1),
            fail_create: false,
            fixed_path: None,
            completions: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
        }
    }
}

impl FakeEntryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry ids start at `id`.
    pub fn starting_at(id: u32) -> Self {
        Self { next_id: AtomicUsize::new(id as usize), ..Self::default() }
    }

    /// Every create call fails.
    pub fn failing() -> Self {
        Self { fail_create: true, ..Self::default() }
    }

    /// Every create call returns `path`.
    pub fn with_fixed_path(path: impl Into<String>) -> Self {
        Self { fixed_path: Some(path.into()), ..Self::default() }
    }

    /// `(dump type, id, size)` for each completion notification.
    pub fn completions(&self) -> Vec<(DumpType, u32, u64)> {
        self.completions.lock().unwrap().clone()
    }

    /// `(entry path, status)` for each progress update.
    pub fn progress_updates(&self) -> Vec<(String, ProgressStatus)> {
        self.progress.lock().unwrap().clone()
    }
}

#[async_trait]
impl DumpEntryService for FakeEntryService {
    async fn create_entry(
        &self,
        dump_type: DumpType,
    ) -> Result<String, EntryServiceError> {
        if self.fail_create {
            return Err(EntryServiceError::CallFailed {
                method: "CreateDump",
                reason: "dump manager unavailable".to_string(),
            });
        }
        if let Some(path) = &self.fixed_path {
            return Ok(path.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}/entry/{id}", dump_type.entry_manager_path()))
    }

    async fn notify_collection_complete(
        &self,
        dump_type: DumpType,
        id: u32,
        size: u64,
    ) -> Result<(), EntryServiceError> {
        self.completions.lock().unwrap().push((dump_type, id, size));
        Ok(())
    }

    async fn set_progress_status(
        &self,
        entry_path: &str,
        status: ProgressStatus,
    ) -> Result<(), EntryServiceError> {
        self.progress.lock().unwrap().push((entry_path.to_string(), status));
        Ok(())
    }
}
