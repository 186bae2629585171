// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event records raised on behalf of a dump collection.

use crate::error::{ChipOpError, EventLogError, FileIoError};
use crate::ffdc::{FfdcEntry, FfdcFile};
use crate::types::{ClockState, DumpRequest, Target};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use display_error_chain::DisplayErrorChain;
use slog::{debug, o, warn, Logger};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SBE_CHIP_OP_FAILURE: &str =
    "org.open_power.Processor.Error.SbeChipOpFailure";
pub const SBE_CHIP_OP_TIMEOUT: &str =
    "org.open_power.Processor.Error.SbeChipOpTimeout";
pub const FILE_OPEN_ERROR: &str = "xyz.openbmc_project.Common.File.Error.Open";
pub const FILE_WRITE_ERROR: &str =
    "xyz.openbmc_project.Common.File.Error.Write";
pub const INVALID_ARGUMENT: &str =
    "xyz.openbmc_project.Common.Error.InvalidArgument";
pub const INTERNAL_FAILURE: &str =
    "xyz.openbmc_project.Common.Error.InternalFailure";
pub const SBE_INTERNAL_FFDC_DATA: &str =
    "org.open_power.Processor.Error.SbeInternalFFDCData";

/// Command class of the SBE dump chip-ops.
pub const SBEFIFO_CMD_CLASS_DUMP: u32 = 0xAA00;
/// The get-dump command within [SBEFIFO_CMD_CLASS_DUMP].
pub const SBEFIFO_CMD_GET_DUMP: u32 = 0x01;
/// Command class of the SBE instruction control chip-ops.
pub const SBEFIFO_CMD_CLASS_INSTRUCTION: u32 = 0xA700;
/// The control-instructions command within
/// [SBEFIFO_CMD_CLASS_INSTRUCTION].
pub const SBEFIFO_CMD_CONTROL_INSN: u32 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Informational,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Informational => {
                "xyz.openbmc_project.Logging.Entry.Level.Informational"
            }
            Severity::Warning => {
                "xyz.openbmc_project.Logging.Entry.Level.Warning"
            }
            Severity::Error => "xyz.openbmc_project.Logging.Entry.Level.Error",
        }
    }
}

/// A request to create one event log entry.
#[derive(Debug)]
pub struct EventRecord {
    pub message: String,
    pub severity: Severity,
    pub additional_data: BTreeMap<String, String>,
    pub ffdc: Vec<FfdcEntry>,
}

impl EventRecord {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            additional_data: BTreeMap::new(),
            ffdc: Vec::new(),
        }
    }

    pub fn with_data(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }
}

/// The platform event log.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Create an entry, returning its platform log id.
    async fn create(&self, record: EventRecord) -> Result<u32, EventLogError>;
}

/// Builds event records for collection failures and hands them to the
/// [EventLog]. Reporting failures are logged and otherwise ignored.
pub struct EventReporter {
    log: Logger,
    sink: Arc<dyn EventLog>,
    ffdc_dir: Option<Utf8PathBuf>,
}

impl EventReporter {
    pub fn new(
        log: &Logger,
        sink: Arc<dyn EventLog>,
        ffdc_dir: Option<Utf8PathBuf>,
    ) -> Self {
        Self {
            log: log.new(o!("component" => "EventReporter")),
            sink,
            ffdc_dir,
        }
    }

    pub async fn report(&self, record: EventRecord) -> Option<u32> {
        let message = record.message.clone();
        match self.sink.create(record).await {
            Ok(plid) => {
                debug!(
                    self.log,
                    "created event log";
                    "message" => &message,
                    "plid" => plid,
                );
                Some(plid)
            }
            Err(err) => {
                warn!(
                    self.log,
                    "failed to create event log";
                    "message" => &message,
                    "error" => %DisplayErrorChain::new(&err),
                );
                None
            }
        }
    }

    /// Report a failed get-dump chip-op against `target`.
    pub async fn chip_op_failure(
        &self,
        request: &DumpRequest,
        target: &Target,
        clock_state: ClockState,
        err: &ChipOpError,
        severity: Severity,
    ) -> Option<u32> {
        let record = self
            .chip_op_record(
                request,
                target,
                err,
                severity,
                SBEFIFO_CMD_CLASS_DUMP | SBEFIFO_CMD_GET_DUMP,
            )
            .with_data("CLOCK_STATE", clock_state.to_string());
        self.report(record).await
    }

    /// Report a failed stop-instructions chip-op against `target`.
    pub async fn thread_stop_failure(
        &self,
        request: &DumpRequest,
        target: &Target,
        err: &ChipOpError,
    ) -> Option<u32> {
        let record = self.chip_op_record(
            request,
            target,
            err,
            Severity::Error,
            SBEFIFO_CMD_CLASS_INSTRUCTION | SBEFIFO_CMD_CONTROL_INSN,
        );
        self.report(record).await
    }

    /// Report FFDC that the SBE returned alongside good dump data.
    pub async fn internal_ffdc(
        &self,
        request: &DumpRequest,
        target: &Target,
        clock_state: ClockState,
        ffdc: &serde_json::Value,
    ) -> Option<u32> {
        let mut record =
            EventRecord::new(SBE_INTERNAL_FFDC_DATA, Severity::Warning)
                .with_data(
                    "SRC6",
                    src6(
                        target,
                        SBEFIFO_CMD_CLASS_DUMP | SBEFIFO_CMD_GET_DUMP,
                    ),
                )
                .with_data("CHIP_POSITION", target.position.to_string())
                .with_data("DUMP_TYPE", request.dump_type().to_string())
                .with_data("DUMP_ID", request.id().to_string())
                .with_data("CLOCK_STATE", clock_state.to_string());
        self.attach_ffdc(&mut record, target, ffdc);
        self.report(record).await
    }

    fn chip_op_record(
        &self,
        request: &DumpRequest,
        target: &Target,
        err: &ChipOpError,
        severity: Severity,
        command: u32,
    ) -> EventRecord {
        let message = match err {
            ChipOpError::Timeout => SBE_CHIP_OP_TIMEOUT,
            _ => SBE_CHIP_OP_FAILURE,
        };
        let mut record = EventRecord::new(message, severity)
            .with_data("SRC6", src6(target, command))
            .with_data("CHIP_POSITION", target.position.to_string())
            .with_data("DUMP_TYPE", request.dump_type().to_string())
            .with_data("DUMP_ID", request.id().to_string())
            .with_data("SBE_ERR_MSG", err.to_string());
        if let ChipOpError::Failed { ffdc: Some(ffdc), .. } = err {
            self.attach_ffdc(&mut record, target, ffdc);
        }
        record
    }

    fn attach_ffdc(
        &self,
        record: &mut EventRecord,
        target: &Target,
        ffdc: &serde_json::Value,
    ) {
        match FfdcFile::new(&self.log, self.ffdc_dir.as_deref(), ffdc) {
            Ok(file) => record.ffdc.push(FfdcEntry::json_callouts(file)),
            Err(err) => {
                warn!(
                    self.log,
                    "failed to attach SBE FFDC; logging without it";
                    "position" => target.position,
                    "error" => %DisplayErrorChain::new(&err),
                );
            }
        }
    }

    /// Report a failure to create or write a file in the dump directory.
    pub async fn file_error(&self, err: &FileIoError) -> Option<u32> {
        let message = match err {
            FileIoError::Write { .. } => FILE_WRITE_ERROR,
            FileIoError::CreateDir { .. } => INTERNAL_FAILURE,
            FileIoError::Open { .. } => FILE_OPEN_ERROR,
        };
        let record = EventRecord::new(message, Severity::Error)
            .with_data("ERRNO", err.errno().to_string())
            .with_data("PATH", err.path().to_string());
        self.report(record).await
    }

    pub async fn invalid_argument(
        &self,
        argument: &str,
        value: &str,
    ) -> Option<u32> {
        let record = EventRecord::new(INVALID_ARGUMENT, Severity::Error)
            .with_data("ARGUMENT_NAME", argument)
            .with_data("ARGUMENT_VALUE", value);
        self.report(record).await
    }

    pub async fn internal_failure(&self, reason: &str) -> Option<u32> {
        let record = EventRecord::new(INTERNAL_FAILURE, Severity::Error)
            .with_data("REASON", reason);
        self.report(record).await
    }
}

/// The SRC6 word: chip position in the upper half, command in the lower.
fn src6(target: &Target, command: u32) -> String {
    format!("0x{:X}{:04X}", target.position, command)
}
