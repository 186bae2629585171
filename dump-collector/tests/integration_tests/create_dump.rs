// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Acceptance and rejection of dump creation requests.

use crate::common::{params, TestContext};
use camino_tempfile::Utf8TempDir;
use dump_collector::entry::ProgressStatus;
use dump_collector::event_log::{
    FILE_OPEN_ERROR, INTERNAL_FAILURE, INVALID_ARGUMENT,
};
use dump_collector::fakes::{
    functional_target, FakeEntryService, FakeRegistry, FakeResponse,
};
use dump_collector::params::{
    DUMP_TYPE_KEY, ERROR_LOG_ID_KEY, FAILING_UNIT_ID_KEY,
};
use dump_collector::{ClockState, Config, CreateError, RequestState, Role};

fn single_target() -> FakeRegistry {
    FakeRegistry::new(vec![functional_target(0, Role::Primary)])
}

#[tokio::test]
async fn hardware_dump_without_failing_unit_is_rejected() {
    let ctx = TestContext::new(single_target(), FakeEntryService::new());

    let err = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "com.ibm.Dump.Create.DumpType.Hardware".into()),
            (ERROR_LOG_ID_KEY, 1u64.into()),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CreateError::InvalidArgument { argument: FAILING_UNIT_ID_KEY, .. }
    ));

    assert!(ctx.dump_dirs().is_empty());
    assert_eq!(ctx.registry.calls(), 0);
    assert!(ctx.chip.calls().is_empty());
    assert!(ctx.entries.progress_updates().is_empty());
}

#[tokio::test]
async fn unknown_dump_type_is_rejected() {
    let ctx = TestContext::new(single_target(), FakeEntryService::new());

    let err = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "com.ibm.Dump.Create.DumpType.Resource".into()),
            (ERROR_LOG_ID_KEY, 1u64.into()),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CreateError::InvalidArgument { argument: DUMP_TYPE_KEY, ref value }
            if value == "com.ibm.Dump.Create.DumpType.Resource"
    ));
    assert!(ctx.dump_dirs().is_empty());
    assert_eq!(ctx.registry.calls(), 0);
}

#[tokio::test]
async fn out_of_range_error_log_id_is_replaced_and_reported() {
    let ctx =
        TestContext::new(single_target(), FakeEntryService::starting_at(4));

    let mut handle = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "Hostboot".into()),
            (ERROR_LOG_ID_KEY, (u64::from(u32::MAX) + 1).into()),
        ]))
        .await
        .unwrap();
    assert_eq!(
        handle.wait_for_terminal_state().await,
        RequestState::Completed
    );

    let error_log = ctx.collection_root.join("4").join("ErrorLog");
    assert_eq!(std::fs::read_to_string(error_log).unwrap(), "00000000");

    let records = ctx.events.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, INVALID_ARGUMENT);
    assert_eq!(records[0].additional_data["ARGUMENT_NAME"], ERROR_LOG_ID_KEY);
    assert_eq!(records[0].additional_data["ARGUMENT_VALUE"], "4294967296");
}

#[tokio::test]
async fn dump_already_in_flight_is_rejected() {
    let path = "/xyz/openbmc_project/dump/hostboot/entry/5";
    let ctx = TestContext::new(
        single_target(),
        FakeEntryService::with_fixed_path(path),
    );
    // Keep the first collection in flight.
    ctx.chip.respond(0, ClockState::On, FakeResponse::Hang);

    let request = || {
        params(&[
            (DUMP_TYPE_KEY, "Hostboot".into()),
            (ERROR_LOG_ID_KEY, 1u64.into()),
        ])
    };
    let first = ctx.manager.create_dump(request()).await.unwrap();
    assert_eq!(first.id(), 5);
    assert_eq!(ctx.manager.active_dumps(), vec![5]);
    assert!(ctx.entries.progress_updates().is_empty());

    let err = ctx.manager.create_dump(request()).await.unwrap_err();
    assert!(matches!(err, CreateError::DuplicateDump(5)));
    assert!(!first.state().is_terminal());

    // The entry created for the rejected request is not left in progress.
    assert_eq!(
        ctx.entries.progress_updates(),
        vec![(path.to_string(), ProgressStatus::Failed)]
    );
    assert_eq!(ctx.manager.active_dumps(), vec![5]);
}

#[tokio::test]
async fn entry_path_without_id_is_an_internal_failure() {
    let path = "/xyz/openbmc_project/dump/hostboot/entry/latest";
    let ctx = TestContext::new(
        single_target(),
        FakeEntryService::with_fixed_path(path),
    );

    let err = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "Hostboot".into()),
            (ERROR_LOG_ID_KEY, 1u64.into()),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(err, CreateError::InternalFailure(_)));
    assert_eq!(
        ctx.entries.progress_updates(),
        vec![(path.to_string(), ProgressStatus::Failed)]
    );
    assert!(ctx.dump_dirs().is_empty());

    let records = ctx.events.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, INTERNAL_FAILURE);
    assert!(records[0].additional_data["REASON"].contains(path));
}

#[tokio::test]
async fn entry_creation_failure_is_returned() {
    let ctx = TestContext::new(single_target(), FakeEntryService::failing());

    let err = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "Hostboot".into()),
            (ERROR_LOG_ID_KEY, 1u64.into()),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(err, CreateError::EntryService(_)));
    assert!(ctx.dump_dirs().is_empty());
}

#[tokio::test]
async fn unwritable_error_log_does_not_fail_the_dump() {
    let ctx =
        TestContext::new(single_target(), FakeEntryService::starting_at(8));
    // A directory where the error log file should go.
    let dump_dir = ctx.collection_root.join("8");
    std::fs::create_dir_all(dump_dir.join("ErrorLog")).unwrap();

    let mut handle = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "Hostboot".into()),
            (ERROR_LOG_ID_KEY, 1u64.into()),
        ]))
        .await
        .unwrap();
    assert_eq!(
        handle.wait_for_terminal_state().await,
        RequestState::Completed
    );

    let records = ctx.events.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, FILE_OPEN_ERROR);
    assert!(records[0].additional_data["PATH"].ends_with("8/ErrorLog"));

    assert!(dump_dir.join("00000008.SbeDataClocksOn.node0.proc0").exists());
    assert!(dump_dir.join("00000008.SbeDataClocksOff.node0.proc0").exists());
    assert_eq!(ctx.entries.completions().len(), 1);
    assert!(ctx.entries.progress_updates().is_empty());
}

#[tokio::test]
async fn unusable_collection_root_fails_the_dump() {
    let dir = Utf8TempDir::new().unwrap();
    // A regular file where the collection root's parent should be.
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let ctx = TestContext::with_config(
        dir,
        Config::new(blocker.join("dumps")),
        single_target(),
        FakeEntryService::starting_at(2),
    );

    let mut handle = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "Hostboot".into()),
            (ERROR_LOG_ID_KEY, 1u64.into()),
        ]))
        .await
        .unwrap();
    assert_eq!(handle.wait_for_terminal_state().await, RequestState::Failed);

    assert_eq!(ctx.registry.calls(), 0);
    assert_eq!(ctx.events.messages(), vec![INTERNAL_FAILURE.to_string()]);
    assert_eq!(
        ctx.entries.progress_updates(),
        vec![(handle.entry_path().to_string(), ProgressStatus::Failed)]
    );
    assert!(ctx.manager.active_dumps().is_empty());
}
