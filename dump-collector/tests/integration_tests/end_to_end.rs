// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Full collections driven through the dump manager.

use crate::common::{params, TestContext};
use dump_collector::entry::ProgressStatus;
use dump_collector::event_log::{
    SBE_CHIP_OP_FAILURE, SBE_CHIP_OP_TIMEOUT, SBE_INTERNAL_FFDC_DATA,
};
use dump_collector::fakes::{
    expected_data, functional_target, FakeEntryService, FakeRegistry,
    FakeResponse,
};
use dump_collector::params::{
    DUMP_TYPE_KEY, ERROR_LOG_ID_KEY, FAILING_UNIT_ID_KEY,
};
use dump_collector::{ClockState, DumpType, RequestState, Role};

#[tokio::test]
async fn hostboot_dump_collects_every_target_in_both_clock_states() {
    let ctx = TestContext::new(
        FakeRegistry::new(vec![
            functional_target(0, Role::Primary),
            functional_target(1, Role::Secondary),
        ]),
        FakeEntryService::starting_at(7),
    );

    let mut handle = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "com.ibm.Dump.Create.DumpType.Hostboot".into()),
            (ERROR_LOG_ID_KEY, "abc".into()),
        ]))
        .await
        .unwrap();
    assert_eq!(handle.id(), 7);
    assert_eq!(
        handle.entry_path(),
        "/xyz/openbmc_project/dump/hostboot/entry/7"
    );
    assert_eq!(handle.wait_for_terminal_state().await, RequestState::Completed);

    let dump_dir = ctx.collection_root.join("7");
    assert_eq!(
        std::fs::read_to_string(dump_dir.join("ErrorLog")).unwrap(),
        "abc"
    );

    let mut total = 0;
    for clock_state in [ClockState::On, ClockState::Off] {
        for position in [0, 1] {
            let name = format!(
                "00000007.SbeDataClocks{clock_state}.node0.proc{position}"
            );
            let data = std::fs::read(dump_dir.join(&name)).unwrap();
            assert_eq!(data, expected_data(position, clock_state), "{name}");
            total += data.len() as u64;
        }
    }
    // Four data files and the error log, nothing else.
    assert_eq!(std::fs::read_dir(&dump_dir).unwrap().count(), 5);

    assert_eq!(ctx.entries.completions(), vec![(DumpType::Hostboot, 7, total)]);
    assert!(ctx.entries.progress_updates().is_empty());
    assert!(ctx.events.records().is_empty());
    assert_eq!(ctx.registry.calls(), 2);
    assert!(ctx.manager.active_dumps().is_empty());
}

#[tokio::test]
async fn hardware_dump_fails_when_failing_unit_chip_op_fails() {
    let ctx = TestContext::new(
        FakeRegistry::new(vec![
            functional_target(0, Role::Primary),
            functional_target(3, Role::Secondary),
        ]),
        FakeEntryService::starting_at(12),
    );
    ctx.chip.respond(3, ClockState::On, FakeResponse::Fail(-1));

    let mut handle = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "com.ibm.Dump.Create.DumpType.Hardware".into()),
            (ERROR_LOG_ID_KEY, 0x50000012u64.into()),
            (FAILING_UNIT_ID_KEY, 3u64.into()),
        ]))
        .await
        .unwrap();
    assert_eq!(handle.id(), 12);
    assert_eq!(handle.wait_for_terminal_state().await, RequestState::Failed);

    // The clocks-off pass never ran.
    let calls = ctx.chip.calls();
    assert!(calls.iter().all(|call| call.clock_state == ClockState::On));
    assert!(calls.iter().all(|call| !call.collect_fast_array));
    assert_eq!(ctx.registry.calls(), 1);

    assert_eq!(
        ctx.entries.progress_updates(),
        vec![(handle.entry_path().to_string(), ProgressStatus::Failed)]
    );
    assert!(ctx.entries.completions().is_empty());

    let records = ctx.events.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, SBE_CHIP_OP_FAILURE);
    assert_eq!(records[0].additional_data["CHIP_POSITION"], "3");

    let dump_dir = ctx.collection_root.join("12");
    assert_eq!(
        std::fs::read_to_string(dump_dir.join("ErrorLog")).unwrap(),
        "50000012"
    );
    assert!(dump_dir.join("00000012.SbeDataClocksOn.node0.proc0").exists());
    assert!(!dump_dir.join("00000012.SbeDataClocksOn.node0.proc3").exists());
}

#[tokio::test]
async fn hostboot_dump_tolerates_secondary_failures() {
    let ctx = TestContext::new(
        FakeRegistry::new(vec![
            functional_target(0, Role::Primary),
            functional_target(1, Role::Secondary),
        ]),
        FakeEntryService::starting_at(3),
    );
    ctx.chip.respond(1, ClockState::On, FakeResponse::Empty);
    ctx.chip.respond(1, ClockState::Off, FakeResponse::Fail(-3));

    let mut handle = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "Hostboot".into()),
            (ERROR_LOG_ID_KEY, 1u64.into()),
        ]))
        .await
        .unwrap();
    assert_eq!(handle.wait_for_terminal_state().await, RequestState::Completed);

    let dump_dir = ctx.collection_root.join("3");
    assert!(dump_dir.join("00000003.SbeDataClocksOn.node0.proc0").exists());
    assert!(dump_dir.join("00000003.SbeDataClocksOff.node0.proc0").exists());
    assert!(!dump_dir.join("00000003.SbeDataClocksOn.node0.proc1").exists());
    assert!(!dump_dir.join("00000003.SbeDataClocksOff.node0.proc1").exists());

    let total = (expected_data(0, ClockState::On).len()
        + expected_data(0, ClockState::Off).len()) as u64;
    assert_eq!(ctx.entries.completions(), vec![(DumpType::Hostboot, 3, total)]);
    assert_eq!(ctx.events.messages(), vec![SBE_CHIP_OP_FAILURE.to_string()]);
}

#[tokio::test]
async fn target_failing_between_passes_is_skipped_in_later_pass() {
    let mut failed = functional_target(1, Role::Secondary);
    failed.functional = false;
    let ctx = TestContext::new(
        FakeRegistry::with_passes(vec![
            Ok(vec![
                functional_target(0, Role::Primary),
                functional_target(1, Role::Secondary),
            ]),
            Ok(vec![functional_target(0, Role::Primary), failed]),
        ]),
        FakeEntryService::starting_at(5),
    );

    let mut handle = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "Hostboot".into()),
            (ERROR_LOG_ID_KEY, 1u64.into()),
        ]))
        .await
        .unwrap();
    assert_eq!(handle.wait_for_terminal_state().await, RequestState::Completed);

    let dump_dir = ctx.collection_root.join("5");
    assert!(dump_dir.join("00000005.SbeDataClocksOn.node0.proc1").exists());
    assert!(!dump_dir.join("00000005.SbeDataClocksOff.node0.proc1").exists());
    assert!(!ctx
        .chip
        .calls()
        .iter()
        .any(|c| c.position == 1 && c.clock_state == ClockState::Off));
}

#[tokio::test]
async fn concurrent_requests_run_independently() {
    let ctx = TestContext::new(
        FakeRegistry::new(vec![
            functional_target(0, Role::Primary),
            functional_target(1, Role::Secondary),
        ]),
        FakeEntryService::starting_at(1),
    );

    let request = || {
        params(&[
            (DUMP_TYPE_KEY, "Hostboot".into()),
            (ERROR_LOG_ID_KEY, 9u64.into()),
        ])
    };
    let (first, second) = tokio::join!(
        ctx.manager.create_dump(request()),
        ctx.manager.create_dump(request()),
    );
    let mut first = first.unwrap();
    let mut second = second.unwrap();
    assert_ne!(first.id(), second.id());

    assert_eq!(first.wait_for_terminal_state().await, RequestState::Completed);
    assert_eq!(second.wait_for_terminal_state().await, RequestState::Completed);

    assert_eq!(ctx.dump_dirs(), vec!["1".to_string(), "2".to_string()]);
    for id in [1u32, 2] {
        let dir = ctx.collection_root.join(id.to_string());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 5);
    }
    let mut completed: Vec<u32> =
        ctx.entries.completions().iter().map(|(_, id, _)| *id).collect();
    completed.sort();
    assert_eq!(completed, vec![1, 2]);
}

#[tokio::test]
async fn hostboot_dump_leaves_out_processors_not_stopped() {
    let ctx = TestContext::new(
        FakeRegistry::new(vec![
            functional_target(0, Role::Primary),
            functional_target(1, Role::Secondary),
            functional_target(2, Role::Secondary),
        ]),
        FakeEntryService::starting_at(6),
    );
    ctx.chip.respond_stop(1, FakeResponse::NotAllowed);
    ctx.chip.respond_stop(2, FakeResponse::Timeout);

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

    assert_eq!(ctx.chip.stop_calls(), vec![0, 1, 2]);
    assert!(ctx.chip.calls().iter().all(|call| call.position == 0));

    // Only the processor that stopped contributed data.
    let dump_dir = ctx.collection_root.join("6");
    assert_eq!(std::fs::read_dir(&dump_dir).unwrap().count(), 3);
    assert!(dump_dir.join("00000006.SbeDataClocksOn.node0.proc0").exists());
    assert!(dump_dir.join("00000006.SbeDataClocksOff.node0.proc0").exists());
    assert_eq!(ctx.events.messages(), vec![SBE_CHIP_OP_TIMEOUT.to_string()]);
}

#[tokio::test]
async fn sbe_internal_ffdc_is_logged_and_data_kept() {
    let ctx = TestContext::new(
        FakeRegistry::new(vec![functional_target(0, Role::Primary)]),
        FakeEntryService::starting_at(2),
    );
    let ffdc = serde_json::json!({"Reason": "SBE async FFDC"});
    ctx.chip.respond(
        0,
        ClockState::Off,
        FakeResponse::DataWithFfdc(vec![0xaa; 16], ffdc.clone()),
    );

    let mut handle = ctx
        .manager
        .create_dump(params(&[
            (DUMP_TYPE_KEY, "com.ibm.Dump.Create.DumpType.SBE".into()),
            (ERROR_LOG_ID_KEY, 1u64.into()),
            (FAILING_UNIT_ID_KEY, 0u64.into()),
        ]))
        .await
        .unwrap();
    assert_eq!(
        handle.wait_for_terminal_state().await,
        RequestState::Completed
    );

    let data = std::fs::read(
        ctx.collection_root
            .join("2")
            .join("00000002.SbeDataClocksOff.node0.proc0"),
    )
    .unwrap();
    assert_eq!(data, vec![0xaa; 16]);

    let records = ctx.events.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, SBE_INTERNAL_FFDC_DATA);
    assert_eq!(records[0].ffdc_contents, vec![ffdc]);
    // SBE dumps do not stop instructions.
    assert!(ctx.chip.stop_calls().is_empty());
}

#[tokio::test]
async fn unavailable_registry_fails_the_dump() {
    let ctx = TestContext::new(
        FakeRegistry::unavailable("device tree not loaded"),
        FakeEntryService::starting_at(9),
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

    assert_eq!(ctx.registry.calls(), 1);
    assert!(ctx.chip.calls().is_empty());
    assert!(ctx.chip.stop_calls().is_empty());
    assert!(ctx.entries.completions().is_empty());
    assert_eq!(
        ctx.entries.progress_updates(),
        vec![(handle.entry_path().to_string(), ProgressStatus::Failed)]
    );
}
