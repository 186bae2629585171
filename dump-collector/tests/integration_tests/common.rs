// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use dump_collector::fakes::{
    FakeChipAccess, FakeEntryService, FakeRegistry, RecordingEventLog,
};
use dump_collector::{Config, CreateParamValue, DumpCreateParams, DumpManager};
use slog::{o, Logger};
use std::sync::Arc;

pub struct TestContext {
    // Held so the collection root outlives the test.
    _dir: Utf8TempDir,
    pub collection_root: Utf8PathBuf,
    pub manager: DumpManager,
    pub registry: Arc<FakeRegistry>,
    pub chip: Arc<FakeChipAccess>,
    pub entries: Arc<FakeEntryService>,
    pub events: Arc<RecordingEventLog>,
}

impl TestContext {
    pub fn new(registry: FakeRegistry, entries: FakeEntryService) -> Self {
        let dir = Utf8TempDir::new().unwrap();
        let collection_root = dir.path().join("dumps");
        Self::with_config(
            dir,
            Config::new(collection_root),
            registry,
            entries,
        )
    }

    pub fn with_config(
        dir: Utf8TempDir,
        config: Config,
        registry: FakeRegistry,
        entries: FakeEntryService,
    ) -> Self {
        let log = Logger::root(slog::Discard, o!());
        let registry = Arc::new(registry);
        let chip = Arc::new(FakeChipAccess::new());
        let entries = Arc::new(entries);
        let events = Arc::new(RecordingEventLog::default());
        let collection_root = config.collection_root.clone();
        let manager = DumpManager::new(
            &log,
            config,
            registry.clone(),
            chip.clone(),
            entries.clone(),
            events.clone(),
        );
        Self {
            _dir: dir,
            collection_root,
            manager,
            registry,
            chip,
            entries,
            events,
        }
    }

    /// Directory names under the collection root, if it exists.
    pub fn dump_dirs(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.collection_root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }
}

pub fn params(entries: &[(&str, CreateParamValue)]) -> DumpCreateParams {
    entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}
