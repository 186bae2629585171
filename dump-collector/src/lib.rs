// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collection of SBE dumps from the host processors.
//!
//! A [DumpManager] accepts dump creation requests, and for each one collects
//! the dump from every processor's self-boot engine, once with clocks running
//! and once with clocks stopped, into a per-dump directory. Hardware access,
//! the event log, and the dump manager that owns the resulting entries are
//! reached through the traits in [target], [event_log], and [entry].

pub mod aggregate;
pub mod config;
pub mod controller;
pub mod entry;
pub mod error;
pub mod event_log;
#[cfg(any(test, feature = "testing"))]
pub mod fakes;
pub mod ffdc;
pub mod layout;
pub mod logging;
pub mod manager;
pub mod params;
pub mod target;
pub mod types;
pub mod worker;

pub use aggregate::{RunResult, RunStatus};
pub use config::Config;
pub use error::CreateError;
pub use manager::{DumpHandle, DumpManager, RequestState};
pub use params::{CreateParamValue, DumpCreateParams};
pub use types::{ClockState, DumpType, Role, Target};
