//! sysd-client - control a systemd-compatible service manager
//!
//! A client library that:
//! - Calls org.freedesktop.systemd1.Manager over D-Bus
//! - Waits for job results delivered as `JobRemoved` signals
//! - Follows a unit's log through journalctl
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  sysd-client                     │
//! ├────────────────────────┬────────────────────────┤
//! │  SystemdClient (D-Bus) │  Journal (journalctl)  │
//! ├────────────────────────┼────────────────────────┤
//! │  JobRegistry           │  race_then_cleanup     │
//! └────────────────────────┴────────────────────────┘
//! ```
//!
//! The two halves share no state.

pub mod dbus;
pub mod jobs;
pub mod journal;
pub mod race;

pub use dbus::{Bus, DbusError, Property, SystemdClient, UnitFileChange, UnitStatus};
pub use jobs::{
    is_success, CompletionListener, JobCompletion, JobError, JobRegistry, PendingJob, JOB_RESULTS,
};
pub use journal::{Journal, JournalConfig, JournalError, LogStream, Since, Stopped};
