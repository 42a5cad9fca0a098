//! Records exchanged with the Manager
//!
//! - UnitStatus: one ListUnits entry, `(ssssssouso)`
//! - UnitFileChange: one Enable/DisableUnitFiles change, `(sss)`
//! - Property: a unit property for StartTransientUnit/SetUnitProperties, `(sv)`

use serde::{Deserialize, Serialize};
use zbus::zvariant::{self, OwnedObjectPath, OwnedValue, Type, Value};

/// A loaded unit as reported by ListUnits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Type)]
pub struct UnitStatus {
    /// Primary unit name
    pub name: String,
    /// Human readable description
    pub description: String,
    /// Whether the unit file was loaded successfully: "loaded", "not-found", ...
    pub load_state: String,
    /// "active", "inactive", "activating", "deactivating", "failed"
    pub active_state: String,
    /// Unit type specific state: "running", "dead", "exited", ...
    pub sub_state: String,
    /// Unit this one follows in state, empty if none
    pub followed: String,
    pub path: OwnedObjectPath,
    /// Queued job id, 0 if none
    pub job_id: u32,
    pub job_type: String,
    pub job_path: OwnedObjectPath,
}

impl UnitStatus {
    pub fn is_active(&self) -> bool {
        self.active_state == "active"
    }

    pub fn is_failed(&self) -> bool {
        self.active_state == "failed"
    }

    /// Whether a job is queued for this unit
    pub fn has_job(&self) -> bool {
        self.job_id != 0
    }
}

/// A symlink created or removed by EnableUnitFiles/DisableUnitFiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct UnitFileChange {
    /// "symlink" or "unlink"
    pub change_type: String,
    /// The symlink
    pub filename: String,
    /// Where it points
    pub destination: String,
}

/// A unit property name and value
#[derive(Debug, Serialize, Deserialize, Type)]
pub struct Property {
    pub name: String,
    pub value: OwnedValue,
}

impl Property {
    pub fn new<'a>(name: &str, value: impl Into<Value<'a>>) -> zvariant::Result<Self> {
        Ok(Self {
            name: name.to_string(),
            value: OwnedValue::try_from(value.into())?,
        })
    }

    pub fn description(description: &str) -> zvariant::Result<Self> {
        Self::new("Description", description)
    }

    /// Slice to place the unit in (e.g. "user.slice")
    pub fn slice(slice: &str) -> zvariant::Result<Self> {
        Self::new("Slice", slice)
    }

    /// Processes to move into a transient scope
    pub fn pids(pids: &[u32]) -> zvariant::Result<Self> {
        Self::new("PIDs", pids.to_vec())
    }

    pub fn remain_after_exit(remain: bool) -> zvariant::Result<Self> {
        Self::new("RemainAfterExit", remain)
    }
}
