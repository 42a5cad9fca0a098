//! org.freedesktop.systemd1.Manager proxy
//!
//! Methods the client calls on the manager object:
//! - Job-returning: StartUnit, StopUnit, RestartUnit, StartTransientUnit, ...
//! - Plain: LoadUnit, KillUnit, ListUnits, EnableUnitFiles, Reload, ...
//! - Signal: JobRemoved, reports the result of every finished job

use std::collections::HashMap;

use zbus::{
    proxy,
    zvariant::{ObjectPath, OwnedObjectPath, OwnedValue},
};

use super::unit::{Property, UnitFileChange, UnitStatus};

#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
pub trait Manager {
    /// Load a unit from disk if needed, returns its object path
    fn load_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;

    // ==================== Jobs ====================

    fn start_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn stop_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn reload_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn try_restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn reload_or_restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn reload_or_try_restart_unit(&self, name: &str, mode: &str)
        -> zbus::Result<OwnedObjectPath>;

    /// The aux list is unused by the manager and should be empty
    fn start_transient_unit(
        &self,
        name: &str,
        mode: &str,
        properties: &[Property],
        aux: &[(String, Vec<Property>)],
    ) -> zbus::Result<OwnedObjectPath>;

    // ==================== Units ====================

    /// Signal the unit's processes (whom: "main", "control", "all")
    fn kill_unit(&self, name: &str, whom: &str, signal: i32) -> zbus::Result<()>;

    fn set_unit_properties(
        &self,
        name: &str,
        runtime: bool,
        properties: &[Property],
    ) -> zbus::Result<()>;

    fn list_units(&self) -> zbus::Result<Vec<UnitStatus>>;

    // ==================== Unit files ====================

    fn enable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
        force: bool,
    ) -> zbus::Result<(bool, Vec<UnitFileChange>)>;

    fn disable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
    ) -> zbus::Result<Vec<UnitFileChange>>;

    /// Rescan and reload unit files (daemon-reload)
    fn reload(&self) -> zbus::Result<()>;

    /// Ask the manager to emit job and unit signals to this client
    fn subscribe(&self) -> zbus::Result<()>;

    // ==================== Signals ====================

    /// Emitted when a job completes
    #[zbus(signal)]
    fn job_removed(&self, id: u32, job: ObjectPath<'_>, unit: &str, result: &str)
        -> zbus::Result<()>;
}

/// org.freedesktop.DBus.Properties on a unit object
#[proxy(
    interface = "org.freedesktop.DBus.Properties",
    default_service = "org.freedesktop.systemd1"
)]
pub trait UnitProperties {
    fn get_all(&self, interface_name: &str) -> zbus::Result<HashMap<String, OwnedValue>>;
}
