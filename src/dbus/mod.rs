//! D-Bus client for systemd-compatible managers
//!
//! Talks to org.freedesktop.systemd1 on the system or session bus.
//!
//! Key pieces:
//! - ManagerProxy: statically declared Manager methods and signals
//! - SystemdClient: one session, owns the job registry and the JobRemoved listener
//! - Job calls come in two shapes: `start_unit` waits for the job result,
//!   `start_unit_job` returns a [`PendingJob`] to wait on later

mod manager;
pub mod unit;

pub use manager::{ManagerProxy, UnitPropertiesProxy};
pub use unit::{Property, UnitFileChange, UnitStatus};

use std::collections::HashMap;
use std::future::Future;

use futures_lite::StreamExt;
use zbus::{
    zvariant::{self, ObjectPath, OwnedObjectPath, OwnedValue},
    Connection,
};

use crate::jobs::{CompletionListener, JobCompletion, JobError, JobRegistry, PendingJob};

/// Interface whose properties `get_unit_properties` returns
const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";

/// Which bus the manager lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bus {
    /// System manager (`systemctl`)
    #[default]
    System,
    /// Per-user manager (`systemctl --user`)
    Session,
}

/// A connection to the manager with job tracking
pub struct SystemdClient {
    connection: Connection,
    manager: ManagerProxy<'static>,
    listener: CompletionListener,
}

impl SystemdClient {
    /// Connect to the manager on `bus`
    pub async fn connect(bus: Bus) -> Result<Self, DbusError> {
        let connection = match bus {
            Bus::System => Connection::system().await?,
            Bus::Session => Connection::session().await?,
        };
        Self::with_connection(connection).await
    }

    /// Use an existing connection
    pub async fn with_connection(connection: Connection) -> Result<Self, DbusError> {
        let manager = ManagerProxy::new(&connection).await?;

        // Match rule has to be in place before the first job is enqueued
        let removed = manager.receive_job_removed().await?;
        manager.subscribe().await?;

        let events = removed.filter_map(|signal| match signal.args() {
            Ok(args) => Some(JobCompletion {
                id: *args.id(),
                job: args.job().to_string(),
                unit: args.unit().to_string(),
                result: args.result().to_string(),
            }),
            Err(e) => {
                log::warn!("Ignoring malformed JobRemoved signal: {}", e);
                None
            }
        });
        let listener = CompletionListener::spawn(JobRegistry::new(), events);

        log::debug!("Connected to org.freedesktop.systemd1");

        Ok(Self {
            connection,
            manager,
            listener,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Jobs enqueued through this client that have not completed yet
    pub fn jobs(&self) -> &JobRegistry {
        self.listener.registry()
    }

    /// Stop listening for job results. Pending jobs resolve to
    /// [`JobError::Closed`]. Dropping the client does the same.
    pub fn close(self) {
        log::debug!("Closing client with {} pending jobs", self.jobs().len());
        self.listener.shutdown();
    }

    async fn enqueue<F>(&self, call: F) -> Result<PendingJob, DbusError>
    where
        F: Future<Output = zbus::Result<OwnedObjectPath>>,
    {
        self.jobs()
            .enqueue(async {
                let job = call.await?;
                Ok::<_, DbusError>(job.as_str().to_string())
            })
            .await
    }

    async fn run<F>(&self, call: F) -> Result<String, DbusError>
    where
        F: Future<Output = zbus::Result<OwnedObjectPath>>,
    {
        let job = self.enqueue(call).await?;
        Ok(job.wait().await?)
    }

    /// Load a unit from disk if it isn't loaded yet, returns its object path
    pub async fn load_unit(&self, name: &str) -> Result<String, DbusError> {
        let path = self.manager.load_unit(name).await?;
        Ok(path.as_str().to_string())
    }

    /// Enqueue a start job for `name` and its dependencies and wait for the
    /// job result.
    ///
    /// `mode` is one of "replace", "fail", "isolate", "ignore-dependencies" or
    /// "ignore-requirements". "replace" may replace already queued jobs that
    /// conflict; "fail" fails instead; "isolate" also stops every unit that
    /// isn't a dependency of this one. The last two skip dependencies and are
    /// best avoided.
    ///
    /// The result is one of [`JOB_RESULTS`](crate::jobs::JOB_RESULTS):
    /// "done" on success; "canceled" if the job was canceled before it ran;
    /// "timeout" if the job timeout was hit; "failed" if it failed;
    /// "dependency" if a job it depended on failed; "skipped" if it did not
    /// apply to the unit's current state.
    pub async fn start_unit(&self, name: &str, mode: &str) -> Result<String, DbusError> {
        log::debug!("StartUnit {} mode={}", name, mode);
        self.run(self.manager.start_unit(name, mode)).await
    }

    /// Enqueue a start job without waiting for it
    pub async fn start_unit_job(&self, name: &str, mode: &str) -> Result<PendingJob, DbusError> {
        log::debug!("StartUnit {} mode={} (no wait)", name, mode);
        self.enqueue(self.manager.start_unit(name, mode)).await
    }

    /// Like [`start_unit`](Self::start_unit) but stops the unit
    pub async fn stop_unit(&self, name: &str, mode: &str) -> Result<String, DbusError> {
        log::debug!("StopUnit {} mode={}", name, mode);
        self.run(self.manager.stop_unit(name, mode)).await
    }

    pub async fn stop_unit_job(&self, name: &str, mode: &str) -> Result<PendingJob, DbusError> {
        log::debug!("StopUnit {} mode={} (no wait)", name, mode);
        self.enqueue(self.manager.stop_unit(name, mode)).await
    }

    /// Reload a unit. Fails unless the unit is already running.
    pub async fn reload_unit(&self, name: &str, mode: &str) -> Result<String, DbusError> {
        log::debug!("ReloadUnit {} mode={}", name, mode);
        self.run(self.manager.reload_unit(name, mode)).await
    }

    pub async fn reload_unit_job(&self, name: &str, mode: &str) -> Result<PendingJob, DbusError> {
        log::debug!("ReloadUnit {} mode={} (no wait)", name, mode);
        self.enqueue(self.manager.reload_unit(name, mode)).await
    }

    /// Restart a unit, starting it if it isn't running
    pub async fn restart_unit(&self, name: &str, mode: &str) -> Result<String, DbusError> {
        log::debug!("RestartUnit {} mode={}", name, mode);
        self.run(self.manager.restart_unit(name, mode)).await
    }

    pub async fn restart_unit_job(&self, name: &str, mode: &str) -> Result<PendingJob, DbusError> {
        log::debug!("RestartUnit {} mode={} (no wait)", name, mode);
        self.enqueue(self.manager.restart_unit(name, mode)).await
    }

    /// Restart a unit only if it is running
    pub async fn try_restart_unit(&self, name: &str, mode: &str) -> Result<String, DbusError> {
        self.run(self.manager.try_restart_unit(name, mode)).await
    }

    /// Reload if the unit supports it, restart otherwise
    pub async fn reload_or_restart_unit(&self, name: &str, mode: &str) -> Result<String, DbusError> {
        self.run(self.manager.reload_or_restart_unit(name, mode)).await
    }

    /// Reload if the unit supports it, try-restart otherwise
    pub async fn reload_or_try_restart_unit(
        &self,
        name: &str,
        mode: &str,
    ) -> Result<String, DbusError> {
        self.run(self.manager.reload_or_try_restart_unit(name, mode))
            .await
    }

    /// Create and start a transient unit.
    ///
    /// `name` includes the suffix and must be unique. The unit is released
    /// once it stops running and nothing references it.
    pub async fn start_transient_unit(
        &self,
        name: &str,
        mode: &str,
        properties: &[Property],
    ) -> Result<String, DbusError> {
        let job = self.start_transient_unit_job(name, mode, properties).await?;
        Ok(job.wait().await?)
    }

    pub async fn start_transient_unit_job(
        &self,
        name: &str,
        mode: &str,
        properties: &[Property],
    ) -> Result<PendingJob, DbusError> {
        log::debug!(
            "StartTransientUnit {} mode={} ({} properties)",
            name,
            mode,
            properties.len()
        );
        self.enqueue(self.manager.start_transient_unit(name, mode, properties, &[]))
            .await
    }

    /// Send `signal` to all of the unit's processes
    pub async fn kill_unit(&self, name: &str, signal: i32) -> Result<(), DbusError> {
        log::debug!("KillUnit {} signal={}", name, signal);
        Ok(self.manager.kill_unit(name, "all", signal).await?)
    }

    /// All properties of the unit's org.freedesktop.systemd1.Unit interface
    pub async fn get_unit_properties(
        &self,
        unit: &str,
    ) -> Result<HashMap<String, OwnedValue>, DbusError> {
        let path = unit_path(unit)?;
        let props = UnitPropertiesProxy::builder(&self.connection)
            .path(path)?
            .build()
            .await?;
        Ok(props.get_all(UNIT_INTERFACE).await?)
    }

    /// Change unit properties at runtime. Unless `runtime` is set the change
    /// also persists across reboots.
    pub async fn set_unit_properties(
        &self,
        name: &str,
        runtime: bool,
        properties: &[Property],
    ) -> Result<(), DbusError> {
        Ok(self
            .manager
            .set_unit_properties(name, runtime, properties)
            .await?)
    }

    /// Every loaded unit. A unit can be loaded under several names, so there
    /// may be more entries than units.
    pub async fn list_units(&self) -> Result<Vec<UnitStatus>, DbusError> {
        Ok(self.manager.list_units().await?)
    }

    /// Enable unit files by creating their symlinks in /etc (or /run if
    /// `runtime`). `force` replaces symlinks pointing at other units.
    ///
    /// Returns whether the files had an [Install] section, plus the changes made.
    pub async fn enable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
        force: bool,
    ) -> Result<(bool, Vec<UnitFileChange>), DbusError> {
        Ok(self.manager.enable_unit_files(files, runtime, force).await?)
    }

    /// Disable unit files by removing their symlinks
    pub async fn disable_unit_files(
        &self,
        files: &[&str],
        runtime: bool,
    ) -> Result<Vec<UnitFileChange>, DbusError> {
        Ok(self.manager.disable_unit_files(files, runtime).await?)
    }

    /// Rescan and reload unit files, like `systemctl daemon-reload`
    pub async fn reload(&self) -> Result<(), DbusError> {
        Ok(self.manager.reload().await?)
    }
}

/// Convert unit name to D-Bus ObjectPath
fn unit_path(unit_id: &str) -> Result<ObjectPath<'static>, DbusError> {
    if unit_id.is_empty() {
        return Err(DbusError::InvalidUnitName(unit_id.to_string()));
    }
    ObjectPath::try_from(unit_object_path(unit_id))
        .map_err(|_| DbusError::InvalidUnitName(unit_id.to_string()))
}

/// Convert unit name to D-Bus object path string
/// e.g., "docker.service" -> "/org/freedesktop/systemd1/unit/docker_2eservice"
pub fn unit_object_path(unit_id: &str) -> String {
    let escaped: String = unit_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_string()
            } else {
                format!("_{:02x}", c as u32)
            }
        })
        .collect();

    format!("/org/freedesktop/systemd1/unit/{}", escaped)
}

#[derive(Debug, thiserror::Error)]
pub enum DbusError {
    #[error("D-Bus call failed: {0}")]
    Call(#[source] zbus::Error),

    #[error("Unexpected reply: {0}")]
    Decode(#[source] zvariant::Error),

    #[error("Invalid unit name: {0:?}")]
    InvalidUnitName(String),

    #[error(transparent)]
    Job(#[from] JobError),
}

impl From<zbus::Error> for DbusError {
    fn from(e: zbus::Error) -> Self {
        match e {
            zbus::Error::Variant(e) => Self::Decode(e),
            e => Self::Call(e),
        }
    }
}
