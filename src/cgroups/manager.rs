//! cgroup lifecycle for one managed process
//!
//! A [`Manager`] owns the cgroup of a single pid and walks it through
//! create → apply/update → pause/resume → remove.
//!
//! ```text
//!              create              pause
//! Unprepared ─────────► Active ◄──────────► Frozen
//!                          │       resume      │
//!                          └──────┬────────────┘
//!                                 │ remove
//!                                 ▼
//!                              Removed
//! ```
//!
//! The manager is synchronous and not meant to be shared: two interleaved
//! Apply calls on the same cgroup could leave a mix of both specs on disk.
//! Managers for different pids are fully independent.

use std::path::Path;
use std::time::Duration;

use tracing::dispatcher::{self, Dispatch};
use tracing::{debug, info, info_span};

use super::controllers::{self, write_entry};
use super::error::{CgroupError, Result};
use super::freezer::{self, FreezerState};
use super::path::{CgroupPath, RemovePolicy};
use super::spec::ResourceSpec;
use crate::config::CgroupConfig;
use crate::metrics::CGROUP_OPERATIONS;

/// Moving a pid here migrates the process into the cgroup
const CGROUP_PROCS: &str = "cgroup.procs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No cgroup directory yet
    Unprepared,
    /// Directory exists, freezer released
    Active,
    /// Directory exists, freeze requested
    Frozen,
    /// Directory removed; terminal
    Removed,
}

/// Manages the cgroup bound to one process
///
/// # Example
///
/// ```ignore
/// let mut manager = Manager::new(CgroupConfig::default(), child.id() as i32)?;
/// manager.create()?;
/// manager.add_process(child.id() as i32)?;
/// manager.apply(&ResourceSpec::from_file("limits.json")?)?;
///
/// manager.pause()?;
/// manager.resume()?;
///
/// manager.remove()?;
/// ```
///
/// # Partial failure
///
/// Apply and Update write one interface entry at a time. When a write
/// fails, the entries before it stay written and the call returns the
/// error; treat the cgroup as being in an unknown state and apply again.
pub struct Manager {
    config: CgroupConfig,
    pid: i32,
    path: Option<CgroupPath>,
    state: ManagerState,
    applied_spec: Option<ResourceSpec>,
    dispatch: Dispatch,
}

impl Manager {
    /// Bind a new manager to a freshly started process
    pub fn new(config: CgroupConfig, pid: i32) -> Result<Self> {
        let path = CgroupPath::derive(&config, pid)?;
        Ok(Self {
            config,
            pid,
            path: Some(path),
            state: ManagerState::Unprepared,
            applied_spec: None,
            dispatch: current_dispatch(),
        })
    }

    /// A manager with no process yet. Every operation that needs a pid
    /// fails with [`CgroupError::InvalidProcess`] until [`Manager::bind`].
    pub fn unbound(config: CgroupConfig) -> Self {
        Self {
            config,
            pid: 0,
            path: None,
            state: ManagerState::Unprepared,
            applied_spec: None,
            dispatch: current_dispatch(),
        }
    }

    /// Rebuild a manager for a process whose cgroup may already exist
    ///
    /// The state comes from disk: `Unprepared` if the directory is missing,
    /// `Frozen` if a freeze is requested, `Active` otherwise. No applied
    /// spec is known until the next Apply or Update.
    pub fn from_pid(config: CgroupConfig, pid: i32) -> Result<Self> {
        let mut manager = Self::unbound(config);
        manager.bind(pid)?;
        Ok(manager)
    }

    /// Route this manager's diagnostics to `dispatch` instead of the
    /// dispatcher that was current at construction
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Point the manager at `pid`, picking up any cgroup already on disk
    ///
    /// A removed manager stays removed; build a new one for the next
    /// lifecycle.
    pub fn bind(&mut self, pid: i32) -> Result<()> {
        self.require_state(
            "bind",
            &[ManagerState::Unprepared, ManagerState::Active, ManagerState::Frozen],
        )?;
        let path = CgroupPath::derive(&self.config, pid)?;
        let state = if path.exists() {
            match freezer::requested(&path.full()) {
                Ok(FreezerState::Frozen) => ManagerState::Frozen,
                _ => ManagerState::Active,
            }
        } else {
            ManagerState::Unprepared
        };

        let dir = path.full();
        dispatcher::with_default(&self.dispatch, || {
            debug!(pid, state = ?state, path = %dir.display(), "manager bound");
        });
        self.pid = pid;
        self.path = Some(path);
        self.state = state;
        self.applied_spec = None;
        Ok(())
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn path(&self) -> Option<&CgroupPath> {
        self.path.as_ref()
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn is_frozen(&self) -> bool {
        self.state == ManagerState::Frozen
    }

    /// The last spec applied through this manager, merged with later updates
    ///
    /// Diagnostics only; never consulted when deciding what to write.
    pub fn applied_spec(&self) -> Option<&ResourceSpec> {
        self.applied_spec.as_ref()
    }

    /// Create the cgroup directory. No limits are written.
    pub fn create(&mut self) -> Result<()> {
        self.observed("create", Self::create_inner)
    }

    /// Write every present field of `spec`
    ///
    /// Absent fields are left as they are on disk. On success `spec`
    /// becomes the applied spec.
    ///
    /// Device rules are only enforced where the cgroup exposes
    /// `devices.allow`/`devices.deny`. A pure v2 hierarchy does not, and
    /// there the rules are skipped with a warning while the call succeeds.
    pub fn apply(&mut self, spec: &ResourceSpec) -> Result<()> {
        self.observed("apply", |m| m.apply_inner(spec))
    }

    /// Patch the cgroup with the present fields of `spec`
    ///
    /// Writes exactly what [`Manager::apply`] would; the difference is that
    /// `spec` is merged into the applied spec rather than replacing it.
    pub fn update(&mut self, spec: &ResourceSpec) -> Result<()> {
        self.observed("update", |m| m.update_inner(spec))
    }

    /// Parse a resource document, create the cgroup if needed, move the
    /// bound process into it and apply the document
    pub fn apply_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.observed("apply", |m| {
            let spec = ResourceSpec::from_file(path)?;
            if m.state == ManagerState::Unprepared {
                m.create_inner()?;
            }
            m.add_process_inner(m.pid)?;
            m.apply_inner(&spec)
        })
    }

    /// Parse a resource document and patch the cgroup with it
    pub fn update_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.observed("update", |m| {
            let spec = ResourceSpec::from_file(path)?;
            m.update_inner(&spec)
        })
    }

    /// Move `pid` into this cgroup
    pub fn add_process(&mut self, pid: i32) -> Result<()> {
        self.observed("add_process", |m| m.add_process_inner(pid))
    }

    /// Request a freeze of every task in the cgroup
    ///
    /// Returns once the kernel accepted the request, not once the tasks
    /// stopped. Use [`Manager::wait_for_freeze`] to wait for that.
    pub fn pause(&mut self) -> Result<()> {
        self.observed("pause", |m| {
            m.require_pid()?;
            m.require_state("pause", &[ManagerState::Active])?;
            freezer::request(&m.require_path()?.full(), FreezerState::Frozen)?;
            m.state = ManagerState::Frozen;
            info!(pid = m.pid, "cgroup frozen");
            Ok(())
        })
    }

    /// Release a previous freeze
    pub fn resume(&mut self) -> Result<()> {
        self.observed("resume", |m| {
            m.require_pid()?;
            m.require_state("resume", &[ManagerState::Frozen])?;
            freezer::request(&m.require_path()?.full(), FreezerState::Running)?;
            m.state = ManagerState::Active;
            info!(pid = m.pid, "cgroup thawed");
            Ok(())
        })
    }

    /// Read back the freeze state requested on disk
    pub fn freezer_state(&self) -> Result<FreezerState> {
        freezer::requested(&self.require_path()?.full())
    }

    /// Block until the kernel reports that the last Pause or Resume took
    /// effect, or fail once `timeout` elapses
    pub fn wait_for_freeze(&self, timeout: Duration) -> Result<()> {
        let want = match self.state {
            ManagerState::Frozen => FreezerState::Frozen,
            ManagerState::Active => FreezerState::Running,
            state => {
                return Err(CgroupError::InvalidState {
                    operation: "wait for",
                    state,
                })
            }
        };
        freezer::wait_for(&self.require_path()?.full(), want, timeout)
    }

    /// Remove the cgroup directory
    ///
    /// A directory that is already gone counts as removed: the process
    /// may have exited and the kernel pruned its cgroup. Calling this again
    /// after success is a no-op.
    pub fn remove(&mut self) -> Result<()> {
        self.observed("remove", |m| {
            if m.state == ManagerState::Removed {
                debug!(pid = m.pid, "cgroup already removed");
                return Ok(());
            }
            if let Some(path) = &m.path {
                path.remove(RemovePolicy::TolerateMissing)?;
            }
            m.state = ManagerState::Removed;
            info!(pid = m.pid, "cgroup removed");
            Ok(())
        })
    }

    fn create_inner(&mut self) -> Result<()> {
        self.require_state(
            "create",
            &[ManagerState::Unprepared, ManagerState::Active, ManagerState::Frozen],
        )?;
        let path = self.require_path()?;
        path.create()?;
        let dir = path.full();
        if self.state == ManagerState::Unprepared {
            info!(pid = self.pid, path = %dir.display(), "cgroup created");
            self.state = ManagerState::Active;
        }
        Ok(())
    }

    fn apply_inner(&mut self, spec: &ResourceSpec) -> Result<()> {
        self.write_spec("apply", spec)?;
        self.applied_spec = Some(spec.clone());
        Ok(())
    }

    fn update_inner(&mut self, spec: &ResourceSpec) -> Result<()> {
        self.write_spec("update", spec)?;
        self.applied_spec = Some(match &self.applied_spec {
            Some(previous) => previous.merge(spec),
            None => spec.clone(),
        });
        Ok(())
    }

    fn write_spec(&self, operation: &'static str, spec: &ResourceSpec) -> Result<()> {
        self.require_state(operation, &[ManagerState::Active, ManagerState::Frozen])?;
        spec.validate()?;
        let dir = self.require_path()?.full();
        controllers::apply_all(&dir, spec)?;
        info!(pid = self.pid, operation, "resource limits written");
        Ok(())
    }

    fn add_process_inner(&mut self, pid: i32) -> Result<()> {
        if pid <= 0 {
            return Err(CgroupError::InvalidProcess { pid });
        }
        self.require_state(
            "add a process to",
            &[ManagerState::Active, ManagerState::Frozen],
        )?;
        let dir = self.require_path()?.full();
        write_entry(&dir, "cgroup", CGROUP_PROCS, &pid.to_string())?;
        debug!(pid, cgroup = %dir.display(), "process attached");
        Ok(())
    }

    fn require_pid(&self) -> Result<()> {
        if self.pid <= 0 {
            return Err(CgroupError::InvalidProcess { pid: self.pid });
        }
        Ok(())
    }

    fn require_path(&self) -> Result<&CgroupPath> {
        self.path
            .as_ref()
            .ok_or(CgroupError::InvalidProcess { pid: self.pid })
    }

    fn require_state(&self, operation: &'static str, allowed: &[ManagerState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CgroupError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Run `op` with this manager's dispatcher and count the outcome
    fn observed<T>(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let dispatch = self.dispatch.clone();
        dispatcher::with_default(&dispatch, || {
            let span = info_span!("cgroup", operation, pid = self.pid);
            let _guard = span.enter();

            let result = op(self);
            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) => {
                    debug!(error = %e, "cgroup operation failed");
                    "error"
                }
            };
            CGROUP_OPERATIONS
                .with_label_values(&[operation, outcome])
                .inc();
            result
        })
    }
}

fn current_dispatch() -> Dispatch {
    dispatcher::get_default(|dispatch| dispatch.clone())
}
