//! cgroup v2 freezer
//!
//! Writing `1` to `cgroup.freeze` asks the kernel to stop every task in the
//! cgroup; writing `0` lets them run again. The write returns as soon as the
//! request is recorded. Whether the tasks have actually stopped shows up
//! later in the `frozen` key of `cgroup.events`.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use super::controllers::{entry_not_found, write_entry};
use super::error::{CgroupError, Result};

const CGROUP_FREEZE: &str = "cgroup.freeze";
const CGROUP_EVENTS: &str = "cgroup.events";

/// Controller name used in errors and metrics
const FREEZER: &str = "freezer";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezerState {
    Running,
    Frozen,
}

impl FreezerState {
    fn as_value(self) -> &'static str {
        match self {
            FreezerState::Running => "0",
            FreezerState::Frozen => "1",
        }
    }

    fn from_value(value: &str) -> Option<Self> {
        match value.trim() {
            "0" => Some(FreezerState::Running),
            "1" => Some(FreezerState::Frozen),
            _ => None,
        }
    }
}

/// Request `state` for every task in the cgroup
pub(crate) fn request(cgroup_dir: &Path, state: FreezerState) -> Result<()> {
    write_entry(cgroup_dir, FREEZER, CGROUP_FREEZE, state.as_value())
}

/// The state last requested through `cgroup.freeze`
pub(crate) fn requested(cgroup_dir: &Path) -> Result<FreezerState> {
    let path = cgroup_dir.join(CGROUP_FREEZE);
    let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => entry_not_found(cgroup_dir, FREEZER, CGROUP_FREEZE, e),
        _ => CgroupError::fs(&path, e),
    })?;
    FreezerState::from_value(&content).ok_or_else(|| {
        CgroupError::fs(
            &path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected freezer value {:?}", content.trim()),
            ),
        )
    })
}

/// The state the kernel reports as reached, from `cgroup.events`
pub(crate) fn observed(cgroup_dir: &Path) -> Result<Option<FreezerState>> {
    let path = cgroup_dir.join(CGROUP_EVENTS);
    let content = fs::read_to_string(&path).map_err(|e| CgroupError::fs(&path, e))?;
    Ok(content
        .lines()
        .filter_map(|line| line.split_once(' '))
        .find(|(key, _)| *key == "frozen")
        .and_then(|(_, value)| FreezerState::from_value(value)))
}

/// Poll `cgroup.events` until the kernel reports `want`, or `timeout` elapses
pub(crate) fn wait_for(cgroup_dir: &Path, want: FreezerState, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        if observed(cgroup_dir)? == Some(want) {
            return Ok(());
        }
        if start.elapsed() > timeout {
            return Err(CgroupError::fs(
                cgroup_dir.join(CGROUP_EVENTS),
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("freezer did not reach {:?} within {:?}", want, timeout),
                ),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CGROUP_FREEZE), "0\n").unwrap();

        request(dir.path(), FreezerState::Frozen).unwrap();
        assert_eq!(requested(dir.path()).unwrap(), FreezerState::Frozen);

        request(dir.path(), FreezerState::Running).unwrap();
        assert_eq!(requested(dir.path()).unwrap(), FreezerState::Running);
    }

    #[test]
    fn test_missing_freeze_entry() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            request(dir.path(), FreezerState::Frozen),
            Err(CgroupError::ControllerUnavailable {
                controller: FREEZER,
                ..
            })
        ));
        assert!(matches!(
            requested(dir.path()),
            Err(CgroupError::ControllerUnavailable { .. })
        ));
    }

    #[test]
    fn test_pruned_cgroup_is_not_a_missing_controller() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("4242");
        assert!(matches!(
            request(&gone, FreezerState::Frozen),
            Err(CgroupError::Filesystem { .. })
        ));
        assert!(matches!(
            requested(&gone),
            Err(CgroupError::Filesystem { .. })
        ));
    }

    #[test]
    fn test_observed_parses_events() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CGROUP_EVENTS), "populated 1\nfrozen 1\n").unwrap();
        assert_eq!(observed(dir.path()).unwrap(), Some(FreezerState::Frozen));
        let timeout = Duration::from_millis(50);
        wait_for(dir.path(), FreezerState::Frozen, timeout).unwrap();
    }

    #[test]
    fn test_wait_times_out() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CGROUP_EVENTS), "populated 1\nfrozen 0\n").unwrap();
        let timeout = Duration::from_millis(30);
        let err = wait_for(dir.path(), FreezerState::Frozen, timeout).unwrap_err();
        match err {
            CgroupError::Filesystem { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::TimedOut)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
