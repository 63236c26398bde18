//! Hierarchy path derivation and directory lifecycle
//!
//! ```text
//! /sys/fs/cgroup/              ← root (cgroup v2 mount)
//! └── cgvisor/                 ← namespace prefix
//!     └── 4242/                ← one directory per managed pid
//!         ├── pids.max
//!         ├── memory.max
//!         ├── cgroup.freeze
//!         └── ...
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nix::sys::statfs::{statfs, CGROUP2_SUPER_MAGIC};
use tracing::{debug, warn};

use super::error::{CgroupError, Result};
use crate::config::CgroupConfig;

/// Lists the controllers available at a level of the hierarchy
const CGROUP_CONTROLLERS: &str = "cgroup.controllers";

/// Controls which controllers are delegated to child cgroups
const CGROUP_SUBTREE_CONTROL: &str = "cgroup.subtree_control";

/// How [`CgroupPath::remove`] treats a directory that is already gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovePolicy {
    /// A missing directory counts as removed. The owning process may have
    /// exited and the kernel pruned the cgroup before we got here.
    TolerateMissing,
    /// A missing directory is reported as a filesystem error
    Strict,
}

/// Location of one managed cgroup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupPath {
    root: PathBuf,
    relative: PathBuf,
    pid: i32,
}

impl CgroupPath {
    /// Derive the hierarchy path for `pid`
    ///
    /// Deterministic: the same config and pid always yield the same path, so
    /// a manager rebuilt from a pid finds the cgroup an earlier one created.
    pub fn derive(config: &CgroupConfig, pid: i32) -> Result<Self> {
        if pid <= 0 {
            return Err(CgroupError::InvalidProcess { pid });
        }
        Ok(Self {
            root: config.root.clone(),
            relative: PathBuf::from(&config.namespace).join(pid.to_string()),
            pid,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the mount root, e.g. `cgvisor/4242`
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Absolute directory of this cgroup
    pub fn full(&self) -> PathBuf {
        self.root.join(&self.relative)
    }

    /// Absolute path of an interface entry inside this cgroup
    pub fn entry(&self, name: &str) -> PathBuf {
        self.full().join(name)
    }

    pub fn exists(&self) -> bool {
        self.full().is_dir()
    }

    /// Create the cgroup directory
    ///
    /// Succeeds if the directory already exists. Controllers listed in the
    /// root's `cgroup.controllers` are enabled in every intermediate
    /// `cgroup.subtree_control` so the leaf gets their interface entries.
    pub fn create(&self) -> Result<()> {
        let full = self.full();
        fs::create_dir_all(&full).map_err(|e| CgroupError::fs(&full, e))?;
        debug!(path = %full.display(), "cgroup directory ready");
        self.delegate_controllers();
        Ok(())
    }

    /// Best effort: a failure here surfaces later as a missing interface
    /// entry for whichever controller the spec actually asks for.
    fn delegate_controllers(&self) {
        let available = match fs::read_to_string(self.root.join(CGROUP_CONTROLLERS)) {
            Ok(content) => content,
            Err(_) => return,
        };
        let controllers: Vec<&str> = available.split_whitespace().collect();
        if controllers.is_empty() {
            return;
        }

        let mut levels = vec![self.root.clone()];
        if let Some(parent) = self.relative.parent() {
            for component in parent.components() {
                let next = levels[levels.len() - 1].join(component);
                levels.push(next);
            }
        }

        for dir in levels {
            let subtree = dir.join(CGROUP_SUBTREE_CONTROL);
            for controller in &controllers {
                if let Err(e) = fs::write(&subtree, format!("+{}", controller)) {
                    warn!(
                        path = %subtree.display(),
                        controller = *controller,
                        error = %e,
                        "failed to delegate controller"
                    );
                }
            }
        }
    }

    /// Remove the cgroup directory and any child cgroups, deepest first
    ///
    /// On a real cgroup2 mount only directories are removed; the kernel
    /// drops interface entries with them. On any other filesystem the
    /// entries are ordinary files and get unlinked as well.
    pub fn remove(&self, policy: RemovePolicy) -> Result<()> {
        let full = self.full();
        let emulated = match statfs(full.as_path()) {
            Ok(stat) => stat.filesystem_type() != CGROUP2_SUPER_MAGIC,
            Err(nix::errno::Errno::ENOENT) => {
                return missing(&full, policy);
            }
            Err(e) => return Err(CgroupError::fs(&full, io::Error::from(e))),
        };

        match remove_tree(&full, emulated) {
            Ok(()) => {
                debug!(path = %full.display(), "cgroup directory removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => missing(&full, policy),
            Err(e) => Err(CgroupError::fs(&full, e)),
        }
    }
}

fn missing(path: &Path, policy: RemovePolicy) -> Result<()> {
    match policy {
        RemovePolicy::TolerateMissing => {
            debug!(path = %path.display(), "cgroup directory already gone");
            Ok(())
        }
        RemovePolicy::Strict => {
            let err = io::Error::from(io::ErrorKind::NotFound);
            Err(CgroupError::fs(path, err))
        }
    }
}

fn remove_tree(dir: &Path, unlink_files: bool) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(t) => t,
            // Child cgroup pruned while we were walking
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let result = if file_type.is_dir() {
            remove_tree(&path, unlink_files)
        } else if unlink_files {
            fs::remove_file(&path)
        } else {
            Ok(())
        };
        if let Err(e) = result {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(e);
            }
        }
    }
    fs::remove_dir(dir)
}
