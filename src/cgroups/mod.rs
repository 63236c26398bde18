//! cgroups v2 resource lifecycle
//!
//! This module creates, configures, freezes and removes the cgroup of a
//! single process.
//!
//! # Why cgroups?
//!
//! Without cgroups, a runaway workload could consume all host CPU, memory
//! or pids, starving everything else on the machine. cgroups provide
//! kernel-enforced limits the workload cannot escape.
//!
//! # Example Usage
//!
//! ```ignore
//! use cgvisor::cgroups::{Manager, ResourceSpec};
//! use cgvisor::CgroupConfig;
//!
//! // Creates /sys/fs/cgroup/cgvisor/<pid>/, moves the pid in, applies limits
//! let mut manager = Manager::new(CgroupConfig::default(), pid)?;
//! manager.apply_from_file("limits.json")?;
//!
//! // Later: patch only the pids limit, everything else stays as is
//! let patch = ResourceSpec::from_json_str(r#"{ "pids": { "limit": 512 } }"#)?;
//! manager.update(&patch)?;
//!
//! manager.pause()?;
//! manager.resume()?;
//!
//! // Succeeds even if the kernel already pruned the cgroup
//! manager.remove()?;
//! ```

mod controllers;
pub mod error;
pub mod freezer;
pub mod manager;
pub mod path;
pub mod spec;

pub use error::{CgroupError, Result};
pub use freezer::FreezerState;
pub use manager::{Manager, ManagerState};
pub use path::{CgroupPath, RemovePolicy};
pub use spec::{
    BlockIoSpec, CpuSpec, DeviceRule, DeviceType, HugeTlbSpec, MemorySpec, PidsSpec,
    ResourceSpec, ThrottleDirection, ThrottleRule, ThrottleUnit,
};
