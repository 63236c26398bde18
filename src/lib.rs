//! cgvisor - cgroup v2 resource lifecycle manager for container workloads
//!
//! This library binds a Linux cgroup v2 hierarchy to a process and enforces
//! resource limits on it: pids, memory, CPU, huge pages, devices and block
//! I/O. Limits can be re-applied and patched over the process lifetime, and
//! the whole cgroup can be frozen and thawed.
//!
//! # Modules
//!
//! - `cgroups` - resource spec, cgroup paths, controller adapters, manager
//! - `identity` - user/group lookup, including concurrent batch resolution
//! - `config` - where managed cgroups live
//! - `metrics` - Prometheus counters for manager operations
//! - `tracing` - subscriber setup for binaries and demos
//!
//! # Quick Start
//!
//! ```ignore
//! use cgvisor::{CgroupConfig, Manager, ResourceSpec};
//!
//! let mut manager = Manager::new(CgroupConfig::from_env(), pid)?;
//! manager.apply_from_file("limits.json")?;
//! manager.update(&ResourceSpec::from_json_str(r#"{ "pids": { "limit": 512 } }"#)?)?;
//! manager.remove()?;
//! ```

pub mod cgroups;
pub mod config;
pub mod identity;
pub mod metrics;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use cgroups::{CgroupError, Manager, ManagerState, ResourceSpec};
pub use config::CgroupConfig;
