//! Per-controller adapters
//!
//! Each adapter maps one section of a [`ResourceSpec`] onto the interface
//! entries of one controller family. Only fields present in the spec are
//! written; absent fields leave whatever the kernel currently holds.
//!
//! | Section  | Entries                                        |
//! |----------|------------------------------------------------|
//! | pids     | `pids.max`                                     |
//! | memory   | `memory.max`, `memory.low`, `memory.swap.max`  |
//! | cpu      | `cpu.weight`, `cpu.max`, `cpuset.cpus`         |
//! | hugetlb  | `hugetlb.<size>.max`                           |
//! | devices  | `devices.allow`, `devices.deny`                |
//! | blockio  | `io.weight`, `io.max`                          |

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use tracing::debug;

use super::error::{CgroupError, Result};
use super::spec::ResourceSpec;
use crate::metrics::CGROUP_ENTRY_WRITES;

mod blkio;
mod cpu;
mod devices;
mod hugetlb;
mod memory;
mod pids;

pub(crate) use blkio::Io;
pub(crate) use cpu::Cpu;
pub(crate) use devices::Devices;
pub(crate) use hugetlb::HugeTlb;
pub(crate) use memory::Memory;
pub(crate) use pids::Pids;

/// Sentinel the kernel accepts for "no ceiling"
pub(crate) const LIMIT_MAX: &str = "max";

pub(crate) trait Controller {
    /// Controller name as it appears in `cgroup.controllers`
    const NAME: &'static str;

    type Resource;

    /// The section of `spec` this controller handles, if present
    fn needs_to_handle(spec: &ResourceSpec) -> Option<&Self::Resource>;

    /// Write every present field of `resource` into the cgroup at `cgroup_dir`
    fn apply(cgroup_dir: &Path, resource: &Self::Resource) -> Result<()>;
}

fn run<C: Controller>(cgroup_dir: &Path, spec: &ResourceSpec) -> Result<()> {
    if let Some(resource) = C::needs_to_handle(spec) {
        debug!(controller = C::NAME, "applying controller settings");
        C::apply(cgroup_dir, resource)?;
    }
    Ok(())
}

/// Run every adapter against `cgroup_dir`
///
/// Stops at the first failure. Entries written before the failure stay
/// written; there is no multi-file transaction to roll back.
pub(crate) fn apply_all(cgroup_dir: &Path, spec: &ResourceSpec) -> Result<()> {
    // Adapters that skip absent entries would otherwise report success
    // against a pruned cgroup
    if !cgroup_dir.is_dir() {
        let err = io::Error::from(io::ErrorKind::NotFound);
        return Err(CgroupError::fs(cgroup_dir, err));
    }
    run::<Pids>(cgroup_dir, spec)?;
    run::<Memory>(cgroup_dir, spec)?;
    run::<Cpu>(cgroup_dir, spec)?;
    run::<HugeTlb>(cgroup_dir, spec)?;
    run::<Devices>(cgroup_dir, spec)?;
    run::<Io>(cgroup_dir, spec)?;
    Ok(())
}

/// Encode a signed limit: negative means unlimited
pub(crate) fn limit_value(limit: i64) -> String {
    if limit < 0 {
        LIMIT_MAX.to_string()
    } else {
        limit.to_string()
    }
}

/// Classify a missing interface entry
///
/// Inside an existing cgroup a missing entry means the controller is not
/// enabled there. If the cgroup directory itself is gone (the process
/// exited and the kernel pruned it), the error names the directory.
pub(crate) fn entry_not_found(
    cgroup_dir: &Path,
    controller: &'static str,
    entry: &str,
    err: io::Error,
) -> CgroupError {
    if cgroup_dir.is_dir() {
        CgroupError::ControllerUnavailable {
            controller,
            entry: entry.to_string(),
        }
    } else {
        CgroupError::fs(cgroup_dir, err)
    }
}

/// Write `value` into an existing interface entry
///
/// The entry is never created: on the cgroup filesystem a missing entry
/// means the controller is not enabled for this cgroup, which is reported
/// as [`CgroupError::ControllerUnavailable`].
pub(crate) fn write_entry(
    cgroup_dir: &Path,
    controller: &'static str,
    entry: &str,
    value: &str,
) -> Result<()> {
    let path = cgroup_dir.join(entry);
    let result = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&path)
        .and_then(|mut file| file.write_all(value.as_bytes()));

    match result {
        Ok(()) => {
            CGROUP_ENTRY_WRITES.with_label_values(&[controller]).inc();
            debug!(controller, entry, value, "wrote cgroup entry");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(entry_not_found(cgroup_dir, controller, entry, e))
        }
        Err(e) => Err(CgroupError::fs(path, e)),
    }
}

#[cfg(test)]
fn fake_cgroup(entries: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, value) in entries {
        std::fs::write(dir.path().join(name), value).unwrap();
    }
    dir
}

#[cfg(test)]
fn read_entry(dir: &Path, name: &str) -> String {
    let content = std::fs::read_to_string(dir.join(name)).unwrap();
    content.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_value_encoding() {
        assert_eq!(limit_value(-1), "max");
        assert_eq!(limit_value(i64::MIN), "max");
        assert_eq!(limit_value(0), "0");
        assert_eq!(limit_value(1024), "1024");
    }

    #[test]
    fn test_write_entry_never_creates() {
        let dir = fake_cgroup(&[]);
        let err = write_entry(dir.path(), "pids", "pids.max", "10").unwrap_err();
        match err {
            CgroupError::ControllerUnavailable { controller, entry } => {
                assert_eq!(controller, "pids");
                assert_eq!(entry, "pids.max");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("pids.max").exists());
    }

    #[test]
    fn test_write_entry_in_pruned_cgroup() {
        let dir = fake_cgroup(&[]);
        let gone = dir.path().join("4242");
        let err = write_entry(&gone, "pids", "pids.max", "10").unwrap_err();
        match err {
            CgroupError::Filesystem { path, source } => {
                assert_eq!(path, gone);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }

        let spec = ResourceSpec::from_json_str(r#"{ "hugetlb": { "2MB": 1 } }"#).unwrap();
        assert!(matches!(
            apply_all(&gone, &spec),
            Err(CgroupError::Filesystem { .. })
        ));
    }

    #[test]
    fn test_write_entry_reports_other_io_errors() {
        // A directory where the entry should be cannot be opened for writing
        let dir = fake_cgroup(&[]);
        std::fs::create_dir(dir.path().join("pids.max")).unwrap();
        let err = write_entry(dir.path(), "pids", "pids.max", "10").unwrap_err();
        match err {
            CgroupError::Filesystem { path, .. } => assert_eq!(path, dir.path().join("pids.max")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_write_entry_replaces_value() {
        let dir = fake_cgroup(&[("pids.max", "1024\n")]);
        write_entry(dir.path(), "pids", "pids.max", "8").unwrap();
        assert_eq!(read_entry(dir.path(), "pids.max"), "8");
    }

    #[test]
    fn test_apply_all_touches_only_present_fields() {
        let dir = fake_cgroup(&[
            ("pids.max", "max"),
            ("memory.max", "max"),
            ("memory.low", "0"),
            ("cpu.max", "max 100000"),
        ]);
        let spec = ResourceSpec::from_json_str(r#"{ "memory": { "limit": 4096 } }"#).unwrap();
        apply_all(dir.path(), &spec).unwrap();

        assert_eq!(read_entry(dir.path(), "memory.max"), "4096");
        assert_eq!(read_entry(dir.path(), "memory.low"), "0");
        assert_eq!(read_entry(dir.path(), "pids.max"), "max");
        assert_eq!(read_entry(dir.path(), "cpu.max"), "max 100000");
    }

    #[test]
    fn test_apply_all_keeps_earlier_writes_on_failure() {
        // cpu.max is missing, so the cpu adapter fails after pids succeeded
        let dir = fake_cgroup(&[("pids.max", "max")]);
        let spec = ResourceSpec::from_json_str(
            r#"{ "pids": { "limit": 64 }, "cpu": { "quota": 1000, "period": 10000 } }"#,
        )
        .unwrap();

        let err = apply_all(dir.path(), &spec).unwrap_err();
        assert!(matches!(
            err,
            CgroupError::ControllerUnavailable {
                controller: "cpu",
                ..
            }
        ));
        assert_eq!(read_entry(dir.path(), "pids.max"), "64");
    }
}
