use std::path::Path;

use super::{limit_value, write_entry, Controller};
use crate::cgroups::error::Result;
use crate::cgroups::spec::{MemorySpec, ResourceSpec};

const CGROUP_MEMORY_MAX: &str = "memory.max";
const CGROUP_MEMORY_LOW: &str = "memory.low";
// Only present when the kernel accounts swap
const CGROUP_MEMORY_SWAP_MAX: &str = "memory.swap.max";

pub(crate) struct Memory;

impl Controller for Memory {
    const NAME: &'static str = "memory";

    type Resource = MemorySpec;

    fn needs_to_handle(spec: &ResourceSpec) -> Option<&Self::Resource> {
        spec.memory.as_ref()
    }

    fn apply(cgroup_dir: &Path, memory: &MemorySpec) -> Result<()> {
        if let Some(limit) = memory.limit {
            let value = limit_value(limit);
            write_entry(cgroup_dir, Self::NAME, CGROUP_MEMORY_MAX, &value)?;
        }
        if let Some(swap) = memory.swap {
            let value = limit_value(swap);
            write_entry(cgroup_dir, Self::NAME, CGROUP_MEMORY_SWAP_MAX, &value)?;
        }
        if let Some(reservation) = memory.reservation {
            let value = limit_value(reservation);
            write_entry(cgroup_dir, Self::NAME, CGROUP_MEMORY_LOW, &value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{fake_cgroup, read_entry};
    use super::*;
    use crate::cgroups::CgroupError;

    #[test]
    fn test_memory_entries() {
        let dir = fake_cgroup(&[
            (CGROUP_MEMORY_MAX, "max"),
            (CGROUP_MEMORY_LOW, "0"),
            (CGROUP_MEMORY_SWAP_MAX, "max"),
        ]);
        let memory = MemorySpec {
            limit: Some(512 * 1024 * 1024),
            reservation: Some(256 * 1024 * 1024),
            swap: Some(0),
        };
        Memory::apply(dir.path(), &memory).unwrap();

        assert_eq!(read_entry(dir.path(), CGROUP_MEMORY_MAX), "536870912");
        assert_eq!(read_entry(dir.path(), CGROUP_MEMORY_LOW), "268435456");
        assert_eq!(read_entry(dir.path(), CGROUP_MEMORY_SWAP_MAX), "0");
    }

    #[test]
    fn test_requested_swap_without_accounting_fails() {
        let dir = fake_cgroup(&[(CGROUP_MEMORY_MAX, "max")]);
        let memory = MemorySpec {
            swap: Some(-1),
            ..Default::default()
        };
        let err = Memory::apply(dir.path(), &memory).unwrap_err();
        match err {
            CgroupError::ControllerUnavailable { controller, entry } => {
                assert_eq!(controller, "memory");
                assert_eq!(entry, CGROUP_MEMORY_SWAP_MAX);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unrequested_swap_is_not_needed() {
        let dir = fake_cgroup(&[(CGROUP_MEMORY_MAX, "max")]);
        let memory = MemorySpec {
            limit: Some(-1),
            ..Default::default()
        };
        Memory::apply(dir.path(), &memory).unwrap();
        assert_eq!(read_entry(dir.path(), CGROUP_MEMORY_MAX), "max");
    }
}
