use std::path::Path;

use super::{limit_value, write_entry, Controller};
use crate::cgroups::error::Result;
use crate::cgroups::spec::{PidsSpec, ResourceSpec};

// Maximum number of tasks in the cgroup
const CGROUP_PIDS_MAX: &str = "pids.max";

pub(crate) struct Pids;

impl Controller for Pids {
    const NAME: &'static str = "pids";

    type Resource = PidsSpec;

    fn needs_to_handle(spec: &ResourceSpec) -> Option<&Self::Resource> {
        spec.pids.as_ref()
    }

    fn apply(cgroup_dir: &Path, pids: &PidsSpec) -> Result<()> {
        if let Some(limit) = pids.limit {
            let value = limit_value(limit);
            write_entry(cgroup_dir, Self::NAME, CGROUP_PIDS_MAX, &value)?;
        }
        Ok(())
    }
}
