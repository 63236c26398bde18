use std::path::Path;

use tracing::debug;

use super::{limit_value, write_entry, Controller};
use crate::cgroups::error::Result;
use crate::cgroups::spec::{HugeTlbSpec, ResourceSpec};

pub(crate) struct HugeTlb;

fn limit_entry(page_size: &str) -> String {
    format!("hugetlb.{}.max", page_size)
}

impl Controller for HugeTlb {
    const NAME: &'static str = "hugetlb";

    type Resource = HugeTlbSpec;

    fn needs_to_handle(spec: &ResourceSpec) -> Option<&Self::Resource> {
        spec.hugetlb.as_ref()
    }

    /// Page sizes vary by architecture and kernel build; a size this host
    /// does not offer is skipped rather than failing the whole call.
    fn apply(cgroup_dir: &Path, hugetlb: &HugeTlbSpec) -> Result<()> {
        for (page_size, limit) in &hugetlb.0 {
            let Some(limit) = limit else { continue };
            let entry = limit_entry(page_size);
            if !cgroup_dir.join(&entry).exists() {
                debug!(
                    page_size = page_size.as_str(),
                    "huge page size not supported, skipping"
                );
                continue;
            }
            write_entry(cgroup_dir, Self::NAME, &entry, &limit_value(*limit))?;
        }
        Ok(())
    }
}
