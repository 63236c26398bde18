use std::collections::BTreeSet;
use std::path::Path;

use super::{write_entry, Controller, LIMIT_MAX};
use crate::cgroups::error::Result;
use crate::cgroups::spec::{CpuSpec, ResourceSpec, CPU_SHARES_MAX, CPU_SHARES_MIN};

const CGROUP_CPU_WEIGHT: &str = "cpu.weight";
// "{quota} {period}" in microseconds, quota may be "max"
const CGROUP_CPU_MAX: &str = "cpu.max";
const CGROUP_CPUSET_CPUS: &str = "cpuset.cpus";

/// cpuset is its own controller in cgroup v2
const CPUSET: &str = "cpuset";

pub(crate) struct Cpu;

impl Controller for Cpu {
    const NAME: &'static str = "cpu";

    type Resource = CpuSpec;

    fn needs_to_handle(spec: &ResourceSpec) -> Option<&Self::Resource> {
        spec.cpu.as_ref()
    }

    fn apply(cgroup_dir: &Path, cpu: &CpuSpec) -> Result<()> {
        if let Some(shares) = cpu.shares {
            let weight = shares_to_weight(shares).to_string();
            write_entry(cgroup_dir, Self::NAME, CGROUP_CPU_WEIGHT, &weight)?;
        }

        // Validation guarantees quota and period come together
        if let (Some(quota), Some(period)) = (cpu.quota, cpu.period) {
            let value = cpu_max(quota, period);
            write_entry(cgroup_dir, Self::NAME, CGROUP_CPU_MAX, &value)?;
        }

        if let Some(cpus) = &cpu.cpus {
            let list = format_cpu_list(cpus);
            write_entry(cgroup_dir, CPUSET, CGROUP_CPUSET_CPUS, &list)?;
        }

        Ok(())
    }
}

/// Map v1 shares (2..=262144) onto v2 weight (1..=10000)
fn shares_to_weight(shares: u64) -> u64 {
    let shares = shares.clamp(CPU_SHARES_MIN, CPU_SHARES_MAX);
    1 + ((shares - 2) * 9999) / 262_142
}

fn cpu_max(quota: i64, period: u64) -> String {
    if quota <= 0 {
        format!("{} {}", LIMIT_MAX, period)
    } else {
        format!("{} {}", quota, period)
    }
}

/// Render a CPU set in kernel list format, collapsing runs: `0-2,5`
fn format_cpu_list(cpus: &BTreeSet<u32>) -> String {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &cpu in cpus {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == cpu => *end = cpu,
            _ => ranges.push((cpu, cpu)),
        }
    }
    ranges
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
