//! Device access rules
//!
//! A pure cgroup v2 hierarchy enforces device access through attached
//! kernel programs, which this crate does not manage. Some hosts still
//! expose the `devices.allow`/`devices.deny` entries (hybrid mounts,
//! emulated roots); there the rules are written one by one, in order,
//! since a later rule overrides an earlier one for the same device.

use std::path::Path;

use tracing::warn;

use super::{write_entry, Controller};
use crate::cgroups::error::Result;
use crate::cgroups::spec::{DeviceRule, ResourceSpec};

const CGROUP_DEVICES_ALLOW: &str = "devices.allow";
const CGROUP_DEVICES_DENY: &str = "devices.deny";

pub(crate) struct Devices;

impl Controller for Devices {
    const NAME: &'static str = "devices";

    type Resource = Vec<DeviceRule>;

    fn needs_to_handle(spec: &ResourceSpec) -> Option<&Self::Resource> {
        spec.devices.as_ref()
    }

    fn apply(cgroup_dir: &Path, rules: &Vec<DeviceRule>) -> Result<()> {
        if rules.is_empty() {
            return Ok(());
        }

        let writable = cgroup_dir.join(CGROUP_DEVICES_ALLOW).exists()
            && cgroup_dir.join(CGROUP_DEVICES_DENY).exists();
        if !writable {
            warn!(
                rules = rules.len(),
                "device rules not enforced: hierarchy has no devices.allow/devices.deny"
            );
            return Ok(());
        }

        for rule in rules {
            let entry = if rule.allow {
                CGROUP_DEVICES_ALLOW
            } else {
                CGROUP_DEVICES_DENY
            };
            write_entry(cgroup_dir, Self::NAME, entry, &rule_line(rule))?;
        }
        Ok(())
    }
}

/// `"<type> <major>:<minor> <access>"`, `*` for a wildcard number
fn rule_line(rule: &DeviceRule) -> String {
    let number = |n: Option<u32>| n.map_or_else(|| "*".to_string(), |n| n.to_string());
    format!(
        "{} {}:{} {}",
        rule.kind.as_str(),
        number(rule.major),
        number(rule.minor),
        rule.access
    )
}
