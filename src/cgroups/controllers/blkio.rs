use std::path::Path;

use super::{limit_value, write_entry, Controller};
use crate::cgroups::error::Result;
use crate::cgroups::spec::{
    BlockIoSpec, ResourceSpec, ThrottleDirection, ThrottleRule, ThrottleUnit, BLKIO_WEIGHT_MAX,
    BLKIO_WEIGHT_MIN,
};

const CGROUP_IO_WEIGHT: &str = "io.weight";
// One "<major>:<minor> <key>=<value>" line per write
const CGROUP_IO_MAX: &str = "io.max";

pub(crate) struct Io;

impl Controller for Io {
    const NAME: &'static str = "io";

    type Resource = BlockIoSpec;

    fn needs_to_handle(spec: &ResourceSpec) -> Option<&Self::Resource> {
        spec.blockio.as_ref()
    }

    fn apply(cgroup_dir: &Path, blockio: &BlockIoSpec) -> Result<()> {
        if let Some(weight) = blockio.weight {
            let value = format!("default {}", blkio_weight_to_io_weight(weight));
            write_entry(cgroup_dir, Self::NAME, CGROUP_IO_WEIGHT, &value)?;
        }

        // Document order: a later rule for the same device and key wins
        for rule in &blockio.throttle {
            let line = throttle_line(rule);
            write_entry(cgroup_dir, Self::NAME, CGROUP_IO_MAX, &line)?;
        }
        Ok(())
    }
}

/// Map v1 blkio weight (10..=1000) onto v2 io weight (1..=10000)
fn blkio_weight_to_io_weight(weight: u16) -> u64 {
    let weight = u64::from(weight.clamp(BLKIO_WEIGHT_MIN, BLKIO_WEIGHT_MAX));
    1 + (weight - 10) * 9999 / 990
}

fn throttle_line(rule: &ThrottleRule) -> String {
    let key = match (rule.direction, rule.unit) {
        (ThrottleDirection::Read, ThrottleUnit::Bytes) => "rbps",
        (ThrottleDirection::Write, ThrottleUnit::Bytes) => "wbps",
        (ThrottleDirection::Read, ThrottleUnit::Iops) => "riops",
        (ThrottleDirection::Write, ThrottleUnit::Iops) => "wiops",
    };
    let limit = limit_value(rule.limit);
    format!("{}:{} {}={}", rule.major, rule.minor, key, limit)
}

#[cfg(test)]
mod tests {
    use super::super::{fake_cgroup, read_entry};
    use super::*;

    fn throttle(direction: ThrottleDirection, unit: ThrottleUnit, limit: i64) -> ThrottleRule {
        ThrottleRule {
            major: 8,
            minor: 0,
            direction,
            unit,
            limit,
        }
    }

    #[test]
    fn test_weight_conversion() {
        assert_eq!(blkio_weight_to_io_weight(10), 1);
        assert_eq!(blkio_weight_to_io_weight(500), 4950);
        assert_eq!(blkio_weight_to_io_weight(1000), 10_000);
    }

    #[test]
    fn test_throttle_lines() {
        let read = throttle(ThrottleDirection::Read, ThrottleUnit::Bytes, 1_048_576);
        assert_eq!(throttle_line(&read), "8:0 rbps=1048576");

        let write = throttle(ThrottleDirection::Write, ThrottleUnit::Iops, -1);
        assert_eq!(throttle_line(&write), "8:0 wiops=max");
    }

    #[test]
    fn test_last_throttle_rule_is_written_last() {
        let dir = fake_cgroup(&[(CGROUP_IO_WEIGHT, "default 100"), (CGROUP_IO_MAX, "")]);
        let blockio = BlockIoSpec {
            weight: Some(1000),
            throttle: vec![
                throttle(ThrottleDirection::Read, ThrottleUnit::Bytes, 100),
                throttle(ThrottleDirection::Read, ThrottleUnit::Bytes, 200),
            ],
        };
        Io::apply(dir.path(), &blockio).unwrap();

        assert_eq!(read_entry(dir.path(), CGROUP_IO_WEIGHT), "default 10000");
        assert_eq!(read_entry(dir.path(), CGROUP_IO_MAX), "8:0 rbps=200");
    }
}
