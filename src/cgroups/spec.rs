//! Declarative resource specification
//!
//! A [`ResourceSpec`] is what the manager is asked to enforce. Every field is
//! optional: an absent field means "leave whatever the controller currently
//! has", a present one means "set it to exactly this".
//!
//! The on-disk document is JSON with one top-level key per section:
//!
//! ```text
//! {
//!   "pids":    { "limit": 1024 },
//!   "memory":  { "limit": 536870912, "reservation": 268435456, "swap": -1 },
//!   "cpu":     { "shares": 1024, "quota": 50000, "period": 100000, "cpus": [0, 1] },
//!   "hugetlb": { "2MB": 1073741824 },
//!   "devices": [ { "allow": false, "type": "a", "access": "rwm" } ],
//!   "blockio": { "weight": 500, "throttle": [ ... ] }
//! }
//! ```
//!
//! Negative limits mean "no ceiling" and are written as `max`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::{CgroupError, Result};

/// Lowest and highest values the v1-style `shares` knob accepts
pub const CPU_SHARES_MIN: u64 = 2;
pub const CPU_SHARES_MAX: u64 = 262_144;

/// Valid range for the v1-style block I/O weight
pub const BLKIO_WEIGHT_MIN: u16 = 10;
pub const BLKIO_WEIGHT_MAX: u16 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PidsSpec {
    /// Maximum number of tasks
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MemorySpec {
    /// Hard ceiling in bytes (`memory.max`)
    pub limit: Option<i64>,
    /// Best-effort protection in bytes (`memory.low`)
    pub reservation: Option<i64>,
    /// Swap ceiling in bytes (`memory.swap.max`)
    pub swap: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CpuSpec {
    pub shares: Option<u64>,
    /// Microseconds of CPU time allowed per period; `<= 0` means unlimited
    pub quota: Option<i64>,
    /// Accounting period in microseconds
    pub period: Option<u64>,
    pub cpus: Option<BTreeSet<u32>>,
}

/// Huge-page limits keyed by page size (`"2MB"`, `"1GB"`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct HugeTlbSpec(pub BTreeMap<String, Option<i64>>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "a")]
    All,
    #[serde(rename = "b")]
    Block,
    #[serde(rename = "c")]
    Char,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::All => "a",
            DeviceType::Block => "b",
            DeviceType::Char => "c",
        }
    }
}

/// One device access rule. Rules are applied in document order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceRule {
    pub allow: bool,
    #[serde(rename = "type")]
    pub kind: DeviceType,
    /// `None` matches every major number
    pub major: Option<u32>,
    /// `None` matches every minor number
    pub minor: Option<u32>,
    /// Subset of `rwm`
    pub access: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleDirection {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleUnit {
    Bytes,
    Iops,
}

/// Per-device I/O throttle. Rules are applied in document order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThrottleRule {
    pub major: u32,
    pub minor: u32,
    pub direction: ThrottleDirection,
    pub unit: ThrottleUnit,
    pub limit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BlockIoSpec {
    pub weight: Option<u16>,
    #[serde(default)]
    pub throttle: Vec<ThrottleRule>,
}

/// Desired resource limits for one cgroup
///
/// Missing sections stay `None`; they are never filled with zero limits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSpec {
    pub pids: Option<PidsSpec>,
    pub memory: Option<MemorySpec>,
    pub cpu: Option<CpuSpec>,
    pub hugetlb: Option<HugeTlbSpec>,
    pub devices: Option<Vec<DeviceRule>>,
    pub blockio: Option<BlockIoSpec>,
}

fn section<T: DeserializeOwned>(doc: &Map<String, Value>, name: &str) -> Result<Option<T>> {
    match doc.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| CgroupError::parse(name, e.to_string())),
    }
}

impl ResourceSpec {
    /// Parse and validate a JSON resource document
    ///
    /// Unknown top-level keys are ignored.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(input)
            .map_err(|e| CgroupError::parse("document", e.to_string()))?;
        let Value::Object(doc) = doc else {
            return Err(CgroupError::parse("document", "expected an object"));
        };

        let spec = ResourceSpec {
            pids: section(&doc, "pids")?,
            memory: section(&doc, "memory")?,
            cpu: section(&doc, "cpu")?,
            hugetlb: section(&doc, "hugetlb")?,
            devices: section(&doc, "devices")?,
            blockio: section(&doc, "blockio")?,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Read, parse and validate a resource document from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| CgroupError::fs(path, e))?;
        Self::from_json_str(&content)
    }

    /// Check the semantic rules serde cannot express
    pub fn validate(&self) -> Result<()> {
        if let Some(memory) = &self.memory {
            if let (Some(limit), Some(reservation)) = (memory.limit, memory.reservation) {
                if limit >= 0 && reservation > limit {
                    return Err(CgroupError::parse(
                        "memory",
                        format!("reservation {} exceeds limit {}", reservation, limit),
                    ));
                }
            }
        }

        if let Some(cpu) = &self.cpu {
            match (cpu.quota, cpu.period) {
                (Some(_), None) => return Err(CgroupError::parse("cpu", "quota requires period")),
                (None, Some(_)) => return Err(CgroupError::parse("cpu", "period requires quota")),
                (Some(_), Some(0)) => {
                    return Err(CgroupError::parse("cpu", "period must be positive"))
                }
                _ => {}
            }
            if let Some(shares) = cpu.shares {
                if !(CPU_SHARES_MIN..=CPU_SHARES_MAX).contains(&shares) {
                    return Err(CgroupError::parse(
                        "cpu",
                        format!(
                            "shares {} outside {}..={}",
                            shares, CPU_SHARES_MIN, CPU_SHARES_MAX
                        ),
                    ));
                }
            }
        }

        if let Some(hugetlb) = &self.hugetlb {
            for size in hugetlb.0.keys() {
                if !is_page_size(size) {
                    return Err(CgroupError::parse(
                        "hugetlb",
                        format!("invalid page size {:?}", size),
                    ));
                }
            }
        }

        if let Some(devices) = &self.devices {
            for rule in devices {
                let valid = !rule.access.is_empty()
                    && rule.access.chars().all(|c| matches!(c, 'r' | 'w' | 'm'));
                if !valid {
                    return Err(CgroupError::parse(
                        "devices",
                        format!("invalid access {:?}", rule.access),
                    ));
                }
            }
        }

        if let Some(weight) = self.blockio.as_ref().and_then(|b| b.weight) {
            if !(BLKIO_WEIGHT_MIN..=BLKIO_WEIGHT_MAX).contains(&weight) {
                return Err(CgroupError::parse(
                    "blockio",
                    format!(
                        "weight {} outside {}..={}",
                        weight, BLKIO_WEIGHT_MIN, BLKIO_WEIGHT_MAX
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Overlay `newer` on top of `self`
    ///
    /// Scalar fields present in `newer` win. Ordered rule lists are
    /// concatenated, since each rule was written after the ones before it.
    pub fn merge(&self, newer: &ResourceSpec) -> ResourceSpec {
        ResourceSpec {
            pids: merge_section(&self.pids, &newer.pids, |old, new| PidsSpec {
                limit: new.limit.or(old.limit),
            }),
            memory: merge_section(&self.memory, &newer.memory, |old, new| MemorySpec {
                limit: new.limit.or(old.limit),
                reservation: new.reservation.or(old.reservation),
                swap: new.swap.or(old.swap),
            }),
            cpu: merge_section(&self.cpu, &newer.cpu, |old, new| CpuSpec {
                shares: new.shares.or(old.shares),
                quota: new.quota.or(old.quota),
                period: new.period.or(old.period),
                cpus: new.cpus.clone().or_else(|| old.cpus.clone()),
            }),
            hugetlb: merge_section(&self.hugetlb, &newer.hugetlb, |old, new| {
                let mut merged = old.0.clone();
                merged.extend(new.0.iter().map(|(k, v)| (k.clone(), *v)));
                HugeTlbSpec(merged)
            }),
            devices: merge_section(&self.devices, &newer.devices, |old, new| {
                old.iter().chain(new.iter()).cloned().collect()
            }),
            blockio: merge_section(&self.blockio, &newer.blockio, |old, new| BlockIoSpec {
                weight: new.weight.or(old.weight),
                throttle: [old.throttle.as_slice(), new.throttle.as_slice()].concat(),
            }),
        }
    }

    /// True when no section is present
    pub fn is_empty(&self) -> bool {
        *self == ResourceSpec::default()
    }
}

fn merge_section<T: Clone>(
    old: &Option<T>,
    new: &Option<T>,
    f: impl FnOnce(&T, &T) -> T,
) -> Option<T> {
    match (old, new) {
        (Some(old), Some(new)) => Some(f(old, new)),
        (None, Some(new)) => Some(new.clone()),
        (old, None) => old.clone(),
    }
}

fn is_page_size(size: &str) -> bool {
    let digits = size.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let suffix = &size[digits.len()..];
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && matches!(suffix, "KB" | "MB" | "GB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sections_stay_absent() {
        let spec = ResourceSpec::from_json_str(r#"{ "pids": { "limit": 512 } }"#).unwrap();
        assert_eq!(spec.pids, Some(PidsSpec { limit: Some(512) }));
        assert!(spec.memory.is_none());
        assert!(spec.cpu.is_none());
        assert!(spec.hugetlb.is_none());
        assert!(spec.devices.is_none());
        assert!(spec.blockio.is_none());
    }

    #[test]
    fn test_unknown_sections_are_ignored() {
        let doc = r#"{ "network": { "classID": 3 }, "pids": {} }"#;
        let spec = ResourceSpec::from_json_str(doc).unwrap();
        assert_eq!(spec.pids, Some(PidsSpec::default()));
    }

    #[test]
    fn test_malformed_value_names_section() {
        let err = ResourceSpec::from_json_str(r#"{ "memory": { "limit": "lots" } }"#).unwrap_err();
        match err {
            CgroupError::ConfigParse { section, .. } => assert_eq!(section, "memory"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_quota_without_period_is_rejected() {
        let err = ResourceSpec::from_json_str(r#"{ "cpu": { "quota": 50000 } }"#).unwrap_err();
        match err {
            CgroupError::ConfigParse { section, .. } => assert_eq!(section, "cpu"),
            other => panic!("unexpected error: {other}"),
        }

        let err = ResourceSpec::from_json_str(r#"{ "cpu": { "period": 100000 } }"#).unwrap_err();
        assert!(matches!(err, CgroupError::ConfigParse { .. }));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        for doc in [
            r#"{ "cpu": { "shares": 1 } }"#,
            r#"{ "blockio": { "weight": 5 } }"#,
            r#"{ "hugetlb": { "2M": 1 } }"#,
            r#"{ "devices": [ { "allow": true, "type": "c", "access": "rx" } ] }"#,
            r#"{ "devices": [ { "allow": true, "type": "z", "access": "r" } ] }"#,
            r#"{ "memory": { "limit": 100, "reservation": 200 } }"#,
            r#"[1, 2, 3]"#,
        ] {
            assert!(ResourceSpec::from_json_str(doc).is_err(), "accepted {doc}");
        }
    }

    #[test]
    fn test_full_document() {
        let spec = ResourceSpec::from_json_str(
            r#"{
                "pids": { "limit": 1024 },
                "memory": { "limit": -1, "swap": 0 },
                "cpu": { "shares": 1024, "quota": 50000, "period": 100000, "cpus": [3, 0, 1] },
                "hugetlb": { "2MB": 1073741824, "1GB": null },
                "devices": [
                    { "allow": false, "type": "a", "access": "rwm" },
                    { "allow": true, "type": "c", "major": 1, "minor": 3, "access": "rw" }
                ],
                "blockio": {
                    "weight": 500,
                    "throttle": [
                        {
                            "major": 8, "minor": 0,
                            "direction": "read", "unit": "bytes", "limit": 1048576
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

        let cpu = spec.cpu.as_ref().unwrap();
        let cpus: Vec<u32> = cpu.cpus.clone().unwrap().into_iter().collect();
        assert_eq!(cpus, vec![0, 1, 3]);
        assert_eq!(spec.hugetlb.as_ref().unwrap().0.get("1GB"), Some(&None));
        let devices = spec.devices.as_ref().unwrap();
        assert_eq!(devices[0].kind, DeviceType::All);
        assert_eq!(devices[1].major, Some(1));
        let blockio = spec.blockio.as_ref().unwrap();
        assert_eq!(blockio.throttle[0].unit, ThrottleUnit::Bytes);
    }

    #[test]
    fn test_merge_prefers_newer_and_keeps_older() {
        let first = ResourceSpec::from_json_str(
            r#"{ "pids": { "limit": 1024 }, "memory": { "limit": 4096, "swap": 0 } }"#,
        )
        .unwrap();
        let second = ResourceSpec::from_json_str(
            r#"{ "memory": { "limit": 8192 }, "hugetlb": { "2MB": 1 } }"#,
        )
        .unwrap();

        let merged = first.merge(&second);
        assert_eq!(merged.pids, Some(PidsSpec { limit: Some(1024) }));
        assert_eq!(
            merged.memory,
            Some(MemorySpec {
                limit: Some(8192),
                reservation: None,
                swap: Some(0),
            })
        );
        assert!(merged.hugetlb.is_some());
        assert!(ResourceSpec::default().is_empty());
        assert!(!merged.is_empty());
    }
}
