//! Runtime configuration for the cgroup manager

use std::env;
use std::path::PathBuf;

/// Default cgroup v2 mount point
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Default namespace directory under the mount point
pub const DEFAULT_CGROUP_NAMESPACE: &str = "cgvisor";

/// Environment variable overriding [`CgroupConfig::root`]
pub const ENV_CGROUP_ROOT: &str = "CGVISOR_CGROUP_ROOT";

/// Environment variable overriding [`CgroupConfig::namespace`]
pub const ENV_CGROUP_NAMESPACE: &str = "CGVISOR_CGROUP_NAMESPACE";

/// Where managed cgroups live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupConfig {
    /// cgroup v2 mount point
    pub root: PathBuf,
    /// Directory under `root` holding one cgroup per managed pid
    pub namespace: String,
}

impl Default for CgroupConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_CGROUP_ROOT),
            namespace: DEFAULT_CGROUP_NAMESPACE.to_string(),
        }
    }
}

impl CgroupConfig {
    /// Defaults, overridden by `CGVISOR_CGROUP_ROOT` and
    /// `CGVISOR_CGROUP_NAMESPACE` when set and non-empty
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(root) = env::var_os(ENV_CGROUP_ROOT).filter(|v| !v.is_empty()) {
            config.root = PathBuf::from(root);
        }
        if let Ok(namespace) = env::var(ENV_CGROUP_NAMESPACE) {
            if !namespace.is_empty() {
                config.namespace = namespace;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CgroupConfig::default();
        assert_eq!(config.root, PathBuf::from("/sys/fs/cgroup"));
        assert_eq!(config.namespace, "cgvisor");
    }
}
