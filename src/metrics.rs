//! Prometheus metrics for cgroup manager operations
//!
//! These count what the manager did, not what the cgroups consumed.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    /// Manager operations by outcome.
    ///
    /// Labels:
    /// - operation: create, apply, update, add_process, pause, resume, remove
    /// - outcome: ok or error
    pub static ref CGROUP_OPERATIONS: IntCounterVec = register_int_counter_vec!(
        "cgvisor_cgroup_operations_total",
        "cgroup manager operations by outcome",
        &["operation", "outcome"]
    ).expect("failed to register CGROUP_OPERATIONS metric");

    /// Successful interface entry writes, by controller.
    pub static ref CGROUP_ENTRY_WRITES: IntCounterVec = register_int_counter_vec!(
        "cgvisor_cgroup_entry_writes_total",
        "cgroup interface entries written per controller",
        &["controller"]
    ).expect("failed to register CGROUP_ENTRY_WRITES metric");
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported() {
        CGROUP_OPERATIONS.with_label_values(&["create", "ok"]).inc();
        CGROUP_ENTRY_WRITES.with_label_values(&["pids"]).inc();

        let text = gather_text();
        assert!(text.contains("cgvisor_cgroup_operations_total"));
        assert!(text.contains("cgvisor_cgroup_entry_writes_total"));
    }
}
