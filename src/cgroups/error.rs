//! Error type shared by every cgroup operation

use std::io;
use std::path::PathBuf;

use super::manager::ManagerState;

/// Result alias for cgroup operations
pub type Result<T> = std::result::Result<T, CgroupError>;

/// Error type for cgroup lifecycle operations
///
/// Every variant carries enough context (section, controller, entry or path)
/// to tell the caller which part of the request failed. A failed Apply or
/// Update may already have written some entries; see [`Manager::apply`].
///
/// [`Manager::apply`]: super::Manager::apply
#[derive(Debug)]
pub enum CgroupError {
    /// Malformed or semantically invalid resource document field
    ConfigParse { section: String, message: String },
    /// The operation needs a positive process identifier
    InvalidProcess { pid: i32 },
    /// A requested limit targets a controller this host does not expose
    ControllerUnavailable {
        controller: &'static str,
        entry: String,
    },
    /// I/O failure other than the tolerated "not found" on removal
    Filesystem { path: PathBuf, source: io::Error },
    /// The operation is not valid from the manager's current state
    InvalidState {
        operation: &'static str,
        state: ManagerState,
    },
}

impl CgroupError {
    pub(crate) fn parse(section: impl Into<String>, message: impl Into<String>) -> Self {
        CgroupError::ConfigParse {
            section: section.into(),
            message: message.into(),
        }
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CgroupError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

impl std::fmt::Display for CgroupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CgroupError::ConfigParse { section, message } => {
                write!(f, "invalid [{}] section: {}", section, message)
            }
            CgroupError::InvalidProcess { pid } => {
                write!(f, "operation requires a positive process id, got {}", pid)
            }
            CgroupError::ControllerUnavailable { controller, entry } => write!(
                f,
                "controller '{}' is not available on this host (missing {})",
                controller, entry
            ),
            CgroupError::Filesystem { path, source } => write!(
                f,
                "cgroup filesystem error at {}: {}",
                path.display(),
                source
            ),
            CgroupError::InvalidState { operation, state } => {
                write!(f, "cannot {} a cgroup in state {:?}", operation, state)
            }
        }
    }
}

impl std::error::Error for CgroupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CgroupError::Filesystem { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_section_and_controller() {
        let err = CgroupError::parse("cpu", "quota requires period");
        assert_eq!(
            err.to_string(),
            "invalid [cpu] section: quota requires period"
        );

        let err = CgroupError::ControllerUnavailable {
            controller: "pids",
            entry: "pids.max".to_string(),
        };
        assert!(err.to_string().contains("'pids'"));
        assert!(err.to_string().contains("pids.max"));
    }

    #[test]
    fn test_filesystem_error_exposes_source() {
        use std::error::Error;

        let err = CgroupError::fs(
            "/sys/fs/cgroup/x",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.source().is_some());
        assert!(CgroupError::InvalidProcess { pid: 0 }.source().is_none());
    }
}
