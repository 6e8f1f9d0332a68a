//! Error handling module for mailstrap
//!
//! Every fatal condition the provisioning sequence can hit is a variant of
//! [`ProvisionError`]. Non-fatal post-check findings live in
//! [`crate::verify::PostCheckAdvisory`] and never become errors.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for provisioning runs
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// One or more required ports are already bound by another process
    #[error("Port conflict: {} already in use", format_ports(.ports))]
    PortConflict { ports: Vec<u16> },

    /// A filesystem the run depends on forbids what we need (e.g. `noexec` on /tmp)
    #[error("Filesystem constraint on {}: {reason}", .path.display())]
    FilesystemConstraint { path: PathBuf, reason: String },

    /// Other precondition failures (not root, missing binaries)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The OS package manager reported failure
    #[error("Package manager failure: {0}")]
    PackageManagerFailure(String),

    /// Database or database user could not be created
    #[error("Datastore bootstrap failure: {0}")]
    DatastoreBootstrapFailure(String),

    /// A firewall rule could not be inserted
    #[error("Firewall configuration failure: {0}")]
    FirewallFailure(String),

    /// Cloning the delegated installer failed
    #[error("Installer acquisition failure: {0}")]
    AcquisitionFailure(String),

    /// The delegated installer rejected the generated settings file
    #[error("Configuration check failed: {0}")]
    ConfigValidationFailure(String),

    /// The delegated installer exited unsuccessfully
    #[error("Delegated installer failed (see {}): {reason}", .log.display())]
    DelegatedExecutionFailure { log: PathBuf, reason: String },

    /// The two entries of a password pair differ
    #[error("Passwords for {0} do not match")]
    PasswordMismatch(String),

    /// The operator declined the final confirmation
    #[error("Aborted by operator")]
    Aborted,

    /// Configuration values failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Terminal prompt could not be read
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Stage state machine rejected a transition
    #[error("Stage transition error: {0}")]
    StageTransition(String),

    /// IO errors (file operations, process spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

fn format_ports(ports: &[u16]) -> String {
    let list: Vec<String> = ports.iter().map(u16::to_string).collect();
    if list.len() == 1 {
        format!("port {}", list[0])
    } else {
        format!("ports {}", list.join(", "))
    }
}

impl ProvisionError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a prompt error
    pub fn prompt(msg: impl Into<String>) -> Self {
        Self::Prompt(msg.into())
    }

    /// Process exit code for this error.
    ///
    /// Every fatal condition aborts the run with status 1.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// True for failures raised before anything on the host was changed.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::PortConflict { .. } | Self::FilesystemConstraint { .. } | Self::Precondition(_)
        )
    }
}

impl From<dialoguer::Error> for ProvisionError {
    fn from(err: dialoguer::Error) -> Self {
        Self::Prompt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProvisionError::PortConflict { ports: vec![443] };
        assert_eq!(err.to_string(), "Port conflict: port 443 already in use");

        let err = ProvisionError::PortConflict {
            ports: vec![25, 587],
        };
        assert_eq!(err.to_string(), "Port conflict: ports 25, 587 already in use");

        let err = ProvisionError::validation("domain is empty");
        assert_eq!(err.to_string(), "Validation error: domain is empty");
    }

    #[test]
    fn test_filesystem_constraint_display() {
        let err = ProvisionError::FilesystemConstraint {
            path: PathBuf::from("/tmp"),
            reason: "mounted noexec".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Filesystem constraint on /tmp: mounted noexec"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ProvisionError = io_err.into();
        assert!(matches!(err, ProvisionError::Io(_)));
    }

    #[test]
    fn test_precondition_classification() {
        assert!(ProvisionError::PortConflict { ports: vec![25] }.is_precondition());
        assert!(ProvisionError::precondition("not root").is_precondition());
        assert!(!ProvisionError::PackageManagerFailure("x".into()).is_precondition());
        assert_eq!(ProvisionError::Aborted.exit_code(), 1);
    }
}
