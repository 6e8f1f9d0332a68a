//! Pre-flight checks for the provisioning host
//!
//! Everything here is read-only. The sequencer runs these checks before the
//! first mutating stage and aborts if any of them fails:
//!
//! - required ports must be free (probed with a real socket bind)
//! - the scratch directory must not be mounted `noexec` (via `statvfs`)
//! - the process must run as root (EUID 0)
//! - required host binaries must be on `PATH`

use nix::sys::statvfs::{statvfs, FsFlags};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result};
use crate::steps::firewall::REQUIRED_PORTS;

/// Binaries the sequencer shells out to
pub const REQUIRED_BINARIES: &[&str] = &["apt-get", "git", "python3", "ufw", "systemctl"];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of probing one TCP port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    Free,
    InUse,
    /// The probe itself was not allowed (unprivileged bind below 1024)
    Unknown,
}

/// Read-only view of the host the sequencer needs
pub trait HostProbe {
    fn port_status(&self, port: u16) -> PortStatus;

    /// `Ok(true)` when `path` lives on a filesystem mounted `noexec`
    fn is_noexec(&self, path: &Path) -> std::io::Result<bool>;

    fn is_root(&self) -> bool;

    fn binary_exists(&self, name: &str) -> bool;

    /// Whether something accepts TCP connections on `port` at localhost
    fn is_listening(&self, port: u16) -> bool;
}

/// [`HostProbe`] backed by the running system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl HostProbe for SystemHost {
    fn port_status(&self, port: u16) -> PortStatus {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        match TcpListener::bind(addr) {
            Ok(_listener) => PortStatus::Free,
            Err(e) if e.kind() == ErrorKind::AddrInUse => PortStatus::InUse,
            Err(e) => {
                debug!(port, error = %e, "port probe inconclusive");
                PortStatus::Unknown
            }
        }
    }

    fn is_noexec(&self, path: &Path) -> std::io::Result<bool> {
        let stat = statvfs(path).map_err(std::io::Error::from)?;
        Ok(stat.flags().contains(FsFlags::ST_NOEXEC))
    }

    fn is_root(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    fn binary_exists(&self, name: &str) -> bool {
        let Some(paths) = std::env::var_os("PATH") else {
            return false;
        };
        std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(name)))
    }

    fn is_listening(&self, port: u16) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok()
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// What the checks found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub ports_in_use: Vec<u16>,
    pub ports_unknown: Vec<u16>,
    /// Scratch directory that is mounted noexec, if any
    pub noexec_scratch: Option<PathBuf>,
    /// Scratch directory that could not be inspected, with the reason
    pub scratch_error: Option<(PathBuf, String)>,
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
}

impl PreflightReport {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.ports_in_use.is_empty()
            && self.noexec_scratch.is_none()
            && self.scratch_error.is_none()
            && self.missing_binaries.is_empty()
            && self.is_root
    }

    /// First fatal finding as an error, in check order
    pub fn into_result(self) -> Result<()> {
        if !self.ports_in_use.is_empty() {
            return Err(ProvisionError::PortConflict {
                ports: self.ports_in_use,
            });
        }
        if let Some(path) = self.noexec_scratch {
            return Err(ProvisionError::FilesystemConstraint {
                path,
                reason: "mounted noexec; the installer needs to execute binaries there".to_string(),
            });
        }
        if let Some((path, reason)) = self.scratch_error {
            return Err(ProvisionError::FilesystemConstraint { path, reason });
        }
        if !self.is_root {
            return Err(ProvisionError::precondition(
                "root privileges required (run with sudo, or set MAILSTRAP_SKIP_ROOT_CHECK=1 for testing)",
            ));
        }
        if !self.missing_binaries.is_empty() {
            return Err(ProvisionError::precondition(format!(
                "missing required binaries: {}",
                self.missing_binaries.join(", ")
            )));
        }
        Ok(())
    }
}

/// Options that relax the checks
#[derive(Debug, Clone, Copy, Default)]
pub struct PreflightOptions {
    pub skip_root: bool,
}

/// Skip root check (for development/testing)
/// Set MAILSTRAP_SKIP_ROOT_CHECK=1 to skip
pub fn should_skip_root_check() -> bool {
    std::env::var("MAILSTRAP_SKIP_ROOT_CHECK")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Run every check against `host`
pub fn run_checks(host: &dyn HostProbe, scratch_dir: &Path, options: PreflightOptions) -> PreflightReport {
    debug!("running pre-flight checks");
    let mut report = PreflightReport::default();

    for &port in REQUIRED_PORTS {
        match host.port_status(port) {
            PortStatus::Free => {}
            PortStatus::InUse => report.ports_in_use.push(port),
            PortStatus::Unknown => {
                warn!(port, "could not probe port (insufficient privileges?)");
                report.ports_unknown.push(port);
            }
        }
    }

    match host.is_noexec(scratch_dir) {
        Ok(true) => report.noexec_scratch = Some(scratch_dir.to_path_buf()),
        Ok(false) => {}
        Err(e) => {
            report.scratch_error = Some((scratch_dir.to_path_buf(), format!("cannot inspect: {}", e)))
        }
    }

    for binary in REQUIRED_BINARIES {
        if !host.binary_exists(binary) {
            report.missing_binaries.push((*binary).to_string());
        }
    }

    report.is_root = host.is_root();
    if !report.is_root && options.skip_root {
        warn!("root check skipped (MAILSTRAP_SKIP_ROOT_CHECK=1)");
        report.is_root = true;
    }

    if report.is_ok() {
        info!("pre-flight checks passed");
    }
    report
}

/// Print a human-readable summary of the report
pub fn print_report(report: &PreflightReport) {
    for &port in REQUIRED_PORTS {
        let status = if report.ports_in_use.contains(&port) {
            "IN USE"
        } else if report.ports_unknown.contains(&port) {
            "unknown"
        } else {
            "free"
        };
        println!("  port {:<5} {}", port, status);
    }
    match (&report.noexec_scratch, &report.scratch_error) {
        (Some(path), _) => println!("  scratch     {} is mounted noexec", path.display()),
        (None, Some((path, reason))) => println!("  scratch     {}: {}", path.display(), reason),
        (None, None) => println!("  scratch     executable"),
    }
    println!("  root        {}", if report.is_root { "yes" } else { "no" });
    if report.missing_binaries.is_empty() {
        println!("  binaries    all present");
    } else {
        println!("  binaries    missing: {}", report.missing_binaries.join(", "));
    }
}
