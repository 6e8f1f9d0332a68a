//! Post-execution verification
//!
//! Nothing in here can fail the run. Every problem found is collected as a
//! [`PostCheckAdvisory`] and printed for the operator.

use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::StepCommand;
use crate::config::ProvisioningConfig;
use crate::preflight::HostProbe;
use crate::runner::CommandRunner;
use crate::steps::firewall::REQUIRED_PORTS;
use crate::steps::services::{CertificateDates, CertificateValidity, ServiceQuery, SYSTEMCTL_NO_SUCH_UNIT};

/// Units the delegated installer sets up, besides the database server
pub const MAIL_SERVICES: &[&str] = &["postfix", "dovecot", "nginx", "uwsgi", "rspamd", "redis-server"];

/// Lines of the mail log shown after installation
pub const MAIL_LOG_TAIL_LINES: usize = 20;

pub const SMTP_PORT: u16 = 25;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// State of a systemd unit as reported by `systemctl is-active`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Active,
    Inactive,
    Absent,
}

impl ServiceState {
    /// Map a `systemctl is-active` exit code
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Active,
            Some(SYSTEMCTL_NO_SUCH_UNIT) => Self::Absent,
            _ => Self::Inactive,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Absent => "not installed",
        })
    }
}

/// A non-fatal finding from post-execution checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostCheckAdvisory {
    ServiceNotFound { unit: String },
    ServiceInactive { unit: String },
    PortNotListening { port: u16 },
    LogUnavailable { path: PathBuf, reason: String },
    SmokeTestFailed { reason: String },
    CertificateNotFound { path: PathBuf, reason: String },
}

impl fmt::Display for PostCheckAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceNotFound { unit } => write!(f, "service {} is not installed", unit),
            Self::ServiceInactive { unit } => write!(f, "service {} is not running", unit),
            Self::PortNotListening { port } => write!(f, "nothing is listening on port {}", port),
            Self::LogUnavailable { path, reason } => {
                write!(f, "cannot read {}: {}", path.display(), reason)
            }
            Self::SmokeTestFailed { reason } => write!(f, "SMTP smoke test failed: {}", reason),
            Self::CertificateNotFound { path, reason } => {
                write!(f, "certificate {}: {}", path.display(), reason)
            }
        }
    }
}

/// Which optional checks to run
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    pub smoke_test: bool,
    pub check_cert: bool,
}

/// Everything the post-checks found
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub services: Vec<(String, ServiceState)>,
    pub ports: Vec<(u16, bool)>,
    pub mail_log_tail: Vec<String>,
    pub smtp_banner: Option<String>,
    pub certificate: Option<CertificateValidity>,
    pub advisories: Vec<PostCheckAdvisory>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.advisories.is_empty()
    }

    pub fn print(&self) {
        println!("Services:");
        for (unit, state) in &self.services {
            println!("  {:<14} {}", unit, state);
        }
        println!("Ports:");
        for (port, listening) in &self.ports {
            println!("  {:<5} {}", port, if *listening { "listening" } else { "closed" });
        }
        if let Some(banner) = &self.smtp_banner {
            println!("SMTP greeting: {}", banner);
        }
        if let Some(cert) = &self.certificate {
            println!("Certificate valid from {} until {}", cert.not_before, cert.not_after);
        }
        if !self.mail_log_tail.is_empty() {
            println!("Recent mail log:");
            for line in &self.mail_log_tail {
                println!("  {}", line);
            }
        }
        for advisory in &self.advisories {
            println!("warning: {}", advisory);
        }
    }
}

/// Service units expected after installation for this configuration.
/// A remote database server is not a unit on this host.
pub fn expected_services(config: &ProvisioningConfig) -> Vec<String> {
    let database = config
        .database
        .is_local()
        .then(|| config.database.engine.service_name().to_string());
    MAIL_SERVICES
        .iter()
        .map(|s| (*s).to_string())
        .chain(database)
        .collect()
}

/// Last `count` lines of a text file
pub fn tail_lines(path: &Path, count: usize) -> std::io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut tail = VecDeque::with_capacity(count);
    for chunk in reader.split(b'\n') {
        let line = String::from_utf8_lossy(&chunk?).trim_end_matches('\r').to_string();
        if tail.len() == count {
            tail.pop_front();
        }
        if count > 0 {
            tail.push_back(line);
        }
    }
    Ok(tail.into())
}

/// Read one SMTP reply, following `NNN-` continuation lines.
/// Returns the code and the text of the last line.
fn read_reply(reader: &mut impl BufRead) -> Result<(u16, String), String> {
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).map_err(|e| e.to_string())?;
        if n == 0 {
            return Err("connection closed".to_string());
        }
        let line = line.trim_end();
        let code = line
            .get(..3)
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or_else(|| format!("malformed reply: {}", line))?;
        if line.as_bytes().get(3) != Some(&b'-') {
            return Ok((code, line.get(4..).unwrap_or("").to_string()));
        }
    }
}

fn expect_reply(reader: &mut impl BufRead, expected: u16, step: &str) -> Result<String, String> {
    let (code, text) = read_reply(reader)?;
    if code != expected {
        return Err(format!("{}: expected {}, got {} {}", step, expected, code, text));
    }
    Ok(text)
}

/// Connect to an SMTP server, check the greeting and EHLO reply, then QUIT.
/// Returns the greeting text.
pub fn smtp_smoke_test(addr: SocketAddr, helo: &str, timeout: Duration) -> Result<String, String> {
    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| format!("connect {}: {}", addr, e))?;
    stream.set_read_timeout(Some(timeout)).map_err(|e| e.to_string())?;
    stream.set_write_timeout(Some(timeout)).map_err(|e| e.to_string())?;

    let mut writer = stream.try_clone().map_err(|e| e.to_string())?;
    let mut reader = BufReader::new(stream);

    let banner = expect_reply(&mut reader, 220, "greeting")?;
    write!(writer, "EHLO {}\r\n", helo).map_err(|e| e.to_string())?;
    expect_reply(&mut reader, 250, "EHLO")?;

    // QUIT is courtesy; the server already proved it speaks SMTP
    if write!(writer, "QUIT\r\n").is_ok() {
        let _ = read_reply(&mut reader);
    }
    Ok(banner)
}

fn check_services(runner: &dyn CommandRunner, config: &ProvisioningConfig, report: &mut VerificationReport) {
    for unit in expected_services(config) {
        let spec = ServiceQuery { unit: unit.clone() }.to_spec();
        let state = match runner.run(&spec) {
            Ok(output) => ServiceState::from_exit_code(output.exit_code),
            Err(e) => {
                debug!(unit = %unit, error = %e, "systemctl unavailable");
                ServiceState::Absent
            }
        };
        match state {
            ServiceState::Active => {}
            ServiceState::Inactive => report.advisories.push(PostCheckAdvisory::ServiceInactive { unit: unit.clone() }),
            ServiceState::Absent => report.advisories.push(PostCheckAdvisory::ServiceNotFound { unit: unit.clone() }),
        }
        report.services.push((unit, state));
    }
}

fn check_certificate(runner: &dyn CommandRunner, config: &ProvisioningConfig, report: &mut VerificationReport) {
    let path = config
        .layout
        .cert_dir
        .join(&config.mail_hostname)
        .join("cert.pem");
    if !path.exists() {
        report.advisories.push(PostCheckAdvisory::CertificateNotFound {
            path,
            reason: "file does not exist".to_string(),
        });
        return;
    }

    let spec = CertificateDates { certificate: path.clone() }.to_spec();
    let result = runner
        .run(&spec)
        .map_err(|e| e.to_string())
        .and_then(|output| {
            output.check("openssl x509")?;
            CertificateValidity::parse(&output.stdout).ok_or_else(|| "no validity dates in output".to_string())
        });
    match result {
        Ok(validity) => report.certificate = Some(validity),
        Err(reason) => report.advisories.push(PostCheckAdvisory::CertificateNotFound { path, reason }),
    }
}

/// Run every post-check. Never fails; problems become advisories.
pub fn run_verification(
    runner: &dyn CommandRunner,
    host: &dyn HostProbe,
    config: &ProvisioningConfig,
    options: VerifyOptions,
) -> VerificationReport {
    let mut report = VerificationReport::default();

    check_services(runner, config, &mut report);

    for &port in REQUIRED_PORTS {
        let listening = host.is_listening(port);
        if !listening {
            report.advisories.push(PostCheckAdvisory::PortNotListening { port });
        }
        report.ports.push((port, listening));
    }

    match tail_lines(&config.layout.mail_log, MAIL_LOG_TAIL_LINES) {
        Ok(lines) => report.mail_log_tail = lines,
        Err(e) => report.advisories.push(PostCheckAdvisory::LogUnavailable {
            path: config.layout.mail_log.clone(),
            reason: e.to_string(),
        }),
    }

    if options.smoke_test {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, SMTP_PORT));
        match smtp_smoke_test(addr, &config.mail_hostname, SMTP_TIMEOUT) {
            Ok(banner) => report.smtp_banner = Some(banner),
            Err(reason) => report.advisories.push(PostCheckAdvisory::SmokeTestFailed { reason }),
        }
    }

    if options.check_cert {
        check_certificate(runner, config, &mut report);
    }

    if report.is_clean() {
        info!("post-installation checks passed");
    } else {
        for advisory in &report.advisories {
            warn!("{}", advisory);
        }
    }
    report
}
