//! Read-only queries used by post-execution verification.

use std::path::PathBuf;

use crate::command::StepCommand;

/// `systemctl is-active --quiet <unit>`
///
/// Only the exit status matters: 0 active, 4 no such unit, anything else
/// inactive or failed.
#[derive(Debug, Clone)]
pub struct ServiceQuery {
    pub unit: String,
}

/// Exit status `systemctl is-active` uses for an unknown unit
pub const SYSTEMCTL_NO_SUCH_UNIT: i32 = 4;

impl StepCommand for ServiceQuery {
    fn program(&self) -> &'static str {
        "systemctl"
    }

    fn to_args(&self) -> Vec<String> {
        vec!["is-active".to_string(), "--quiet".to_string(), self.unit.clone()]
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

/// `openssl x509 -noout -dates -in <cert>`
#[derive(Debug, Clone)]
pub struct CertificateDates {
    pub certificate: PathBuf,
}

impl StepCommand for CertificateDates {
    fn program(&self) -> &'static str {
        "openssl"
    }

    fn to_args(&self) -> Vec<String> {
        vec![
            "x509".to_string(),
            "-noout".to_string(),
            "-dates".to_string(),
            "-in".to_string(),
            self.certificate.display().to_string(),
        ]
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

/// Validity window printed by `openssl x509 -dates`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateValidity {
    pub not_before: String,
    pub not_after: String,
}

impl CertificateValidity {
    /// Parse the `notBefore=` / `notAfter=` lines
    pub fn parse(output: &str) -> Option<Self> {
        let mut not_before = None;
        let mut not_after = None;
        for line in output.lines() {
            if let Some(v) = line.trim().strip_prefix("notBefore=") {
                not_before = Some(v.trim().to_string());
            } else if let Some(v) = line.trim().strip_prefix("notAfter=") {
                not_after = Some(v.trim().to_string());
            }
        }
        Some(Self {
            not_before: not_before?,
            not_after: not_after?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_query_args() {
        let q = ServiceQuery {
            unit: "postfix".to_string(),
        };
        assert_eq!(q.to_spec().command_line(), "systemctl is-active --quiet postfix");
        assert!(q.to_spec().read_only);
    }

    #[test]
    fn test_certificate_query_is_read_only() {
        let q = CertificateDates {
            certificate: PathBuf::from("/etc/letsencrypt/live/mail.example.com/cert.pem"),
        };
        assert!(q.to_spec().read_only);
    }

    #[test]
    fn test_parse_certificate_dates() {
        let out = "notBefore=Mar  1 00:00:00 2024 GMT\nnotAfter=May 30 23:59:59 2024 GMT\n";
        let validity = CertificateValidity::parse(out).unwrap();
        assert_eq!(validity.not_before, "Mar  1 00:00:00 2024 GMT");
        assert_eq!(validity.not_after, "May 30 23:59:59 2024 GMT");
    }

    #[test]
    fn test_parse_incomplete_dates() {
        assert_eq!(CertificateValidity::parse("notAfter=May 30 23:59:59 2024 GMT"), None);
        assert_eq!(CertificateValidity::parse(""), None);
    }
}
