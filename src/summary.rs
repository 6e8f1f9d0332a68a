//! Final follow-up block printed after every provisioning run.
//!
//! The DNS side of a mail server cannot be automated from the host itself,
//! so the operator gets the exact records to publish.

use std::fmt::Write as _;
use std::path::Path;
use strum::{Display, EnumIter};

use crate::config::ProvisioningConfig;

/// DKIM selector the delegated installer generates keys for
pub const DKIM_SELECTOR: &str = "modoboa";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum RecordKind {
    A,
    MX,
    #[strum(to_string = "TXT (SPF)")]
    Spf,
    #[strum(to_string = "TXT (DKIM)")]
    Dkim,
    #[strum(to_string = "TXT (DMARC)")]
    Dmarc,
    PTR,
}

/// One record the operator has to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub kind: RecordKind,
    pub name: String,
    pub value: String,
    pub note: &'static str,
}

pub fn dns_records(config: &ProvisioningConfig) -> Vec<DnsRecord> {
    let domain = &config.domain;
    let host = &config.mail_hostname;
    vec![
        DnsRecord {
            kind: RecordKind::A,
            name: host.clone(),
            value: "<public IPv4 of this host>".to_string(),
            note: "add an AAAA record too if the host has IPv6",
        },
        DnsRecord {
            kind: RecordKind::MX,
            name: domain.clone(),
            value: format!("10 {}.", host),
            note: "",
        },
        DnsRecord {
            kind: RecordKind::Spf,
            name: domain.clone(),
            value: "\"v=spf1 mx -all\"".to_string(),
            note: "",
        },
        DnsRecord {
            kind: RecordKind::Dkim,
            name: format!("{}._domainkey.{}", DKIM_SELECTOR, domain),
            value: "<public key shown in the admin panel>".to_string(),
            note: "the installer generates the key pair",
        },
        DnsRecord {
            kind: RecordKind::Dmarc,
            name: format!("_dmarc.{}", domain),
            value: format!("\"v=DMARC1; p=quarantine; rua=mailto:postmaster@{}\"", domain),
            note: "",
        },
        DnsRecord {
            kind: RecordKind::PTR,
            name: "<public IPv4 of this host>".to_string(),
            value: format!("{}.", host),
            note: "set through the hosting provider, not your DNS zone",
        },
    ]
}

/// Render the closing summary. `log` is the delegated installer's log, when
/// one was written.
pub fn render_summary(config: &ProvisioningConfig, log: Option<&Path>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "==> Next steps for {}", config.domain);
    let _ = writeln!(out);
    let _ = writeln!(out, "Publish these DNS records:");
    for record in dns_records(config) {
        let _ = writeln!(out, "  {:<12} {:<32} {}", record.kind, record.name, record.value);
        if !record.note.is_empty() {
            let _ = writeln!(out, "  {:<12} ({})", "", record.note);
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Admin panel: https://{}/", config.mail_hostname);
    if let Some(log) = log {
        let _ = writeln!(out, "Installer log: {}", log.display());
    }
    out
}
