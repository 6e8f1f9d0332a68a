//! Materialization of the delegated installer's settings file.
//!
//! The installer reads an INI-style file. Values are written verbatim, so
//! [`ProvisioningConfig::validate`] must have rejected line breaks first.

use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

use crate::config::{CertificateMode, ProvisioningConfig, Secret};
use crate::config_file::write_owner_only;

/// Whether secrets are written out or masked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretHandling {
    /// Real values, for the file the installer reads
    Include,
    /// `***`, for printing to a terminal
    Redact,
}

struct IniWriter {
    out: String,
}

impl IniWriter {
    fn new() -> Self {
        Self { out: String::new() }
    }

    fn section(&mut self, name: &str) -> &mut Self {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        let _ = writeln!(self.out, "[{}]", name);
        self
    }

    fn entry(&mut self, key: &str, value: impl std::fmt::Display) -> &mut Self {
        let _ = writeln!(self.out, "{} = {}", key, value);
        self
    }

    fn finish(self) -> String {
        self.out
    }
}

fn secret_value(secret: &Secret, handling: SecretHandling) -> &str {
    match handling {
        SecretHandling::Include => secret.expose(),
        SecretHandling::Redact => "***",
    }
}

/// Render the settings file contents
pub fn render(config: &ProvisioningConfig, handling: SecretHandling) -> String {
    let mut ini = IniWriter::new();

    ini.section("general")
        .entry("domain", &config.domain)
        .entry("hostname", &config.mail_hostname)
        .entry("admin_username", &config.admin.username)
        .entry("admin_email", &config.admin.email)
        .entry("admin_password", secret_value(&config.admin.password, handling));

    ini.section("database")
        .entry("engine", config.database.engine)
        .entry("host", &config.database.host)
        .entry("install", "false")
        .entry("name", &config.database.name)
        .entry("user", &config.database.user)
        .entry("password", secret_value(&config.database.password, handling));

    ini.section("certificate")
        .entry("generate", "true")
        .entry("type", config.certificate.mode);

    if config.certificate.mode == CertificateMode::Letsencrypt {
        ini.section("letsencrypt")
            .entry("email", &config.certificate.contact_email);
    }

    ini.section("mail").entry("hostname", &config.mail_hostname);

    ini.finish()
}

/// Write the settings file with owner-only permissions
pub fn write_settings(config: &ProvisioningConfig, path: &Path) -> std::io::Result<()> {
    let contents = render(config, SecretHandling::Include);
    write_owner_only(path, contents.as_bytes())?;
    info!(path = %path.display(), "settings file written (mode 0600)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_render_sections() {
        let text = render(&sample_config(), SecretHandling::Include);
        let expected = "\
[general]
domain = example.com
hostname = mail.example.com
admin_username = admin
admin_email = admin@example.com
admin_password = admin-pass-123

[database]
engine = mysql
host = 127.0.0.1
install = false
name = modoboa
user = modoboa
password = db-pass-4567

[certificate]
generate = true
type = letsencrypt

[letsencrypt]
email = admin@example.com

[mail]
hostname = mail.example.com
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_redacted_hides_passwords() {
        let text = render(&sample_config(), SecretHandling::Redact);
        assert!(!text.contains("admin-pass-123"));
        assert!(!text.contains("db-pass-4567"));
        assert!(text.contains("admin_password = ***"));
    }

    #[test]
    fn test_self_signed_has_no_letsencrypt_section() {
        let mut config = sample_config();
        config.certificate.mode = CertificateMode::SelfSigned;
        let text = render(&config, SecretHandling::Include);
        assert!(text.contains("type = self-signed"));
        assert!(!text.contains("[letsencrypt]"));
    }

    #[test]
    fn test_written_file_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installer.cfg");
        write_settings(&sample_config(), &path).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert!(std::fs::read_to_string(&path).unwrap().contains("[database]"));
    }
}
