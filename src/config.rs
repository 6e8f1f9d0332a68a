//! Provisioning configuration
//!
//! [`ProvisioningConfig`] is the single immutable value every stage reads.
//! It is produced either by the interactive prompts or by loading a JSON
//! file, and it is validated before the sequencer accepts it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use strum::{Display, EnumIter, EnumString};

use crate::error::{ProvisionError, Result};

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum length of SQL identifiers and the admin username
const MAX_IDENTIFIER_LEN: usize = 32;

/// A secret string that never shows up in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Only the settings renderer and the SQL
    /// builder should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Database engine the delegated installer should target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DatabaseEngine {
    #[default]
    Mysql,
    Postgres,
}

impl DatabaseEngine {
    /// systemd unit expected to be running once the stack is up
    pub fn service_name(self) -> &'static str {
        match self {
            Self::Mysql => "mariadb",
            Self::Postgres => "postgresql",
        }
    }

    /// OS packages that provide the server
    pub fn server_packages(self) -> &'static [&'static str] {
        match self {
            Self::Mysql => &["mariadb-server", "mariadb-client"],
            Self::Postgres => &["postgresql", "postgresql-client"],
        }
    }

    /// OS packages for talking to a server on another host
    pub fn client_packages(self) -> &'static [&'static str] {
        match self {
            Self::Mysql => &["mariadb-client"],
            Self::Postgres => &["postgresql-client"],
        }
    }
}

/// How the delegated installer obtains the TLS certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
pub enum CertificateMode {
    #[default]
    #[strum(serialize = "letsencrypt")]
    Letsencrypt,
    #[strum(serialize = "self-signed")]
    SelfSigned,
}

/// Administrator account created by the delegated installer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminIdentity {
    pub email: String,
    pub username: String,
    pub password: Secret,
}

/// Database connection and credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub engine: DatabaseEngine,
    #[serde(default = "default_database_host")]
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: Secret,
}

fn default_database_host() -> String {
    "127.0.0.1".to_string()
}

impl DatabaseSettings {
    /// Whether the server runs on this host and is installed by this run
    pub fn is_local(&self) -> bool {
        matches!(self.host.as_str(), "127.0.0.1" | "localhost" | "::1")
    }

    /// Packages this run installs for the configured engine and host
    pub fn packages(&self) -> &'static [&'static str] {
        if self.is_local() {
            self.engine.server_packages()
        } else {
            self.engine.client_packages()
        }
    }
}

/// Certificate issuance settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSettings {
    #[serde(default)]
    pub mode: CertificateMode,
    pub contact_email: String,
}

/// The validated set of settings for one provisioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    pub domain: String,
    pub mail_hostname: String,
    pub admin: AdminIdentity,
    pub database: DatabaseSettings,
    pub certificate: CertificateSettings,
    #[serde(default)]
    pub layout: HostLayout,
}

/// Filesystem locations and external sources used by the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostLayout {
    pub installer_repo: String,
    pub checkout_dir: PathBuf,
    pub settings_file_name: String,
    pub log_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub mail_log: PathBuf,
    pub cert_dir: PathBuf,
}

impl Default for HostLayout {
    fn default() -> Self {
        let installer_repo = std::env::var("MAILSTRAP_INSTALLER_REPO")
            .unwrap_or_else(|_| "https://github.com/modoboa/modoboa-installer.git".to_string());
        Self {
            installer_repo,
            checkout_dir: PathBuf::from("/opt/modoboa-installer"),
            settings_file_name: "installer.cfg".to_string(),
            log_dir: PathBuf::from("/var/log/mailstrap"),
            scratch_dir: PathBuf::from("/tmp"),
            mail_log: PathBuf::from("/var/log/mail.log"),
            cert_dir: PathBuf::from("/etc/letsencrypt/live"),
        }
    }
}

impl HostLayout {
    /// Absolute path of the settings file inside the checkout
    pub fn settings_path(&self) -> PathBuf {
        self.checkout_dir.join(&self.settings_file_name)
    }
}

impl ProvisioningConfig {
    /// Validate every field. A config that passes is safe to render into
    /// the settings file and to interpolate into SQL identifiers.
    pub fn validate(&self) -> Result<()> {
        validate_hostname("Domain", &self.domain)?;
        validate_hostname("Mail hostname", &self.mail_hostname)?;

        let domain = self.domain.to_ascii_lowercase();
        let host = self.mail_hostname.to_ascii_lowercase();
        if host != domain && !host.ends_with(&format!(".{}", domain)) {
            return Err(ProvisionError::validation(format!(
                "Mail hostname {} is not within domain {}",
                self.mail_hostname, self.domain
            )));
        }

        validate_email("Admin email", &self.admin.email)?;
        validate_identifier("Admin username", &self.admin.username)?;
        validate_password("Admin password", &self.admin.password)?;

        validate_identifier("Database name", &self.database.name)?;
        validate_identifier("Database user", &self.database.user)?;
        validate_password("Database password", &self.database.password)?;
        validate_database_host(&self.database.host)?;

        validate_email("Certificate contact email", &self.certificate.contact_email)?;

        if self.layout.installer_repo.trim().is_empty() || has_line_break(&self.layout.installer_repo) {
            return Err(ProvisionError::validation("Installer repository URL must be set"));
        }
        if self.layout.settings_file_name.contains('/') || self.layout.settings_file_name.is_empty() {
            return Err(ProvisionError::validation(
                "Settings file name must be a plain file name",
            ));
        }

        Ok(())
    }

    /// Default mail hostname for a domain (`mail.<domain>`)
    pub fn default_mail_hostname(domain: &str) -> String {
        format!("mail.{}", domain.trim())
    }
}

fn has_line_break(value: &str) -> bool {
    value.contains('\n') || value.contains('\r')
}

/// Check a DNS name: at least two labels, each 1-63 chars of
/// `[A-Za-z0-9-]` without leading or trailing hyphen.
pub fn validate_hostname(field: &str, value: &str) -> Result<()> {
    let name = value.trim_end_matches('.');
    if name.is_empty() {
        return Err(ProvisionError::validation(format!("{} must be specified", field)));
    }
    if name.len() > 253 {
        return Err(ProvisionError::validation(format!("{} is longer than 253 characters", field)));
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(ProvisionError::validation(format!(
            "{} must be a fully qualified name (e.g. example.com)",
            field
        )));
    }

    for label in labels {
        if label.is_empty() || label.len() > 63 {
            return Err(ProvisionError::validation(format!(
                "{} has an empty or overlong label",
                field
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ProvisionError::validation(format!(
                "{} labels cannot start or end with a hyphen",
                field
            )));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ProvisionError::validation(format!(
                "{} can only contain letters, digits, hyphens and dots",
                field
            )));
        }
    }

    Ok(())
}

/// Check the database server address: a local name, an IP address or a DNS name
pub fn validate_database_host(value: &str) -> Result<()> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ProvisionError::validation(
            "Database host must be a single name or address without whitespace",
        ));
    }
    if value == "localhost" || value.parse::<std::net::IpAddr>().is_ok() {
        return Ok(());
    }
    validate_hostname("Database host", value)
}

/// Check an address of the form `local@domain`. Surrounding whitespace is
/// rejected rather than trimmed since the value is stored as given.
pub fn validate_email(field: &str, value: &str) -> Result<()> {
    if value != value.trim() || has_line_break(value) {
        return Err(ProvisionError::validation(format!(
            "{} cannot contain surrounding whitespace or line breaks",
            field
        )));
    }
    let Some((local, domain)) = value.split_once('@') else {
        return Err(ProvisionError::validation(format!("{} must contain '@'", field)));
    };
    if local.is_empty() || domain.contains('@') {
        return Err(ProvisionError::validation(format!("{} is not a valid address", field)));
    }
    if local.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ProvisionError::validation(format!("{} contains whitespace", field)));
    }
    validate_hostname(field, domain)
}

/// Check a name that ends up as an SQL identifier or login
pub fn validate_identifier(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ProvisionError::validation(format!("{} must be specified", field)));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ProvisionError::validation(format!(
            "{} must be at most {} characters long",
            field, MAX_IDENTIFIER_LEN
        )));
    }
    if let Some(first_char) = value.chars().next() {
        if !first_char.is_ascii_alphabetic() {
            return Err(ProvisionError::validation(format!("{} must start with a letter", field)));
        }
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ProvisionError::validation(format!(
            "{} can only contain letters, numbers, and underscores",
            field
        )));
    }
    Ok(())
}

/// Check a password before it is written anywhere
pub fn validate_password(field: &str, value: &Secret) -> Result<()> {
    if value.is_empty() {
        return Err(ProvisionError::validation(format!("{} must be specified", field)));
    }
    if value.expose().chars().count() < MIN_PASSWORD_LEN {
        return Err(ProvisionError::validation(format!(
            "{} must be at least {} characters long",
            field, MIN_PASSWORD_LEN
        )));
    }
    if has_line_break(value.expose()) {
        return Err(ProvisionError::validation(format!("{} cannot contain line breaks", field)));
    }
    Ok(())
}
