//! Interactive collection of the provisioning configuration.
//!
//! Prompting is kept apart from execution: [`collect_config`] only ever
//! produces a validated [`ProvisioningConfig`] or an error, and the sequencer
//! never talks to the terminal.

use tracing::debug;

use crate::config::{
    validate_email, validate_hostname, validate_identifier, validate_password, AdminIdentity,
    CertificateMode, CertificateSettings, DatabaseEngine, DatabaseSettings, HostLayout,
    ProvisioningConfig, Secret,
};
use crate::error::{ProvisionError, Result};

/// Source of operator answers
pub trait Prompter {
    fn text(&mut self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Read a secret without echoing it
    fn password(&mut self, prompt: &str) -> Result<Secret>;

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;
}

/// Terminal prompts via `dialoguer`
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn text(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = dialoguer::Input::<String>::new().with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?.trim().to_string())
    }

    fn password(&mut self, prompt: &str) -> Result<Secret> {
        let value = dialoguer::Password::new().with_prompt(prompt).interact()?;
        Ok(Secret::new(value))
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}

/// Ask for a password twice. A mismatch is fatal; there is no retry.
pub fn confirmed_password(prompter: &mut dyn Prompter, label: &str) -> Result<Secret> {
    let first = prompter.password(&format!("{} password", capitalize(label)))?;
    let second = prompter.password(&format!("Confirm {} password", label))?;
    if first != second {
        return Err(ProvisionError::PasswordMismatch(label.to_string()));
    }
    validate_password(&format!("{} password", capitalize(label)), &first)?;
    Ok(first)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Collect a full configuration from the operator.
///
/// Each answer is checked as soon as it is given, and the assembled
/// configuration is validated as a whole before it is returned.
pub fn collect_config(prompter: &mut dyn Prompter, layout: HostLayout) -> Result<ProvisioningConfig> {
    let domain = prompter.text("Mail domain (e.g. example.com)", None)?.to_ascii_lowercase();
    validate_hostname("Domain", &domain)?;

    let default_host = ProvisioningConfig::default_mail_hostname(&domain);
    let mail_hostname = prompter
        .text("Mail server hostname", Some(&default_host))?
        .to_ascii_lowercase();
    validate_hostname("Mail hostname", &mail_hostname)?;

    let admin_email = prompter.text("Administrator email", Some(&format!("postmaster@{}", domain)))?;
    validate_email("Admin email", &admin_email)?;
    let admin_username = prompter.text("Administrator username", Some("admin"))?;
    validate_identifier("Admin username", &admin_username)?;
    let admin_password = confirmed_password(prompter, "administrator")?;

    let db_name = prompter.text("Database name", Some("modoboa"))?;
    validate_identifier("Database name", &db_name)?;
    let db_user = prompter.text("Database user", Some("modoboa"))?;
    validate_identifier("Database user", &db_user)?;
    let db_password = confirmed_password(prompter, "database")?;

    let contact_email = prompter.text("Certificate contact email", Some(&admin_email))?;
    validate_email("Certificate contact email", &contact_email)?;

    let config = ProvisioningConfig {
        domain,
        mail_hostname,
        admin: AdminIdentity {
            email: admin_email,
            username: admin_username,
            password: admin_password,
        },
        database: DatabaseSettings {
            name: db_name,
            user: db_user,
            engine: DatabaseEngine::default(),
            host: "127.0.0.1".to_string(),
            password: db_password,
        },
        certificate: CertificateSettings {
            mode: CertificateMode::default(),
            contact_email,
        },
        layout,
    };
    config.validate()?;
    debug!(?config, "configuration collected");
    Ok(config)
}

/// Final gate before the host is modified. `assume_yes` skips the question.
pub fn confirm_execution(prompter: &mut dyn Prompter, config: &ProvisioningConfig, assume_yes: bool) -> Result<()> {
    if assume_yes {
        return Ok(());
    }
    println!();
    println!("About to provision {} for {}.", config.mail_hostname, config.domain);
    println!("This installs packages, creates database '{}', opens firewall ports", config.database.name);
    println!("and runs the installer from {}.", config.layout.installer_repo);
    if prompter.confirm("Proceed?", false)? {
        Ok(())
    } else {
        Err(ProvisionError::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned answers; `None` for a text prompt means "accept default"
    struct Scripted {
        texts: VecDeque<Option<&'static str>>,
        passwords: VecDeque<&'static str>,
        confirms: VecDeque<bool>,
    }

    impl Scripted {
        fn new(texts: &[Option<&'static str>], passwords: &[&'static str]) -> Self {
            Self {
                texts: texts.iter().copied().collect(),
                passwords: passwords.iter().copied().collect(),
                confirms: VecDeque::new(),
            }
        }
    }

    impl Prompter for Scripted {
        fn text(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
            match self.texts.pop_front() {
                Some(Some(answer)) => Ok(answer.to_string()),
                Some(None) => default
                    .map(str::to_string)
                    .ok_or_else(|| ProvisionError::prompt(format!("no default for {}", prompt))),
                None => Err(ProvisionError::prompt(format!("unexpected prompt: {}", prompt))),
            }
        }

        fn password(&mut self, prompt: &str) -> Result<Secret> {
            self.passwords
                .pop_front()
                .map(Secret::new)
                .ok_or_else(|| ProvisionError::prompt(format!("unexpected prompt: {}", prompt)))
        }

        fn confirm(&mut self, _prompt: &str, default: bool) -> Result<bool> {
            Ok(self.confirms.pop_front().unwrap_or(default))
        }
    }

    const DEFAULTS: &[Option<&str>] = &[Some("Example.COM"), None, None, None, None, None, None];

    #[test]
    fn test_collect_with_defaults() {
        let mut prompter = Scripted::new(DEFAULTS, &["admin-pass-1", "admin-pass-1", "db-pass-12", "db-pass-12"]);
        let config = collect_config(&mut prompter, HostLayout::default()).unwrap();

        assert_eq!(config.domain, "example.com");
        assert_eq!(config.mail_hostname, "mail.example.com");
        assert_eq!(config.admin.email, "postmaster@example.com");
        assert_eq!(config.admin.username, "admin");
        assert_eq!(config.database.name, "modoboa");
        assert_eq!(config.certificate.contact_email, "postmaster@example.com");
        assert_eq!(config.database.password.expose(), "db-pass-12");
    }

    #[test]
    fn test_admin_password_mismatch() {
        let mut prompter = Scripted::new(DEFAULTS, &["admin-pass-1", "admin-pass-2"]);
        let err = collect_config(&mut prompter, HostLayout::default()).unwrap_err();
        assert!(matches!(err, ProvisionError::PasswordMismatch(ref who) if who == "administrator"));
    }

    #[test]
    fn test_database_password_mismatch() {
        let mut prompter = Scripted::new(DEFAULTS, &["admin-pass-1", "admin-pass-1", "db-pass-12", "db-pass-13"]);
        let err = collect_config(&mut prompter, HostLayout::default()).unwrap_err();
        assert!(matches!(err, ProvisionError::PasswordMismatch(ref who) if who == "database"));
    }

    #[test]
    fn test_short_password_rejected() {
        let mut prompter = Scripted::new(DEFAULTS, &["short", "short"]);
        let err = collect_config(&mut prompter, HostLayout::default()).unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(_)));
    }

    #[test]
    fn test_invalid_domain_stops_early() {
        let mut prompter = Scripted::new(&[Some("not a domain")], &[]);
        let err = collect_config(&mut prompter, HostLayout::default()).unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(_)));
    }

    #[test]
    fn test_confirmation_gate() {
        let config = crate::config::tests::sample_config();

        let mut prompter = Scripted::new(&[], &[]);
        prompter.confirms.push_back(false);
        assert!(matches!(
            confirm_execution(&mut prompter, &config, false),
            Err(ProvisionError::Aborted)
        ));

        prompter.confirms.push_back(true);
        assert!(confirm_execution(&mut prompter, &config, false).is_ok());

        // --yes never asks
        assert!(confirm_execution(&mut prompter, &config, true).is_ok());
    }
}
