//! Property-based tests for mailstrap
//!
//! These tests verify:
//! - Secrets never leak through Debug/Display or the redacted settings file
//! - Mismatched password pairs never yield a value
//! - The stage machine only ever moves forward
//! - Identifier validation matches what is safe to put in SQL

use proptest::prelude::*;

use mailstrap::config::{validate_identifier, validate_password};
use mailstrap::prompt::confirmed_password;
use mailstrap::settings_file::{render, SecretHandling};
use mailstrap::steps::datastore::DatabaseBootstrap;
use mailstrap::{
    AdminIdentity, CertificateMode, CertificateSettings, DatabaseEngine, DatabaseSettings, HostLayout,
    ProvisionContext, ProvisionError, ProvisionStage, Prompter, ProvisioningConfig, Secret, StepCommand,
};

/// Strategy for passwords the validator accepts
fn password_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9!#%&'()*+,./:;<=>?@_-]{8,40}"
}

fn engine_strategy() -> impl Strategy<Value = DatabaseEngine> {
    prop_oneof![Just(DatabaseEngine::Mysql), Just(DatabaseEngine::Postgres)]
}

fn config_with(admin_password: &str, db_password: &str, engine: DatabaseEngine) -> ProvisioningConfig {
    ProvisioningConfig {
        domain: "example.net".to_string(),
        mail_hostname: "mail.example.net".to_string(),
        admin: AdminIdentity {
            email: "admin@example.net".to_string(),
            username: "admin".to_string(),
            password: Secret::new(admin_password),
        },
        database: DatabaseSettings {
            engine,
            host: "127.0.0.1".to_string(),
            name: "modoboa".to_string(),
            user: "modoboa".to_string(),
            password: Secret::new(db_password),
        },
        certificate: CertificateSettings {
            mode: CertificateMode::SelfSigned,
            contact_email: "admin@example.net".to_string(),
        },
        layout: HostLayout::default(),
    }
}

/// Answers password prompts from a fixed list
struct Answers(Vec<String>);

impl Prompter for Answers {
    fn text(&mut self, prompt: &str, _default: Option<&str>) -> mailstrap::Result<String> {
        Err(ProvisionError::prompt(format!("unexpected prompt: {}", prompt)))
    }

    fn password(&mut self, prompt: &str) -> mailstrap::Result<Secret> {
        if self.0.is_empty() {
            return Err(ProvisionError::prompt(format!("unexpected prompt: {}", prompt)));
        }
        Ok(Secret::new(self.0.remove(0)))
    }

    fn confirm(&mut self, _prompt: &str, default: bool) -> mailstrap::Result<bool> {
        Ok(default)
    }
}

// =============================================================================
// Secret handling
// =============================================================================

proptest! {
    /// Secret: Debug and Display never show the value
    #[test]
    fn secret_formatting_is_redacted(value in password_strategy()) {
        let secret = Secret::new(value.clone());
        let debug = format!("{:?}", secret);
        let display = secret.to_string();
        prop_assert!(!debug.contains(&value));
        prop_assert!(!display.contains(&value));
    }

    /// Whole configuration: Debug output carries no password
    #[test]
    fn config_debug_is_redacted(admin in password_strategy(), db in password_strategy()) {
        let config = config_with(&admin, &db, DatabaseEngine::Mysql);
        let debug = format!("{:?}", config);
        prop_assert!(!debug.contains(&admin));
        prop_assert!(!debug.contains(&db));
    }

    /// Redacted rendering never contains a password; the real one contains both
    #[test]
    fn redacted_settings_hide_passwords(admin in password_strategy(), db in password_strategy()) {
        let config = config_with(&admin, &db, DatabaseEngine::Mysql);
        let redacted = render(&config, SecretHandling::Redact);
        prop_assert!(!redacted.contains(&admin));
        prop_assert!(!redacted.contains(&db));

        let real = render(&config, SecretHandling::Include);
        let admin_line = format!("admin_password = {}", admin);
        let db_line = format!("password = {}", db);
        prop_assert!(real.contains(&admin_line));
        prop_assert!(real.contains(&db_line));
    }

    /// Database bootstrap: the password travels on stdin only
    #[test]
    fn bootstrap_password_never_in_argv(db in password_strategy(), engine in engine_strategy()) {
        let config = config_with("admin-pass-123", &db, engine);
        let spec = DatabaseBootstrap::new(&config.database).to_spec();
        prop_assert!(spec.args.iter().all(|a| !a.contains(&db)));
        prop_assert!(!spec.to_string().contains(&db));
        prop_assert!(spec.stdin.is_some());
    }
}

// =============================================================================
// Password confirmation
// =============================================================================

proptest! {
    /// Two different entries never produce a password
    #[test]
    fn mismatched_pair_is_rejected(a in password_strategy(), b in password_strategy()) {
        prop_assume!(a != b);
        let mut prompter = Answers(vec![a, b]);
        let result = confirmed_password(&mut prompter, "database");
        prop_assert!(matches!(result, Err(ProvisionError::PasswordMismatch(_))));
    }

    /// Two identical valid entries always produce that password
    #[test]
    fn matching_pair_is_accepted(a in password_strategy()) {
        let mut prompter = Answers(vec![a.clone(), a.clone()]);
        let secret = confirmed_password(&mut prompter, "database").expect("should accept");
        prop_assert_eq!(secret.expose(), a.as_str());
        prop_assert!(validate_password("password", &secret).is_ok());
    }
}

// =============================================================================
// Stage machine
// =============================================================================

fn stage_strategy() -> impl Strategy<Value = ProvisionStage> {
    prop::sample::select(ProvisionStage::all_stages().to_vec())
}

proptest! {
    /// Whatever is attempted, the current stage never moves backwards and
    /// every accepted transition is exactly one step
    #[test]
    fn stage_machine_only_moves_forward(targets in prop::collection::vec(stage_strategy(), 1..40)) {
        let mut ctx = ProvisionContext::new();
        ctx.confirm();
        for target in targets {
            let before = ctx.current_stage();
            if ctx.transition_to(target).is_ok() {
                prop_assert_eq!(before.next(), Some(target));
            } else {
                prop_assert_eq!(ctx.current_stage(), before);
            }
        }
    }

    /// Failing at any non-terminal stage records that stage
    #[test]
    fn failure_records_stage(steps in 0usize..10) {
        let mut ctx = ProvisionContext::new();
        ctx.confirm();
        for _ in 0..steps {
            ctx.advance().unwrap();
        }
        let at = ctx.current_stage();
        ctx.fail().unwrap();
        prop_assert_eq!(ctx.failed_at(), Some(at));
        prop_assert!(ctx.advance().is_err());
    }
}

// =============================================================================
// Identifier validation
// =============================================================================

proptest! {
    #[test]
    fn valid_identifiers_accepted(name in "[A-Za-z][A-Za-z0-9_]{0,31}") {
        prop_assert!(validate_identifier("name", &name).is_ok());
    }

    /// Anything with quoting or separator characters is rejected
    #[test]
    fn unsafe_identifiers_rejected(
        prefix in "[a-z]{1,10}",
        bad in prop::sample::select(vec!['\'', '"', '`', ';', ' ', '-', '.', '\\']),
    ) {
        let name = format!("{}{}x", prefix, bad);
        prop_assert!(validate_identifier("name", &name).is_err());
    }
}
