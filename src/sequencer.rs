//! Provisioning sequencer
//!
//! Runs the stages in fixed order against an injected [`CommandRunner`] and
//! [`HostProbe`]. The first fatal failure stops the run; completed stages
//! are never rolled back. Progress is tracked by [`ProvisionContext`], so a
//! stage cannot be skipped or repeated and the host is not touched until a
//! confirmation has been recorded.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::command::{CommandOutput, StepCommand};
use crate::config::ProvisioningConfig;
use crate::error::{ProvisionError, Result};
use crate::preflight::{self, HostProbe, PreflightOptions, PreflightReport};
use crate::runner::CommandRunner;
use crate::settings_file;
use crate::stage::{ProvisionContext, ProvisionStage};
use crate::steps::checkout::{backup_existing_checkout, GitClone, TIMESTAMP_FORMAT};
use crate::steps::datastore::DatabaseBootstrap;
use crate::steps::firewall::required_rules;
use crate::steps::installer::InstallerRun;
use crate::steps::packages::{required_packages, AptInstall, AptUpdate};
use crate::verify::{self, VerificationReport, VerifyOptions};

#[derive(Debug, Clone, Copy, Default)]
pub struct SequencerOptions {
    pub preflight: PreflightOptions,
    pub verify: VerifyOptions,
}

/// What a completed run left behind
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    /// Where a previous installer checkout was moved, if there was one
    pub backup: Option<PathBuf>,
    /// Combined output of the delegated installer
    pub log_path: PathBuf,
    pub verification: VerificationReport,
}

/// `<log_dir>/installer-<YYYYmmdd-HHMMSS>.log`
pub fn log_file_path(log_dir: &Path, now: DateTime<Local>) -> PathBuf {
    log_dir.join(format!("installer-{}.log", now.format(TIMESTAMP_FORMAT)))
}

/// Run `cmd` and turn any failure into the stage's error variant
fn run_step(
    runner: &dyn CommandRunner,
    cmd: &impl StepCommand,
    what: &str,
    wrap: fn(String) -> ProvisionError,
) -> Result<CommandOutput> {
    let spec = cmd.to_spec();
    let output = runner
        .run(&spec)
        .map_err(|e| wrap(format!("{}: {}", what, e)))?;
    output.check(what).map_err(wrap)?;
    Ok(output)
}

pub struct Provisioner<'a> {
    runner: &'a dyn CommandRunner,
    host: &'a dyn HostProbe,
    config: &'a ProvisioningConfig,
    options: SequencerOptions,
    context: ProvisionContext,
    /// Fixed at construction so the backup and the log share one timestamp
    started_at: DateTime<Local>,
}

impl<'a> Provisioner<'a> {
    /// Rejects configurations that do not validate.
    pub fn new(
        runner: &'a dyn CommandRunner,
        host: &'a dyn HostProbe,
        config: &'a ProvisioningConfig,
        options: SequencerOptions,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            runner,
            host,
            config,
            options,
            context: ProvisionContext::new(),
            started_at: Local::now(),
        })
    }

    pub fn with_start_time(mut self, started_at: DateTime<Local>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn context(&self) -> &ProvisionContext {
        &self.context
    }

    /// Record the operator's approval to modify the host
    pub fn confirm(&mut self) {
        self.context.confirm();
    }

    fn dry_run(&self) -> bool {
        self.runner.is_dry_run()
    }

    fn enter(&mut self, stage: ProvisionStage) -> Result<()> {
        self.context.transition_to(stage)?;
        println!("==> {}", stage);
        info!(stage = %stage, "stage started");
        Ok(())
    }

    fn abort(&mut self, err: ProvisionError) -> ProvisionError {
        let stage = self.context.current_stage();
        let _ = self.context.fail();
        error!(stage = %stage, "{}", err);
        err
    }

    fn stage<T>(&mut self, stage: ProvisionStage, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.enter(stage)?;
        f(self).map_err(|e| self.abort(e))
    }

    /// Read-only precondition checks. Must run before [`Self::execute`].
    pub fn preflight(&mut self) -> Result<PreflightReport> {
        self.stage(ProvisionStage::Preflight, |p| {
            let report = preflight::run_checks(p.host, &p.config.layout.scratch_dir, p.options.preflight);
            if !report.is_ok() {
                preflight::print_report(&report);
            }
            report.clone().into_result()?;
            Ok(report)
        })
    }

    /// Every mutating stage, then verification.
    pub fn execute(&mut self) -> Result<ProvisionOutcome> {
        self.stage(ProvisionStage::InstallingPackages, Self::install_packages)?;
        self.stage(ProvisionStage::BootstrappingDatastore, Self::bootstrap_datastore)?;
        self.stage(ProvisionStage::ConfiguringFirewall, Self::configure_firewall)?;
        let backup = self.stage(ProvisionStage::FetchingInstaller, Self::fetch_installer)?;
        self.stage(ProvisionStage::WritingSettings, Self::write_settings)?;
        self.stage(ProvisionStage::CheckingSettings, Self::check_settings)?;
        let log_path = self.stage(ProvisionStage::RunningInstaller, Self::run_installer)?;
        let verification = self.stage(ProvisionStage::Verifying, |p| Ok(p.verify()))?;
        self.context.advance()?;

        Ok(ProvisionOutcome {
            backup,
            log_path,
            verification,
        })
    }

    /// [`Self::preflight`] followed by [`Self::execute`]
    pub fn run(&mut self) -> Result<ProvisionOutcome> {
        self.preflight()?;
        self.execute()
    }

    fn install_packages(&mut self) -> Result<()> {
        run_step(self.runner, &AptUpdate, "apt-get update", ProvisionError::PackageManagerFailure)?;
        let install = AptInstall {
            packages: required_packages(&self.config.database),
        };
        run_step(self.runner, &install, "apt-get install", ProvisionError::PackageManagerFailure)?;
        Ok(())
    }

    fn bootstrap_datastore(&mut self) -> Result<()> {
        let bootstrap = DatabaseBootstrap::new(&self.config.database);
        run_step(
            self.runner,
            &bootstrap,
            &format!("creating database {}", self.config.database.name),
            ProvisionError::DatastoreBootstrapFailure,
        )?;
        Ok(())
    }

    fn configure_firewall(&mut self) -> Result<()> {
        for rule in required_rules() {
            run_step(
                self.runner,
                &rule,
                &format!("ufw allow {}/{}", rule.port, rule.protocol),
                ProvisionError::FirewallFailure,
            )?;
        }
        Ok(())
    }

    fn fetch_installer(&mut self) -> Result<Option<PathBuf>> {
        let checkout = &self.config.layout.checkout_dir;
        let backup = if self.dry_run() {
            if checkout.exists() {
                info!("[DRY RUN] would move {} aside", checkout.display());
            }
            None
        } else {
            backup_existing_checkout(checkout, self.started_at).map_err(|e| {
                ProvisionError::AcquisitionFailure(format!("cannot move {} aside: {}", checkout.display(), e))
            })?
        };
        if let Some(path) = &backup {
            println!("    previous checkout kept at {}", path.display());
        }

        let clone = GitClone {
            repository: self.config.layout.installer_repo.clone(),
            destination: checkout.clone(),
        };
        run_step(self.runner, &clone, "git clone", ProvisionError::AcquisitionFailure)?;
        Ok(backup)
    }

    fn write_settings(&mut self) -> Result<()> {
        let path = self.config.layout.settings_path();
        if self.dry_run() {
            info!("[DRY RUN] would write {} (mode 0600)", path.display());
            return Ok(());
        }
        settings_file::write_settings(self.config, &path)?;
        Ok(())
    }

    fn installer_run(&self, check_only: bool) -> InstallerRun {
        InstallerRun {
            checkout_dir: self.config.layout.checkout_dir.clone(),
            settings_file: self.config.layout.settings_path(),
            domain: self.config.domain.clone(),
            check_only,
        }
    }

    fn check_settings(&mut self) -> Result<()> {
        run_step(
            self.runner,
            &self.installer_run(true),
            "installer configuration check",
            ProvisionError::ConfigValidationFailure,
        )?;
        Ok(())
    }

    fn run_installer(&mut self) -> Result<PathBuf> {
        let log = log_file_path(&self.config.layout.log_dir, self.started_at);
        let failure = |reason: String| ProvisionError::DelegatedExecutionFailure {
            log: log.clone(),
            reason,
        };
        if !self.dry_run() {
            std::fs::create_dir_all(&self.config.layout.log_dir).map_err(|e| {
                failure(format!(
                    "cannot create log directory {}: {}",
                    self.config.layout.log_dir.display(),
                    e
                ))
            })?;
        }
        println!("    installer output: {}", log.display());

        let spec = self.installer_run(false).to_spec();
        let output = self.runner.run_logged(&spec, &log).map_err(|e| failure(e.to_string()))?;
        output.check("installer").map_err(failure)?;
        Ok(log)
    }

    fn verify(&self) -> VerificationReport {
        verify::run_verification(self.runner, self.host, self.config, self.options.verify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_path() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            log_file_path(Path::new("/var/log/mailstrap"), now),
            PathBuf::from("/var/log/mailstrap/installer-20240309-070501.log")
        );
    }
}
