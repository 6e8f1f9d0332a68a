//! mailstrap - main entry point

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use mailstrap::cli::{CheckFlags, Cli, Commands};
use mailstrap::preflight::{self, should_skip_root_check};
use mailstrap::settings_file::{self, SecretHandling};
use mailstrap::{
    collect_config, confirm_execution, process_guard, summary, verify, DialoguerPrompter, HostLayout,
    PreflightOptions, ProvisionError, Provisioner, ProvisioningConfig, SequencerOptions, SystemHost,
    SystemRunner, VerifyOptions,
};

/// Initialize the logger with appropriate settings
fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    // RUST_LOG overrides the default
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn main() {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    info!("mailstrap starting up");

    // Children get terminated if we receive SIGINT/SIGTERM/SIGHUP
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    if let Err(e) = run(cli) {
        let provision_error = e.downcast_ref::<ProvisionError>();
        let code = provision_error.map(ProvisionError::exit_code).unwrap_or(1);
        error!("{:#}", e);
        eprintln!("✗ {:#}", e);
        if provision_error.is_some_and(ProvisionError::is_precondition) {
            eprintln!("  No changes were made to this host");
        }
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    let dry_run = cli.dry_run;
    if dry_run {
        info!("Dry-run mode: no changes will be made to this host");
    }

    match cli.command {
        None => run_install(dry_run, None, None, false, CheckFlags::default()),
        Some(Commands::Install {
            config,
            save_config,
            yes,
            checks,
        }) => run_install(dry_run, config.as_deref(), save_config.as_deref(), yes, checks),
        Some(Commands::Validate { config }) => {
            info!("Validating configuration file: {:?}", config);
            let config = ProvisioningConfig::load_validated(&config)?;
            println!("✓ Configuration is valid for {} ({})", config.domain, config.mail_hostname);
            Ok(())
        }
        Some(Commands::Preflight) => run_preflight(),
        Some(Commands::Verify { config, checks }) => run_verify(dry_run, &config, checks),
        Some(Commands::Render { config }) => {
            let config = ProvisioningConfig::load_validated(&config)?;
            print!("{}", settings_file::render(&config, SecretHandling::Redact));
            Ok(())
        }
    }
}

fn verify_options(checks: CheckFlags) -> VerifyOptions {
    VerifyOptions {
        smoke_test: checks.smoke_test,
        check_cert: checks.check_cert,
    }
}

fn run_install(
    dry_run: bool,
    config_path: Option<&Path>,
    save_path: Option<&Path>,
    yes: bool,
    checks: CheckFlags,
) -> Result<()> {
    let mut prompter = DialoguerPrompter;

    let config = match config_path {
        Some(path) => {
            info!("Running headless provisioning with config: {:?}", path);
            ProvisioningConfig::load_validated(path)?
        }
        None => collect_config(&mut prompter, HostLayout::default())?,
    };

    if let Some(path) = save_path {
        config.save_to_file(path)?;
        println!("✓ Configuration saved to {}", path.display());
    }

    let runner = SystemRunner::new(dry_run);
    let host = SystemHost;
    let options = SequencerOptions {
        preflight: PreflightOptions {
            skip_root: should_skip_root_check(),
        },
        verify: verify_options(checks),
    };

    let mut provisioner = Provisioner::new(&runner, &host, &config, options)?;
    provisioner.preflight()?;
    confirm_execution(&mut prompter, &config, yes)?;
    provisioner.confirm();

    let outcome = match provisioner.execute() {
        Ok(outcome) => outcome,
        Err(e) => {
            let stage = provisioner
                .context()
                .failed_at()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "startup".to_string());
            return Err(e).context(format!("Provisioning stopped while {}", stage.to_lowercase()));
        }
    };

    println!();
    outcome.verification.print();
    println!();
    print!("{}", summary::render_summary(&config, Some(&outcome.log_path)));
    println!();
    if dry_run {
        println!("✓ Dry run finished; nothing was changed");
    } else {
        println!("✓ Provisioning completed");
    }
    Ok(())
}

fn run_preflight() -> Result<()> {
    let layout = HostLayout::default();
    let options = PreflightOptions {
        skip_root: should_skip_root_check(),
    };
    let report = preflight::run_checks(&SystemHost, &layout.scratch_dir, options);
    preflight::print_report(&report);
    report.into_result()?;
    println!("✓ Host is ready for provisioning");
    Ok(())
}

fn run_verify(dry_run: bool, config_path: &Path, checks: CheckFlags) -> Result<()> {
    let config = ProvisioningConfig::load_validated(config_path)
        .with_context(|| format!("Cannot verify without a configuration ({})", config_path.display()))?;
    let runner = SystemRunner::new(dry_run);
    let report = verify::run_verification(&runner, &SystemHost, &config, verify_options(checks));
    report.print();
    println!();
    print!("{}", summary::render_summary(&config, None));
    Ok(())
}
