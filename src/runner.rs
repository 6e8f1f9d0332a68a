//! Command execution
//!
//! [`CommandRunner`] is the seam between the sequencer and the host. The
//! production [`SystemRunner`] is the only code that spawns processes:
//!
//! - every child runs in its own process group with a parent-death signal
//! - the child PID is registered with [`ChildRegistry::global`] while it runs
//! - in dry-run mode only read-only queries are spawned; everything else
//!   is logged instead

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::command::{CommandOutput, CommandSpec};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};

/// Permissions for newly created installer logs
pub const LOG_FILE_MODE: u32 = 0o640;

/// Executes [`CommandSpec`]s
pub trait CommandRunner {
    /// Run to completion, capturing stdout and stderr.
    fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput>;

    /// Run to completion with stdout and stderr both appended to `log`.
    fn run_logged(&self, spec: &CommandSpec, log: &Path) -> std::io::Result<CommandOutput>;

    /// Whether commands are only being printed
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Production runner backed by `std::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn build(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).in_new_process_group();
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd
    }

    fn execute(mut cmd: Command, spec: &CommandSpec) -> std::io::Result<(std::process::Output, u32)> {
        let mut child = cmd.spawn()?;
        let pid = child.id();
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }

        let mut stdin_result = Ok(());
        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            stdin_result = stdin.write_all(input.as_bytes());
            // stdin is dropped here so the child sees EOF
        }

        let output = child.wait_with_output();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        // A child that only got part of its input must not count as a success
        if let Err(e) = stdin_result {
            warn!(program = %spec.program, error = %e, "failed to write stdin");
            return Err(std::io::Error::new(
                e.kind(),
                format!("failed to write stdin of {}: {}", spec.program, e),
            ));
        }

        output.map(|o| (o, pid))
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        if self.dry_run && !spec.read_only {
            info!("[DRY RUN] would run: {}", spec);
            return Ok(CommandOutput::skipped());
        }

        debug!(command = %spec, "running");
        let mut cmd = Self::build(spec);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let (output, pid) = Self::execute(cmd, spec)?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
            dry_run: false,
        };
        debug!(pid, exit_code = ?result.exit_code, "{} finished", spec.program);
        Ok(result)
    }

    fn run_logged(&self, spec: &CommandSpec, log: &Path) -> std::io::Result<CommandOutput> {
        if self.dry_run {
            info!("[DRY RUN] would run: {} > {}", spec, log.display());
            return Ok(CommandOutput::skipped());
        }

        let file = File::options()
            .create(true)
            .append(true)
            .mode(LOG_FILE_MODE)
            .open(log)?;
        let mut cmd = Self::build(spec);
        cmd.stdout(Stdio::from(file.try_clone()?))
            .stderr(Stdio::from(file));

        info!(command = %spec, log = %log.display(), "running with output logged");
        let (output, _pid) = Self::execute(cmd, spec)?;
        Ok(CommandOutput {
            exit_code: output.status.code(),
            success: output.status.success(),
            ..CommandOutput::default()
        })
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
