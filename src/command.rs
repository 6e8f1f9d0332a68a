//! Type-safe command contracts.
//!
//! Every external program mailstrap launches is described by a struct that
//! implements [`StepCommand`]. The struct is the single place where flags,
//! environment and stdin for that program are defined; the runner only ever
//! sees the resulting [`CommandSpec`].

use std::fmt;
use std::path::PathBuf;

/// A fully described process invocation
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Data written to the child's stdin. Used for anything secret so it
    /// never appears in the process list.
    pub stdin: Option<String>,
    pub current_dir: Option<PathBuf>,
    /// Only inspects host state; still executed in dry-run mode
    pub read_only: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            current_dir: None,
            read_only: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program followed by its arguments, space separated
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env)
            .field("stdin", &self.stdin.as_ref().map(|s| format!("<{} bytes>", s.len())))
            .field("current_dir", &self.current_dir)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())?;
        if let Some(stdin) = &self.stdin {
            write!(f, " <stdin: {} bytes>", stdin.len())?;
        }
        Ok(())
    }
}

/// Output from a command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output (empty when output went to a log file)
    pub stdout: String,
    /// Standard error (empty when output went to a log file)
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    /// Whether the command exited with status 0
    pub success: bool,
    /// Whether execution was skipped because of dry-run mode
    pub dry_run: bool,
}

impl CommandOutput {
    /// Output reported for a command that dry-run mode skipped
    pub fn skipped() -> Self {
        Self {
            exit_code: Some(0),
            success: true,
            dry_run: true,
            ..Self::default()
        }
    }

    /// `Ok(())` on success, otherwise a one-line description of the failure
    /// suitable for wrapping in the stage's error variant.
    pub fn check(&self, context: &str) -> Result<(), String> {
        if self.success {
            return Ok(());
        }
        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let detail = self.stderr.trim();
        if detail.is_empty() {
            Err(format!("{} failed (exit code {})", context, code))
        } else {
            Err(format!("{} failed (exit code {}): {}", context, code, detail))
        }
    }
}

/// Trait for typed command arguments.
///
/// Implementors map their fields to the exact argv, environment and stdin
/// the target program expects, so flag mismatches are caught in one place.
pub trait StepCommand {
    /// Executable name, resolved through `PATH`
    fn program(&self) -> &'static str;

    /// Arguments exactly as the program expects them
    fn to_args(&self) -> Vec<String>;

    /// Environment variables the program requires
    fn env_vars(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Data to feed on stdin
    fn stdin(&self) -> Option<String> {
        None
    }

    /// Working directory, if the program must run from a specific place
    fn working_dir(&self) -> Option<PathBuf> {
        None
    }

    /// True for queries that change nothing on the host
    fn is_read_only(&self) -> bool {
        false
    }

    fn to_spec(&self) -> CommandSpec {
        CommandSpec {
            program: self.program().to_string(),
            args: self.to_args(),
            env: self.env_vars(),
            stdin: self.stdin(),
            current_dir: self.working_dir(),
            read_only: self.is_read_only(),
        }
    }
}
