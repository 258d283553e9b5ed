//! External command execution.
//!
//! Every side-effecting command goes through [`CommandRunner`] so the
//! installer steps can be driven by a scripted runner in tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::error::{HelperError, Result};

/// A program, its arguments and an optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner {
    fn run(&mut self, invocation: &Invocation) -> std::io::Result<Outcome>;
}

/// Runs commands on the host. Output is captured; long commands show a spinner.
#[derive(Debug, Default)]
pub struct SystemRunner {
    quiet: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable the progress spinner (non-tty output).
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn spinner(&self, invocation: &Invocation) -> Option<ProgressBar> {
        if self.quiet {
            return None;
        }
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("  {spinner} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(invocation.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Some(bar)
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> std::io::Result<Outcome> {
        debug!(command = %invocation, "running");
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        let spinner = self.spinner(invocation);
        let result = cmd.output();
        if let Some(bar) = spinner {
            bar.finish_and_clear();
        }

        let output = result?;
        let outcome = Outcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(command = %invocation, code = ?outcome.exit_code, "finished");
        Ok(outcome)
    }
}

/// Run and require a zero exit status.
pub fn run_checked(runner: &mut dyn CommandRunner, invocation: &Invocation) -> Result<Outcome> {
    let outcome = runner.run(invocation)?;
    if outcome.success {
        Ok(outcome)
    } else {
        Err(HelperError::CommandFailed {
            command: invocation.to_string(),
            exit_code: outcome.exit_code.unwrap_or(-1),
            stderr: stderr_tail(&outcome.stderr),
        })
    }
}

/// True if the command ran and exited zero. Spawn failures count as failure.
pub fn succeeds(runner: &mut dyn CommandRunner, invocation: &Invocation) -> bool {
    match runner.run(invocation) {
        Ok(outcome) => outcome.success,
        Err(e) => {
            debug!(command = %invocation, error = %e, "spawn failed");
            false
        }
    }
}

/// Lines of captured stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 10;

/// The last few non-empty lines of `stderr`.
pub fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Run a command in a named stage; failure becomes [`HelperError::Stage`]
/// carrying the tail of the command's stderr.
pub fn run_stage(
    runner: &mut dyn CommandRunner,
    stage: &'static str,
    invocation: &Invocation,
) -> Result<()> {
    match runner.run(invocation) {
        Ok(outcome) if outcome.success => Ok(()),
        Ok(outcome) => {
            let mut detail = match outcome.exit_code {
                Some(code) => format!("`{invocation}` exited {code}"),
                None => format!("`{invocation}` was terminated"),
            };
            let tail = stderr_tail(&outcome.stderr);
            if !tail.is_empty() {
                detail.push_str(":\n");
                detail.push_str(&tail);
            }
            Err(HelperError::Stage { stage, detail })
        }
        Err(e) => Err(HelperError::Stage {
            stage,
            detail: e.to_string(),
        }),
    }
}
