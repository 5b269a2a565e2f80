//! Thin wrapper around `std::process::Command` for host tools.

use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::process::{Command, ExitStatus, Stdio};

/// Builder for a host tool invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    quiet: bool,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            quiet: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Discard the tool's stdout and stderr.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Run to completion and return the exit status.
    ///
    /// A non-zero exit is not an error here; only a failure to spawn is.
    pub fn status(&self) -> Result<ExitStatus> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if self.quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        command
            .status()
            .with_context(|| format!("failed to execute '{}'", self.program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_success_and_failure() {
        assert!(Cmd::new("true").status().unwrap().success());
        assert!(!Cmd::new("false").status().unwrap().success());
    }

    #[test]
    fn test_args_are_passed_through() {
        let status = Cmd::new("sh")
            .args(["-c", "test \"$0\" = /tmp"])
            .arg("/tmp")
            .quiet(true)
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_missing_program_is_error() {
        let err = Cmd::new("definitely_not_a_real_command_12345")
            .status()
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("definitely_not_a_real_command_12345"));
    }
}
