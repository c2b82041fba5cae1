// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Command execution on the local machine and on deployment hosts.
//!
//! Every external program limndeploy needs, e.g., git, chown, supervisorctl,
//! is described as a typed [`Command`] (program plus argument list) and run
//! through a [`Transport`]. The transport is the only piece that knows how
//! to actually reach a host. The stock transport shells out to `ssh`, hopping
//! through the stage's gateway when one is configured; tests substitute a
//! recording fake.
//!
//! # Sessions
//!
//! A [`Session`] binds a transport to one host for the duration of a step.
//! It keeps a stack of working directories: [`Session::within`] pushes a
//! directory, runs a closure, and always pops the directory again, even when
//! the closure fails. Remote commands run in the innermost directory.
//!
//! # Failures
//!
//! A command that exits non-zero is a [`RemoteError::CommandFailed`] carrying
//! the command text, exit status, and captured output, unless the caller opts
//! into [`OnFailure::Tolerate`].

pub mod dry_run;
pub mod ssh;

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// External program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
}

impl Command {
    /// Construct new command for program with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a command line on whitespace.
    ///
    /// No shell syntax is interpreted, so quotes and operators are passed
    /// along literally. Returns `None` for a blank line.
    pub fn from_words(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        Some(Self::new(program).args(words))
    }

    /// Append argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program to run.
    pub fn get_program(&self) -> &str {
        &self.program
    }

    /// Arguments to program.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Render command as a single shell-safe line.
    pub fn to_shell(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|word| quote_arg(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.to_shell())
    }
}

/// Privilege level a command runs with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Run as the connecting user.
    #[default]
    Normal,

    /// Run through sudo.
    Privileged,
}

/// What to do when a command exits non-zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// Turn exit status into [`RemoteError::CommandFailed`].
    #[default]
    Abort,

    /// Hand exit status back to caller.
    Tolerate,
}

/// Where a command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The machine limndeploy runs on.
    Local,

    /// A deployment host, optionally reached through a gateway host.
    Remote {
        host: String,
        gateway: Option<String>,
    },
}

impl Display for Target {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Local => fmt.write_str("local"),
            Self::Remote { host, .. } => fmt.write_str(host),
        }
    }
}

/// Fully described request to run a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub target: Target,
    pub command: Command,
    pub cwd: Option<PathBuf>,
    pub privilege: Privilege,
}

impl Invocation {
    /// Shell line running command in its working directory.
    ///
    /// Privilege is not part of the line; transports apply it themselves.
    pub fn script(&self) -> String {
        match &self.cwd {
            Some(cwd) => format!(
                "cd {} && {}",
                quote_arg(cwd.to_string_lossy().as_ref()),
                self.command.to_shell()
            ),
            None => self.command.to_shell(),
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Check if command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Standard output followed by standard error, trailing newline chomped.
    pub fn combined(&self) -> String {
        let mut message = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !message.is_empty() && !message.ends_with('\n') {
                message.push('\n');
            }
            message.push_str(&self.stderr);
        }

        // INVARIANT: Chomp trailing newlines.
        message.trim_end_matches(['\r', '\n']).to_string()
    }
}

/// Means of running an [`Invocation`].
pub trait Transport {
    /// Run invocation to completion.
    ///
    /// Non-zero exit status is not an error at this level; only failing to
    /// run the command at all is.
    fn execute(&self, invocation: &Invocation) -> std::io::Result<CommandOutput>;
}

/// Where to look for a path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// On the machine limndeploy runs on.
    Local,

    /// On the session's host.
    #[default]
    Remote,
}

/// Transport bound to one deployment host.
pub struct Session<'a> {
    transport: &'a dyn Transport,
    target: Target,
    dirs: Vec<PathBuf>,
}

impl<'a> Session<'a> {
    /// Construct new session for target.
    pub fn new(transport: &'a dyn Transport, target: Target) -> Self {
        Self {
            transport,
            target,
            dirs: Vec::new(),
        }
    }

    /// Construct new session for a host, optionally behind a gateway.
    pub fn remote(
        transport: &'a dyn Transport,
        host: impl Into<String>,
        gateway: Option<String>,
    ) -> Self {
        Self::new(
            transport,
            Target::Remote {
                host: host.into(),
                gateway,
            },
        )
    }

    /// Target of session.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Current working directory for remote commands, if any.
    pub fn cwd(&self) -> Option<&Path> {
        self.dirs.last().map(PathBuf::as_path)
    }

    /// Run command on the local machine.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Spawn`] if command cannot be run.
    /// - Return [`RemoteError::CommandFailed`] if command exits non-zero.
    pub fn run_local(&self, command: Command) -> Result<CommandOutput> {
        self.dispatch(
            Invocation {
                target: Target::Local,
                command,
                cwd: None,
                privilege: Privilege::Normal,
            },
            OnFailure::Abort,
        )
    }

    /// Run command on the session's host in the current directory.
    ///
    /// # Errors
    ///
    /// - See [`Session::run_local`].
    pub fn run_remote(&self, command: Command, privilege: Privilege) -> Result<CommandOutput> {
        self.run_remote_with(command, privilege, OnFailure::Abort)
    }

    /// Run command on the session's host, choosing how to treat failure.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::Spawn`] if command cannot be run.
    /// - Return [`RemoteError::CommandFailed`] if command exits non-zero and
    ///   `on_failure` is [`OnFailure::Abort`].
    pub fn run_remote_with(
        &self,
        command: Command,
        privilege: Privilege,
        on_failure: OnFailure,
    ) -> Result<CommandOutput> {
        self.dispatch(
            Invocation {
                target: self.target.clone(),
                command,
                cwd: self.dirs.last().cloned(),
                privilege,
            },
            on_failure,
        )
    }

    /// Check if path exists.
    ///
    /// Remote checks run `test -e` on the session's host.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteError::CommandFailed`] if the check itself fails,
    ///   e.g., the host cannot be reached.
    pub fn path_exists(&self, path: impl AsRef<Path>, location: Location) -> Result<bool> {
        let path = path.as_ref();
        if location == Location::Local {
            return Ok(path.exists());
        }

        let command = Command::new("test")
            .arg("-e")
            .arg(path.to_string_lossy());
        let output = self.run_remote_with(command.clone(), Privilege::Normal, OnFailure::Tolerate)?;
        match output.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            exit_code => Err(RemoteError::CommandFailed {
                host: self.target.to_string(),
                command: command.to_shell(),
                exit_code,
                output: output.combined(),
            }),
        }
    }

    /// Run closure with directory pushed as working directory.
    ///
    /// The directory is popped again no matter how the closure returns.
    pub fn within<T, E>(
        &mut self,
        dir: impl Into<PathBuf>,
        run: impl FnOnce(&mut Self) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        self.dirs.push(dir.into());
        let result = run(self);
        self.dirs.pop();
        result
    }

    #[instrument(skip(self, invocation), fields(target = %invocation.target), level = "debug")]
    fn dispatch(&self, invocation: Invocation, on_failure: OnFailure) -> Result<CommandOutput> {
        debug!("run {}", invocation.script());
        let output = self
            .transport
            .execute(&invocation)
            .map_err(|err| RemoteError::Spawn {
                source: err,
                host: invocation.target.to_string(),
                command: invocation.command.to_shell(),
            })?;

        if !output.success() && on_failure == OnFailure::Abort {
            return Err(RemoteError::CommandFailed {
                host: invocation.target.to_string(),
                command: invocation.command.to_shell(),
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }

        Ok(output)
    }
}

/// Quote a single argument for shell execution.
///
/// Arguments free of shell metacharacters are left alone. Everything else is
/// wrapped in single quotes, with embedded single quotes escaped.
pub fn quote_arg(arg: &str) -> String {
    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if arg.is_empty() {
        return "''".to_string();
    }

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Command execution error types.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Command could not be run at all.
    #[error("failed to run `{command}` on {host}")]
    Spawn {
        #[source]
        source: std::io::Error,
        host: String,
        command: String,
    },

    /// Command ran but exited non-zero.
    #[error("command `{command}` on {host} exited with status {exit_code}:\n{output}")]
    CommandFailed {
        host: String,
        command: String,
        exit_code: i32,
        output: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = RemoteError> = std::result::Result<T, E>;
