// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Transport through the system `ssh` binary.
//!
//! Remote invocations become `ssh [options] [-J gateway] host script`, so
//! the user's own ssh configuration (keys, agents, host aliases) applies
//! unchanged. A configured gateway is used as a jump host, giving the
//! two-hop connection local → gateway → host. Privileged commands are
//! wrapped in `sudo -n`, which fails instead of waiting on a password prompt
//! that nobody can answer.

use crate::remote::{quote_arg, CommandOutput, Invocation, Privilege, Target, Transport};

use std::process::Command as Process;
use tracing::{debug, instrument};

/// Transport running commands through `ssh`.
#[derive(Debug, Clone)]
pub struct SshTransport {
    options: Vec<String>,
}

impl SshTransport {
    /// Construct new ssh transport with non-interactive connection options.
    pub fn new() -> Self {
        Self {
            options: [
                "BatchMode=yes",
                "ConnectTimeout=10",
                "ServerAliveInterval=15",
                "ServerAliveCountMax=3",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }

    /// Add an extra `-o` option passed to every ssh connection.
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Full argument vector that would run invocation.
    pub fn argv(&self, invocation: &Invocation) -> Vec<String> {
        match &invocation.target {
            Target::Local => local_argv(invocation),
            Target::Remote { host, gateway } => {
                let mut argv = vec!["ssh".to_string()];
                for option in &self.options {
                    argv.push("-o".into());
                    argv.push(option.clone());
                }
                if let Some(gateway) = gateway {
                    argv.push("-J".into());
                    argv.push(gateway.clone());
                }
                argv.push(host.clone());
                argv.push(remote_script(invocation));
                argv
            }
        }
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SshTransport {
    #[instrument(skip(self, invocation), fields(target = %invocation.target), level = "debug")]
    fn execute(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        let argv = self.argv(invocation);
        debug!("spawn {argv:?}");

        let output = Process::new(&argv[0]).args(&argv[1..]).output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

fn local_argv(invocation: &Invocation) -> Vec<String> {
    let direct = invocation.cwd.is_none() && invocation.privilege == Privilege::Normal;
    if direct {
        return std::iter::once(invocation.command.get_program().to_string())
            .chain(invocation.command.get_args().iter().cloned())
            .collect();
    }

    let mut argv = Vec::new();
    if invocation.privilege == Privilege::Privileged {
        argv.extend(["sudo".to_string(), "-n".to_string()]);
    }
    argv.extend(["sh".to_string(), "-c".to_string(), invocation.script()]);
    argv
}

fn remote_script(invocation: &Invocation) -> String {
    match invocation.privilege {
        Privilege::Normal => invocation.script(),
        Privilege::Privileged => format!("sudo -n sh -c {}", quote_arg(&invocation.script())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Command;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn invocation(target: Target, cwd: Option<&str>, privilege: Privilege) -> Invocation {
        Invocation {
            target,
            command: Command::new("git").args(["checkout", "develop"]),
            cwd: cwd.map(PathBuf::from),
            privilege,
        }
    }

    #[test]
    fn remote_through_gateway() {
        let transport = SshTransport::new();
        let target = Target::Remote {
            host: "kripke.pmtpa.wmflabs".into(),
            gateway: Some("bastion2.wmflabs.org".into()),
        };

        let result = transport.argv(&invocation(target, Some("/srv/limn"), Privilege::Privileged));
        let tail = result[result.len() - 4..].to_vec();
        assert_eq!(result[0], "ssh");
        assert_eq!(
            tail,
            vec![
                "-J",
                "bastion2.wmflabs.org",
                "kripke.pmtpa.wmflabs",
                "sudo -n sh -c 'cd /srv/limn && git checkout develop'",
            ]
        );
        assert!(result.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn remote_without_gateway() {
        let transport = SshTransport::new().with_option("Port=2222");
        let target = Target::Remote {
            host: "h1".into(),
            gateway: None,
        };

        let result = transport.argv(&invocation(target, None, Privilege::Normal));
        assert!(!result.contains(&"-J".to_string()));
        assert!(result.contains(&"Port=2222".to_string()));
        assert_eq!(result[result.len() - 2..], ["h1", "git checkout develop"]);
    }

    #[test]
    fn local_direct_and_wrapped() {
        let transport = SshTransport::new();

        let result = transport.argv(&invocation(Target::Local, None, Privilege::Normal));
        assert_eq!(result, vec!["git", "checkout", "develop"]);

        let result = transport.argv(&invocation(Target::Local, Some("/tmp"), Privilege::Privileged));
        assert_eq!(
            result,
            vec!["sudo", "-n", "sh", "-c", "cd /tmp && git checkout develop"]
        );
    }
}
