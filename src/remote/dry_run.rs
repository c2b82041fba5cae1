// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Transport that only reports what it would run.

use crate::remote::{CommandOutput, Invocation, Privilege, Transport};

use tracing::info;

/// Transport logging every invocation instead of running it.
///
/// Every command succeeds with empty output, except path checks, which
/// report the path as absent so that guarded steps show their full work.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunTransport;

impl Transport for DryRunTransport {
    fn execute(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        let sudo = match invocation.privilege {
            Privilege::Privileged => "sudo ",
            Privilege::Normal => "",
        };
        info!("[{}] would run: {sudo}{}", invocation.target, invocation.script());

        let exit_code = match invocation.command.get_program() {
            "test" => 1,
            _ => 0,
        };

        Ok(CommandOutput {
            exit_code,
            ..Default::default()
        })
    }
}
