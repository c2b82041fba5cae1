// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use limndeploy::{
    config::{parse_override, StageFile, Value},
    git::{check_branch, BranchCheck, GitError},
    orchestrator::Orchestrator,
    path::locate_stage_file,
    registry::{validate_choice, Registry},
    remote::{dry_run::DryRunTransport, ssh::SshTransport, Transport},
    step::{Step, Tree},
    task::{TaskRegistry, DEFAULT_TASK},
};

use anyhow::Result;
use clap::Parser;
use indicatif::ProgressBar;
use inquire::{validator::Validation, Confirm, CustomUserError, Text};
use std::{env::current_dir, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "limndeploy [options] [stage] [task]",
    version
)]
struct Cli {
    /// Stage to deploy to, prompted for if absent.
    #[arg(value_name = "stage")]
    pub stage: Option<String>,

    /// Task to run, prompted for if absent.
    #[arg(value_name = "task")]
    pub task: Option<String>,

    /// Path to stage file to use instead of the usual lookup.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Override a stage setting, e.g., git_branch=hotfix.
    #[arg(short = 's', long = "set", value_name = "key=value", value_parser = parse_override)]
    pub overrides: Vec<(String, Value)>,

    /// Log every command instead of running it.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// List known stages and tasks, then exit.
    #[arg(short, long)]
    pub list: bool,

    /// Do not ask before deploying from a different local branch.
    #[arg(short, long)]
    pub yes: bool,
}

impl Cli {
    fn run(self) -> Result<()> {
        let cwd = current_dir()?;
        let stage_file = match locate_stage_file(self.config.as_deref(), &cwd) {
            Some(path) => {
                info!("using stage file {:?}", path.display());
                StageFile::load(path)?
            }
            None => StageFile::builtin()?,
        };

        let mut registry = Registry::from_stage_file(stage_file);
        for (key, value) in self.overrides.iter().cloned() {
            registry.set_override(key, value);
        }
        let tasks = TaskRegistry::limn();

        if self.list {
            print_listing(&registry, &tasks);
            return Ok(());
        }

        if self.dry_run {
            self.deploy(registry, tasks, DryRunTransport)
        } else {
            self.deploy(registry, tasks, SshTransport::new())
        }
    }

    fn deploy<T: Transport>(
        self,
        registry: Registry,
        tasks: TaskRegistry,
        transport: T,
    ) -> Result<()> {
        let stage = match self.stage {
            Some(stage) => stage,
            None => prompt_choice("stage", registry.names(), None)?,
        };
        let task = match self.task {
            Some(task) => task,
            None => prompt_choice("task", tasks.names(), Some(DEFAULT_TASK))?,
        };

        let bar = ProgressBar::new(0);
        let mut orchestrator = Orchestrator::new(registry, tasks, transport).with_progress(bar)?;
        orchestrator.select(&stage)?;

        let deploys_code = orchestrator
            .tasks()
            .get(&task)?
            .steps()
            .iter()
            .any(|step| matches!(step, Step::Bundle | Step::Pull(Tree::Code)));
        if deploys_code && !self.yes {
            if let Some(expected) = orchestrator
                .profile()
                .and_then(|profile| profile.optional_text("git_branch"))
            {
                confirm_branch(&expected)?;
            }
        }

        orchestrator.invoke(&task)?;

        Ok(())
    }
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = Cli::parse().run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn prompt_choice(kind: &str, names: Vec<String>, default: Option<&str>) -> Result<String> {
    let message = format!("{kind}:");
    let help = format!("one of: {}", names.join(", "));
    let known = names.clone();
    let validator = move |input: &str| -> std::result::Result<Validation, CustomUserError> {
        match validate_choice(input, &known) {
            Ok(_) => Ok(Validation::Valid),
            Err(error) => Ok(Validation::Invalid(error.to_string().into())),
        }
    };

    let mut prompt = Text::new(&message)
        .with_help_message(&help)
        .with_validator(validator);
    if let Some(default) = default {
        prompt = prompt.with_default(default);
    }
    let answer = prompt.prompt()?;

    Ok(validate_choice(&answer, &names)?)
}

fn confirm_branch(expected: &str) -> Result<()> {
    let BranchCheck::Mismatch { local, expected } = check_branch(current_dir()?, expected)? else {
        return Ok(());
    };

    let message = format!("local branch is {local:?}, but stage deploys {expected:?}. Continue?");
    if Confirm::new(&message).with_default(false).prompt()? {
        return Ok(());
    }

    Err(GitError::BranchMismatchDeclined { local, expected }.into())
}

fn print_listing(registry: &Registry, tasks: &TaskRegistry) {
    println!("stages:");
    for name in registry.names() {
        println!("  {name}");
    }

    println!("tasks:");
    for task in tasks.iter() {
        let marker = if task.name() == DEFAULT_TASK { " (default)" } else { "" };
        println!("  {:<20}{}{marker}", task.name(), task.description());
    }
}
