// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment orchestration.
//!
//! The [`Orchestrator`] ties the environment registry, the task registry,
//! and a [`Transport`] together. It moves through three states:
//!
//! 1. __Unselected__: no stage has been activated yet. Invoking a task here
//!    fails with [`OrchestratorError::EnvironmentNotSelected`] before any
//!    command is issued, and the orchestrator aborts.
//! 2. __Selected__: a stage is active. Tasks may be invoked any number of
//!    times, each step running on every host of the stage in turn.
//! 3. __Aborted__: a task failed. Nothing else runs for the rest of the
//!    invocation; the operator fixes the cause and starts over, relying on
//!    the idempotence of each step to skip work already done.

use crate::{
    profile::{Profile, ProfileError},
    registry::{Registry, RegistryError},
    remote::{ssh::SshTransport, Session, Target, Transport},
    step::{Scope, Step, StepError},
    task::{Task, TaskError, TaskRegistry},
};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, instrument};

/// Lifecycle of an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Unselected,
    Selected(Profile),
    Aborted,
}

/// Runs tasks against the active stage.
#[derive(Debug)]
pub struct Orchestrator<T: Transport = SshTransport> {
    registry: Registry,
    tasks: TaskRegistry,
    transport: T,
    state: State,
    progress: ProgressBar,
}

impl<T: Transport> Orchestrator<T> {
    /// Construct new orchestrator with no stage selected and no visible
    /// progress bar.
    pub fn new(registry: Registry, tasks: TaskRegistry, transport: T) -> Self {
        Self {
            registry,
            tasks,
            transport,
            state: State::Unselected,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report progress of tasks through a progress bar.
    ///
    /// # Errors
    ///
    /// - Return [`OrchestratorError::IndicatifStyleTemplate`] if the bar
    ///   style cannot be set.
    pub fn with_progress(mut self, bar: ProgressBar) -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<40}  [{wide_bar:.yellow/blue}] {pos}/{len}",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);
        self.progress = bar;

        Ok(self)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Active profile, if a stage is selected.
    pub fn profile(&self) -> Option<&Profile> {
        match &self.state {
            State::Selected(profile) => Some(profile),
            _ => None,
        }
    }

    /// Select stage to deploy to.
    ///
    /// A failed selection leaves the orchestrator as it was.
    ///
    /// # Errors
    ///
    /// - Return [`OrchestratorError::Aborted`] if an earlier task failed.
    /// - Return [`OrchestratorError::Registry`] if the stage is unknown,
    ///   another stage is already selected, or the stage's profile does not
    ///   resolve.
    #[instrument(skip(self), level = "debug")]
    pub fn select(&mut self, name: &str) -> Result<()> {
        if self.state == State::Aborted {
            return Err(OrchestratorError::Aborted);
        }

        let profile = self.registry.activate(name)?;
        self.state = State::Selected(profile);

        Ok(())
    }

    /// Run task against active stage.
    ///
    /// Steps run strictly in order. Each step runs on every host before the
    /// next step starts, except local steps, which run once. The first
    /// failure stops the task and aborts the orchestrator.
    ///
    /// # Errors
    ///
    /// - Return [`OrchestratorError::EnvironmentNotSelected`] if no stage is
    ///   selected.
    /// - Return [`OrchestratorError::Aborted`] if an earlier task failed.
    /// - Return [`OrchestratorError::Task`] if the task is unknown.
    /// - Return [`OrchestratorError::StepFailed`] naming the step and host
    ///   that failed.
    #[instrument(skip(self), level = "debug")]
    pub fn invoke(&mut self, task: &str) -> Result<()> {
        if self.state == State::Unselected {
            self.state = State::Aborted;
            return Err(OrchestratorError::EnvironmentNotSelected {
                task: task.to_string(),
            });
        }
        let State::Selected(profile) = &self.state else {
            return Err(OrchestratorError::Aborted);
        };
        let task = self.tasks.get(task)?;

        info!("running task {} on stage {}", task.name(), profile.name());
        let result = run_task(profile, task, &self.transport, &self.progress);
        if result.is_err() {
            self.state = State::Aborted;
        }

        result
    }
}

fn run_task(
    profile: &Profile,
    task: &Task,
    transport: &dyn Transport,
    progress: &ProgressBar,
) -> Result<()> {
    let hosts = profile.hosts()?;
    let gateway = profile.gateway();

    let ticks = task
        .steps()
        .iter()
        .map(|step| match step.scope() {
            Scope::Local => 1,
            Scope::PerHost => hosts.len() as u64,
        })
        .sum();
    progress.reset();
    progress.set_length(ticks);

    for step in task.steps() {
        match step.scope() {
            Scope::Local => {
                let mut session = Session::new(transport, Target::Local);
                run_step(profile, step, &mut session, progress)?;
            }
            Scope::PerHost => {
                for host in &hosts {
                    let mut session = Session::remote(transport, host.clone(), gateway.clone());
                    run_step(profile, step, &mut session, progress)?;
                }
            }
        }
    }
    progress.finish_with_message(format!("{} done", task.name()));

    Ok(())
}

fn run_step(
    profile: &Profile,
    step: &Step,
    session: &mut Session<'_>,
    progress: &ProgressBar,
) -> Result<()> {
    progress.set_message(format!("{step} on {}", session.target()));
    progress
        .suspend(|| step.run(profile, session))
        .map_err(|source| OrchestratorError::StepFailed {
            step: step.to_string(),
            host: session.target().to_string(),
            source,
        })?;
    progress.inc(1);

    Ok(())
}

/// Orchestration error types.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Task invoked before any stage was selected.
    #[error("cannot run task {task:?}, no staging environment selected")]
    EnvironmentNotSelected { task: String },

    /// Earlier failure ended this invocation.
    #[error("deployment already aborted, start over")]
    Aborted,

    /// Step failed on a host.
    #[error("step {step} failed on {host}")]
    StepFailed {
        step: String,
        host: String,
        #[source]
        source: StepError,
    },

    /// Stage selection fails.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Task lookup fails.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Active profile is unusable.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;
