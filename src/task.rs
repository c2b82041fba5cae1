// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment tasks.
//!
//! A __task__ is a named, ordered list of [`Step`]s. Composite tasks, e.g.,
//! `code_and_data`, are flattened into the steps of their parts when they are
//! defined, so the orchestrator only ever sees a flat list.

use crate::step::{Step, Tree};

use indexmap::IndexMap;

/// Task run when none is named.
pub const DEFAULT_TASK: &str = "full_deploy";

/// Named ordered list of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    name: String,
    description: String,
    steps: Vec<Step>,
}

impl Task {
    /// Construct new task.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: impl IntoIterator<Item = Step>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps: steps.into_iter().collect(),
        }
    }

    /// Construct new task running other tasks one after another.
    pub fn composite<'a>(
        name: impl Into<String>,
        description: impl Into<String>,
        parts: impl IntoIterator<Item = &'a Task>,
    ) -> Self {
        let steps = parts
            .into_iter()
            .flat_map(|task| task.steps.iter().copied())
            .collect::<Vec<_>>();
        Self::new(name, description, steps)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Tasks by name in definition order.
#[derive(Debug, Default, Clone)]
pub struct TaskRegistry {
    tasks: IndexMap<String, Task>,
}

impl TaskRegistry {
    /// Construct new empty task registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct task registry holding the Limn deployment tasks.
    pub fn limn() -> Self {
        let only_data = Task::new(
            "only_data",
            "Deploy only the data repository",
            [
                Step::EnsureDirectory(Tree::Data),
                Step::FixPermissions(Tree::Data),
                Step::CloneOrSkip(Tree::Data),
                Step::Pull(Tree::Data),
                Step::FixPermissions(Tree::Data),
            ],
        );
        let only_code = Task::new(
            "only_code",
            "Deploy only the application code",
            [
                Step::EnsureDirectory(Tree::Code),
                Step::FixPermissions(Tree::Code),
                Step::CloneOrSkip(Tree::Code),
                Step::Pull(Tree::Code),
                Step::InstallDependencies,
                Step::RemoveDerived,
                Step::LinkData,
                Step::FixPermissions(Tree::Code),
                Step::RestartService,
                Step::Build,
            ],
        );
        let bundle = Task::new("bundle", "Bundle assets locally", [Step::Bundle]);
        let code_and_data = Task::composite(
            "code_and_data",
            "Deploy data, then code",
            [&only_data, &only_code],
        );
        let full_deploy = Task::composite(
            "full_deploy",
            "Bundle assets, then deploy data and code",
            [&bundle, &code_and_data],
        );

        let mut registry = Self::new();
        for task in [full_deploy, code_and_data, only_code, only_data, bundle] {
            registry.insert(task);
        }
        registry.insert(Task::new(
            "restart_server",
            "Restart the application service",
            [Step::RestartService],
        ));
        registry.insert(Task::new(
            "stop_server",
            "Stop the application service",
            [Step::StopService],
        ));
        registry.insert(Task::new(
            "start_server",
            "Start the application service",
            [Step::StartService],
        ));
        registry.insert(Task::new(
            "setup_directories",
            "Create code and data directories",
            [
                Step::EnsureDirectory(Tree::Code),
                Step::EnsureDirectory(Tree::Data),
            ],
        ));
        registry.insert(Task::new(
            "fix_permissions",
            "Fix permissions of code and data trees",
            [
                Step::FixPermissions(Tree::Code),
                Step::FixPermissions(Tree::Data),
            ],
        ));

        registry
    }

    /// Add task, replacing any task of the same name.
    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.name.clone(), task);
    }

    /// Look up task by name.
    ///
    /// # Errors
    ///
    /// - Return [`TaskError::UnknownTask`] if no task has the name.
    pub fn get(&self, name: &str) -> Result<&Task> {
        self.tasks.get(name).ok_or_else(|| TaskError::UnknownTask {
            name: name.to_string(),
            known: self.names(),
        })
    }

    /// Names of all tasks in definition order.
    pub fn names(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    /// Iterate over all tasks in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }
}

/// Task lookup error types.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{name:?} is not a known task, expected one of: {}", known.join(", "))]
    UnknownTask { name: String, known: Vec<String> },
}

/// Friendly result alias :3
pub type Result<T, E = TaskError> = std::result::Result<T, E>;
