// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Stage-aware deployer for the Limn visualization framework.
//!
//! Limndeploy bundles front-end assets locally, then, over ssh, clones or
//! updates the application and data repositories on every host of a
//! deployment target, fixes their permissions, links the data into the
//! application, and restarts the process supervisor.
//!
//! # Stages
//!
//! A __stage__ is a named deployment target, e.g., `prod` or `dev`. Stages
//! are declared in a TOML stage file and registered in a
//! [`Registry`](registry::Registry). Activating a stage produces its
//! [`Profile`](profile::Profile): the stage's settings merged over project
//! defaults with every `%(key)s` placeholder resolved. Only one stage may be
//! activated per invocation.
//!
//! # Tasks and Steps
//!
//! A [`Task`](task::Task) is an ordered list of [`Step`](step::Step)s, e.g.,
//! `full_deploy`. The [`Orchestrator`](orchestrator::Orchestrator) runs a
//! task against the active profile, applying each step to every host before
//! moving on, and stops at the first failure. Steps guard themselves, so a
//! failed deployment can simply be run again from the top.
//!
//! # External Programs
//!
//! All real work is done by external programs: git, chown, rsync,
//! supervisorctl, and friends. They are described as typed
//! [`Command`](remote::Command)s and run through a
//! [`Transport`](remote::Transport), which by default is the system `ssh`
//! binary.

pub mod config;
pub mod expand;
pub mod git;
pub mod orchestrator;
pub mod path;
pub mod profile;
pub mod registry;
pub mod remote;
pub mod step;
pub mod task;
