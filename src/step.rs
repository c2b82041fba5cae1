// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Step library.
//!
//! A __step__ is one named unit of deployment work, e.g., cloning the code
//! repository, or restarting the application. Steps hold no state of their
//! own: everything they need comes from the active [`Profile`], and
//! everything they do goes through a [`Session`].
//!
//! # Idempotence
//!
//! Steps are safe to run again after a partial deployment. Each guarded step
//! checks its own precondition before acting:
//!
//! - __ensure-directory__ does nothing if the directory exists.
//! - __clone-or-skip__ does nothing if `<dir>/.git` exists.
//! - __checkout-branch__ only sets up tracking for branches that do not yet
//!   exist locally.
//! - __link-data__ does nothing if the link directory exists.
//!
//! The remaining steps are naturally repeatable, e.g., `chmod`, `git pull`,
//! or restarting a service.
//!
//! # Code and Data Trees
//!
//! A deployment target holds two independent git checkouts: the code tree
//! at `target_dir`, and the data tree at `target_data_dir`. Steps that apply
//! to both take a [`Tree`] to pick the settings they read.

use crate::{
    config::Provider,
    profile::{Profile, ProfileError},
    remote::{Command, Location, OnFailure, Privilege, RemoteError, Session},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Which git checkout a step works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tree {
    /// Application code at `target_dir`.
    Code,

    /// Data repository at `target_data_dir`.
    Data,
}

impl Tree {
    fn dir_key(self) -> &'static str {
        match self {
            Self::Code => "target_dir",
            Self::Data => "target_data_dir",
        }
    }

    fn origin_key(self) -> &'static str {
        match self {
            Self::Code => "git_origin",
            Self::Data => "git_data_origin",
        }
    }

    fn branch_key(self) -> &'static str {
        match self {
            Self::Code => "git_branch",
            Self::Data => "git_data_branch",
        }
    }
}

impl Display for Tree {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Code => fmt.write_str("code"),
            Self::Data => fmt.write_str("data"),
        }
    }
}

/// Where a step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Once, on the local machine.
    Local,

    /// Once on every host of the profile.
    PerHost,
}

/// Named unit of deployment work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    EnsureDirectory(Tree),
    FixPermissions(Tree),
    CloneOrSkip(Tree),
    CheckoutBranch(Tree),
    Pull(Tree),
    InstallDependencies,
    RemoveDerived,
    LinkData,
    Build,
    Bundle,
    RestartService,
    StopService,
    StartService,
}

impl Step {
    /// Short machine-friendly name of step.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EnsureDirectory(_) => "ensure-directory",
            Self::FixPermissions(_) => "fix-permissions",
            Self::CloneOrSkip(_) => "clone-or-skip",
            Self::CheckoutBranch(_) => "checkout-branch",
            Self::Pull(_) => "pull",
            Self::InstallDependencies => "install-dependencies",
            Self::RemoveDerived => "remove-derived",
            Self::LinkData => "link-data",
            Self::Build => "build",
            Self::Bundle => "bundle",
            Self::RestartService => "restart-service",
            Self::StopService => "stop-service",
            Self::StartService => "start-service",
        }
    }

    /// Message announcing step to the operator.
    pub fn message(&self) -> &'static str {
        match self {
            Self::EnsureDirectory(Tree::Code) => "Making target directories",
            Self::EnsureDirectory(Tree::Data) => "Making target directories for data",
            Self::FixPermissions(Tree::Code) => "Fixing permissions",
            Self::FixPermissions(Tree::Data) => "Fixing permissions in data directory",
            Self::CloneOrSkip(Tree::Code) => "Cloning origin",
            Self::CloneOrSkip(Tree::Data) => "Cloning data",
            Self::CheckoutBranch(Tree::Code) => "Checking out branch",
            Self::CheckoutBranch(Tree::Data) => "Checking out data branch",
            Self::Pull(Tree::Code) => "Updating branch",
            Self::Pull(Tree::Data) => "Updating branch for data repository",
            Self::InstallDependencies => "Installing dependencies",
            Self::RemoveDerived => "Removing derived files",
            Self::LinkData => "Sym-linking data",
            Self::Build => "Building minified assets",
            Self::Bundle => "Bundling assets",
            Self::RestartService => "Restarting service",
            Self::StopService => "Stopping service",
            Self::StartService => "Starting service",
        }
    }

    /// Where step runs.
    pub fn scope(&self) -> Scope {
        match self {
            Self::Bundle => Scope::Local,
            _ => Scope::PerHost,
        }
    }

    /// Run step against profile through session.
    ///
    /// # Errors
    ///
    /// - Return [`StepError::Remote`] if any command fails.
    /// - Return [`StepError::Profile`] if a needed setting is absent.
    #[instrument(skip(self, profile, session), fields(step = %self, target = %session.target()), level = "debug")]
    pub fn run(&self, profile: &Profile, session: &mut Session<'_>) -> Result<()> {
        info!("{}...", self.message());
        match *self {
            Self::EnsureDirectory(tree) => ensure_directory(profile, session, tree),
            Self::FixPermissions(tree) => fix_permissions(profile, session, tree, None, None),
            Self::CloneOrSkip(tree) => clone_or_skip(profile, session, tree),
            Self::CheckoutBranch(tree) => checkout_branch(profile, session, tree),
            Self::Pull(tree) => pull(profile, session, tree),
            Self::InstallDependencies => install_dependencies(profile, session),
            Self::RemoveDerived => remove_derived(profile, session),
            Self::LinkData => link_data(profile, session),
            Self::Build => build(profile, session),
            Self::Bundle => bundle(profile, session),
            Self::RestartService => restart_service(profile, session),
            Self::StopService => stop_service(profile, session),
            Self::StartService => start_service(profile, session),
        }
    }
}

impl Display for Step {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::EnsureDirectory(tree)
            | Self::FixPermissions(tree)
            | Self::CloneOrSkip(tree)
            | Self::CheckoutBranch(tree)
            | Self::Pull(tree) => write!(fmt, "{}({tree})", self.name()),
            _ => fmt.write_str(self.name()),
        }
    }
}

/// Create tree's directory if missing, then fix its permissions.
///
/// # Errors
///
/// - Return [`StepError`] if a command fails or `owner`/`group` are unset.
pub fn ensure_directory(profile: &Profile, session: &mut Session<'_>, tree: Tree) -> Result<()> {
    let dir = profile.require_path(tree.dir_key())?;
    if session.path_exists(&dir, Location::Remote)? {
        debug!("{} already exists", dir.display());
        return Ok(());
    }

    session.run_remote(
        Command::new("mkdir").arg("-p").arg(path_arg(&dir)),
        Privilege::Privileged,
    )?;
    fix_permissions(profile, session, tree, None, None)
}

/// Recursively make tree group-writable and owned by owner and group.
///
/// Owner and group default to the profile's `owner` and `group` settings.
///
/// # Errors
///
/// - Return [`StepError`] if a command fails or a needed setting is unset.
pub fn fix_permissions(
    profile: &Profile,
    session: &mut Session<'_>,
    tree: Tree,
    owner: Option<&str>,
    group: Option<&str>,
) -> Result<()> {
    let dir = profile.require_path(tree.dir_key())?;
    let owner = match owner {
        Some(owner) => owner.to_string(),
        None => profile.require_text("owner")?,
    };
    let group = match group {
        Some(group) => group.to_string(),
        None => profile.require_text("group")?,
    };

    session.run_remote(
        Command::new("chmod").args(["-R", "g+w"]).arg(path_arg(&dir)),
        Privilege::Privileged,
    )?;
    session.run_remote(
        Command::new("chown")
            .arg("-R")
            .arg(format!("{owner}:{group}"))
            .arg(path_arg(&dir)),
        Privilege::Privileged,
    )?;

    Ok(())
}

/// Clone tree's origin unless the tree is already a git checkout.
///
/// # Errors
///
/// - Return [`StepError`] if a command fails or a needed setting is unset.
pub fn clone_or_skip(profile: &Profile, session: &mut Session<'_>, tree: Tree) -> Result<()> {
    let dir = profile.require_path(tree.dir_key())?;
    if session.path_exists(dir.join(".git"), Location::Remote)? {
        debug!("{} is already cloned", dir.display());
        return Ok(());
    }

    let origin = profile.require_text(tree.origin_key())?;
    session.run_remote(
        Command::new("git").arg("clone").arg(origin).arg(path_arg(&dir)),
        Privilege::Privileged,
    )?;
    fix_permissions(profile, session, tree, None, None)
}

/// Check out tree's configured branch.
///
/// Fetches all remotes first. A branch that does not exist locally yet is
/// set up to track `origin/<branch>`.
///
/// # Errors
///
/// - Return [`StepError`] if a command fails or a needed setting is unset.
pub fn checkout_branch(profile: &Profile, session: &mut Session<'_>, tree: Tree) -> Result<()> {
    let dir = profile.require_path(tree.dir_key())?;
    let branch = profile.require_text(tree.branch_key())?;

    session.within(dir, |session| {
        session.run_remote(
            Command::new("git").args(["fetch", "--all"]),
            Privilege::Privileged,
        )?;

        let checkout = if local_branches(session)?.contains(&branch) {
            Command::new("git").arg("checkout").arg(&branch)
        } else {
            Command::new("git")
                .args(["checkout", "--track"])
                .arg(format!("origin/{branch}"))
        };
        session.run_remote(checkout, Privilege::Privileged)?;

        Ok(())
    })
}

/// Check out and pull tree's configured branch, then fix permissions.
///
/// # Errors
///
/// - Return [`StepError`] if a command fails or a needed setting is unset.
pub fn pull(profile: &Profile, session: &mut Session<'_>, tree: Tree) -> Result<()> {
    checkout_branch(profile, session, tree)?;

    let dir = profile.require_path(tree.dir_key())?;
    let branch = profile.require_text(tree.branch_key())?;
    session.within(dir, |session| {
        session.run_remote(
            Command::new("git").args(["pull", "origin"]).arg(&branch),
            Privilege::Privileged,
        )
    })?;

    fix_permissions(profile, session, tree, None, None)
}

/// Run `install_cmds` inside the code tree.
///
/// # Errors
///
/// - Return [`StepError`] if a command fails or a needed setting is unset.
pub fn install_dependencies(profile: &Profile, session: &mut Session<'_>) -> Result<()> {
    let dir = profile.require_path("target_dir")?;
    let commands = profile
        .require_list("install_cmds")?
        .iter()
        .filter_map(|line| Command::from_words(line))
        .collect::<Vec<_>>();

    session.within(dir, |session| {
        for command in commands {
            session.run_remote(command, Privilege::Privileged)?;
        }
        Ok(())
    })
}

/// Delete the tree of build-derived files so it gets regenerated.
///
/// Derived files live in `<target_dir>/var`. A stage's `target_var_dir` is
/// left alone, since it may hold the link directory.
///
/// # Errors
///
/// - Return [`StepError::UnsafePath`] if `target_dir` is empty or the
///   filesystem root.
/// - Return [`StepError`] if a command fails or a needed setting is unset.
pub fn remove_derived(profile: &Profile, session: &mut Session<'_>) -> Result<()> {
    let dir = profile.require_path("target_dir")?;
    ensure_removable(&dir)?;

    session.run_remote(
        Command::new("rm").arg("-rf").arg(path_arg(&dir.join("var"))),
        Privilege::Privileged,
    )?;

    Ok(())
}

/// Expose the data tree inside the code tree.
///
/// Skipped if the link directory exists. That is `target_link_dir` if set,
/// else `<target_var_dir>/data`, else `<target_dir>/var/data`. Otherwise creates it and runs the link
/// tool (`link_cmd`, defaulting to `coke`) inside the code tree.
///
/// # Errors
///
/// - Return [`StepError`] if a command fails or a needed setting is unset.
pub fn link_data(profile: &Profile, session: &mut Session<'_>) -> Result<()> {
    let link_dir = match profile.get("target_link_dir") {
        Some(_) => profile.require_path("target_link_dir")?,
        None => var_dir(profile)?.join("data"),
    };
    if session.path_exists(&link_dir, Location::Remote)? {
        debug!("{} already linked", link_dir.display());
        return Ok(());
    }

    let dir = profile.require_path("target_dir")?;
    let data_dir = profile.require_path("target_data_dir")?;
    let data_to = profile.require_text("target_data_to")?;
    let link_cmd = profile
        .optional_text("link_cmd")
        .unwrap_or_else(|| "coke".into());
    let link = Command::from_words(&link_cmd)
        .unwrap_or_else(|| Command::new("coke"))
        .arg("--from")
        .arg(path_arg(&data_dir))
        .arg("--to")
        .arg(data_to)
        .arg("link_data");

    session.run_remote(
        Command::new("mkdir").arg("-p").arg(path_arg(&link_dir)),
        Privilege::Privileged,
    )?;
    session.within(dir, |session| session.run_remote(link, Privilege::Privileged))?;

    Ok(())
}

/// Run `build_cmd` inside the code tree.
///
/// Skipped with a warning if the stage sets no `build_cmd`.
///
/// # Errors
///
/// - Return [`StepError`] if the build tool exits non-zero.
pub fn build(profile: &Profile, session: &mut Session<'_>) -> Result<()> {
    let Some(command) = profile
        .optional_text("build_cmd")
        .and_then(|line| Command::from_words(&line))
    else {
        warn!("stage {} sets no build_cmd, skipping build", profile.name());
        return Ok(());
    };

    let dir = profile.require_path("target_dir")?;
    session.within(dir, |session| session.run_remote(command, Privilege::Privileged))?;

    Ok(())
}

/// Collapse the local serve trees into `work_dir` and run the bundler.
///
/// Runs `version_cmd` first and `bundle_cmd` last, each only if set.
///
/// # Errors
///
/// - Return [`StepError::UnsafePath`] if `work_dir` is empty or the
///   filesystem root.
/// - Return [`StepError`] if a command fails or `work_dir` is unset.
pub fn bundle(profile: &Profile, session: &mut Session<'_>) -> Result<()> {
    let work_dir = profile.require_path("work_dir")?;
    ensure_removable(&work_dir)?;

    if let Some(command) = profile
        .optional_text("version_cmd")
        .and_then(|line| Command::from_words(&line))
    {
        session.run_local(command)?;
    }

    let work_arg = path_arg(&work_dir);
    session.run_local(Command::new("rm").arg("-rf").arg(&work_arg))?;
    session.run_local(Command::new("mkdir").arg("-p").arg(&work_arg))?;
    session.run_local(
        Command::new("rsync")
            .args(["-Ca", "static/", "var/"])
            .arg(format!("{work_arg}/")),
    )?;
    session.run_local(
        Command::new("rsync")
            .args(["-Ca", "src/"])
            .arg(format!("{work_arg}/src/")),
    )?;

    if let Some(command) = profile
        .optional_text("bundle_cmd")
        .and_then(|line| Command::from_words(&line))
    {
        session.run_local(command)?;
    }

    Ok(())
}

/// Restart the application through its provider.
///
/// Supervisor restarts in one command. Upstart stops the job, tolerating
/// failure since it may not be running, then starts it.
///
/// # Errors
///
/// - Return [`StepError`] if a command fails or a needed setting is unset.
pub fn restart_service(profile: &Profile, session: &mut Session<'_>) -> Result<()> {
    let job = profile.require_text("provider_job")?;
    match profile.provider()? {
        Provider::Supervisor => {
            session.run_remote(
                Command::new("supervisorctl").arg("restart").arg(job),
                Privilege::Privileged,
            )?;
        }
        Provider::Upstart => {
            session.run_remote_with(
                Command::new("stop").arg(&job),
                Privilege::Privileged,
                OnFailure::Tolerate,
            )?;
            session.run_remote(Command::new("start").arg(job), Privilege::Privileged)?;
        }
    }

    Ok(())
}

/// Stop the application through its provider.
///
/// # Errors
///
/// - Return [`StepError`] if a command fails or a needed setting is unset.
pub fn stop_service(profile: &Profile, session: &mut Session<'_>) -> Result<()> {
    let job = profile.require_text("provider_job")?;
    let command = match profile.provider()? {
        Provider::Supervisor => Command::new("supervisorctl").arg("stop").arg(job),
        Provider::Upstart => Command::new("stop").arg(job),
    };
    session.run_remote(command, Privilege::Privileged)?;

    Ok(())
}

/// Start the application through its provider.
///
/// Supervisor has no separate start here: `restart` also starts a stopped
/// job.
///
/// # Errors
///
/// - Return [`StepError`] if a command fails or a needed setting is unset.
pub fn start_service(profile: &Profile, session: &mut Session<'_>) -> Result<()> {
    let job = profile.require_text("provider_job")?;
    let command = match profile.provider()? {
        Provider::Supervisor => Command::new("supervisorctl").arg("restart").arg(job),
        Provider::Upstart => Command::new("start").arg(job),
    };
    session.run_remote(command, Privilege::Privileged)?;

    Ok(())
}

/// List local branches of the git checkout in the session's directory.
///
/// # Errors
///
/// - Return [`StepError::Remote`] if `git branch` fails.
pub fn local_branches(session: &Session<'_>) -> Result<Vec<String>> {
    let output = session.run_remote(
        Command::new("git").args(["branch", "--no-color"]),
        Privilege::Normal,
    )?;

    Ok(output
        .stdout
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .map(str::to_owned)
        .collect())
}

fn var_dir(profile: &Profile) -> Result<PathBuf> {
    match profile.get("target_var_dir") {
        Some(_) => Ok(profile.require_path("target_var_dir")?),
        None => Ok(profile.require_path("target_dir")?.join("var")),
    }
}

// INVARIANT: Never hand `rm -rf` an empty path or a filesystem root.
fn ensure_removable(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || path.parent().is_none() {
        return Err(StepError::UnsafePath {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Step error types.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// External command failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Needed setting is absent or malformed.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Refusing to delete a path that would wipe the host.
    #[error("refusing to remove {path:?}")]
    UnsafePath { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = StepError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Value,
        remote::{CommandOutput, Invocation, Target, Transport},
    };
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, collections::HashSet};

    /// Transport with a fixed set of existing paths and local branches.
    #[derive(Default)]
    struct Host {
        existing: HashSet<String>,
        branches: String,
        failing: Option<String>,
        seen: RefCell<Vec<String>>,
    }

    impl Host {
        fn with_paths(paths: &[&str]) -> Self {
            Self {
                existing: paths.iter().map(|path| path.to_string()).collect(),
                ..Default::default()
            }
        }

        fn commands(&self) -> Vec<String> {
            self.seen.borrow().clone()
        }
    }

    impl Transport for Host {
        fn execute(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
            let command = &invocation.command;
            self.seen.borrow_mut().push(command.to_shell());

            let output = match (command.get_program(), command.get_args()) {
                (program, _) if self.failing.as_deref() == Some(program) => CommandOutput {
                    exit_code: 1,
                    ..Default::default()
                },
                ("test", [_, path]) if !self.existing.contains(path) => CommandOutput {
                    exit_code: 1,
                    ..Default::default()
                },
                ("git", [sub, ..]) if sub == "branch" => CommandOutput {
                    stdout: self.branches.clone(),
                    ..Default::default()
                },
                _ => CommandOutput::default(),
            };

            Ok(output)
        }
    }

    fn profile() -> Profile {
        Profile::new("dev")
            .with("deploy_env", "dev")
            .with("hosts", Value::list(["h1"]))
            .with("target_dir", Value::path("/srv/limn"))
            .with("target_data_dir", Value::path("/srv/limn-data"))
            .with("target_data_to", "rc")
            .with("git_origin", "git@less.ly:kraken-ui.git")
            .with("git_branch", "develop")
            .with("owner", "www-data")
            .with("group", "www")
            .with("provider_job", "dev-reportcard")
            .with("provider", "supervisor")
    }

    #[test]
    fn existing_directory_is_left_alone() -> anyhow::Result<()> {
        let host = Host::with_paths(&["/srv/limn"]);
        let mut session = Session::remote(&host, "h1", None);

        ensure_directory(&profile(), &mut session, Tree::Code)?;
        assert_eq!(host.commands(), vec!["test -e /srv/limn"]);

        Ok(())
    }

    #[test]
    fn missing_directory_is_created_and_owned() -> anyhow::Result<()> {
        let host = Host::default();
        let mut session = Session::remote(&host, "h1", None);

        ensure_directory(&profile(), &mut session, Tree::Data)?;
        assert_eq!(
            host.commands(),
            vec![
                "test -e /srv/limn-data",
                "mkdir -p /srv/limn-data",
                "chmod -R g+w /srv/limn-data",
                "chown -R www-data:www /srv/limn-data",
            ]
        );

        Ok(())
    }

    #[test]
    fn fix_permissions_with_explicit_owner() -> anyhow::Result<()> {
        let host = Host::default();
        let mut session = Session::remote(&host, "h1", None);

        fix_permissions(&profile(), &mut session, Tree::Code, Some("limn"), None)?;
        assert_eq!(host.commands()[1], "chown -R limn:www /srv/limn");

        Ok(())
    }

    #[test]
    fn fix_permissions_needs_owner() {
        let host = Host::default();
        let mut session = Session::remote(&host, "h1", None);
        let profile = Profile::new("bare").with("target_dir", Value::path("/srv/limn"));

        let result = fix_permissions(&profile, &mut session, Tree::Code, None, None);
        assert!(matches!(
            result,
            Err(StepError::Profile(ProfileError::MissingKey { key, .. })) if key == "owner"
        ));
        assert!(host.commands().is_empty());
    }

    #[test]
    fn checkout_tracks_new_branch() -> anyhow::Result<()> {
        let host = Host {
            branches: "* master\n".into(),
            ..Default::default()
        };
        let mut session = Session::remote(&host, "h1", None);

        checkout_branch(&profile(), &mut session, Tree::Code)?;
        assert_eq!(
            host.commands(),
            vec![
                "git fetch --all",
                "git branch --no-color",
                "git checkout --track origin/develop",
            ]
        );

        Ok(())
    }

    #[test]
    fn checkout_existing_branch_without_tracking() -> anyhow::Result<()> {
        let host = Host {
            branches: "  develop\n* master\n".into(),
            ..Default::default()
        };
        let mut session = Session::remote(&host, "h1", None);

        checkout_branch(&profile(), &mut session, Tree::Code)?;
        assert_eq!(host.commands()[2], "git checkout develop");

        Ok(())
    }

    #[test]
    fn link_data_defaults() -> anyhow::Result<()> {
        let host = Host::default();
        let mut session = Session::remote(&host, "h1", None);

        link_data(&profile(), &mut session)?;
        assert_eq!(
            host.commands(),
            vec![
                "test -e /srv/limn/var/data",
                "mkdir -p /srv/limn/var/data",
                "coke --from /srv/limn-data --to rc link_data",
            ]
        );

        Ok(())
    }

    #[test]
    fn link_data_skips_existing_link_directory() -> anyhow::Result<()> {
        let host = Host::with_paths(&["/srv/links"]);
        let mut session = Session::remote(&host, "h1", None);
        let profile = profile().with("target_link_dir", Value::path("/srv/links"));

        link_data(&profile, &mut session)?;
        assert_eq!(host.commands(), vec!["test -e /srv/links"]);

        Ok(())
    }

    #[test]
    fn link_data_under_var_dir() -> anyhow::Result<()> {
        let host = Host::default();
        let mut session = Session::remote(&host, "h1", None);
        let profile = profile().with("target_var_dir", Value::path("/var/lib/limn"));

        link_data(&profile, &mut session)?;
        assert_eq!(host.commands()[0], "test -e /var/lib/limn/data");

        Ok(())
    }

    #[test]
    fn remove_derived_ignores_var_dir() -> anyhow::Result<()> {
        let host = Host::default();
        let mut session = Session::remote(&host, "h1", None);
        let profile = profile().with("target_var_dir", Value::path("/var/lib/limn"));

        remove_derived(&profile, &mut session)?;
        assert_eq!(host.commands(), vec!["rm -rf /srv/limn/var"]);

        Ok(())
    }

    #[test]
    fn remove_derived_refuses_root() {
        let host = Host::default();
        let mut session = Session::remote(&host, "h1", None);
        let profile = profile().with("target_dir", Value::path("/"));

        let result = remove_derived(&profile, &mut session);
        assert!(matches!(result, Err(StepError::UnsafePath { .. })));
        assert!(host.commands().is_empty());
    }

    #[test]
    fn bundle_refuses_root_work_dir() {
        let host = Host::default();
        let mut session = Session::new(&host, Target::Local);
        let profile = profile()
            .with("version_cmd", "coke update_version")
            .with("work_dir", Value::path("/"));

        let result = bundle(&profile, &mut session);
        assert!(matches!(result, Err(StepError::UnsafePath { path }) if path == Path::new("/")));
        assert!(host.commands().is_empty());
    }

    #[test]
    fn build_without_command_is_skipped() -> anyhow::Result<()> {
        let host = Host::default();
        let mut session = Session::remote(&host, "h1", None);

        build(&profile(), &mut session)?;
        assert!(host.commands().is_empty());

        build(&profile().with("build_cmd", "coke build_minified"), &mut session)?;
        assert_eq!(host.commands(), vec!["coke build_minified"]);

        Ok(())
    }

    #[test]
    fn service_control_per_provider() -> anyhow::Result<()> {
        let supervisor = profile();
        let upstart = profile().with("provider", "upstart");

        let cases: [(&Profile, fn(&Profile, &mut Session<'_>) -> Result<()>, Vec<&str>); 6] = [
            (&supervisor, restart_service, vec!["supervisorctl restart dev-reportcard"]),
            (&supervisor, stop_service, vec!["supervisorctl stop dev-reportcard"]),
            (&supervisor, start_service, vec!["supervisorctl restart dev-reportcard"]),
            (&upstart, restart_service, vec!["stop dev-reportcard", "start dev-reportcard"]),
            (&upstart, stop_service, vec!["stop dev-reportcard"]),
            (&upstart, start_service, vec!["start dev-reportcard"]),
        ];

        for (profile, step, expect) in cases {
            let host = Host::default();
            let mut session = Session::remote(&host, "h1", None);
            step(profile, &mut session)?;
            assert_eq!(host.commands(), expect);
        }

        Ok(())
    }

    #[test]
    fn upstart_restart_tolerates_stopped_job() -> anyhow::Result<()> {
        let host = Host {
            failing: Some("stop".into()),
            ..Default::default()
        };
        let mut session = Session::remote(&host, "h1", None);

        restart_service(&profile().with("provider", "upstart"), &mut session)?;
        assert_eq!(
            host.commands(),
            vec!["stop dev-reportcard", "start dev-reportcard"]
        );

        let result = stop_service(&profile().with("provider", "upstart"), &mut session);
        assert!(matches!(result, Err(StepError::Remote(_))));

        Ok(())
    }

    #[test]
    fn step_display_names_tree() {
        assert_eq!(Step::CloneOrSkip(Tree::Data).to_string(), "clone-or-skip(data)");
        assert_eq!(Step::RestartService.to_string(), "restart-service");
        assert_eq!(Step::Bundle.scope(), Scope::Local);
        assert_eq!(Step::Pull(Tree::Code).scope(), Scope::PerHost);
    }
}
