// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Environment registry.
//!
//! Keeps every known deployment target, or __stage__, under its name. Each
//! stage is registered as a builder function that produces the stage's
//! [`Profile`]. Exactly one stage may be activated per invocation: the first
//! activation wins, and any further activation is rejected without touching
//! the profile handed out the first time.

use crate::{
    config::{Settings, StageFile, Value},
    expand::ExpandError,
    profile::{Profile, ProfileError},
};

use indexmap::IndexMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use tracing::{debug, info, instrument};

/// Function producing the profile of a stage.
pub type StageBuilder = Box<dyn Fn() -> Profile + Send + Sync>;

/// Named stage builders in registration order.
#[derive(Default)]
pub struct Registry {
    builders: IndexMap<String, StageBuilder>,
    defaults: Settings,
    overrides: Settings,
    active: Option<String>,
}

impl Registry {
    /// Construct new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct registry holding every stage of a stage file.
    ///
    /// Stages that do not set `deploy_env` themselves get their stage name.
    pub fn from_stage_file(stage_file: StageFile) -> Self {
        let mut registry = Self::new();
        registry.set_defaults(stage_file.defaults);

        for (name, settings) in stage_file.stages {
            let stage = name.clone();
            registry.register(name, move || {
                let mut profile = Profile::from_settings(stage.clone(), settings.clone());
                if profile.get("deploy_env").is_none() {
                    profile.insert("deploy_env", stage.clone());
                }
                profile
            });
        }

        registry
    }

    /// Register a stage builder under a name.
    ///
    /// Registering the same name twice replaces the earlier builder, but
    /// keeps its original position.
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn() -> Profile + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("register stage {name}");
        self.builders.insert(name, Box::new(builder));
    }

    /// Set project-wide defaults merged under every stage.
    pub fn set_defaults(&mut self, defaults: Settings) {
        self.defaults = defaults;
    }

    /// Set a setting that takes precedence over stage and defaults alike.
    pub fn set_override(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.overrides.insert(key.into(), value.into());
    }

    /// Names of all registered stages in registration order.
    pub fn names(&self) -> Vec<String> {
        self.builders.keys().cloned().collect()
    }

    /// Check if stage is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Name of active stage, if any.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Activate a stage, producing its fully resolved profile.
    ///
    /// Builds the profile, applies overrides, fills in defaults, expands all
    /// placeholders, and validates required settings. The stage only becomes
    /// active if all of that succeeds.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::EnvironmentAlreadySelected`] if any stage is
    ///   already active.
    /// - Return [`RegistryError::UnknownEnvironment`] if no stage has the
    ///   name.
    /// - Return [`RegistryError::Expand`] if placeholder expansion fails.
    /// - Return [`RegistryError::Profile`] if required settings are absent.
    #[instrument(skip(self), level = "debug")]
    pub fn activate(&mut self, name: &str) -> Result<Profile> {
        if let Some(active) = &self.active {
            return Err(RegistryError::EnvironmentAlreadySelected {
                active: active.clone(),
                requested: name.to_string(),
            });
        }

        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| RegistryError::UnknownEnvironment {
                name: name.to_string(),
                known: self.names(),
            })?;

        let mut profile = builder();
        for (key, value) in &self.overrides {
            profile.insert(key.clone(), value.clone());
        }
        profile.fill_defaults(&self.defaults);
        profile.expand_all()?;
        profile.validate()?;

        info!("using stage {name}");
        self.active = Some(name.to_string());

        Ok(profile)
    }
}

impl Debug for Registry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Registry")
            .field("stages", &self.builders.keys().collect::<Vec<_>>())
            .field("defaults", &self.defaults)
            .field("overrides", &self.overrides)
            .field("active", &self.active)
            .finish()
    }
}

/// Match a typed choice against known names.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// - Return [`InvalidChoice`] if the choice matches none of the names.
pub fn validate_choice(
    choice: &str,
    names: impl IntoIterator<Item = impl AsRef<str>>,
) -> Result<String, InvalidChoice> {
    let choice = choice.trim();
    let names = names
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .collect::<Vec<_>>();

    if names.iter().any(|name| name == choice) {
        return Ok(choice.to_string());
    }

    Err(InvalidChoice {
        choice: choice.to_string(),
        known: names,
    })
}

/// Typed choice matches no known name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{choice:?} is not a valid choice, expected one of: {}", known.join(", "))]
pub struct InvalidChoice {
    pub choice: String,
    pub known: Vec<String>,
}

/// Environment registry error types.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No stage registered under requested name.
    #[error("{name:?} is not a valid staging environment, expected one of: {}", known.join(", "))]
    UnknownEnvironment { name: String, known: Vec<String> },

    /// A stage was already activated for this invocation.
    #[error("stage {active:?} is already selected, cannot switch to {requested:?}")]
    EnvironmentAlreadySelected { active: String, requested: String },

    /// Placeholder expansion failed.
    #[error(transparent)]
    Expand(#[from] ExpandError),

    /// Profile is missing required settings.
    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// Friendly result alias :3
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register("prod", || {
            Profile::new("prod")
                .with("deploy_env", "prod")
                .with("hosts", Value::list(["reportcard"]))
                .with("target_dir", Value::path("/usr/lib/limn"))
        });
        registry.register("dev", || {
            Profile::new("dev")
                .with("deploy_env", "dev")
                .with("hosts", Value::list(["kripke"]))
                .with("target_dir", Value::path("/srv/dev/limn"))
        });
        registry
    }

    #[test]
    fn names_keep_registration_order() {
        let mut registry = registry();
        registry.register("alpha", || Profile::new("alpha"));
        assert_eq!(registry.names(), vec!["prod", "dev", "alpha"]);
    }

    #[test]
    fn activate_unknown_stage() {
        let mut registry = registry();
        let result = registry.activate("staging");
        assert!(matches!(
            result,
            Err(RegistryError::UnknownEnvironment { name, known })
                if name == "staging" && known == vec!["prod", "dev"]
        ));
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn second_activation_is_rejected() -> anyhow::Result<()> {
        let mut registry = registry();
        let prod = registry.activate("prod")?;

        let result = registry.activate("dev");
        assert!(matches!(
            result,
            Err(RegistryError::EnvironmentAlreadySelected { active, requested })
                if active == "prod" && requested == "dev"
        ));
        assert_eq!(registry.active(), Some("prod"));
        assert_eq!(prod.require_path("target_dir")?, PathBuf::from("/usr/lib/limn"));

        Ok(())
    }

    #[test]
    fn overrides_beat_stage_and_defaults() -> anyhow::Result<()> {
        let mut registry = registry();
        let mut defaults = Settings::new();
        defaults.insert("git_branch".into(), Value::text("master"));
        defaults.insert("owner".into(), Value::text("www-data"));
        defaults.insert("work_dir".into(), Value::path("%(target_dir)s/tmp"));
        registry.set_defaults(defaults);
        registry.set_override("git_branch", "hotfix");

        let profile = registry.activate("dev")?;
        assert_eq!(profile.require_text("git_branch")?, "hotfix");
        assert_eq!(profile.require_text("owner")?, "www-data");
        assert_eq!(profile.require_path("work_dir")?, PathBuf::from("/srv/dev/limn/tmp"));

        Ok(())
    }

    #[test]
    fn failed_activation_selects_nothing() {
        let mut registry = registry();
        registry.register("broken", || {
            Profile::new("broken")
                .with("deploy_env", "broken")
                .with("hosts", Value::list(["h1"]))
                .with("a", "%(b)s")
                .with("b", "%(a)s")
        });

        let result = registry.activate("broken");
        assert!(matches!(
            result,
            Err(RegistryError::Expand(ExpandError::TemplateCycle { .. }))
        ));
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn stage_file_stages_default_deploy_env() -> anyhow::Result<()> {
        let stage_file: StageFile = r#"
            [defaults]
            owner = "www-data"

            [stage.gp]
            hosts = ["kripke"]
        "#
        .parse()?;

        let mut registry = Registry::from_stage_file(stage_file);
        let profile = registry.activate("gp")?;
        assert_eq!(profile.deploy_env()?, "gp");
        assert_eq!(profile.require_text("owner")?, "www-data");

        Ok(())
    }

    #[test]
    fn choice_must_match_known_name() {
        let names = ["prod", "dev"];
        assert_eq!(validate_choice("  dev \n", names), Ok("dev".to_string()));
        assert_eq!(
            validate_choice("stage", names),
            Err(InvalidChoice {
                choice: "stage".into(),
                known: vec!["prod".into(), "dev".into()],
            })
        );
    }
}
