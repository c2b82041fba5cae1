// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deployment target profiles.
//!
//! A __profile__ is the fully built configuration of one stage: the stage's
//! own settings, any command line overrides, and the project defaults the
//! stage did not set itself. Profiles are handed out by the
//! [`Registry`](crate::registry::Registry) upon activation and threaded by
//! reference into every step. Nothing mutates a profile after activation.
//!
//! # Required Settings
//!
//! Every profile must carry `deploy_env` and a non-empty `hosts` list. All
//! other settings are looked up when a step needs them, and a step that asks
//! for a missing setting fails with [`ProfileError::MissingKey`] instead of
//! running with an empty value.

use crate::{
    config::{Provider, Settings, Value},
    expand::{expand_with, ExpandError},
};

use std::path::PathBuf;
use tracing::debug;

/// Configuration of a single deployment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    name: String,
    settings: Settings,
    expanded: bool,
}

impl Profile {
    /// Construct new empty profile for stage.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Settings::new(),
            expanded: false,
        }
    }

    /// Construct new profile from existing settings.
    pub fn from_settings(name: impl Into<String>, settings: Settings) -> Self {
        Self {
            name: name.into(),
            settings,
            expanded: false,
        }
    }

    /// Set a setting, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a setting, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.settings.insert(key.into(), value.into());
    }

    /// Fill in every default the profile does not set itself.
    pub fn fill_defaults(&mut self, defaults: &Settings) {
        for (key, value) in defaults {
            self.settings
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Expand placeholders in every setting.
    ///
    /// Runs once. Calling it again on an already expanded profile does
    /// nothing.
    ///
    /// # Errors
    ///
    /// - Return [`ExpandError`] if any setting fails to expand. The profile
    ///   is left untouched in that case.
    pub fn expand_all(&mut self) -> Result<(), ExpandError> {
        if self.expanded {
            return Ok(());
        }

        let mut expanded = Settings::with_capacity(self.settings.len());
        for (key, value) in &self.settings {
            expanded.insert(key.clone(), expand_with(value, &self.settings)?);
        }
        debug!("expanded {} settings of stage {}", expanded.len(), self.name);

        self.settings = expanded;
        self.expanded = true;

        Ok(())
    }

    /// Check that all required settings are present.
    ///
    /// # Errors
    ///
    /// - Return [`ProfileError::MissingKey`] if `deploy_env` is missing.
    /// - Return [`ProfileError::NoHosts`] if `hosts` is missing or empty.
    pub fn validate(&self) -> Result<()> {
        self.deploy_env()?;
        self.hosts()?;
        Ok(())
    }

    /// Name of stage profile was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw settings of profile.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Check if placeholders have been expanded.
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Look up setting.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Look up setting that must be text or path.
    ///
    /// # Errors
    ///
    /// - Return [`ProfileError::MissingKey`] if setting is absent.
    /// - Return [`ProfileError::WrongShape`] if setting is a list.
    pub fn require_text(&self, key: &str) -> Result<String> {
        self.require(key)?
            .as_scalar()
            .ok_or_else(|| ProfileError::WrongShape {
                key: key.to_string(),
                expected: "text",
            })
    }

    /// Look up setting that names a path.
    ///
    /// # Errors
    ///
    /// - See [`Profile::require_text`].
    pub fn require_path(&self, key: &str) -> Result<PathBuf> {
        match self.require(key)? {
            Value::Path { path } => Ok(path.clone()),
            Value::Text(text) => Ok(PathBuf::from(text)),
            Value::List(_) => Err(ProfileError::WrongShape {
                key: key.to_string(),
                expected: "path",
            }),
        }
    }

    /// Look up setting that holds a list.
    ///
    /// Plain text is treated as a list of one item.
    ///
    /// # Errors
    ///
    /// - Return [`ProfileError::MissingKey`] if setting is absent.
    pub fn require_list(&self, key: &str) -> Result<Vec<String>> {
        match self.require(key)? {
            Value::List(items) => Ok(items.clone()),
            scalar => Ok(scalar.as_scalar().into_iter().collect()),
        }
    }

    /// Look up optional text setting.
    ///
    /// Empty text counts as unset.
    pub fn optional_text(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(Value::as_scalar)
            .filter(|text| !text.is_empty())
    }

    /// Identity of deployment environment.
    ///
    /// # Errors
    ///
    /// - See [`Profile::require_text`].
    pub fn deploy_env(&self) -> Result<String> {
        self.require_text("deploy_env")
    }

    /// Hosts to deploy to, in order.
    ///
    /// # Errors
    ///
    /// - Return [`ProfileError::NoHosts`] if there are no hosts.
    pub fn hosts(&self) -> Result<Vec<String>> {
        let hosts = match self.get("hosts") {
            Some(_) => self
                .require_list("hosts")?
                .into_iter()
                .filter(|host| !host.trim().is_empty())
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };

        if hosts.is_empty() {
            return Err(ProfileError::NoHosts {
                stage: self.name.clone(),
            });
        }

        Ok(hosts)
    }

    /// Intermediate host to hop through, if any.
    pub fn gateway(&self) -> Option<String> {
        self.optional_text("gateway")
    }

    /// Process supervision mechanism.
    ///
    /// # Errors
    ///
    /// - Return [`ProfileError::MissingKey`] if `provider` is absent.
    /// - Return [`ProfileError::Provider`] if `provider` is not recognized.
    pub fn provider(&self) -> Result<Provider> {
        Ok(self.require_text("provider")?.parse()?)
    }

    fn require(&self, key: &str) -> Result<&Value> {
        self.get(key).ok_or_else(|| ProfileError::MissingKey {
            key: key.to_string(),
            stage: self.name.clone(),
        })
    }
}

/// Profile lookup error types.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// Required setting is absent.
    #[error("stage {stage:?} does not define required setting {key:?}")]
    MissingKey { key: String, stage: String },

    /// Setting has the wrong shape.
    #[error("setting {key:?} must be a {expected}")]
    WrongShape { key: String, expected: &'static str },

    /// Profile lists no hosts.
    #[error("stage {stage:?} does not list any hosts")]
    NoHosts { stage: String },

    /// Provider setting is invalid.
    #[error(transparent)]
    Provider(#[from] crate::config::ConfigError),
}

/// Friendly result alias :3
pub type Result<T, E = ProfileError> = std::result::Result<T, E>;
