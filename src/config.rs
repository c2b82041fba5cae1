// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the __stage file__ that limndeploy reads its
//! deployment targets from. A stage file is a TOML document made up of two
//! parts: a `[defaults]` table holding project-wide settings, and one
//! `[stage.<name>]` table per deployment target. When a stage is activated,
//! every default that the stage does not set itself is filled in for it.
//!
//! # Values
//!
//! Every setting is one of three shapes: plain text, a list of text, or a
//! path written as an inline table (`key = { path = "/srv/limn" }`). Paths go
//! through shell expansion when the stage file is parsed, so `~` and `$VAR`
//! work as expected. Text of the form `%(key)s` is a placeholder that refers
//! to another setting of the same stage; see [`expand`](crate::expand).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Stage definitions compiled into the binary.
const BUILTIN_STAGES: &str = include_str!("stages.toml");

/// Stage file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct StageFile {
    /// Settings shared by every stage unless the stage overrides them.
    #[serde(default)]
    pub defaults: Settings,

    /// Named deployment targets in declaration order.
    #[serde(default, rename = "stage")]
    pub stages: IndexMap<String, Settings>,
}

/// Ordered mapping of setting keys to values.
pub type Settings = IndexMap<String, Value>;

impl StageFile {
    /// Stage file describing the stock Limn deployment targets.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Deserialize`] if the bundled stage file is
    ///   malformed.
    pub fn builtin() -> Result<Self> {
        BUILTIN_STAGES.parse()
    }

    /// Read and parse stage file at target path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is not a valid
    ///   stage file.
    /// - Return [`ConfigError::ShellExpansion`] if a path value cannot be
    ///   shell expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = read_to_string(path.as_ref()).map_err(|err| ConfigError::Read {
            source: err,
            path: path.as_ref().to_path_buf(),
        })?;

        data.parse()
    }
}

impl FromStr for StageFile {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut stage_file: StageFile =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path value.
        expand_paths(&mut stage_file.defaults)?;
        for settings in stage_file.stages.values_mut() {
            expand_paths(settings)?;
        }

        Ok(stage_file)
    }
}

impl Display for StageFile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand_paths(settings: &mut Settings) -> Result<()> {
    for value in settings.values_mut() {
        if let Value::Path { path } = value {
            let expanded = shellexpand::full(path.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned();
            *path = PathBuf::from(expanded);
        }
    }

    Ok(())
}

/// Value of a single setting.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Plain text.
    Text(String),

    /// Ordered list of text, e.g., host names.
    List(Vec<String>),

    /// Filesystem path.
    Path { path: PathBuf },
}

impl Value {
    /// Construct new text value.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Construct new path value.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path { path: path.into() }
    }

    /// Construct new list value.
    pub fn list(items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Scalar text of value, if it has any.
    ///
    /// Lists have no scalar form.
    pub fn as_scalar(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text.clone()),
            Self::Path { path } => Some(path.to_string_lossy().into_owned()),
            Self::List(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<PathBuf> for Value {
    fn from(path: PathBuf) -> Self {
        Self::path(path)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// Parse a `key=value` override given on the command line.
///
/// # Errors
///
/// - Return [`ConfigError::MalformedOverride`] if there is no `=`, or the key
///   is empty.
pub fn parse_override(text: &str) -> Result<(String, Value)> {
    match text.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), Value::text(value)))
        }
        _ => Err(ConfigError::MalformedOverride(text.to_string())),
    }
}

/// Process supervision mechanism running the deployed application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Jobs controlled through `supervisorctl`.
    Supervisor,

    /// Jobs controlled through upstart's `start` and `stop`.
    Upstart,
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data.trim() {
            "supervisor" => Ok(Self::Supervisor),
            "upstart" => Ok(Self::Upstart),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl Display for Provider {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Supervisor => fmt.write_str("supervisor"),
            Self::Upstart => fmt.write_str("upstart"),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read stage file.
    #[error("failed to read stage file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Provider is neither supervisor nor upstart.
    #[error("unknown provider {0:?}, expected \"supervisor\" or \"upstart\"")]
    UnknownProvider(String),

    /// Command line override is not of the form `key=value`.
    #[error("malformed override {0:?}, expected key=value")]
    MalformedOverride(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
