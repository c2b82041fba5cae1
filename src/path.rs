// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where limndeploy should look for its stage file.

use std::path::{Path, PathBuf};

/// Name of stage file looked up in the current working directory.
pub const LOCAL_STAGE_FILE: &str = "limndeploy.toml";

/// Determine default absolute path to the user's stage file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/limndeploy/stages.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if the configuration directory cannot be
///   determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_stage_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("limndeploy").join("stages.toml"))
        .ok_or(NoConfigDir)
}

/// Locate stage file to load.
///
/// An explicit path always wins, even if it does not exist, so that a typo
/// surfaces as a read error instead of silently falling back. Otherwise
/// `./limndeploy.toml` is preferred over the user's XDG stage file. Returns
/// `None` when neither exists, meaning the built-in stages should be used.
pub fn locate_stage_file(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = cwd.join(LOCAL_STAGE_FILE);
    if local.is_file() {
        return Some(local);
    }

    default_stage_file().ok().filter(|path| path.is_file())
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{env::current_dir, fs::write};

    #[sealed_test]
    fn explicit_stage_file_wins() -> anyhow::Result<()> {
        let cwd = current_dir()?;
        write(cwd.join(LOCAL_STAGE_FILE), "")?;

        let result = locate_stage_file(Some(Path::new("/nope/stages.toml")), &cwd);
        assert_eq!(result, Some(PathBuf::from("/nope/stages.toml")));

        Ok(())
    }

    #[sealed_test]
    fn local_stage_file_found_in_working_directory() -> anyhow::Result<()> {
        let cwd = current_dir()?;
        write(cwd.join(LOCAL_STAGE_FILE), "")?;

        let result = locate_stage_file(None, &cwd);
        assert_eq!(result, Some(cwd.join(LOCAL_STAGE_FILE)));

        Ok(())
    }

    #[sealed_test(env = [("XDG_CONFIG_HOME", "/definitely/not/here")])]
    fn no_stage_file_means_builtin() -> anyhow::Result<()> {
        let cwd = current_dir()?;
        assert_eq!(locate_stage_file(None, &cwd), None);

        Ok(())
    }
}
