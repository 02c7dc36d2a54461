//! `install-extension`: write a starter user extension.
//!
//! The template is a POSIX shell script that already speaks the extension
//! protocol, so a freshly installed extension loads and collects an empty
//! item list until it is edited.

use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use crate::config::{ConfigError, Paths, Settings};
use crate::loader::is_valid_name;

/// Errors from [`install_extension`].
#[derive(Debug, thiserror::Error)]
pub enum ScaffoldError {
    #[error("invalid extension name {0:?}: use letters, digits, '-', '_' or '.'")]
    InvalidName(String),

    #[error("extension {name} already exists at {path}")]
    AlreadyExists { name: String, path: PathBuf },

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What [`install_extension`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub path: PathBuf,
    /// `false` when the settings already had an entry for the name.
    pub added_to_settings: bool,
}

/// The starter script for extension `name`.
pub fn template(name: &str) -> String {
    format!(
        r#"#!/bin/sh
# DevAssist extension: {name}
#
# Invoked as `{name} init` or `{name} collect`. The connector config arrives
# on stdin as {{"config": {{...}}}}. `collect` must print one JSON value.

set -eu

case "${{1:-}}" in
  init)
    cat >/dev/null
    ;;
  collect)
    cat >/dev/null
    printf '%s\n' '{{"items": []}}'
    ;;
  *)
    echo "usage: $0 init|collect" >&2
    exit 2
    ;;
esac
"#
    )
}

/// Write the template to `<extensions>/<name>` and enable it in `settings`.
///
/// Never overwrites an existing extension. The settings file is rewritten
/// only when a new entry was added.
pub fn install_extension(
    paths: &Paths,
    settings: &mut Settings,
    name: &str,
) -> Result<InstallReport, ScaffoldError> {
    if !is_valid_name(name) {
        return Err(ScaffoldError::InvalidName(name.to_string()));
    }

    paths.ensure_dirs()?;
    let path = paths.extensions_dir.join(name);
    let script = paths.extensions_dir.join(format!("{name}.sh"));
    if script.exists() {
        return Err(ScaffoldError::AlreadyExists {
            name: name.to_string(),
            path: script,
        });
    }

    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(ScaffoldError::AlreadyExists {
                name: name.to_string(),
                path,
            })
        }
        Err(source) => return Err(ScaffoldError::Io { path, source }),
    };
    file.write_all(template(name).as_bytes())
        .map_err(|source| ScaffoldError::Io {
            path: path.clone(),
            source,
        })?;
    drop(file);
    make_executable(&path)?;
    info!(extension = %name, path = %path.display(), "extension template written");

    let added_to_settings = settings.ensure_extension(name);
    if added_to_settings {
        settings.save(&paths.config_file)?;
    }

    Ok(InstallReport {
        path,
        added_to_settings,
    })
}

#[cfg(unix)]
fn make_executable(path: &std::path::Path) -> Result<(), ScaffoldError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
        ScaffoldError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &std::path::Path) -> Result<(), ScaffoldError> {
    Ok(())
}
