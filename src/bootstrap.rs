//! Filesystem preparation and privilege drop, run before logging starts.

use crate::config::Config;
use crate::error::Error;
use nix::unistd::{chown, setgid, setgroups, setuid, Uid, User};
use std::fs::{self, OpenOptions, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// What happened to the process identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No `RUN_AS_USER` configured.
    Unchanged,
    /// `RUN_AS_USER` is set but the process isn't root, so it can't switch.
    NotRoot,
    /// Now running as this user.
    Dropped(String),
}

/// Create the config, certs and logs directories and a world-writable log file, then switch to
/// `RUN_AS_USER` if it is set and we are root. The directories are handed to that user first.
///
/// # Errors
///
/// Returns [`Error::IO`] if a directory or the log file can't be created, and
/// [`Error::Privileges`] if the user is unknown or the switch fails.
pub fn prepare(config: &Config) -> Result<Identity, Error> {
    let paths = &config.paths;
    let dirs = [&paths.config_dir, &paths.certs_dir, &paths.logs_dir];
    for dir in dirs {
        fs::create_dir_all(dir)?;
    }

    let log_file = paths.log_file();
    OpenOptions::new().create(true).append(true).open(&log_file)?;
    fs::set_permissions(&log_file, Permissions::from_mode(0o666))?;

    let Some(name) = &config.run_as else {
        return Ok(Identity::Unchanged);
    };
    if !Uid::effective().is_root() {
        return Ok(Identity::NotRoot);
    }

    let user = User::from_name(name)
        .map_err(|err| Error::Privileges(format!("looking up {name}: {err}")))?
        .ok_or_else(|| Error::Privileges(format!("no such user: {name}")))?;
    for dir in dirs {
        chown_tree(dir, &user)?;
    }

    setgroups(&[user.gid]).map_err(|err| Error::Privileges(format!("setgroups: {err}")))?;
    setgid(user.gid).map_err(|err| Error::Privileges(format!("setgid: {err}")))?;
    setuid(user.uid).map_err(|err| Error::Privileges(format!("setuid: {err}")))?;
    Ok(Identity::Dropped(name.clone()))
}

fn chown_tree(path: &Path, user: &User) -> Result<(), Error> {
    chown(path, Some(user.uid), Some(user.gid))
        .map_err(|err| Error::Privileges(format!("chown {}: {err}", path.display())))?;
    if path.is_dir() && !path.is_symlink() {
        for entry in fs::read_dir(path)? {
            chown_tree(&entry?.path(), user)?;
        }
    }
    Ok(())
}
