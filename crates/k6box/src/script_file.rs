//! Owner-only temporary copies of submitted scripts.

use crate::error::{GateError, GateResult};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const FILE_PREFIX: &str = "k6box-";
const FILE_SUFFIX: &str = ".js";

/// A script staged on disk for exactly one request.
///
/// The file is removed when the guard is dropped, so every exit path of the
/// owning request (including early returns and unwinding) cleans up. Removal
/// failures are logged and never surfaced.
#[derive(Debug)]
pub struct ScriptFile {
    path: PathBuf,
    removed: bool,
}

impl ScriptFile {
    /// Stage `script` under `dir` with a fresh collision-free name.
    ///
    /// The file is created with `create_new` and mode `0600`, and the mode is
    /// re-applied before the first byte is written. Each step maps to its own
    /// error kind: create, permission, write, close.
    pub fn create(dir: &Path, script: &str) -> GateResult<Self> {
        let path = dir.join(format!(
            "{FILE_PREFIX}{}{FILE_SUFFIX}",
            Uuid::new_v4().simple()
        ));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path).map_err(GateError::FileCreation)?;

        // From here on the guard owns the path and removes it on any failure.
        let staged = Self {
            path,
            removed: false,
        };

        restrict_permissions(&file).map_err(GateError::FilePermission)?;
        file.write_all(script.as_bytes())
            .map_err(GateError::FileWrite)?;
        file.sync_all().map_err(GateError::FileClose)?;
        drop(file);

        tracing::debug!(path_kind = "temporary", bytes = script.len(), "script staged");
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now instead of at drop.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path_kind = "temporary", "script removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path_kind = "temporary", "script already removed");
            }
            Err(err) => {
                tracing::warn!(
                    operation = "cleanup",
                    error = %err,
                    "failed to remove temporary script file"
                );
            }
        }
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(file: &fs::File) -> io::Result<()> {
    // No POSIX modes here; the handle is still checked so failures surface.
    file.metadata().map(|_| ())
}
