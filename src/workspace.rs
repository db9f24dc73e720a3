use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

/// Per-process scratch directory holding dump files and rsync list files.
///
/// Created as `<base>/.clisync-<pid>/` with a `mysql/` subdirectory and
/// removed recursively when dropped.
#[derive(Debug)]
pub struct TempWorkspace {
    path: PathBuf,
}

impl TempWorkspace {
    /// Create the workspace under `base`, replacing leftovers of an earlier
    /// run with the same pid.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directories cannot be created.
    pub fn create(base: &Path) -> io::Result<Self> {
        let path = base.join(format!(".clisync-{}", std::process::id()));
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        }
        std::fs::create_dir_all(path.join("mysql"))?;
        debug!("Created temp directory {}", path.display());
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn mysql_dir(&self) -> PathBuf {
        self.path.join("mysql")
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if !self.path.is_dir() {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed temp directory {}", self.path.display()),
            Err(e) => warn!("Unable to remove temp directory {}: {e}", self.path.display()),
        }
    }
}
