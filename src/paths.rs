//! Default configuration location
//!
//! - **Working directory**: `beatcam.yaml` next to where the binary is run
//!   wins, which keeps development and ad-hoc runs simple.
//! - **User config dir** otherwise: `<config_dir>/beatcam/config.yaml`
//!   (`~/.config` on Linux, `%APPDATA%` on Windows).

use std::path::{Path, PathBuf};

use tracing::debug;

/// Application name used for the user config directory
const APP_NAME: &str = "beatcam";

/// File name looked up in the working directory
pub const LOCAL_CONFIG: &str = "beatcam.yaml";

/// Resolve the config path used when `--config` is not given
pub fn default_config_path() -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_config_path(&cwd, dirs::config_dir().as_deref())
}

/// Resolution rule, with both roots injected
pub fn resolve_config_path(cwd: &Path, config_dir: Option<&Path>) -> PathBuf {
    let local = cwd.join(LOCAL_CONFIG);
    if local.exists() {
        debug!("Using config in working directory: {}", local.display());
        return local;
    }

    match config_dir {
        Some(dir) => dir.join(APP_NAME).join("config.yaml"),
        None => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_file_wins() {
        let cwd = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        std::fs::write(cwd.path().join(LOCAL_CONFIG), "").unwrap();

        assert_eq!(
            resolve_config_path(cwd.path(), Some(user.path())),
            cwd.path().join(LOCAL_CONFIG)
        );
    }

    #[test]
    fn test_falls_back_to_user_config_dir() {
        let cwd = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();

        assert_eq!(
            resolve_config_path(cwd.path(), Some(user.path())),
            user.path().join("beatcam").join("config.yaml")
        );
        assert_eq!(
            resolve_config_path(cwd.path(), None),
            cwd.path().join(LOCAL_CONFIG)
        );
    }
}
