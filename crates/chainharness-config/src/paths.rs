//! Path utilities and XDG directory discovery

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// XDG-compliant paths for chainharness
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    /// Create a new Paths instance with XDG discovery
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("dev", "chainharness", "chainharness"),
        }
    }

    /// Get user config directory (~/.config/chainharness/)
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| {
                ConfigError::XdgError("Failed to determine user config directory".to_string())
            })
    }

    /// Get user config file path (~/.config/chainharness/config.toml)
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    /// Get project config file path (chainharness.toml)
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("chainharness.toml")
    }

    /// Get local config file path (chainharness.local.toml, gitignored)
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("chainharness.local.toml")
    }

    /// Directory holding one scenario run: `<root>/<scenario>`.
    pub fn scenario_dir(root: impl AsRef<Path>, scenario: &str) -> PathBuf {
        root.as_ref().join(scenario)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_xdg_paths() {
        let paths = Paths::new();

        // May be unavailable in minimal environments; must not panic either way
        if let Ok(config_file) = paths.user_config_file() {
            assert!(config_file.to_string_lossy().contains("chainharness"));
            assert!(config_file.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_project_paths() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        assert_eq!(
            Paths::project_config_file(project_dir),
            project_dir.join("chainharness.toml")
        );
        assert_eq!(
            Paths::local_config_file(project_dir),
            project_dir.join("chainharness.local.toml")
        );
        assert_eq!(
            Paths::scenario_dir(project_dir, "smsg"),
            project_dir.join("smsg")
        );
    }
}
