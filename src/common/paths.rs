//! Configuration and executable paths

use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "tf-scenario";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/tf-scenario/`
/// - macOS: `~/Library/Application Support/tf-scenario/`
/// - Windows: `%APPDATA%\tf-scenario\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Resolve a path relative to a base directory unless it is already absolute
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_ends_with_file_name() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_resolve_relative() {
        let base = Path::new("/work/scenarios");
        assert_eq!(
            resolve_relative(base, Path::new("../fixtures/simple")),
            PathBuf::from("/work/scenarios/../fixtures/simple")
        );
        assert_eq!(
            resolve_relative(base, Path::new("/abs/fixture")),
            PathBuf::from("/abs/fixture")
        );
    }
}
