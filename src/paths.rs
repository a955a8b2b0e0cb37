//! Purpose: Resolve where plugin libraries live.
//! Exports: `plugin_dir`, `default_plugin_dir`.
//! Role: Keep the hook and the CLI pointed at the same directory.
//! Invariants: `PSQLX_PLUGIN_DIR` wins; otherwise the platform data directory is used.
//! Invariants: Resolution never creates directories.
use std::path::PathBuf;

use crate::config::Config;

pub fn plugin_dir(config: &Config) -> PathBuf {
    config
        .plugin_dir
        .clone()
        .unwrap_or_else(|| default_plugin_dir(|key| std::env::var_os(key).map(PathBuf::from)))
}

#[cfg(windows)]
pub fn default_plugin_dir<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let base = lookup("LOCALAPPDATA").unwrap_or_else(|| {
        lookup("USERPROFILE")
            .unwrap_or_default()
            .join("AppData")
            .join("Local")
    });
    base.join("psqlx").join("plugins")
}

#[cfg(not(windows))]
pub fn default_plugin_dir<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let data_home = lookup("XDG_DATA_HOME")
        .filter(|dir| dir.is_absolute())
        .unwrap_or_else(|| lookup("HOME").unwrap_or_default().join(".local").join("share"));
    data_home.join("psqlx").join("plugins")
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::{default_plugin_dir, plugin_dir};
    use crate::config::Config;
    use std::path::{Path, PathBuf};

    #[test]
    fn xdg_data_home_is_preferred() {
        let dir = default_plugin_dir(|key| match key {
            "XDG_DATA_HOME" => Some(PathBuf::from("/data")),
            "HOME" => Some(PathBuf::from("/home/ana")),
            _ => None,
        });
        assert_eq!(dir, Path::new("/data/psqlx/plugins"));
    }

    #[test]
    fn falls_back_to_home_local_share() {
        let dir = default_plugin_dir(|key| match key {
            "XDG_DATA_HOME" => Some(PathBuf::from("relative")),
            "HOME" => Some(PathBuf::from("/home/ana")),
            _ => None,
        });
        assert_eq!(dir, Path::new("/home/ana/.local/share/psqlx/plugins"));
    }

    #[test]
    fn configured_directory_wins() {
        let config = Config {
            plugin_dir: Some(PathBuf::from("/opt/plugins")),
            ..Config::default()
        };
        assert_eq!(plugin_dir(&config), Path::new("/opt/plugins"));
    }
}
