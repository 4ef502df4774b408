//! XDG Base Directory paths for sublink.
//!
//! Session storage lives under the data directory, configuration under the
//! config directory. Both follow XDG on every platform, like gh or kubectl.

use std::path::PathBuf;

/// Get the sublink config directory.
///
/// Returns `$XDG_CONFIG_HOME/sublink` if set, otherwise `~/.config/sublink`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("sublink")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config/sublink")
    } else {
        PathBuf::from(".config/sublink")
    }
}

/// Get the sublink data directory.
///
/// Returns `$XDG_DATA_HOME/sublink` if set, otherwise `~/.local/share/sublink`.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join("sublink")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share/sublink")
    } else {
        PathBuf::from(".local/share/sublink")
    }
}

/// Get the directory holding one subdirectory per persisted session.
///
/// # Examples
///
/// ```
/// use sublink_paths::sessions_dir;
///
/// let sessions = sessions_dir();
/// let one = sessions.join("6281234567890");
/// ```
pub fn sessions_dir() -> PathBuf {
    data_dir().join("sessions")
}
