//! XDG-compliant path resolution for chat-friend.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(chat::paths::no_home),
        help(
            "Set the HOME environment variable, or pass --config and --preferences explicitly."
        )
    )]
    NoHome,
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global XDG-compliant directories for chat-friend.
#[derive(Debug, Clone)]
pub struct ChatPaths {
    /// `$XDG_CONFIG_HOME/chat-friend/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/chat-friend/`
    pub data_dir: PathBuf,
}

impl ChatPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        Self::from_env(|key| std::env::var(key).ok())
    }

    fn from_env(var: impl Fn(&str) -> Option<String>) -> PathResult<Self> {
        let home = var("HOME").map(PathBuf::from);

        let config_dir = match (var("XDG_CONFIG_HOME"), &home) {
            (Some(dir), _) => PathBuf::from(dir),
            (None, Some(home)) => home.join(".config"),
            (None, None) => return Err(PathError::NoHome),
        }
        .join("chat-friend");

        let data_dir = match (var("XDG_DATA_HOME"), &home) {
            (Some(dir), _) => PathBuf::from(dir),
            (None, Some(home)) => home.join(".local/share"),
            (None, None) => return Err(PathError::NoHome),
        }
        .join("chat-friend");

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Default path to the preference file.
    pub fn preference_file(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn falls_back_to_home() {
        let paths = ChatPaths::from_env(env(&[("HOME", "/home/u")])).unwrap();
        assert_eq!(paths.config_file(), PathBuf::from("/home/u/.config/chat-friend/config.toml"));
        assert_eq!(
            paths.preference_file(),
            PathBuf::from("/home/u/.local/share/chat-friend/preferences.json")
        );
    }

    #[test]
    fn xdg_overrides_home() {
        let paths = ChatPaths::from_env(env(&[
            ("HOME", "/home/u"),
            ("XDG_CONFIG_HOME", "/cfg"),
            ("XDG_DATA_HOME", "/data"),
        ]))
        .unwrap();
        assert_eq!(paths.config_dir, PathBuf::from("/cfg/chat-friend"));
        assert_eq!(paths.data_dir, PathBuf::from("/data/chat-friend"));
    }

    #[test]
    fn no_home_without_xdg_is_an_error() {
        assert!(matches!(ChatPaths::from_env(env(&[])), Err(PathError::NoHome)));
    }
}
