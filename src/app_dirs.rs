use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the database location.
pub const DB_ENV_VAR: &str = "QUIZR_DB";

/// Where persisted quiz state lives.
pub struct AppDirs;

impl AppDirs {
    /// Resolution order: explicit path, `$QUIZR_DB`, `~/.local/state/quizr`, platform data dir.
    pub fn db_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Some(path) = std::env::var_os(DB_ENV_VAR).filter(|v| !v.is_empty()) {
            return PathBuf::from(path);
        }
        Self::default_db_path().unwrap_or_else(|| PathBuf::from("quizr.db"))
    }

    fn default_db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local/state/quizr/quizr.db"))
        } else {
            ProjectDirs::from("", "", "quizr").map(|dirs| dirs.data_local_dir().join("quizr.db"))
        }
    }
}
