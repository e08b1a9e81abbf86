use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod assets;
pub mod persist;
pub mod scene;

pub use app::{
    run_app, run_app_with_metrics, AppError, FrameMetrics, LoopConfig, MetricsHandle,
    SceneController, Tool, ViewKind, WindowConfig, SAVE_FORMAT_ENV_VAR,
};
pub use assets::{AssetError, AssetLibraries};
pub use persist::{PersistError, SaveFormat, SaveSlot, SlotOutcome, SlotStore};
pub use scene::{GridSpace, SceneState};

pub const ROOT_ENV_VAR: &str = "VTT_ROOT";
pub const MAPS_DIR_NAME: &str = "maps";
pub const TOKENS_DIR_NAME: &str = "tokens";
pub const SAVES_DIR_NAME: &str = "saves";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub maps_dir: PathBuf,
    pub tokens_dir: PathBuf,
    pub saves_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("VTT_ROOT is set but is not a directory: {path}")]
    InvalidEnvRoot { path: PathBuf },
    #[error("failed to create saves directory at {path}: {source}")]
    CreateSavesDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves the content root from `VTT_ROOT`, falling back to the working
/// directory, and makes sure `saves/` exists beneath it.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    app_paths_under(&root)
}

pub fn app_paths_under(root: &Path) -> Result<AppPaths, StartupError> {
    let root = normalize_path(root);
    let saves_dir = root.join(SAVES_DIR_NAME);
    fs::create_dir_all(&saves_dir).map_err(|source| StartupError::CreateSavesDir {
        path: saves_dir.clone(),
        source,
    })?;

    Ok(AppPaths {
        maps_dir: root.join(MAPS_DIR_NAME),
        tokens_dir: root.join(TOKENS_DIR_NAME),
        saves_dir,
        root,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(Path::new(&value));
            if normalized.is_dir() {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => env::current_dir().map_err(StartupError::CurrentDir),
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn paths_hang_off_root_and_saves_dir_is_created() {
        let temp = TempDir::new().expect("temp");
        let paths = app_paths_under(temp.path()).expect("paths");

        assert_eq!(paths.maps_dir, paths.root.join("maps"));
        assert_eq!(paths.tokens_dir, paths.root.join("tokens"));
        assert!(paths.saves_dir.is_dir());
        assert!(!paths.maps_dir.exists());
    }

    #[test]
    fn existing_saves_dir_is_left_alone() {
        let temp = TempDir::new().expect("temp");
        let saves = temp.path().join("saves");
        fs::create_dir_all(&saves).expect("mkdir");
        fs::write(saves.join("slot_1.vtt"), b"kept").expect("write");

        let paths = app_paths_under(temp.path()).expect("paths");
        assert_eq!(
            fs::read(paths.saves_dir.join("slot_1.vtt")).expect("read"),
            b"kept"
        );
    }

    #[test]
    fn saves_path_blocked_by_a_file_is_reported() {
        let temp = TempDir::new().expect("temp");
        fs::write(temp.path().join("saves"), b"not a dir").expect("write");

        let err = app_paths_under(temp.path()).expect_err("blocked");
        assert!(matches!(err, StartupError::CreateSavesDir { .. }));
    }
}
