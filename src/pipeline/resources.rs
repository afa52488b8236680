use std::path::{Path, PathBuf};

use thiserror::Error;

/// Directory name searched next to the executable.
pub const MODELS_DIR_NAME: &str = "models";

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("model resources not found; tried {tried:?}")]
    NotFound { tried: Vec<PathBuf> },
    #[error("model resource path is not a directory: {0:?}")]
    NotADirectory(PathBuf),
    #[error("model resource directory is empty: {0:?}")]
    Empty(PathBuf),
    #[error("failed to read model resources at {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Location of the pre-trained model assets. Contents are owned by the
/// engine; only existence and non-emptiness are checked here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResources {
    root: PathBuf,
}

impl ModelResources {
    /// Resolve the model directory.
    ///
    /// An explicit override wins. Otherwise `models/` beside the executable,
    /// then `../share/fluidcanvas/models` relative to it.
    pub fn locate(override_dir: Option<&Path>) -> Result<Self, ResourceError> {
        if let Some(dir) = override_dir {
            return Self::open(dir);
        }

        let candidates = Self::bundle_candidates();
        for candidate in &candidates {
            if candidate.exists() {
                return Self::open(candidate);
            }
        }
        Err(ResourceError::NotFound { tried: candidates })
    }

    /// Validate a specific directory.
    pub fn open(dir: &Path) -> Result<Self, ResourceError> {
        if !dir.exists() {
            return Err(ResourceError::NotFound {
                tried: vec![dir.to_path_buf()],
            });
        }
        if !dir.is_dir() {
            return Err(ResourceError::NotADirectory(dir.to_path_buf()));
        }
        let mut entries = std::fs::read_dir(dir).map_err(|source| ResourceError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        if entries.next().is_none() {
            return Err(ResourceError::Empty(dir.to_path_buf()));
        }
        tracing::info!(path = ?dir, "Using model resources");
        Ok(Self {
            root: dir.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bundle_candidates() -> Vec<PathBuf> {
        let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        else {
            return Vec::new();
        };
        vec![
            exe_dir.join(MODELS_DIR_NAME),
            exe_dir
                .join("..")
                .join("share")
                .join("fluidcanvas")
                .join(MODELS_DIR_NAME),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_accepts_populated_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("unet.bin"), b"weights").unwrap();

        let resources = ModelResources::locate(Some(dir.path())).unwrap();
        assert_eq!(resources.root(), dir.path());
    }

    #[test]
    fn test_open_rejects_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelResources::open(dir.path()).unwrap_err();
        assert!(matches!(err, ResourceError::Empty(_)));
    }

    #[test]
    fn test_open_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("models");
        std::fs::write(&file, b"").unwrap();
        let err = ModelResources::open(&file).unwrap_err();
        assert!(matches!(err, ResourceError::NotADirectory(_)));
    }

    #[test]
    fn test_missing_override_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        match ModelResources::locate(Some(&missing)).unwrap_err() {
            ResourceError::NotFound { tried } => assert_eq!(tried, vec![missing]),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
