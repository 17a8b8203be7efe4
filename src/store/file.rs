use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{EngineError, Result};

use super::{Artifact, ArtifactStore};

/// One JSON document per artifact under a directory.
///
/// Writes go to a hidden temp file in the same directory and are renamed
/// over the target, so a reader sees either the old or the new document.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

fn unavailable(path: &Path, err: io::Error) -> EngineError {
    EngineError::StoreUnavailable(format!("{}: {err}", path.display()))
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl ArtifactStore for FileStore {
    fn get(&self, name: &str) -> Result<Artifact> {
        let path = self.path_for(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::NotFound(name.to_string()));
            }
            Err(err) => return Err(unavailable(&path, err)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn set(&self, name: &str, artifact: Artifact) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| unavailable(&self.dir, e))?;
        let path = self.path_for(name);
        let tmp = self.dir.join(format!(".{name}.json.tmp"));

        let body = serde_json::to_vec(&artifact)?;
        let mut file = fs::File::create(&tmp).map_err(|e| unavailable(&tmp, e))?;
        file.write_all(&body).map_err(|e| unavailable(&tmp, e))?;
        file.sync_all().map_err(|e| unavailable(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &path).map_err(|e| unavailable(&path, e))?;

        debug!(artifact = name, bytes = body.len(), "stored artifact");
        Ok(())
    }
}
