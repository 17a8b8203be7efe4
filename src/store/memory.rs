use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{EngineError, Result};

use super::{Artifact, ArtifactStore};

/// Process-local store, used by tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: RwLock<HashMap<String, Artifact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.artifacts.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl ArtifactStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Artifact> {
        self.artifacts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    fn set(&self, name: &str, artifact: Artifact) -> Result<()> {
        self.artifacts.write().insert(name.to_string(), artifact);
        Ok(())
    }
}
