//! File-backed knowledge store. One JSON file holds every captured
//! entity; good enough for a single-machine queue and trivially
//! inspectable when debugging captures.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eg_core::traits::KnowledgeStore;
use eg_core::types::{KnowledgeEntity, ScopeRef};
use errors::CaptureError;
use tokio::sync::Mutex;
use tracing::debug;

const ENTITIES_FILE: &str = "entities.json";

pub struct FileKnowledgeStore {
    path: PathBuf,
    entities: Mutex<Vec<KnowledgeEntity>>,
}

impl FileKnowledgeStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| CaptureError::StoreWrite {
            reason: format!("{}: {}", dir.display(), e),
        })?;
        let path = dir.join(ENTITIES_FILE);

        let entities = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| CaptureError::StoreWrite {
                reason: format!("{}: {}", path.display(), e),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(CaptureError::StoreWrite {
                    reason: format!("{}: {}", path.display(), e),
                });
            }
        };

        Ok(Self {
            path,
            entities: Mutex::new(entities),
        })
    }

    fn persist(&self, entities: &[KnowledgeEntity]) -> Result<(), CaptureError> {
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(entities).map_err(|e| CaptureError::StoreWrite {
            reason: e.to_string(),
        })?;
        std::fs::write(&tmp, bytes).map_err(|e| CaptureError::StoreWrite {
            reason: format!("{}: {}", tmp.display(), e),
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| CaptureError::StoreWrite {
            reason: format!("{}: {}", self.path.display(), e),
        })
    }
}

#[async_trait]
impl KnowledgeStore for FileKnowledgeStore {
    type Error = CaptureError;

    async fn store(&self, entity: KnowledgeEntity) -> Result<String, Self::Error> {
        let id = entity.id.clone();
        let mut entities = self.entities.lock().await;
        entities.push(entity);
        self.persist(&entities)?;
        debug!(entity_id = %id, "Stored knowledge entity");
        Ok(id)
    }

    async fn search(
        &self,
        scope: &ScopeRef,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntity>, Self::Error> {
        let needle = query.to_lowercase();
        let entities = self.entities.lock().await;
        Ok(entities
            .iter()
            .filter(|e| e.scope == *scope && e.content.to_lowercase().contains(&needle))
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list(&self, scope: &ScopeRef) -> Result<Vec<KnowledgeEntity>, Self::Error> {
        let entities = self.entities.lock().await;
        Ok(entities
            .iter()
            .filter(|e| e.scope == *scope)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<(), Self::Error> {
        let mut entities = self.entities.lock().await;
        let before = entities.len();
        entities.retain(|e| e.id != id);
        if entities.len() != before {
            self.persist(&entities)?;
        }
        Ok(())
    }
}
