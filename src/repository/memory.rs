//! In-memory gateway for tests and ephemeral serving.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GatewayError, PersistenceGateway};
use crate::models::{Document, OcrResult};

#[derive(Default)]
struct Store {
    documents: HashMap<String, Document>,
    results: HashMap<String, Vec<OcrResult>>,
}

/// Non-durable gateway backed by process memory.
#[derive(Default)]
pub struct MemoryGateway {
    store: Mutex<Store>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn load_document(&self, id: &str) -> Result<Option<Document>, GatewayError> {
        let store = self.store.lock().expect("store poisoned");
        Ok(store.documents.get(id).cloned())
    }

    async fn save_document(&self, document: &Document) -> Result<(), GatewayError> {
        let mut store = self.store.lock().expect("store poisoned");
        store
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool, GatewayError> {
        let mut store = self.store.lock().expect("store poisoned");
        store.results.remove(id);
        Ok(store.documents.remove(id).is_some())
    }

    async fn replace_ocr_results(
        &self,
        document_id: &str,
        results: &[OcrResult],
    ) -> Result<(), GatewayError> {
        let mut store = self.store.lock().expect("store poisoned");
        if !store.documents.contains_key(document_id) {
            return Err(GatewayError::NotFound(document_id.to_string()));
        }
        store
            .results
            .insert(document_id.to_string(), results.to_vec());
        Ok(())
    }

    async fn ocr_results(&self, document_id: &str) -> Result<Vec<OcrResult>, GatewayError> {
        let store = self.store.lock().expect("store poisoned");
        Ok(store.results.get(document_id).cloned().unwrap_or_default())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, GatewayError> {
        let store = self.store.lock().expect("store poisoned");
        let mut documents: Vec<Document> = store.documents.values().cloned().collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }
}
