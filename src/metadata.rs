// src/metadata.rs
// The "host application metadata registry" spec.md treats as an
// external collaborator: `getMetaData(name) -> { datasource }`. The
// aspect's datasource-resolution step consults this and nothing else,
// which keeps the aspect trivially testable against a fake datasource.

use std::sync::Arc;

use dashmap::DashMap;

use crate::session::DataSource;

/// Maps a configurable datasource name (default `"DB"`) to the
/// datasource installed under it, e.g. by [`crate::bootstrap::bootstrap`].
#[derive(Default)]
pub struct MetadataRegistry {
    datasources: DashMap<String, Arc<dyn DataSource>>,
}

impl MetadataRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn install(&self, name: impl Into<String>, datasource: Arc<dyn DataSource>) {
        self.datasources.insert(name.into(), datasource);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.datasources.get(name).map(|e| e.value().clone())
    }

    pub fn remove(&self, name: &str) {
        self.datasources.remove(name);
    }
}
