use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::wgpu::pipelines::PipelineBundle;

/// Compiled programs keyed by [`super::key::compute_pipeline_hash_bytes`].
#[derive(Default)]
pub struct PipelineRegistry {
    inner: Mutex<HashMap<u64, Arc<PipelineBundle>>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &u64) -> Option<Arc<PipelineBundle>> {
        self.inner.lock().ok().and_then(|g| g.get(key).cloned())
    }

    pub fn insert(&self, key: u64, bundle: Arc<PipelineBundle>) {
        if let Ok(mut g) = self.inner.lock() {
            g.insert(key, bundle);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
