use std::sync::Arc;

use crate::pipeline::QueryPipeline;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Pipeline shared across requests
    pub pipeline: Arc<QueryPipeline>,
}

impl AppState {
    pub fn new(pipeline: QueryPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}
