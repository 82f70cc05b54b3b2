//! Adapter projecting source-registry mutations into the graph.

use std::sync::Arc;

use async_trait::async_trait;

use gofriq::models::Source;
use gofriq::Result;
use gofriq_store::SourceMirror;

use crate::graph_store::GraphStore;

/// Mirrors registry mutations through any [`GraphStore`].
pub struct GraphSourceMirror {
    graph: Arc<dyn GraphStore>,
}

impl GraphSourceMirror {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl SourceMirror for GraphSourceMirror {
    async fn mirror_source(&self, source: &Source) -> Result<()> {
        self.graph.upsert_source_node(source).await
    }
}
