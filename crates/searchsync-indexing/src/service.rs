//! Index service: routes documents to their indexes on the backend.
//!
//! Documents are grouped per index (as chosen by the configuration resolver)
//! so that each backend call carries one index's batch. Index names are
//! qualified with the environment variant before they reach the backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use searchsync_types::{validate_field_name, WireDocument};
use tracing::{debug, info, warn};

use crate::backend::SchemaMap;
use crate::builder::DocumentBuilder;
use crate::context::SyncContext;
use crate::document::DocHandle;
use crate::error::IndexingError;

/// Backend type used when a field declares none.
pub const DEFAULT_FIELD_TYPE: &str = "text";

/// Counts from one add or remove call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServiceOutcome {
    /// Documents sent to at least one index
    pub sent: usize,
    /// Documents skipped for exceeding the size limit
    pub oversized: usize,
    /// Backend calls made
    pub calls: usize,
}

pub struct IndexService {
    ctx: Arc<SyncContext>,
    builder: DocumentBuilder,
}

impl IndexService {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        let builder = DocumentBuilder::new(ctx.clone());
        Self { ctx, builder }
    }

    pub fn builder(&self) -> &DocumentBuilder {
        &self.builder
    }

    fn environment_name(&self, index: &str) -> String {
        self.ctx.settings().environment_index_name(index)
    }

    /// Serialize and add documents to every index that applies to them.
    ///
    /// Field names are validated here, right before the backend call.
    pub fn add_documents(&self, documents: &[DocHandle]) -> Result<ServiceOutcome, IndexingError> {
        let max_size = self.ctx.settings().max_document_size;
        let mut outcome = ServiceOutcome::default();
        let mut batches: IndexMap<String, Vec<WireDocument>> = IndexMap::new();

        for document in documents {
            let indexes = self.ctx.configuration().indexes_for_document(document.as_ref());
            if indexes.is_empty() {
                continue;
            }

            let wire = self.builder.to_array(document.as_ref())?;
            for key in wire.keys() {
                validate_field_name(key)?;
            }
            if max_size > 0 {
                let size = serde_json::to_vec(&wire)?.len();
                if size > max_size {
                    warn!(
                        document = %document.identifier(),
                        size,
                        max_size,
                        "Skipping document over the size limit"
                    );
                    outcome.oversized += 1;
                    continue;
                }
            }

            outcome.sent += 1;
            for index in indexes.keys() {
                batches.entry(index.clone()).or_default().push(wire.clone());
            }
        }

        for (index, docs) in batches {
            let name = self.environment_name(&index);
            let count = docs.len();
            self.ctx.backend().add_batch(&name, docs)?;
            outcome.calls += 1;
            debug!(index = %name, count, "Added documents");
        }
        Ok(outcome)
    }

    /// Remove documents from every index that applies to their class.
    pub fn remove_documents(&self, documents: &[DocHandle]) -> Result<ServiceOutcome, IndexingError> {
        let mut outcome = ServiceOutcome::default();
        let mut batches: IndexMap<String, Vec<String>> = IndexMap::new();

        for document in documents {
            let indexes = self.ctx.configuration().indexes_for_document(document.as_ref());
            if indexes.is_empty() {
                continue;
            }
            outcome.sent += 1;
            let id = document.identifier();
            for index in indexes.keys() {
                batches.entry(index.clone()).or_default().push(id.clone());
            }
        }

        for (index, ids) in batches {
            let name = self.environment_name(&index);
            self.ctx.backend().remove_batch(&name, &ids)?;
            outcome.calls += 1;
            debug!(index = %name, count = ids.len(), "Removed documents");
        }
        Ok(outcome)
    }

    /// Schema per index: every field's `type` option, defaulting to text.
    pub fn schema(&self) -> Result<BTreeMap<String, SchemaMap>, IndexingError> {
        let configuration = self.ctx.configuration();
        let mut schemas = BTreeMap::new();
        for index in configuration.index_names() {
            let mut schema = SchemaMap::new();
            for field in configuration.fields_for_index(&index)? {
                field.validate()?;
                let field_type = field.field_type().unwrap_or(DEFAULT_FIELD_TYPE);
                schema.insert(field.search_field_name().to_string(), field_type.to_string());
            }
            schemas.insert(index, schema);
        }
        Ok(schemas)
    }

    /// Push the schema of every configured index to the backend.
    pub fn configure(&self) -> Result<BTreeMap<String, SchemaMap>, IndexingError> {
        let schemas = self.schema()?;
        for (index, schema) in &schemas {
            let name = self.environment_name(index);
            self.ctx.backend().ensure_schema(&name, schema)?;
            info!(index = %name, fields = schema.len(), "Index schema ensured");
        }
        Ok(schemas)
    }

    pub fn list(&self, index: &str, offset: usize, limit: usize) -> Result<Vec<WireDocument>, IndexingError> {
        Ok(self
            .ctx
            .backend()
            .list(&self.environment_name(index), offset, limit)?)
    }

    pub fn count(&self, index: &str) -> Result<u64, IndexingError> {
        Ok(self.ctx.backend().total_count(&self.environment_name(index))?)
    }

    /// Remove documents from `index` by identifier.
    pub fn remove_ids(&self, index: &str, ids: &[String]) -> Result<usize, IndexingError> {
        let outcome = self
            .ctx
            .backend()
            .remove_batch(&self.environment_name(index), ids)?;
        Ok(outcome.accepted)
    }
}
