//! Conversion between documents and the flat wire representation.

use std::collections::BTreeSet;
use std::sync::Arc;

use searchsync_types::{ConfigError, WireDocument};
use serde_json::Value;

use crate::context::SyncContext;
use crate::document::{DocHandle, Document};
use crate::error::IndexingError;

/// Builds wire documents and reconstructs documents from them.
///
/// The wire map is the document's own fields, then the id field, then any
/// meta fields, then the class discriminator.
pub struct DocumentBuilder {
    ctx: Arc<SyncContext>,
}

impl DocumentBuilder {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    pub fn to_array(&self, document: &dyn Document) -> Result<WireDocument, IndexingError> {
        let settings = self.ctx.settings();
        let mut wire = document.to_array()?;
        let user_fields: BTreeSet<String> = wire.keys().cloned().collect();

        let mut reserved: Vec<(String, Value)> =
            vec![(settings.id_field.clone(), Value::String(document.identifier()))];
        if let Some(meta) = document.as_meta_provider() {
            reserved.extend(meta.provide_meta());
        }
        reserved.push((
            settings.source_class_field.clone(),
            Value::String(document.source_class().to_string()),
        ));

        for (key, value) in reserved {
            if settings.reject_reserved_field_collisions && user_fields.contains(&key) {
                return Err(ConfigError::ReservedFieldCollision {
                    field: key,
                    class: document.source_class().to_string(),
                }
                .into());
            }
            wire.insert(key, value);
        }
        Ok(wire)
    }

    /// Rebuild a document from a wire map via the fetcher for its class.
    ///
    /// `Ok(None)` without a discriminator, without a matching fetcher, or
    /// when the fetcher cannot find the record.
    pub fn from_array(&self, wire: &WireDocument) -> Result<Option<DocHandle>, IndexingError> {
        let Some(class) = wire
            .get(&self.ctx.settings().source_class_field)
            .and_then(Value::as_str)
        else {
            return Ok(None);
        };
        match self.ctx.fetcher_for(class) {
            Some(fetcher) => fetcher.create_document(wire),
            None => Ok(None),
        }
    }
}
