//! Lifecycle hooks.
//!
//! Hooks observe and veto indexing without being part of a document type:
//! they are registered once on the [`SyncContext`](crate::SyncContext) and
//! called for every document the indexer touches.

use std::sync::Arc;

use crate::document::{DocHandle, Document};
use crate::error::IndexingError;

/// Synchronous callbacks around indexing. All methods default to no-ops.
pub trait LifecycleHook: Send + Sync {
    fn before_add(&self, _document: &dyn Document) -> Result<(), IndexingError> {
        Ok(())
    }

    fn after_add(&self, _document: &dyn Document) -> Result<(), IndexingError> {
        Ok(())
    }

    fn before_remove(&self, _document: &dyn Document) -> Result<(), IndexingError> {
        Ok(())
    }

    fn after_remove(&self, _document: &dyn Document) -> Result<(), IndexingError> {
        Ok(())
    }

    /// Veto indexing of a document. Checked last in `should_index`.
    fn can_index(&self, _document: &dyn Document) -> bool {
        true
    }

    /// Adjust the computed dependents of a document.
    fn update_dependent_documents(&self, _document: &dyn Document, _dependents: &mut Vec<DocHandle>) {}
}

/// Ordered set of registered hooks.
#[derive(Default, Clone)]
pub struct Hooks {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn before_add(&self, document: &dyn Document) -> Result<(), IndexingError> {
        self.hooks.iter().try_for_each(|h| h.before_add(document))
    }

    pub fn after_add(&self, document: &dyn Document) -> Result<(), IndexingError> {
        self.hooks.iter().try_for_each(|h| h.after_add(document))
    }

    pub fn before_remove(&self, document: &dyn Document) -> Result<(), IndexingError> {
        self.hooks.iter().try_for_each(|h| h.before_remove(document))
    }

    pub fn after_remove(&self, document: &dyn Document) -> Result<(), IndexingError> {
        self.hooks.iter().try_for_each(|h| h.after_remove(document))
    }

    pub fn can_index(&self, document: &dyn Document) -> bool {
        self.hooks.iter().all(|h| h.can_index(document))
    }

    pub fn update_dependent_documents(&self, document: &dyn Document, dependents: &mut Vec<DocHandle>) {
        for hook in &self.hooks {
            hook.update_dependent_documents(document, dependents);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentRef, Identifiable, Indexable, Serializable};
    use searchsync_types::WireDocument;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Plain(&'static str);

    impl Identifiable for Plain {
        fn identifier(&self) -> String {
            self.0.to_string()
        }
        fn source_class(&self) -> &str {
            "Page"
        }
    }

    impl Indexable for Plain {
        fn should_index(&self) -> bool {
            true
        }
        fn to_array(&self) -> Result<WireDocument, IndexingError> {
            Ok(WireDocument::new())
        }
    }

    impl Serializable for Plain {
        fn to_ref(&self) -> DocumentRef {
            DocumentRef::new("Page", 1)
        }
    }

    impl Document for Plain {}

    #[derive(Default)]
    struct Counting {
        adds: AtomicUsize,
    }

    impl LifecycleHook for Counting {
        fn before_add(&self, _document: &dyn Document) -> Result<(), IndexingError> {
            self.adds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct VetoDrafts;

    impl LifecycleHook for VetoDrafts {
        fn can_index(&self, document: &dyn Document) -> bool {
            !document.identifier().starts_with("draft")
        }

        fn after_remove(&self, _document: &dyn Document) -> Result<(), IndexingError> {
            Err(IndexingError::Hook("audit log unavailable".into()))
        }
    }

    #[test]
    fn test_hooks_run_in_order_and_veto() {
        let counting = Arc::new(Counting::default());
        let mut hooks = Hooks::new();
        hooks.register(counting.clone());
        hooks.register(Arc::new(VetoDrafts));

        hooks.before_add(&Plain("page_1")).unwrap();
        hooks.before_add(&Plain("page_2")).unwrap();
        assert_eq!(counting.adds.load(Ordering::SeqCst), 2);

        assert!(hooks.can_index(&Plain("page_1")));
        assert!(!hooks.can_index(&Plain("draft_1")));
    }

    #[test]
    fn test_hook_errors_propagate() {
        let mut hooks = Hooks::new();
        hooks.register(Arc::new(VetoDrafts));
        let err = hooks.after_remove(&Plain("page_1")).unwrap_err();
        assert_eq!(err.to_string(), "Hook error: audit log unavailable");
    }
}
