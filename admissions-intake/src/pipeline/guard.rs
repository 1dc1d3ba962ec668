//! Removal of stored documents whose ingest did not complete

use crate::storage::DocumentStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Owns a freshly stored document until its metadata is recorded
///
/// Dropping an armed guard (the ingest future was cancelled) schedules the
/// delete on the current tokio runtime.
pub(crate) struct CompensationGuard<S: DocumentStore + 'static> {
    store: Arc<S>,
    path: Option<PathBuf>,
}

impl<S: DocumentStore + 'static> CompensationGuard<S> {
    pub(crate) const fn new(store: Arc<S>, path: PathBuf) -> Self {
        Self {
            store,
            path: Some(path),
        }
    }

    /// The document is referenced by a record and must stay
    pub(crate) fn disarm(mut self) {
        self.path = None;
    }

    /// Deletes the document now
    pub(crate) async fn compensate(mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match self.store.delete(&path).await {
            Ok(()) => {
                tracing::warn!(path = %path.display(), "removed stored document without metadata");
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "failed to remove stored document without metadata"
                );
            }
        }
    }
}

impl<S: DocumentStore + 'static> Drop for CompensationGuard<S> {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = Arc::clone(&self.store);
            tracing::warn!(path = %path.display(), "ingest cancelled, scheduling removal");
            handle.spawn(async move {
                if let Err(e) = store.delete(&path).await {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "failed to remove document of cancelled ingest"
                    );
                }
            });
        } else {
            tracing::error!(path = %path.display(), "no runtime to remove document of cancelled ingest");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MockDocumentStore, StorageError};
    use std::path::Path;

    #[tokio::test]
    async fn test_disarmed_guard_keeps_document() {
        // No expectations: any delete call would panic
        let store = Arc::new(MockDocumentStore::new());
        let guard = CompensationGuard::new(store, PathBuf::from("/uploads/applicant_1/a.pdf"));
        guard.disarm();
    }

    #[tokio::test]
    async fn test_compensate_deletes_once() {
        let mut store = MockDocumentStore::new();
        store
            .expect_delete()
            .withf(|path| path == Path::new("/uploads/applicant_1/a.pdf"))
            .times(1)
            .returning(|_| Ok(()));

        let guard = CompensationGuard::new(Arc::new(store), PathBuf::from("/uploads/applicant_1/a.pdf"));
        guard.compensate().await;
    }

    #[tokio::test]
    async fn test_compensate_swallows_delete_failure() {
        let mut store = MockDocumentStore::new();
        store
            .expect_delete()
            .times(1)
            .returning(|_| Err(StorageError::InvalidPath("gone".to_string())));

        let guard = CompensationGuard::new(Arc::new(store), PathBuf::from("/uploads/applicant_1/a.pdf"));
        guard.compensate().await;
    }

    #[tokio::test]
    async fn test_dropped_guard_schedules_delete() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut store = MockDocumentStore::new();
        store.expect_delete().times(1).returning(move |path| {
            let _ = tx.send(path.to_path_buf());
            Ok(())
        });

        let guard = CompensationGuard::new(Arc::new(store), PathBuf::from("/uploads/applicant_1/b.png"));
        drop(guard);

        let deleted = rx.recv().await.unwrap();
        assert_eq!(deleted, PathBuf::from("/uploads/applicant_1/b.png"));
    }
}
