//! Compensating write for backends without transactions.

use semdex_core::{
    ErrorKind, IndexRecord, PipelineError, RecordId, SagaState, Stage, StoreError, VectorStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Replace one document's records on a non-transactional store, undoing the writes on failure.
///
/// The saga records what it intends to write before touching the store:
/// the prior records (snapshot), the stale ids to delete and the new ids.
/// If anything fails after the first write it deletes the new ids and
/// restores the snapshot.
pub struct WriteSaga<'a> {
    store: &'a dyn VectorStore,
    collection: &'a str,
    document_id: &'a str,
    snapshot: Vec<IndexRecord>,
    stale: Vec<RecordId>,
}

impl<'a> WriteSaga<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        collection: &'a str,
        document_id: &'a str,
        snapshot: Vec<IndexRecord>,
        stale: Vec<RecordId>,
    ) -> Self {
        Self {
            store,
            collection,
            document_id,
            snapshot,
            stale,
        }
    }

    /// Records present before this run.
    #[must_use]
    pub fn snapshot(&self) -> &[IndexRecord] {
        &self.snapshot
    }

    /// Delete stale ids, upsert `records`, then commit unless cancelled.
    pub async fn run(
        self,
        records: &[IndexRecord],
        cancel: &CancellationToken,
    ) -> Result<SagaState, PipelineError> {
        let new_ids: Vec<RecordId> = records.iter().map(|r| r.record_id.clone()).collect();

        if !self.stale.is_empty() {
            if let Err(e) = self.store.delete_records(self.collection, &self.stale).await {
                return Err(self.fail(Stage::Storing, &e, &new_ids).await);
            }
        }
        if let Err(e) = self.store.upsert(self.collection, records).await {
            return Err(self.fail(Stage::Storing, &e, &new_ids).await);
        }
        debug!(
            "Saga stored {} records for {} ({} stale removed)",
            records.len(),
            self.document_id,
            self.stale.len()
        );

        if cancel.is_cancelled() {
            warn!("Cancelled before commit of {}, compensating", self.document_id);
            let err = match self.compensate(&new_ids).await {
                Ok(()) => PipelineError::cancelled(Stage::Committing)
                    .with_compensation(SagaState::Compensated),
                Err(e) => self.cleanup_failed(Stage::Committing, &e),
            };
            return Err(err);
        }

        Ok(SagaState::Committed)
    }

    async fn fail(&self, stage: Stage, cause: &StoreError, new_ids: &[RecordId]) -> PipelineError {
        warn!("Write failed for {}: {}, compensating", self.document_id, cause);
        match self.compensate(new_ids).await {
            Ok(()) => PipelineError::new(
                stage,
                ErrorKind::PartialWrite,
                "write failed; prior version restored",
            )
            .with_compensation(SagaState::Compensated),
            Err(e) => self.cleanup_failed(stage, &e),
        }
    }

    async fn compensate(&self, new_ids: &[RecordId]) -> Result<(), StoreError> {
        if !new_ids.is_empty() {
            self.store.delete_records(self.collection, new_ids).await?;
        }
        if !self.snapshot.is_empty() {
            self.store.upsert(self.collection, &self.snapshot).await?;
        }
        debug!(
            "Compensated {}: restored {} prior records",
            self.document_id,
            self.snapshot.len()
        );
        Ok(())
    }

    fn cleanup_failed(&self, stage: Stage, cause: &StoreError) -> PipelineError {
        error!(
            "Compensation failed for {} in {}: {}; document may be inconsistent",
            self.document_id, self.collection, cause
        );
        PipelineError::new(
            stage,
            ErrorKind::CleanupFailed,
            "write failed and cleanup did not complete",
        )
        .with_compensation(SagaState::CompensationFailed)
    }
}
