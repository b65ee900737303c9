//! Liveness probe against the metadata store.

use crate::services::metadata_store::MetadataStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone)]
pub struct HealthService {
    metadata: Arc<dyn MetadataStore>,
}

impl HealthService {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Insert one probe row. Write availability only; nothing is read back.
    pub async fn probe(&self) -> bool {
        match self.metadata.insert_probe(Utc::now().naive_utc()).await {
            Ok(check) => {
                debug!(check_id = check.check_id, at = %check.datetime, "health probe recorded");
                true
            }
            Err(err) => {
                error!(error = %err, "health probe write failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryMetadataStore, MetadataOp};

    #[tokio::test]
    async fn probe_writes_one_row_per_call() {
        let metadata = Arc::new(MemoryMetadataStore::default());
        let health = HealthService::new(metadata.clone());

        assert!(health.probe().await);
        assert!(health.probe().await);
        assert_eq!(metadata.probe_count(), 2);
    }

    #[tokio::test]
    async fn probe_reports_write_failure() {
        let metadata = Arc::new(MemoryMetadataStore::default());
        metadata.fail_on(MetadataOp::Probe);

        assert!(!HealthService::new(metadata.clone()).probe().await);
        assert_eq!(metadata.probe_count(), 0);
    }
}
