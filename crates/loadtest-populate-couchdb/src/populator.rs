//! Database-level orchestration.

use crate::config::PopulateConfig;
use crate::error::PopulateError;
use crate::metrics::{DatabaseSummary, MetricsCollector, PopulateSummary, SampleKind, WorkerStats};
use crate::partitioner::{describe_partitions, partition};
use crate::worker::{UploadWorker, WorkerReport};
use couch_client::{Connector, CouchStore, DatabaseCreation};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Populates every configured database, one after the other, with a pool of
/// upload workers per database.
pub struct CouchPopulator<C: Connector> {
    config: Arc<PopulateConfig>,
    connector: C,
    metrics: Arc<MetricsCollector>,
}

impl<C: Connector> CouchPopulator<C> {
    pub fn new(config: PopulateConfig, connector: C) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    pub fn config(&self) -> &PopulateConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Run the whole load.
    ///
    /// Per-request failures are logged and counted in the summary. Only a
    /// failure to open a connection or a crashed worker aborts the run.
    pub async fn run(&self) -> Result<PopulateSummary, PopulateError> {
        let mut admin = CouchStore::new(self.connector.connect()?);
        let mut databases = Vec::new();

        for db in self.config.database_names() {
            if let Some(summary) = self.populate_database(&mut admin, &db).await? {
                info!("{summary}");
                databases.push(summary);
            }
        }

        Ok(PopulateSummary {
            databases,
            average_document_time: self.metrics.average(SampleKind::Document),
            average_attachment_time: self.metrics.average(SampleKind::Attachment),
        })
    }

    /// Returns `None` when the database could not be created.
    async fn populate_database(
        &self,
        admin: &mut CouchStore<C::Transport>,
        db: &str,
    ) -> Result<Option<DatabaseSummary>, PopulateError> {
        let started = Instant::now();

        if self.config.recreate_dbs {
            match admin.delete_database(db).await {
                Ok(()) => info!("Deleted database '{db}'"),
                Err(e) => debug!("Couldn't delete database '{db}': {e}"),
            }
        }

        match admin.create_database(db).await {
            Ok(DatabaseCreation::Created) => info!("Created database '{db}'"),
            Ok(DatabaseCreation::AlreadyExists) => {
                warn!("Database '{db}' already exists, adding documents to it")
            }
            Err(e) => {
                error!("Error creating database '{db}': {e}");
                return Ok(None);
            }
        }

        let partitions = partition(self.config.docs, self.config.threads, self.config.doc_start_id);
        debug!("{}", describe_partitions(&partitions));
        info!(
            "Populating database '{db}' with {} documents using {} workers",
            self.config.docs,
            partitions.len()
        );

        let mut handles = Vec::with_capacity(partitions.len());
        for (i, part) in partitions.into_iter().enumerate() {
            let worker = UploadWorker::new(
                i + 1,
                db,
                part,
                self.config.clone(),
                self.metrics.clone(),
                CouchStore::new(self.connector.connect()?),
            );
            handles.push((i + 1, tokio::spawn(worker.run())));
        }

        let mut stats = WorkerStats::default();
        for (worker, handle) in handles {
            let report: WorkerReport = handle.await.map_err(|e| PopulateError::Worker {
                worker,
                reason: e.to_string(),
            })?;
            debug!(
                "Worker {} finished docs {}..{}: {} writes, {} failures",
                report.worker_id,
                report.partition.start,
                report.partition.end,
                report.stats.doc_writes,
                report.stats.failures()
            );
            stats += report.stats;
        }

        if let Some(security) = &self.config.security {
            match admin.put_security(db, security).await {
                Ok(()) => info!("Updated security object of database '{db}'"),
                Err(e) => error!("Error updating security object of database '{db}': {e}"),
            }
        }

        Ok(Some(DatabaseSummary {
            name: db.to_string(),
            documents: self.config.docs,
            stats,
            elapsed: started.elapsed(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryCouch;
    use couch_client::Method;
    use couch_template::DocumentTemplate;
    use serde_json::json;

    fn config() -> PopulateConfig {
        let template = DocumentTemplate::parse(r##"{"_id": "#{doc_id_counter}"}"##).unwrap();
        let mut config = PopulateConfig::new(template);
        config.docs = 4;
        config
    }

    #[tokio::test]
    async fn test_security_applied_after_documents() {
        let mut config = config();
        config.security = Some(json!({"members": {"names": ["joe"]}}));
        let server = InMemoryCouch::new();
        CouchPopulator::new(config, server.clone()).run().await.unwrap();

        let requests = server.requests();
        let last = requests.last().unwrap();
        assert_eq!(last.method, Method::Put);
        assert_eq!(last.path, ["testdb", "_security"]);
        assert_eq!(
            server.database("testdb").unwrap().security,
            Some(json!({"members": {"names": ["joe"]}}))
        );
    }

    #[tokio::test]
    async fn test_existing_database_is_appended_to() {
        let server = InMemoryCouch::new();
        server.create_database("testdb");
        let summary = CouchPopulator::new(config(), server.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.databases.len(), 1);
        assert_eq!(summary.totals().doc_writes, 4);
    }

    #[tokio::test]
    async fn test_recreate_drops_previous_documents() {
        let server = InMemoryCouch::new();
        let mut store = CouchStore::new(server.clone());
        store.create_database("testdb").await.unwrap();
        store
            .put_document("testdb", "stale", None, json!({"_id": "stale"}))
            .await
            .unwrap();

        let mut config = config();
        config.recreate_dbs = true;
        CouchPopulator::new(config, server.clone()).run().await.unwrap();

        let db = server.database("testdb").unwrap();
        assert!(!db.docs.contains_key("stale"));
        assert_eq!(db.docs.len(), 4);
    }

    #[tokio::test]
    async fn test_averages_reported() {
        let server = InMemoryCouch::new();
        let populator = CouchPopulator::new(config(), server);
        let summary = populator.run().await.unwrap();
        assert!(summary.average_document_time.is_some());
        assert_eq!(summary.average_attachment_time, None);
        assert_eq!(populator.metrics().count(SampleKind::Document), 4);
    }
}
