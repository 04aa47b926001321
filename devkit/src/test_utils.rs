/*!
Test Harness pour le pipeline Vigia

Câble un `Pipeline` sur une `MockSource` et un `MemoryStore`, avec la
configuration par défaut ajustable avant chaque test.
*/

use crate::mock_source::MockSource;
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use vigia_kernel::config::KernelConfig;
use vigia_kernel::error::PipelineError;
use vigia_kernel::forecast::ForecastEngine;
use vigia_kernel::jobs::{JobKind, JobReport, Pipeline, PipelineSettings};
use vigia_kernel::models::PersistedAlert;
use vigia_kernel::scheduler::JobRunner;
use vigia_kernel::store::memory::MemoryStore;
use vigia_kernel::store::{AlertStore, SnapshotKind, SnapshotStore, StoreBackend, StoreHandles};

pub struct TestHarness {
    pub source: MockSource,
    pub store: Arc<MemoryStore>,
    pub config: KernelConfig,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let mut config = KernelConfig::default();
        config.store.backend = StoreBackend::Memory;
        Self {
            source: MockSource::new(),
            store: Arc::new(MemoryStore::new()),
            config,
        }
    }

    pub fn with_store(mut self, store: MemoryStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn configure(mut self, edit: impl FnOnce(&mut KernelConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    pub fn stores(&self) -> StoreHandles {
        StoreHandles::from_backend(self.store.clone())
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            Arc::new(self.source.clone()),
            self.stores(),
            ForecastEngine::new(self.config.forecast.clone()),
            PipelineSettings::from(&self.config),
        )
    }

    pub async fn run(&self, job: JobKind) -> Result<JobReport, PipelineError> {
        self.pipeline().run(job).await
    }

    pub async fn alerts(&self) -> Result<Vec<PersistedAlert>> {
        Ok(self.store.load_alerts().await?)
    }

    pub async fn alert(&self, alert_table_id: &str) -> Result<PersistedAlert> {
        self.alerts()
            .await?
            .into_iter()
            .find(|a| a.alert_table_id == alert_table_id)
            .ok_or_else(|| anyhow::anyhow!("alert {alert_table_id} not stored"))
    }

    pub async fn snapshot(&self, kind: SnapshotKind) -> Result<Option<Value>> {
        Ok(self.store.latest(kind).await?.map(|s| s.data))
    }
}
