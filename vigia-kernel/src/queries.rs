//! Read/acknowledge surface for the route layer.
//!
//! Every function returns plain serializable values; mapping `QueryError`
//! to a transport status is the caller's concern.

use crate::error::PersistenceFailure;
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{Completed, PersistedAlert};
use crate::store::{AlertStore, Snapshot, SnapshotKind, SnapshotStore};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),
}

pub async fn list_alerts(store: &dyn AlertStore) -> Result<Vec<PersistedAlert>, QueryError> {
    Ok(store.load_alerts().await?)
}

/// Action opérateur: `true` gèle l'alerte, `false` la rend de nouveau modifiable par le pipeline
pub async fn set_alert_completed(
    store: &dyn AlertStore,
    alert_table_id: &str,
    completed: bool,
) -> Result<(), QueryError> {
    if store.set_completed(alert_table_id, Completed::from(completed)).await? {
        tracing::info!(alert_table_id, completed, "alert completion changed");
        Ok(())
    } else {
        Err(QueryError::NotFound(format!("alert {alert_table_id}")))
    }
}

pub async fn latest_snapshot(store: &dyn SnapshotStore, kind: SnapshotKind) -> Result<Snapshot, QueryError> {
    store
        .latest(kind)
        .await?
        .ok_or_else(|| QueryError::NotFound(format!("snapshot {kind}")))
}

pub async fn latest_forecast(store: &dyn SnapshotStore) -> Result<serde_json::Value, QueryError> {
    Ok(latest_snapshot(store, SnapshotKind::GraphForecast).await?.data)
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumptionReport {
    pub internet: serde_json::Value,
    pub non_internet: serde_json::Value,
}

/// Les deux totaux; absent tant que le job n'a jamais réussi
pub async fn latest_consumption(store: &dyn SnapshotStore) -> Result<ConsumptionReport, QueryError> {
    Ok(ConsumptionReport {
        internet: latest_snapshot(store, SnapshotKind::InternetConsumption).await?.data,
        non_internet: latest_snapshot(store, SnapshotKind::NonInternetConsumption).await?.data,
    })
}

pub fn health_report(health: &HealthTracker) -> KernelHealth {
    health.get_health()
}
