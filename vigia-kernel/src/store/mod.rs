/**
 * STOCKAGE - Snapshots "dernier jeu de données" et table des alertes
 *
 * RÔLE :
 * - SnapshotStore : une seule ligne par type de snapshot, remplacée en bloc.
 *   `replace` est un upsert atomique sur la clé du type, il n'existe aucun
 *   état intermédiaire "supprimé mais pas réinséré".
 * - AlertStore : table `alerts` fusionnée par `alert_table_id`, une ligne
 *   `completed = YES` n'est jamais réécrite par le pipeline.
 *
 * HYPOTHÈSE : un seul écrivain par type de snapshot, garanti par le
 * scheduler (un job par type, jamais deux exécutions simultanées).
 *
 * BACKENDS : `json` (fichiers sous data_dir) et `memory` (tests, dry-run).
 */

pub mod json_file;
pub mod memory;

use crate::error::PersistenceFailure;
use crate::models::{Completed, PersistedAlert};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    GraphData,
    GraphForecast,
    PortFailures,
    InternetConsumption,
    NonInternetConsumption,
    DeviceNames,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 6] = [
        SnapshotKind::GraphData,
        SnapshotKind::GraphForecast,
        SnapshotKind::PortFailures,
        SnapshotKind::InternetConsumption,
        SnapshotKind::NonInternetConsumption,
        SnapshotKind::DeviceNames,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::GraphData => "graph_data",
            SnapshotKind::GraphForecast => "graph_forecast",
            SnapshotKind::PortFailures => "port_failures",
            SnapshotKind::InternetConsumption => "internet_consumption",
            SnapshotKind::NonInternetConsumption => "non_internet_consumption",
            SnapshotKind::DeviceNames => "device_names",
        }
    }
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ligne unique d'un type de snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub kind: SnapshotKind,
    #[serde(with = "time::serde::rfc3339")]
    pub written_at: OffsetDateTime,
    pub data: serde_json::Value,
}

impl Snapshot {
    pub fn new(kind: SnapshotKind, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            written_at: OffsetDateTime::now_utc(),
            data,
        }
    }
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Remplace la ligne du type `kind`; retourne la ligne écrite
    async fn replace(&self, kind: SnapshotKind, data: serde_json::Value) -> Result<Snapshot, PersistenceFailure>;
    async fn latest(&self, kind: SnapshotKind) -> Result<Option<Snapshot>, PersistenceFailure>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn load_alerts(&self) -> Result<Vec<PersistedAlert>, PersistenceFailure>;
    /// Upsert par id; retourne le nombre de lignes effectivement écrites
    async fn merge_alerts(&self, records: Vec<PersistedAlert>) -> Result<usize, PersistenceFailure>;
    /// `false` si l'id est inconnu
    async fn set_completed(&self, alert_table_id: &str, completed: Completed) -> Result<bool, PersistenceFailure>;
}

/// Fusion dans une table en mémoire, partagée par les deux backends.
/// Relit le drapeau stocké: une alerte complétée entre la lecture du
/// pipeline et son écriture reste intacte.
pub(crate) fn merge_into(table: &mut BTreeMap<String, PersistedAlert>, records: Vec<PersistedAlert>) -> usize {
    let mut written = 0;
    for record in records {
        if table.get(&record.alert_table_id).is_some_and(PersistedAlert::is_frozen) {
            continue;
        }
        table.insert(record.alert_table_id.clone(), record);
        written += 1;
    }
    written
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Json,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub data_dir: PathBuf,
    /// Timeout de chaque opération de stockage, en secondes
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            data_dir: PathBuf::from("data"),
            timeout_secs: 10,
        }
    }
}

/// Les deux faces d'un même backend
#[derive(Clone)]
pub struct StoreHandles {
    pub alerts: Arc<dyn AlertStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

impl StoreHandles {
    pub fn from_backend<S: AlertStore + SnapshotStore + 'static>(store: Arc<S>) -> Self {
        Self {
            alerts: store.clone(),
            snapshots: store,
        }
    }
}

pub fn open(config: &StoreConfig) -> Result<StoreHandles, PersistenceFailure> {
    match config.backend {
        StoreBackend::Json => {
            let store = json_file::JsonFileStore::open(&config.data_dir)?;
            tracing::info!(dir = %config.data_dir.display(), "json store opened");
            Ok(StoreHandles::from_backend(Arc::new(store)))
        }
        StoreBackend::Memory => {
            tracing::warn!("memory store selected, nothing survives a restart");
            Ok(StoreHandles::from_backend(Arc::new(memory::MemoryStore::new())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceSnapshot, IncomingAlert};

    fn alert(id: &str, status: &str, completed: Completed) -> PersistedAlert {
        let mut alert = PersistedAlert::first_sighting(IncomingAlert {
            alert_table_id: id.into(),
            device_id: None,
            last_ok: None,
            severity: None,
            status: Some(status.into()),
            recovered: None,
            device: DeviceSnapshot::default(),
        });
        alert.completed = completed;
        alert
    }

    #[test]
    fn merge_skips_rows_completed_since_load() {
        let mut table = BTreeMap::new();
        table.insert("5".to_string(), alert("5", "critical", Completed::Yes));

        let written = merge_into(&mut table, vec![alert("5", "ok", Completed::No), alert("6", "warn", Completed::No)]);
        assert_eq!(written, 1);
        assert_eq!(table["5"].status.as_deref(), Some("critical"));
        assert_eq!(table["6"].completed, Completed::No);
    }

    #[test]
    fn kind_names_match_serde() {
        for kind in SnapshotKind::ALL {
            assert_eq!(serde_json::to_value(kind).unwrap(), serde_json::json!(kind.as_str()));
        }
    }
}
