/**
 * JOBS - Les itérations du pipeline fetch → réconciliation/prévision/agrégation → stockage
 *
 * RÔLE : `Pipeline` détient les collaborateurs injectés (source, stockage,
 * moteur de prévision) et exécute un job par appel. Chaque type de snapshot
 * est écrit par exactement un job.
 *
 * JOBS :
 * - alerts        : alertes paginées + équipement de chaque alerte → fusion dans `alerts`
 * - graphs        : graphe brut → `graph_data`, prévision → `graph_forecast`
 * - port_failures : classement des ports par erreurs → `port_failures`
 * - consumption   : totaux internet / hors internet → deux snapshots
 * - device_names  : carte device_id → noms → `device_names`
 *
 * Toute opération de stockage est bornée par `store_timeout`.
 */

use crate::aggregate::{consumption_totals, device_name_map, exclude_descr_type, rank_port_failures};
use crate::config::{AlertsConf, GraphConf, KernelConfig, PortsConf};
use crate::error::{PersistenceFailure, PipelineError};
use crate::fetch::{self, TelemetrySource, TimeoutSource};
use crate::forecast::graph::HistoricalBundle;
use crate::forecast::ForecastEngine;
use crate::models::{field_string, DeviceSnapshot, IncomingAlert};
use crate::reconcile;
use crate::scheduler::JobRunner;
use crate::store::{AlertStore, SnapshotKind, SnapshotStore, StoreHandles};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Alerts,
    Graphs,
    PortFailures,
    Consumption,
    DeviceNames,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::Alerts,
        JobKind::Graphs,
        JobKind::PortFailures,
        JobKind::Consumption,
        JobKind::DeviceNames,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Alerts => "alerts",
            JobKind::Graphs => "graphs",
            JobKind::PortFailures => "port_failures",
            JobKind::Consumption => "consumption",
            JobKind::DeviceNames => "device_names",
        }
    }

    /// Snapshots dont ce job est l'unique écrivain
    pub fn snapshot_kinds(self) -> &'static [SnapshotKind] {
        match self {
            JobKind::Alerts => &[],
            JobKind::Graphs => &[SnapshotKind::GraphData, SnapshotKind::GraphForecast],
            JobKind::PortFailures => &[SnapshotKind::PortFailures],
            JobKind::Consumption => &[SnapshotKind::InternetConsumption, SnapshotKind::NonInternetConsumption],
            JobKind::DeviceNames => &[SnapshotKind::DeviceNames],
        }
    }

    /// Intervalle configuré
    pub fn interval(self, config: &KernelConfig) -> Duration {
        let s = &config.schedule;
        let minutes = match self {
            JobKind::Alerts => s.alerts_minutes,
            JobKind::Graphs => s.graphs_minutes,
            JobKind::PortFailures => s.port_failures_minutes,
            JobKind::Consumption => s.consumption_minutes,
            JobKind::DeviceNames => s.device_names_minutes,
        };
        Duration::from_secs(minutes * 60)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bilan d'une itération réussie
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobReport {
    /// Enregistrements reçus et traités
    pub processed: usize,
    /// Lignes écrites dans le stockage
    pub written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<reconcile::ReconcileSummary>,
    /// Séries prévues par repli
    pub fallbacks: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub alerts: AlertsConf,
    pub graph: GraphConf,
    pub ports: PortsConf,
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
}

impl From<&KernelConfig> for PipelineSettings {
    fn from(config: &KernelConfig) -> Self {
        Self {
            alerts: config.alerts.clone(),
            graph: config.graph.clone(),
            ports: config.ports.clone(),
            fetch_timeout: config.fetch_timeout(),
            store_timeout: config.store_timeout(),
        }
    }
}

pub struct Pipeline {
    source: TimeoutSource,
    alerts: Arc<dyn AlertStore>,
    snapshots: Arc<dyn SnapshotStore>,
    engine: ForecastEngine,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        store: StoreHandles,
        engine: ForecastEngine,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source: TimeoutSource::new(source, settings.fetch_timeout),
            alerts: store.alerts,
            snapshots: store.snapshots,
            engine,
            settings,
        }
    }

    async fn stored<T, F>(&self, operation: &'static str, fut: F) -> Result<T, PersistenceFailure>
    where
        F: Future<Output = Result<T, PersistenceFailure>>,
    {
        tokio::time::timeout(self.settings.store_timeout, fut)
            .await
            .map_err(|_| PersistenceFailure::Timeout { operation })?
    }

    async fn replace(&self, kind: SnapshotKind, data: serde_json::Value) -> Result<(), PersistenceFailure> {
        let snapshot = self.stored("replace_snapshot", self.snapshots.replace(kind, data)).await?;
        debug!(%kind, id = %snapshot.id, "snapshot written");
        Ok(())
    }

    pub async fn sync_alerts(&self) -> Result<JobReport, PipelineError> {
        let cfg = &self.settings.alerts;
        let raw = fetch::fetch_alerts(&self.source, cfg.page_size, cfg.max_pages).await?;

        let mut devices: HashMap<String, DeviceSnapshot> = HashMap::new();
        let mut incoming = Vec::with_capacity(raw.len());
        for entry in &raw {
            let device = match field_string(entry, &["device_id"]) {
                Some(id) => {
                    if !devices.contains_key(&id) {
                        let fetched = fetch::fetch_device(&self.source, &id).await?;
                        devices.insert(id.clone(), fetched);
                    }
                    devices.get(&id).cloned().unwrap_or_default()
                }
                None => DeviceSnapshot::default(),
            };
            match IncomingAlert::from_raw(entry, device) {
                Some(alert) => incoming.push(alert),
                None => debug!("alert entry without alert_table_id dropped"),
            }
        }

        let persisted = self.stored("load_alerts", self.alerts.load_alerts()).await?;
        let fetched = incoming.len();
        let plan = reconcile::plan(incoming, &persisted);
        let summary = plan.summary(fetched);
        let written = self.stored("merge_alerts", self.alerts.merge_alerts(plan.writes())).await?;

        info!(
            fetched = summary.fetched,
            inserted = summary.inserted,
            updated = summary.updated,
            frozen = summary.frozen,
            unchanged = summary.unchanged,
            "alerts reconciled"
        );
        Ok(JobReport {
            processed: raw.len(),
            written,
            reconcile: Some(summary),
            fallbacks: 0,
        })
    }

    pub async fn refresh_graphs(&self) -> Result<JobReport, PipelineError> {
        let graph = &self.settings.graph;
        let params: Vec<(String, String)> = graph.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let payload = fetch::fetch_graph(&self.source, &graph.endpoint, &params).await?;

        // validation avant toute écriture
        let bundle = HistoricalBundle::from_value(&payload, self.engine.config().max_series_len)?;
        self.replace(SnapshotKind::GraphData, payload).await?;

        let forecast = self.engine.forecast_bundle(&bundle);
        let fallbacks = forecast.series.iter().filter(|s| s.fallback).count();
        let value = serde_json::to_value(&forecast).map_err(PersistenceFailure::from)?;
        self.replace(SnapshotKind::GraphForecast, value).await?;

        info!(series = bundle.series.len(), fallbacks, horizon = forecast.meta.horizon, "graph forecast refreshed");
        Ok(JobReport {
            processed: bundle.series.len(),
            written: 2,
            reconcile: None,
            fallbacks,
        })
    }

    pub async fn refresh_port_failures(&self) -> Result<JobReport, PipelineError> {
        let devices = fetch::fetch_devices(&self.source).await?;
        let names = device_name_map(&devices);
        let ports = fetch::fetch_ports(&self.source, None).await?;

        let ranked = rank_port_failures(&ports, &names, self.settings.ports.failure_top_n);
        let value = serde_json::to_value(&ranked).map_err(PersistenceFailure::from)?;
        self.replace(SnapshotKind::PortFailures, value).await?;

        info!(ports = ports.len(), failing = ranked.len(), "port failures ranked");
        Ok(JobReport {
            processed: ports.len(),
            written: 1,
            ..Default::default()
        })
    }

    pub async fn compute_consumption(&self) -> Result<JobReport, PipelineError> {
        let descr_type = self.settings.ports.internet_descr_type.as_str();
        let internet = fetch::fetch_ports(&self.source, Some(descr_type)).await?;
        let all = fetch::fetch_ports(&self.source, None).await?;
        let processed = all.len();
        let rest = exclude_descr_type(all, descr_type);

        let internet_totals = consumption_totals(&internet);
        let rest_totals = consumption_totals(&rest);
        self.replace(
            SnapshotKind::InternetConsumption,
            serde_json::to_value(&internet_totals).map_err(PersistenceFailure::from)?,
        )
        .await?;
        self.replace(
            SnapshotKind::NonInternetConsumption,
            serde_json::to_value(&rest_totals).map_err(PersistenceFailure::from)?,
        )
        .await?;

        info!(
            internet_gb = internet_totals.total_combined_gb,
            non_internet_gb = rest_totals.total_combined_gb,
            "consumption totals refreshed"
        );
        Ok(JobReport {
            processed,
            written: 2,
            ..Default::default()
        })
    }

    pub async fn refresh_device_names(&self) -> Result<JobReport, PipelineError> {
        let devices = fetch::fetch_devices(&self.source).await?;
        let names = device_name_map(&devices);
        let value = serde_json::to_value(&names).map_err(PersistenceFailure::from)?;
        self.replace(SnapshotKind::DeviceNames, value).await?;

        info!(devices = names.len(), "device names refreshed");
        Ok(JobReport {
            processed: devices.len(),
            written: 1,
            ..Default::default()
        })
    }
}

#[async_trait]
impl JobRunner for Pipeline {
    async fn run(&self, job: JobKind) -> Result<JobReport, PipelineError> {
        match job {
            JobKind::Alerts => self.sync_alerts().await,
            JobKind::Graphs => self.refresh_graphs().await,
            JobKind::PortFailures => self.refresh_port_failures().await,
            JobKind::Consumption => self.compute_consumption().await,
            JobKind::DeviceNames => self.refresh_device_names().await,
        }
    }
}
