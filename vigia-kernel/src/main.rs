/**
 * VIGIA KERNEL - Point d'entrée du miroir de télémétrie
 *
 * RÔLE : Bootstrap : .env, logs, config, identifiants API, stockage, pipeline,
 * scheduler. Toute configuration invalide arrête le processus avant le premier job.
 *
 * ARRÊT : Ctrl-C → arrêt des timers, délai de grâce pour les jobs en cours.
 */

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vigia_kernel::config::{load_config, ApiCredentials};
use vigia_kernel::fetch::ObserviumClient;
use vigia_kernel::forecast::ForecastEngine;
use vigia_kernel::health::HealthTracker;
use vigia_kernel::jobs::{JobKind, Pipeline, PipelineSettings};
use vigia_kernel::scheduler::Scheduler;
use vigia_kernel::store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigia_kernel=info")))
        .init();

    let config = load_config().await.context("loading kernel config")?;
    let credentials = ApiCredentials::from_env().context("reading API credentials")?;

    let source = ObserviumClient::new(
        &credentials.url,
        &credentials.username,
        &credentials.password,
        config.fetch_timeout(),
    )
    .context("building Observium client")?;

    let stores = store::open(&config.store).context("opening store")?;
    let pipeline = Pipeline::new(
        Arc::new(source),
        stores,
        ForecastEngine::new(config.forecast.clone()),
        PipelineSettings::from(&config),
    );

    let health = HealthTracker::new();
    let mut scheduler = Scheduler::new();
    for job in JobKind::ALL {
        scheduler.register(job, job.interval(&config));
    }
    let handle = scheduler.start(Arc::new(pipeline), health);
    tracing::info!(api = %credentials.url, backend = ?config.store.backend, "vigia kernel running");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    handle
        .shutdown(Duration::from_secs(config.schedule.shutdown_grace_secs))
        .await;
    Ok(())
}
