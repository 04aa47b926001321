/**
 * SCHEDULER - Déclenchement périodique des jobs et dispatch
 *
 * RÔLE : Un timer par job pousse l'id du job dans une file mpsc; une seule tâche
 * de dispatch (le contexte d'exécution qui détient le runner injecté) vide la
 * file et lance les jobs. Les timers ne font jamais d'I/O.
 *
 * GARANTIES :
 * - un job par id à la fois : un tick reçu pendant une exécution est ignoré et compté
 * - l'échec ou le panic d'un job est loggé et enregistré, rien d'autre ne s'arrête
 * - pas de retry : le tick suivant est le retry
 * - premier tick immédiat au démarrage
 */

use crate::error::PipelineError;
use crate::health::HealthTracker;
use crate::jobs::{JobKind, JobReport};
use crate::state::{new_state, try_claim, InFlight};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Exécute un job; implémenté par le pipeline
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job: JobKind) -> Result<JobReport, PipelineError>;
}

#[derive(Debug, Default)]
pub struct Scheduler {
    jobs: BTreeMap<JobKind, Duration>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre `job`; un second appel met à jour l'intervalle sans dupliquer le timer.
    /// Retourne `true` si le job était inconnu.
    pub fn register(&mut self, job: JobKind, every: Duration) -> bool {
        self.jobs.insert(job, every).is_none()
    }

    pub fn jobs(&self) -> &BTreeMap<JobKind, Duration> {
        &self.jobs
    }

    /// Démarre timers et dispatcher sur le runtime courant
    pub fn start(self, runner: Arc<dyn JobRunner>, health: HealthTracker) -> SchedulerHandle {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(None);

        let timers = self
            .jobs
            .iter()
            .map(|(&job, &every)| {
                info!(%job, every_secs = every.as_secs(), "job registered");
                tokio::spawn(timer_loop(job, every, queue_tx.clone(), stop_rx.clone()))
            })
            .collect();

        let dispatcher = tokio::spawn(dispatch_loop(queue_rx, stop_rx, runner, health));

        SchedulerHandle {
            queue: queue_tx,
            stop: stop_tx,
            dispatcher,
            timers,
        }
    }
}

/// Contrôle d'un scheduler démarré. Le lâcher sans `shutdown` arrête tout sans délai de grâce.
pub struct SchedulerHandle {
    queue: mpsc::UnboundedSender<JobKind>,
    stop: watch::Sender<Option<Duration>>,
    dispatcher: JoinHandle<()>,
    timers: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Exécution manuelle, soumise au même garde "un à la fois"
    pub fn trigger(&self, job: JobKind) -> bool {
        self.queue.send(job).is_ok()
    }

    /// Arrête les timers, laisse `grace` aux jobs en cours puis abandonne le reste
    pub async fn shutdown(self, grace: Duration) {
        self.stop.send_replace(Some(grace));
        for timer in self.timers {
            let _ = timer.await;
        }
        if let Err(e) = self.dispatcher.await {
            error!(error = %e, "dispatcher ended abnormally");
        }
        info!("scheduler stopped");
    }
}

async fn timer_loop(
    job: JobKind,
    every: Duration,
    queue: mpsc::UnboundedSender<JobKind>,
    mut stop: watch::Receiver<Option<Duration>>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if queue.send(job).is_err() {
                    break;
                }
            }
            _ = stop.changed() => break,
        }
    }
}

async fn dispatch_loop(
    mut queue: mpsc::UnboundedReceiver<JobKind>,
    mut stop: watch::Receiver<Option<Duration>>,
    runner: Arc<dyn JobRunner>,
    health: HealthTracker,
) {
    let in_flight: InFlight<JobKind> = new_state(HashSet::new());
    let mut tasks: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            job = queue.recv() => match job {
                Some(job) => launch(job, &mut tasks, &in_flight, &runner, &health),
                None => break,
            },
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            _ = stop.changed() => break,
        }
    }

    let grace = (*stop.borrow()).unwrap_or_default();
    if tasks.is_empty() {
        return;
    }
    info!(running = tasks.len(), grace_secs = grace.as_secs(), "waiting for in-flight jobs");
    let drained = tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(abandoned = tasks.len(), "grace period elapsed, aborting jobs");
        tasks.shutdown().await;
    }
}

/// Annule la tâche quand le handle est lâché (abort du job à l'arrêt)
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn launch(
    job: JobKind,
    tasks: &mut JoinSet<()>,
    in_flight: &InFlight<JobKind>,
    runner: &Arc<dyn JobRunner>,
    health: &HealthTracker,
) {
    let Some(guard) = try_claim(in_flight, job) else {
        warn!(%job, "previous run still in flight, tick skipped");
        health.record_skipped(job);
        return;
    };
    let runner = runner.clone();
    let health = health.clone();

    tasks.spawn(async move {
        let _guard = guard;
        let started = Instant::now();
        info!(%job, "job started");

        let mut worker = AbortOnDrop(tokio::spawn(async move { runner.run(job).await }));
        match (&mut worker.0).await {
            Ok(Ok(report)) => {
                let elapsed = started.elapsed();
                info!(
                    %job,
                    processed = report.processed,
                    written = report.written,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "job finished"
                );
                health.record_success(job, elapsed);
            }
            Ok(Err(e)) => {
                error!(%job, error = %e, "job failed, waiting for next tick");
                health.record_failure(job, started.elapsed(), e.to_string());
            }
            Err(e) => {
                error!(%job, error = %e, "job panicked");
                health.record_failure(job, started.elapsed(), format!("panicked: {e}"));
            }
        }
    });
}
