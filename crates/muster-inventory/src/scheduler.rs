//! Discovery scheduler.
//!
//! One poll loop per connector, a global cap on concurrently running
//! discovery jobs, and at most one in-flight discovery+sync per
//! `(tenant, platform)` pair — a due tick that finds its pair still running
//! is skipped, not queued. Failures are recorded per tick and retried on
//! the next one; there is no backoff beyond the fixed interval.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use muster_connector::error::ConnectorError;
use muster_connector::ids::ConnectorId;
use muster_connector::registry::BoxedConnector;
use muster_connector::types::Platform;
use muster_core::TenantId;

use crate::sync::{SyncEngine, SyncResult};

/// Fallback poll interval for empty or unparsable interval strings.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3600);

/// Parse an interval spec like `"30s"`, `"15m"`, `"1h"`, `"1d"` or a bare
/// number of seconds.
///
/// Anything empty, zero, or unparsable falls back to
/// [`DEFAULT_POLL_INTERVAL`] rather than failing scheduler construction.
#[must_use]
pub fn parse_interval(spec: &str) -> Duration {
    let spec = spec.trim();
    if spec.is_empty() {
        return DEFAULT_POLL_INTERVAL;
    }

    let (number, unit) = match spec.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => spec.split_at(idx),
        None => (spec, "s"),
    };

    let Ok(value) = number.parse::<u64>() else {
        warn!(spec = %spec, "Unparsable poll interval, using default");
        return DEFAULT_POLL_INTERVAL;
    };
    if value == 0 {
        warn!(spec = %spec, "Zero poll interval, using default");
        return DEFAULT_POLL_INTERVAL;
    }

    match unit.trim() {
        "s" | "sec" | "secs" => Duration::from_secs(value),
        "m" | "min" | "mins" => Duration::from_secs(value * 60),
        "h" | "hr" | "hours" => Duration::from_secs(value * 3600),
        "d" | "day" | "days" => Duration::from_secs(value * 86_400),
        _ => {
            warn!(spec = %spec, "Unknown interval unit, using default");
            DEFAULT_POLL_INTERVAL
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Global cap on concurrently running discovery jobs.
    pub max_concurrent_discoveries: usize,

    /// A job running longer than this is recorded as failed and its
    /// concurrency slot freed. The connector's session is left alone; the
    /// next tick health-checks and reconnects if needed.
    pub job_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_discoveries: 5,
            job_timeout: Duration::from_secs(600),
        }
    }
}

/// Scheduling state of one connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    /// Waiting for the next tick.
    #[default]
    Idle,
    /// A discovery+sync is in flight.
    Running,
    /// The last run completed.
    Succeeded,
    /// The last run failed or timed out.
    Failed,
}

/// Observable status of one scheduled connector.
#[derive(Debug, Clone, Default)]
pub struct JobStatus {
    pub state: JobState,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct Shared {
    config: SchedulerConfig,
    engine: SyncEngine,
    semaphore: Semaphore,
    inflight: Mutex<HashSet<(TenantId, Platform)>>,
    jobs: RwLock<HashMap<ConnectorId, JobStatus>>,
    results: broadcast::Sender<SyncResult>,
    shutdown: CancellationToken,
}

/// Drives periodic discovery for every added connector.
///
/// Created once at startup and torn down with [`shutdown`]; the only state
/// it owns is the concurrency semaphore and the per-connector job table.
///
/// [`shutdown`]: DiscoveryScheduler::shutdown
pub struct DiscoveryScheduler {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DiscoveryScheduler {
    /// Create a scheduler over the given engine.
    #[must_use]
    pub fn new(engine: SyncEngine, config: SchedulerConfig) -> Self {
        let (results, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                semaphore: Semaphore::new(config.max_concurrent_discoveries),
                config,
                engine,
                inflight: Mutex::new(HashSet::new()),
                jobs: RwLock::new(HashMap::new()),
                results,
                shutdown: CancellationToken::new(),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to every completed run's [`SyncResult`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncResult> {
        self.shared.results.subscribe()
    }

    /// Start a poll loop for a connector.
    ///
    /// The first discovery runs immediately; after that the loop re-arms
    /// every `interval_spec` (see [`parse_interval`] for the format and its
    /// one-hour fallback).
    pub async fn add_connector(
        &self,
        tenant_id: TenantId,
        connector: BoxedConnector,
        interval_spec: &str,
    ) -> ConnectorId {
        let connector_id = ConnectorId::new();
        let period = parse_interval(interval_spec);

        self.shared
            .jobs
            .write()
            .await
            .insert(connector_id, JobStatus::default());

        info!(
            connector_id = %connector_id,
            platform = %connector.platform(),
            account = %connector.account(),
            interval_secs = period.as_secs(),
            "Scheduling connector"
        );

        let shared = self.shared.clone();
        let handle = tokio::spawn(run_poll_loop(shared, connector_id, tenant_id, connector, period));
        self.handles.lock().await.push(handle);
        connector_id
    }

    /// Current status of a scheduled connector.
    pub async fn job_status(&self, connector_id: ConnectorId) -> Option<JobStatus> {
        self.shared.jobs.read().await.get(&connector_id).cloned()
    }

    /// Cancel in-flight discoveries and stop every poll loop.
    pub async fn shutdown(&self) {
        info!("Scheduler shutdown requested");
        self.shared.shutdown.cancel();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Poll loop ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn run_poll_loop(
    shared: Arc<Shared>,
    connector_id: ConnectorId,
    tenant_id: TenantId,
    connector: BoxedConnector,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = shared.shutdown.cancelled() => {
                debug!(connector_id = %connector_id, "Poll loop stopping");
                break;
            }
            _ = ticker.tick() => {
                run_once(&shared, connector_id, tenant_id, &connector).await;
            }
        }
    }
}

#[instrument(skip_all, fields(connector_id = %connector_id, platform = %connector.platform()))]
async fn run_once(
    shared: &Arc<Shared>,
    connector_id: ConnectorId,
    tenant_id: TenantId,
    connector: &BoxedConnector,
) {
    let pair = (tenant_id, connector.platform());

    // One in-flight discovery+sync per (tenant, platform): a still-running
    // job makes this tick a no-op.
    {
        let mut inflight = shared.inflight.lock().await;
        if !inflight.insert(pair) {
            debug!("Previous discovery still in flight, skipping tick");
            return;
        }
    }

    // Queue for a global concurrency slot rather than spawning unbounded
    // work; give up if shutdown arrives first.
    let permit = tokio::select! {
        () = shared.shutdown.cancelled() => None,
        permit = shared.semaphore.acquire() => permit.ok(),
    };
    let Some(_permit) = permit else {
        shared.inflight.lock().await.remove(&pair);
        return;
    };

    set_running(shared, connector_id).await;

    let outcome = timeout(
        shared.config.job_timeout,
        discover_and_sync(shared, tenant_id, connector),
    )
    .await;

    match outcome {
        Err(_) => {
            warn!(
                timeout_secs = shared.config.job_timeout.as_secs(),
                "Discovery job timed out, freeing its slot"
            );
            set_finished(
                shared,
                connector_id,
                Some(format!(
                    "timed out after {} seconds",
                    shared.config.job_timeout.as_secs()
                )),
            )
            .await;
        }
        Ok(Err(e)) => {
            warn!(error = %e, error_code = e.error_code(), "Discovery run failed");
            set_finished(shared, connector_id, Some(e.to_string())).await;
        }
        Ok(Ok(None)) => {
            // Shutdown fired mid-run; the partial results are discarded.
            debug!("Discarding results of cancelled discovery");
            shared.jobs.write().await.entry(connector_id).or_default().state = JobState::Idle;
        }
        Ok(Ok(Some(result))) => {
            set_finished(shared, connector_id, None).await;
            // Receivers may come and go; a send with no subscribers is fine.
            let _ = shared.results.send(result);
        }
    }

    shared.inflight.lock().await.remove(&pair);
}

/// Health-check, reconnect when unhealthy, discover, reconcile.
///
/// Returns `Ok(None)` when shutdown interrupted the discovery — a cancelled
/// run is not an error, but its results are discarded.
async fn discover_and_sync(
    shared: &Arc<Shared>,
    tenant_id: TenantId,
    connector: &BoxedConnector,
) -> Result<Option<SyncResult>, ConnectorError> {
    if let Err(e) = connector.health().await {
        debug!(error = %e, "Health probe failed, reconnecting");
        connector.connect().await?;
    }

    let discovery = connector
        .discover_assets(tenant_id, &shared.shutdown)
        .await?;

    if shared.shutdown.is_cancelled() {
        return Ok(None);
    }

    Ok(Some(
        shared
            .engine
            .sync(tenant_id, connector.platform(), discovery)
            .await,
    ))
}

async fn set_running(shared: &Arc<Shared>, connector_id: ConnectorId) {
    let mut jobs = shared.jobs.write().await;
    let status = jobs.entry(connector_id).or_default();
    status.state = JobState::Running;
    status.last_started_at = Some(Utc::now());
}

async fn set_finished(shared: &Arc<Shared>, connector_id: ConnectorId, error: Option<String>) {
    let mut jobs = shared.jobs.write().await;
    let status = jobs.entry(connector_id).or_default();
    status.state = if error.is_some() {
        JobState::Failed
    } else {
        JobState::Succeeded
    };
    status.last_finished_at = Some(Utc::now());
    status.last_error = error;
}
