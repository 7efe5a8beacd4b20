use crate::aggregate::{apply_department_filter, group_by_machine};
use crate::api::{ApiError, Backend};
use crate::charts::ChartRegistry;
use crate::config::{AppConfig, DASHBOARD_REFRESH, SCAN_LOG_IDLE, SCAN_LOG_REFRESH};
use crate::model::{CardSummary, MachineAggregate, ScanLogToday, Status};
use crate::render::{self, CardView, RenderedCard};
use crate::status::{StatusCounts, classify};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;

const DASHBOARD_RESOURCE: &str = "dashboard";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    resource: String,
    generation: u64,
}

/// Hands out increasing tickets per polled resource so late replies can be dropped.
#[derive(Default)]
pub struct GenerationTracker {
    latest: Mutex<HashMap<String, u64>>,
}

impl GenerationTracker {
    pub fn begin(&self, resource: &str) -> Ticket {
        let mut latest = self.latest.lock().expect("generation tracker poisoned");
        let slot = latest.entry(resource.to_string()).or_insert(0);
        *slot += 1;
        Ticket {
            resource: resource.to_string(),
            generation: *slot,
        }
    }

    /// True while no newer request for the same resource has been dispatched.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        let latest = self.latest.lock().expect("generation tracker poisoned");
        latest.get(&ticket.resource).copied() == Some(ticket.generation)
    }

    pub fn forget(&self, resource: &str) {
        if let Ok(mut latest) = self.latest.lock() {
            latest.remove(resource);
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MachineEntry {
    pub aggregate: MachineAggregate,
    pub status: Status,
    pub card: CardView,
}

#[derive(Debug, Default)]
pub struct DashboardSnapshot {
    pub machines: Vec<MachineEntry>,
    pub cards: Vec<RenderedCard>,
    pub counts: StatusCounts,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub generation: u64,
    pub last_error: Option<String>,
}

struct ScanLogWatch {
    log: Option<ScanLogToday>,
    refreshed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_read: Instant,
    /// Set once the first fetch has landed; concurrent first readers wait on it.
    first_load: Arc<OnceCell<()>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScanLogState {
    pub machine_no: String,
    pub log: Option<ScanLogToday>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Latest rendered dashboard, chart ownership and request generations.
#[derive(Default)]
pub struct DashboardStore {
    snapshot: RwLock<Arc<DashboardSnapshot>>,
    charts: Mutex<ChartRegistry>,
    generations: GenerationTracker,
    scan_logs: RwLock<HashMap<String, ScanLogWatch>>,
}

impl DashboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Arc<DashboardSnapshot> {
        self.snapshot.read().await.clone()
    }

    #[cfg(test)]
    pub fn chart_count(&self) -> usize {
        self.charts.lock().map(|c| c.len()).unwrap_or_default()
    }

    async fn record_error(&self, message: String) {
        let mut guard = self.snapshot.write().await;
        let next = DashboardSnapshot {
            machines: guard.machines.clone(),
            cards: guard.cards.clone(),
            counts: guard.counts,
            refreshed_at: guard.refreshed_at,
            generation: guard.generation,
            last_error: Some(message),
        };
        *guard = Arc::new(next);
    }
}

fn scan_log_resource(machine_no: &str) -> String {
    format!("scan-log:{machine_no}")
}

#[derive(Clone)]
pub struct Poller {
    backend: Arc<dyn Backend>,
    store: Arc<DashboardStore>,
    config: Arc<AppConfig>,
}

impl Poller {
    pub fn new(backend: Arc<dyn Backend>, store: Arc<DashboardStore>, config: Arc<AppConfig>) -> Self {
        Self {
            backend,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<DashboardStore> {
        &self.store
    }

    /// Refreshes the whole dashboard every 30 seconds. Each refresh runs as
    /// its own task so a slow backend never delays the next dispatch.
    pub fn spawn_dashboard_loop(&self) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(DASHBOARD_REFRESH);
            loop {
                ticker.tick().await;
                poller.dispatch_dashboard();
            }
        })
    }

    pub fn dispatch_dashboard(&self) -> JoinHandle<()> {
        let ticket = self.begin_dashboard();
        let poller = self.clone();
        tokio::spawn(async move {
            let _ = poller.refresh_dashboard(ticket).await;
        })
    }

    pub fn begin_dashboard(&self) -> Ticket {
        self.store.generations.begin(DASHBOARD_RESOURCE)
    }

    /// Fetch, filter, aggregate, classify and render. Returns `Ok(false)`
    /// when a newer refresh was dispatched while this one was in flight.
    pub async fn refresh_dashboard(&self, ticket: Ticket) -> Result<bool, ApiError> {
        let rows = match self.backend.get_data().await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!("Dashboard refresh #{} failed: {err}", ticket.generation);
                if self.store.generations.is_current(&ticket) {
                    self.store.record_error(format!("failed to load: {err}")).await;
                }
                return Err(err);
            }
        };
        let rows = apply_department_filter(rows, &self.config.context.department);
        let aggregates = group_by_machine(&rows);
        let summaries = self.fetch_summaries(&aggregates).await;

        if !self.store.generations.is_current(&ticket) {
            tracing::debug!("Discarding stale dashboard refresh #{}", ticket.generation);
            return Ok(false);
        }

        let now = Utc::now();
        let (machines, chart_total) = {
            let mut charts = self.store.charts.lock().expect("chart registry poisoned");
            for aggregate in &aggregates {
                if let Some(summary) = summaries.get(&aggregate.machine_no) {
                    if !summary.labels.is_empty() && !summary.daily.is_empty() {
                        charts.upsert(&aggregate.machine_no, summary.labels.clone(), summary.daily.clone());
                    }
                }
            }
            let dropped = charts.retain_machines(aggregates.iter().map(|a| a.machine_no.as_str()));
            if dropped > 0 {
                tracing::debug!("Disposed {dropped} charts for removed machines");
            }
            let machines = aggregates
                .into_iter()
                .map(|aggregate| {
                    let status = classify(&aggregate, now);
                    let card = render::card_view(
                        &aggregate,
                        status,
                        charts.get(&aggregate.machine_no),
                        summaries.get(&aggregate.machine_no),
                        &self.config,
                    );
                    MachineEntry {
                        aggregate,
                        status,
                        card,
                    }
                })
                .collect::<Vec<_>>();
            (machines, charts.len())
        };

        let cards: Vec<RenderedCard> = machines.iter().map(|m| render::render_card(&m.card)).collect();
        let counts = StatusCounts::tally(machines.iter().map(|m| m.status));
        let mut guard = self.store.snapshot.write().await;
        // Another refresh may have been dispatched while rendering.
        if !self.store.generations.is_current(&ticket) {
            return Ok(false);
        }
        tracing::info!(
            "Dashboard refreshed: {} machines ({} ready, {} active, {} done), {} charts",
            counts.all,
            counts.ready,
            counts.active,
            counts.done,
            chart_total
        );
        *guard = Arc::new(DashboardSnapshot {
            machines,
            cards,
            counts,
            refreshed_at: Some(now),
            generation: ticket.generation,
            last_error: None,
        });
        Ok(true)
    }

    async fn fetch_summaries(&self, aggregates: &[MachineAggregate]) -> HashMap<String, CardSummary> {
        let mut tasks = JoinSet::new();
        for aggregate in aggregates {
            let Some(url) = self.config.summary_url(&aggregate.machine_no) else {
                continue;
            };
            let backend = Arc::clone(&self.backend);
            let machine_no = aggregate.machine_no.clone();
            tasks.spawn(async move {
                let result = backend.card_summary(&url).await;
                (machine_no, url, result)
            });
        }

        let mut summaries = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((machine_no, _, Ok(summary))) => {
                    summaries.insert(machine_no, summary);
                }
                Ok((machine_no, url, Err(err))) => {
                    tracing::warn!("Card summary for {machine_no} ({url}) failed: {err}");
                }
                Err(err) => tracing::warn!("Card summary task failed: {err}"),
            }
        }
        summaries
    }

    /// Current scan log for one machine. The first request starts a 10 second
    /// refresh loop that stops once nobody has asked for a minute.
    pub async fn scan_log(&self, machine_no: &str) -> ScanLogState {
        let first_load = {
            let mut watches = self.store.scan_logs.write().await;
            let watch = watches
                .entry(machine_no.to_string())
                .or_insert_with(|| ScanLogWatch {
                    log: None,
                    refreshed_at: None,
                    last_error: None,
                    last_read: Instant::now(),
                    first_load: Arc::new(OnceCell::new()),
                });
            watch.last_read = Instant::now();
            Arc::clone(&watch.first_load)
        };
        first_load
            .get_or_init(|| async {
                let ticket = self.store.generations.begin(&scan_log_resource(machine_no));
                let _ = self.refresh_scan_log(machine_no, ticket).await;
                self.spawn_scan_log_loop(machine_no.to_string());
            })
            .await;

        let watches = self.store.scan_logs.read().await;
        match watches.get(machine_no) {
            Some(watch) => ScanLogState {
                machine_no: machine_no.to_string(),
                log: watch.log.clone(),
                refreshed_at: watch.refreshed_at,
                error: watch.last_error.clone(),
            },
            None => ScanLogState {
                machine_no: machine_no.to_string(),
                ..ScanLogState::default()
            },
        }
    }

    fn spawn_scan_log_loop(&self, machine_no: String) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(SCAN_LOG_REFRESH);
            // The first tick fires immediately and the caller already refreshed.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if poller.expire_idle_scan_log(&machine_no).await {
                    tracing::debug!("Scan log watch for {machine_no} stopped after idling");
                    break;
                }
                let ticket = poller.store.generations.begin(&scan_log_resource(&machine_no));
                let task_poller = poller.clone();
                let task_machine = machine_no.clone();
                tokio::spawn(async move {
                    let _ = task_poller.refresh_scan_log(&task_machine, ticket).await;
                });
            }
        })
    }

    async fn expire_idle_scan_log(&self, machine_no: &str) -> bool {
        let mut watches = self.store.scan_logs.write().await;
        let idle = watches
            .get(machine_no)
            .is_none_or(|watch| watch.last_read.elapsed() > SCAN_LOG_IDLE);
        if idle {
            watches.remove(machine_no);
            self.store.generations.forget(&scan_log_resource(machine_no));
        }
        idle
    }

    pub async fn refresh_scan_log(&self, machine_no: &str, ticket: Ticket) -> Result<bool, ApiError> {
        let result = self.backend.scan_logs_today(machine_no).await;
        if !self.store.generations.is_current(&ticket) {
            tracing::debug!("Discarding stale scan log #{} for {machine_no}", ticket.generation);
            return Ok(false);
        }
        let mut watches = self.store.scan_logs.write().await;
        let Some(watch) = watches.get_mut(machine_no) else {
            return Ok(false);
        };
        match result {
            Ok(log) => {
                watch.log = Some(log);
                watch.refreshed_at = Some(Utc::now());
                watch.last_error = None;
                Ok(true)
            }
            Err(err) => {
                tracing::warn!("Scan log refresh for {machine_no} failed: {err}");
                watch.last_error = Some(format!("failed to load: {err}"));
                Err(err)
            }
        }
    }
}
