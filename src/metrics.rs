//! In-process Prometheus-text counters (SPEC_FULL.md §4.10), hand-rolled
//! the way the teacher's `metrics.rs` renders its own counters rather than
//! reaching for a Prometheus client crate — the surface here is just as
//! small.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
pub struct DaemonMetrics {
    pub deploys_total: AtomicU64,
    pub activations_total: AtomicU64,
    pub webhook_deliveries_total: AtomicU64,
    pub webhook_failures_total: AtomicU64,
    pub analytics_events_dropped_total: AtomicU64,
    requests_by_site: Mutex<HashMap<String, AtomicU64>>,
    started_at: Instant,
}

impl DaemonMetrics {
    pub fn new() -> Self {
        Self {
            deploys_total: AtomicU64::new(0),
            activations_total: AtomicU64::new(0),
            webhook_deliveries_total: AtomicU64::new(0),
            webhook_failures_total: AtomicU64::new(0),
            analytics_events_dropped_total: AtomicU64::new(0),
            requests_by_site: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    pub fn inc_deploys(&self) {
        self.deploys_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_activations(&self) {
        self.activations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_webhook_delivery(&self, failed: bool) {
        self.webhook_deliveries_total.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.webhook_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_analytics_dropped(&self) {
        self.analytics_events_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Bounded by `max_sites` — a request for a site not yet seen adds one
    /// entry, never more than the multi-host manager would ever run.
    pub fn inc_requests(&self, site: &str) {
        let requests = self.requests_by_site.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(counter) = requests.get(site) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        drop(requests);
        let mut requests = self.requests_by_site.lock().unwrap_or_else(|e| e.into_inner());
        requests
            .entry(site.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn render_prometheus(&self, running_sites: u64) -> String {
        let requests = self.requests_by_site.lock().unwrap_or_else(|e| e.into_inner());
        let mut per_site = String::new();
        let mut sites: Vec<&String> = requests.keys().collect();
        sites.sort();
        for site in sites {
            let count = requests[site].load(Ordering::Relaxed);
            per_site.push_str(&format!(
                "tspages_requests_total{{site=\"{site}\"}} {count}\n"
            ));
        }

        format!(
            "# HELP tspages_uptime_seconds Process uptime in seconds.\n\
             # TYPE tspages_uptime_seconds gauge\n\
             tspages_uptime_seconds {uptime}\n\
             # HELP tspages_running_sites Number of site endpoints currently running.\n\
             # TYPE tspages_running_sites gauge\n\
             tspages_running_sites {running_sites}\n\
             # HELP tspages_deploys_total Total deploys accepted since start.\n\
             # TYPE tspages_deploys_total counter\n\
             tspages_deploys_total {deploys}\n\
             # HELP tspages_activations_total Total deployment activations since start.\n\
             # TYPE tspages_activations_total counter\n\
             tspages_activations_total {activations}\n\
             # HELP tspages_webhook_deliveries_total Total webhook delivery attempts since start.\n\
             # TYPE tspages_webhook_deliveries_total counter\n\
             tspages_webhook_deliveries_total {webhook_deliveries}\n\
             # HELP tspages_webhook_failures_total Total failed webhook delivery attempts since start.\n\
             # TYPE tspages_webhook_failures_total counter\n\
             tspages_webhook_failures_total {webhook_failures}\n\
             # HELP tspages_analytics_events_dropped_total Analytics events dropped due to a full queue.\n\
             # TYPE tspages_analytics_events_dropped_total counter\n\
             tspages_analytics_events_dropped_total {analytics_dropped}\n\
             # HELP tspages_requests_total Requests served per site since start.\n\
             # TYPE tspages_requests_total counter\n\
             {per_site}",
            uptime = self.uptime_secs(),
            deploys = self.deploys_total.load(Ordering::Relaxed),
            activations = self.activations_total.load(Ordering::Relaxed),
            webhook_deliveries = self.webhook_deliveries_total.load(Ordering::Relaxed),
            webhook_failures = self.webhook_failures_total.load(Ordering::Relaxed),
            analytics_dropped = self.analytics_events_dropped_total.load(Ordering::Relaxed),
        )
    }
}

impl Default for DaemonMetrics {
    fn default() -> Self {
        Self::new()
    }
}
