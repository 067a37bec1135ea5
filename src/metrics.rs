use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

pub const VIEWS: &str = "views";
pub const DIRECTORIES: &str = "directories";

/// Cache metrics collector
#[derive(Clone)]
pub struct CacheMetrics {
    /// Lookups by cache and result (hit, miss, stale)
    pub lookups_total: CounterVec,
    /// Freshly built entries discarded because another caller installed first
    pub install_races_lost: CounterVec,
    /// Evictions by cache and reason
    pub evictions_total: CounterVec,
    /// Reconciliation passes by kind
    pub passes_total: CounterVec,
    /// Reconciliation passes dropped because another pass was running
    pub passes_dropped: CounterVec,
    /// Reconciliation pass duration in seconds
    pub pass_duration: HistogramVec,
    /// Current number of entries
    pub entries: GaugeVec,
}

impl CacheMetrics {
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let lookups_total = CounterVec::new(
            Opts::new("fileview_cache_lookups_total", "Cache lookups"),
            &["cache", "result"],
        )?;

        let install_races_lost = CounterVec::new(
            Opts::new(
                "fileview_cache_install_races_lost_total",
                "Built entries discarded after losing an install race",
            ),
            &["cache"],
        )?;

        let evictions_total = CounterVec::new(
            Opts::new("fileview_cache_evictions_total", "Cache evictions"),
            &["cache", "reason"],
        )?;

        let passes_total = CounterVec::new(
            Opts::new("fileview_reconciliation_passes_total", "Reconciliation passes run"),
            &["pass"],
        )?;

        let passes_dropped = CounterVec::new(
            Opts::new(
                "fileview_reconciliation_passes_dropped_total",
                "Reconciliation passes dropped while another pass was running",
            ),
            &["pass"],
        )?;

        let pass_duration = HistogramVec::new(
            HistogramOpts::new(
                "fileview_reconciliation_pass_duration_seconds",
                "Reconciliation pass duration in seconds",
            ),
            &["pass"],
        )?;

        let entries =
            GaugeVec::new(Opts::new("fileview_cache_entries", "Cached entries"), &["cache"])?;

        registry.register(Box::new(lookups_total.clone()))?;
        registry.register(Box::new(install_races_lost.clone()))?;
        registry.register(Box::new(evictions_total.clone()))?;
        registry.register(Box::new(passes_total.clone()))?;
        registry.register(Box::new(passes_dropped.clone()))?;
        registry.register(Box::new(pass_duration.clone()))?;
        registry.register(Box::new(entries.clone()))?;

        Ok(Self {
            lookups_total,
            install_races_lost,
            evictions_total,
            passes_total,
            passes_dropped,
            pass_duration,
            entries,
        })
    }

    /// Collector bound to a private registry.
    pub fn unregistered() -> Result<Self, prometheus::Error> {
        Self::new(Arc::new(Registry::new()))
    }

    pub fn record_lookup(&self, cache: &str, result: &str) {
        self.lookups_total.with_label_values(&[cache, result]).inc();
    }

    pub fn record_race_lost(&self, cache: &str) {
        self.install_races_lost.with_label_values(&[cache]).inc();
    }

    pub fn record_evictions(&self, cache: &str, reason: &str, count: usize) {
        if count > 0 {
            self.evictions_total.with_label_values(&[cache, reason]).inc_by(count as f64);
        }
    }

    pub fn record_pass(&self, pass: &str, duration_secs: f64) {
        self.passes_total.with_label_values(&[pass]).inc();
        self.pass_duration.with_label_values(&[pass]).observe(duration_secs);
    }

    pub fn record_pass_dropped(&self, pass: &str) {
        self.passes_dropped.with_label_values(&[pass]).inc();
    }

    pub fn update_entries(&self, cache: &str, count: usize) {
        self.entries.with_label_values(&[cache]).set(count as f64);
    }

    pub fn races_lost(&self, cache: &str) -> f64 {
        self.install_races_lost.with_label_values(&[cache]).get()
    }

    pub fn passes_dropped(&self, pass: &str) -> f64 {
        self.passes_dropped.with_label_values(&[pass]).get()
    }

    pub fn passes_run(&self, pass: &str) -> f64 {
        self.passes_total.with_label_values(&[pass]).get()
    }
}
