use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Event encoding/decoding (throughput, failures by reason)
// - Registry builds
// - Event bus publishing
// - State manager updates and cache occupancy
// - Replay/fold latency
//
// Metrics are optional; components take an `Arc<Metrics>` when wired up.
// ============================================================================

/// Central metrics registry for the event sourcing core
pub struct Metrics {
    registry: Registry,

    // Codec Metrics
    pub events_encoded: IntCounterVec,
    pub events_decoded: IntCounterVec,
    pub decode_failures: IntCounterVec,

    // Registry Metrics
    pub registry_builds: IntCounter,

    // Bus Metrics
    pub events_published: IntCounterVec,

    // State Manager Metrics
    pub state_updates: IntCounterVec,
    pub state_cache_entries: IntGauge,
    pub state_cache_evictions: IntCounter,

    // Replay Metrics
    pub replay_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Codec Metrics
        let events_encoded = IntCounterVec::new(
            Opts::new("events_encoded_total", "Total typed events encoded to generic events"),
            &["aggregate_type"],
        )?;
        registry.register(Box::new(events_encoded.clone()))?;

        let events_decoded = IntCounterVec::new(
            Opts::new("events_decoded_total", "Total generic events decoded to typed events"),
            &["aggregate_type"],
        )?;
        registry.register(Box::new(events_decoded.clone()))?;

        let decode_failures = IntCounterVec::new(
            Opts::new("decode_failures_total", "Total events that failed to decode"),
            &["aggregate_type", "reason"],
        )?;
        registry.register(Box::new(decode_failures.clone()))?;

        // Registry Metrics
        let registry_builds = IntCounter::new(
            "registry_builds_total",
            "Total event type registries built",
        )?;
        registry.register(Box::new(registry_builds.clone()))?;

        // Bus Metrics
        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Total events dispatched through the event bus"),
            &["aggregate_type"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        // State Manager Metrics
        let state_updates = IntCounterVec::new(
            Opts::new("state_updates_total", "Total state manager updates"),
            &["outcome"],
        )?;
        registry.register(Box::new(state_updates.clone()))?;

        let state_cache_entries = IntGauge::new(
            "state_cache_entries",
            "Aggregate states currently held in the cache",
        )?;
        registry.register(Box::new(state_cache_entries.clone()))?;

        let state_cache_evictions = IntCounter::new(
            "state_cache_evictions_total",
            "Total aggregate states evicted from the cache",
        )?;
        registry.register(Box::new(state_cache_evictions.clone()))?;

        // Replay Metrics
        let replay_duration = HistogramVec::new(
            HistogramOpts::new("replay_duration_seconds", "Duration of folding a replay into state")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["aggregate_type"],
        )?;
        registry.register(Box::new(replay_duration.clone()))?;

        Ok(Self {
            registry,
            events_encoded,
            events_decoded,
            decode_failures,
            registry_builds,
            events_published,
            state_updates,
            state_cache_entries,
            state_cache_evictions,
            replay_duration,
        })
    }

    /// Get the Prometheus registry, e.g. to merge into an exporter
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Helper to record a state manager update outcome
    pub fn record_state_update(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.state_updates.with_label_values(&[outcome]).inc();
    }
}
