//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Session state values for Prometheus gauge
pub const SESSION_STATE_ACTIVE: u64 = 0;
pub const SESSION_STATE_IDLE: u64 = 1;

/// Maximum number of doors to track individually
pub const MAX_DOORS: usize = 32;

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total events ever processed (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Event processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Total door touches observed (monotonic)
    touches_total: AtomicU64,
    /// Secret sequence attempts started (monotonic)
    sequence_started_total: AtomicU64,
    /// Secret sequence completions (monotonic)
    sequence_completed_total: AtomicU64,
    /// Secret sequence aborts on a wrong door (monotonic)
    sequence_reset_total: AtomicU64,
    /// Secret sequence step-timeout expiries (monotonic)
    sequence_timeout_total: AtomicU64,
    /// Remote redirect-flag activations (monotonic)
    remote_activations_total: AtomicU64,
    /// Idle transitions (monotonic)
    idle_entered_total: AtomicU64,
    /// Wake transitions out of Idle (monotonic)
    wake_total: AtomicU64,
    /// Confirmed purchases (monotonic)
    purchases_total: AtomicU64,
    /// Failed purchase attempts (monotonic)
    purchase_failures_total: AtomicU64,
    /// Total backend commands sent (monotonic)
    backend_cmds_sent: AtomicU64,
    /// Backend command latency histogram buckets (reset on report)
    backend_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of backend command latencies (reset on report)
    backend_latency_sum_us: AtomicU64,
    /// Max backend command latency (reset on report)
    backend_latency_max_us: AtomicU64,
    /// Backend commands since last report (reset on report)
    backend_cmds_since_report: AtomicU64,
    /// Backend command queue delay histogram (enqueue to worker pickup)
    backend_queue_delay_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of backend queue delays (reset on report)
    backend_queue_delay_sum_us: AtomicU64,
    /// Max backend queue delay (reset on report)
    backend_queue_delay_max_us: AtomicU64,
    /// Touch events dropped due to channel full (monotonic)
    touch_events_dropped: AtomicU64,
    /// Backend commands dropped due to channel full (monotonic)
    backend_cmds_dropped: AtomicU64,
    /// Current event queue depth (updated by sampler)
    event_queue_depth: AtomicU64,
    /// Current backend command queue depth (updated by sampler)
    backend_queue_depth: AtomicU64,
    /// Current session state (0=active, 1=idle)
    session_state: AtomicU64,
    /// Current matched length of the secret sequence
    sequence_matched: AtomicU64,
    /// Whether a door selection is live (0/1)
    selection_active: AtomicU64,
    /// Per-door touch counters
    /// Index is determined by registration order
    door_touches: [AtomicU64; MAX_DOORS],
    /// Door ids registered for per-door counting (set on catalog snapshot)
    door_ids: parking_lot::Mutex<Vec<String>>,
    /// Pre-computed door id to index mapping (for O(1) lookup without mutex)
    door_id_to_index: parking_lot::RwLock<FxHashMap<String, usize>>,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            touches_total: AtomicU64::new(0),
            sequence_started_total: AtomicU64::new(0),
            sequence_completed_total: AtomicU64::new(0),
            sequence_reset_total: AtomicU64::new(0),
            sequence_timeout_total: AtomicU64::new(0),
            remote_activations_total: AtomicU64::new(0),
            idle_entered_total: AtomicU64::new(0),
            wake_total: AtomicU64::new(0),
            purchases_total: AtomicU64::new(0),
            purchase_failures_total: AtomicU64::new(0),
            backend_cmds_sent: AtomicU64::new(0),
            backend_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            backend_latency_sum_us: AtomicU64::new(0),
            backend_latency_max_us: AtomicU64::new(0),
            backend_cmds_since_report: AtomicU64::new(0),
            backend_queue_delay_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            backend_queue_delay_sum_us: AtomicU64::new(0),
            backend_queue_delay_max_us: AtomicU64::new(0),
            touch_events_dropped: AtomicU64::new(0),
            backend_cmds_dropped: AtomicU64::new(0),
            event_queue_depth: AtomicU64::new(0),
            backend_queue_depth: AtomicU64::new(0),
            session_state: AtomicU64::new(SESSION_STATE_ACTIVE),
            sequence_matched: AtomicU64::new(0),
            selection_active: AtomicU64::new(0),
            door_touches: std::array::from_fn(|_| AtomicU64::new(0)),
            door_ids: parking_lot::Mutex::new(Vec::new()),
            door_id_to_index: parking_lot::RwLock::new(FxHashMap::default()),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Register the door ids for per-door counting (call on catalog snapshot)
    ///
    /// Idempotent for an unchanged door list; a changed list resets the
    /// per-door counters since slot indices are reassigned.
    pub fn set_doors(&self, door_ids: &[String]) {
        // Update the door list (for reporting)
        let mut doors = self.door_ids.lock();
        if doors.iter().eq(door_ids.iter().take(MAX_DOORS)) {
            return;
        }
        doors.clear();
        doors.extend(door_ids.iter().take(MAX_DOORS).cloned());
        for slot in &self.door_touches {
            slot.store(0, Ordering::Relaxed);
        }

        // Pre-compute the door id to index mapping for O(1) lookup
        let mut index_map = self.door_id_to_index.write();
        index_map.clear();
        for (idx, door_id) in door_ids.iter().take(MAX_DOORS).enumerate() {
            index_map.insert(door_id.clone(), idx);
        }
    }

    /// Get the index for a door id, or None if not registered
    /// Uses pre-computed O(1) lookup via FxHashMap (no mutex on hot path)
    #[inline]
    fn door_index(&self, door_id: &str) -> Option<usize> {
        let index_map = self.door_id_to_index.read();
        index_map.get(door_id).copied()
    }

    /// Record a door touch (lock-free after the read lock)
    #[inline]
    pub fn record_touch(&self, door_id: &str) {
        self.touches_total.fetch_add(1, Ordering::Relaxed);
        if let Some(idx) = self.door_index(door_id) {
            self.door_touches[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get per-door touch counts for all registered doors
    pub fn door_touches(&self) -> Vec<(String, u64)> {
        let doors = self.door_ids.lock();
        doors
            .iter()
            .enumerate()
            .map(|(idx, door_id)| {
                let count = self.door_touches[idx].load(Ordering::Relaxed);
                (door_id.clone(), count)
            })
            .collect()
    }

    /// Record an event was processed with given latency (lock-free)
    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        // Update histogram bucket
        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        // Update max
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_sequence_started(&self) {
        self.sequence_started_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sequence_completed(&self) {
        self.sequence_completed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sequence_reset(&self) {
        self.sequence_reset_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sequence_timeout(&self) {
        self.sequence_timeout_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_remote_activation(&self) {
        self.remote_activations_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_idle_entered(&self) {
        self.idle_entered_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_wake(&self) {
        self.wake_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_purchase(&self, success: bool) {
        if success {
            self.purchases_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.purchase_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a backend command was sent (lock-free)
    #[inline]
    pub fn record_backend_cmd(&self) {
        self.backend_cmds_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record backend command HTTP latency (lock-free)
    #[inline]
    pub fn record_backend_latency(&self, latency_us: u64) {
        self.backend_cmds_since_report.fetch_add(1, Ordering::Relaxed);
        self.backend_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.backend_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.backend_latency_max_us, latency_us);
    }

    /// Record backend command queue delay (time from enqueue to worker pickup)
    #[inline]
    pub fn record_backend_queue_delay(&self, delay_us: u64) {
        let bucket = bucket_index(delay_us);
        self.backend_queue_delay_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.backend_queue_delay_sum_us.fetch_add(delay_us, Ordering::Relaxed);

        update_atomic_max(&self.backend_queue_delay_max_us, delay_us);
    }

    /// Record a touch event dropped due to channel full (lock-free)
    #[inline]
    pub fn record_touch_event_dropped(&self) {
        self.touch_events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a backend command dropped due to channel full (lock-free)
    #[inline]
    pub fn record_backend_cmd_dropped(&self) {
        self.backend_cmds_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Set current event queue depth (called by sampler)
    #[inline]
    pub fn set_event_queue_depth(&self, depth: u64) {
        self.event_queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Set current backend command queue depth (called by sampler)
    #[inline]
    pub fn set_backend_queue_depth(&self, depth: u64) {
        self.backend_queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Set session state gauge (0=active, 1=idle)
    #[inline]
    pub fn set_session_state(&self, state: u64) {
        self.session_state.store(state, Ordering::Relaxed);
    }

    /// Set current secret-sequence matched length gauge
    #[inline]
    pub fn set_sequence_matched(&self, matched: u64) {
        self.sequence_matched.store(matched, Ordering::Relaxed);
    }

    /// Set whether a selection is live (gauge)
    #[inline]
    pub fn set_selection_active(&self, active: bool) {
        self.selection_active.store(active as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn touches_total(&self) -> u64 {
        self.touches_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sequence_completed_total(&self) -> u64 {
        self.sequence_completed_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn touch_events_dropped(&self) -> u64 {
        self.touch_events_dropped.load(Ordering::Relaxed)
    }

    /// Read all monotonic counters and gauges without resetting anything.
    ///
    /// Used by the Prometheus endpoint: a scrape must not disturb the
    /// periodic reporter's swap-reset counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_total: self.events_total.load(Ordering::Relaxed),
            touches_total: self.touches_total.load(Ordering::Relaxed),
            sequence_started_total: self.sequence_started_total.load(Ordering::Relaxed),
            sequence_completed_total: self.sequence_completed_total.load(Ordering::Relaxed),
            sequence_reset_total: self.sequence_reset_total.load(Ordering::Relaxed),
            sequence_timeout_total: self.sequence_timeout_total.load(Ordering::Relaxed),
            remote_activations_total: self.remote_activations_total.load(Ordering::Relaxed),
            idle_entered_total: self.idle_entered_total.load(Ordering::Relaxed),
            wake_total: self.wake_total.load(Ordering::Relaxed),
            purchases_total: self.purchases_total.load(Ordering::Relaxed),
            purchase_failures_total: self.purchase_failures_total.load(Ordering::Relaxed),
            backend_cmds_sent: self.backend_cmds_sent.load(Ordering::Relaxed),
            touch_events_dropped: self.touch_events_dropped.load(Ordering::Relaxed),
            backend_cmds_dropped: self.backend_cmds_dropped.load(Ordering::Relaxed),
            event_queue_depth: self.event_queue_depth.load(Ordering::Relaxed),
            backend_queue_depth: self.backend_queue_depth.load(Ordering::Relaxed),
            session_state: self.session_state.load(Ordering::Relaxed),
            sequence_matched: self.sequence_matched.load(Ordering::Relaxed),
            selection_active: self.selection_active.load(Ordering::Relaxed),
            door_touches: self.door_touches(),
        }
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self, catalog_doors: usize, selectable_doors: usize) -> MetricsSummary {
        // Swap periodic counters to zero and get their values
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);

        // Swap histogram buckets and collect values
        let lat_buckets = swap_buckets(&self.latency_buckets);

        // Swap backend latency counters
        let backend_count = self.backend_cmds_since_report.swap(0, Ordering::Relaxed);
        let backend_latency_sum = self.backend_latency_sum_us.swap(0, Ordering::Relaxed);
        let backend_max_latency = self.backend_latency_max_us.swap(0, Ordering::Relaxed);
        let backend_lat_buckets = swap_buckets(&self.backend_latency_buckets);

        // Swap backend queue delay histogram
        let backend_queue_delay_buckets = swap_buckets(&self.backend_queue_delay_buckets);
        let backend_queue_delay_sum = self.backend_queue_delay_sum_us.swap(0, Ordering::Relaxed);
        let backend_queue_delay_max = self.backend_queue_delay_max_us.swap(0, Ordering::Relaxed);

        // Get monotonic counters (don't reset)
        let events_total = self.events_total.load(Ordering::Relaxed);
        let touches_total = self.touches_total.load(Ordering::Relaxed);
        let sequence_started_total = self.sequence_started_total.load(Ordering::Relaxed);
        let sequence_completed_total = self.sequence_completed_total.load(Ordering::Relaxed);
        let sequence_reset_total = self.sequence_reset_total.load(Ordering::Relaxed);
        let sequence_timeout_total = self.sequence_timeout_total.load(Ordering::Relaxed);
        let remote_activations_total = self.remote_activations_total.load(Ordering::Relaxed);
        let idle_entered_total = self.idle_entered_total.load(Ordering::Relaxed);
        let wake_total = self.wake_total.load(Ordering::Relaxed);
        let purchases_total = self.purchases_total.load(Ordering::Relaxed);
        let purchase_failures_total = self.purchase_failures_total.load(Ordering::Relaxed);
        let backend_cmds_sent = self.backend_cmds_sent.load(Ordering::Relaxed);
        let touch_events_dropped = self.touch_events_dropped.load(Ordering::Relaxed);
        let backend_cmds_dropped = self.backend_cmds_dropped.load(Ordering::Relaxed);

        // Calculate elapsed time and reset
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        // Calculate derived metrics
        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency = if events_count > 0 { latency_sum / events_count } else { 0 };

        // Compute percentiles from histogram
        let lat_p50 = percentile_from_buckets(&lat_buckets, 0.50);
        let lat_p95 = percentile_from_buckets(&lat_buckets, 0.95);
        let lat_p99 = percentile_from_buckets(&lat_buckets, 0.99);

        // Backend latency metrics
        let backend_lat_avg_us =
            if backend_count > 0 { backend_latency_sum / backend_count } else { 0 };
        let backend_lat_p99_us = percentile_from_buckets(&backend_lat_buckets, 0.99);

        let backend_queue_delay_count: u64 = backend_queue_delay_buckets.iter().sum();
        let backend_queue_delay_avg_us = if backend_queue_delay_count > 0 {
            backend_queue_delay_sum / backend_queue_delay_count
        } else {
            0
        };
        let backend_queue_delay_p99_us =
            percentile_from_buckets(&backend_queue_delay_buckets, 0.99);

        MetricsSummary {
            events_total,
            events_per_sec,
            avg_process_latency_us: avg_latency,
            max_process_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: lat_p50,
            lat_p95_us: lat_p95,
            lat_p99_us: lat_p99,
            touches_total,
            sequence_started_total,
            sequence_completed_total,
            sequence_reset_total,
            sequence_timeout_total,
            remote_activations_total,
            idle_entered_total,
            wake_total,
            purchases_total,
            purchase_failures_total,
            backend_cmds_sent,
            backend_lat_buckets,
            backend_lat_avg_us,
            backend_lat_max_us: backend_max_latency,
            backend_lat_p99_us,
            backend_queue_delay_buckets,
            backend_queue_delay_avg_us,
            backend_queue_delay_max_us: backend_queue_delay_max,
            backend_queue_delay_p99_us,
            touch_events_dropped,
            backend_cmds_dropped,
            event_queue_depth: self.event_queue_depth.load(Ordering::Relaxed),
            backend_queue_depth: self.backend_queue_depth.load(Ordering::Relaxed),
            session_state: self.session_state.load(Ordering::Relaxed),
            sequence_matched: self.sequence_matched.load(Ordering::Relaxed),
            selection_active: self.selection_active.load(Ordering::Relaxed) == 1,
            catalog_doors,
            selectable_doors,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for display egress)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Point-in-time view of the monotonic counters and gauges
#[derive(Debug)]
pub struct MetricsSnapshot {
    pub events_total: u64,
    pub touches_total: u64,
    pub sequence_started_total: u64,
    pub sequence_completed_total: u64,
    pub sequence_reset_total: u64,
    pub sequence_timeout_total: u64,
    pub remote_activations_total: u64,
    pub idle_entered_total: u64,
    pub wake_total: u64,
    pub purchases_total: u64,
    pub purchase_failures_total: u64,
    pub backend_cmds_sent: u64,
    pub touch_events_dropped: u64,
    pub backend_cmds_dropped: u64,
    pub event_queue_depth: u64,
    pub backend_queue_depth: u64,
    pub session_state: u64,
    pub sequence_matched: u64,
    pub selection_active: u64,
    pub door_touches: Vec<(String, u64)>,
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Event processing latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    /// 50th percentile latency (µs)
    pub lat_p50_us: u64,
    /// 95th percentile latency (µs)
    pub lat_p95_us: u64,
    /// 99th percentile latency (µs)
    pub lat_p99_us: u64,
    pub touches_total: u64,
    pub sequence_started_total: u64,
    pub sequence_completed_total: u64,
    pub sequence_reset_total: u64,
    pub sequence_timeout_total: u64,
    pub remote_activations_total: u64,
    pub idle_entered_total: u64,
    pub wake_total: u64,
    pub purchases_total: u64,
    pub purchase_failures_total: u64,
    pub backend_cmds_sent: u64,
    /// Backend command HTTP latency histogram buckets (same bounds)
    pub backend_lat_buckets: [u64; NUM_BUCKETS],
    pub backend_lat_avg_us: u64,
    pub backend_lat_max_us: u64,
    pub backend_lat_p99_us: u64,
    /// Backend command queue delay histogram buckets (same bounds)
    pub backend_queue_delay_buckets: [u64; NUM_BUCKETS],
    pub backend_queue_delay_avg_us: u64,
    pub backend_queue_delay_max_us: u64,
    pub backend_queue_delay_p99_us: u64,
    pub touch_events_dropped: u64,
    pub backend_cmds_dropped: u64,
    pub event_queue_depth: u64,
    pub backend_queue_depth: u64,
    /// Current session state (0=active, 1=idle)
    pub session_state: u64,
    /// Current matched length of the secret sequence
    pub sequence_matched: u64,
    pub selection_active: bool,
    pub catalog_doors: usize,
    pub selectable_doors: usize,
}

impl MetricsSummary {
    /// Log the summary as a single structured line
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = %format!("{:.1}", self.events_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            lat_p50_us = %self.lat_p50_us,
            lat_p99_us = %self.lat_p99_us,
            touches = %self.touches_total,
            seq_started = %self.sequence_started_total,
            seq_completed = %self.sequence_completed_total,
            seq_timeouts = %self.sequence_timeout_total,
            idle_entered = %self.idle_entered_total,
            purchases = %self.purchases_total,
            purchase_failures = %self.purchase_failures_total,
            backend_cmds = %self.backend_cmds_sent,
            backend_lat_avg_us = %self.backend_lat_avg_us,
            touch_dropped = %self.touch_events_dropped,
            event_queue = %self.event_queue_depth,
            backend_queue = %self.backend_queue_depth,
            session = %if self.session_state == SESSION_STATE_IDLE { "idle" } else { "active" },
            doors = %self.catalog_doors,
            selectable = %self.selectable_doors,
            "metrics_report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10);
        assert_eq!(bucket_index(u64::MAX), 10);
    }

    #[test]
    fn test_record_and_report() {
        let metrics = Metrics::new();

        metrics.record_event_processed(150);
        metrics.record_event_processed(250);
        metrics.record_event_processed(90);

        let summary = metrics.report(8, 6);
        assert_eq!(summary.events_total, 3);
        assert_eq!(summary.max_process_latency_us, 250);
        assert_eq!(summary.avg_process_latency_us, (150 + 250 + 90) / 3);
        assert_eq!(summary.catalog_doors, 8);
        assert_eq!(summary.selectable_doors, 6);

        // Periodic counters reset after report
        let summary2 = metrics.report(8, 6);
        assert_eq!(summary2.avg_process_latency_us, 0);
        assert_eq!(summary2.max_process_latency_us, 0);
        // Monotonic counter survives
        assert_eq!(summary2.events_total, 3);
    }

    #[test]
    fn test_per_door_touches() {
        let metrics = Metrics::new();
        metrics.set_doors(&["A1".to_string(), "B2".to_string()]);

        metrics.record_touch("A1");
        metrics.record_touch("A1");
        metrics.record_touch("B2");
        metrics.record_touch("Z9"); // unregistered: total only

        assert_eq!(metrics.touches_total(), 4);
        let per_door = metrics.door_touches();
        assert_eq!(per_door, vec![("A1".to_string(), 2), ("B2".to_string(), 1)]);
    }

    #[test]
    fn test_sequence_counters() {
        let metrics = Metrics::new();
        metrics.record_sequence_started();
        metrics.record_sequence_started();
        metrics.record_sequence_completed();
        metrics.record_sequence_timeout();

        let summary = metrics.report(0, 0);
        assert_eq!(summary.sequence_started_total, 2);
        assert_eq!(summary.sequence_completed_total, 1);
        assert_eq!(summary.sequence_timeout_total, 1);
    }

    #[test]
    fn test_session_gauges() {
        let metrics = Metrics::new();
        metrics.set_session_state(SESSION_STATE_IDLE);
        metrics.set_sequence_matched(2);
        metrics.set_selection_active(true);

        let summary = metrics.report(0, 0);
        assert_eq!(summary.session_state, SESSION_STATE_IDLE);
        assert_eq!(summary.sequence_matched, 2);
        assert!(summary.selection_active);
    }

    #[test]
    fn test_percentiles() {
        let metrics = Metrics::new();
        // 99 fast events, 1 slow one
        for _ in 0..99 {
            metrics.record_event_processed(50);
        }
        metrics.record_event_processed(50_000);

        let summary = metrics.report(0, 0);
        assert_eq!(summary.lat_p50_us, 100);
        assert_eq!(summary.lat_p99_us, 100);
    }

    #[test]
    fn test_set_doors_replaces_registration() {
        let metrics = Metrics::new();
        metrics.set_doors(&["A1".to_string()]);
        metrics.record_touch("A1");

        metrics.set_doors(&["B2".to_string()]);
        // A1 is no longer registered; the slot was reassigned and reset
        assert_eq!(metrics.door_touches(), vec![("B2".to_string(), 0)]);

        // Re-registering the same list keeps counts
        metrics.record_touch("B2");
        metrics.set_doors(&["B2".to_string()]);
        assert_eq!(metrics.door_touches(), vec![("B2".to_string(), 1)]);
    }
}
