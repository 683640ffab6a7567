//! Prometheus-compatible metrics endpoint
//!
//! Exposes room metrics in Prometheus text format and as JSON.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::sync::storage::QueueDepths;

const TICK_HISTORY_LEN: usize = 1000;

/// Metrics registry for the room
#[derive(Debug)]
pub struct Metrics {
    // Room population
    pub connections_active: AtomicU64,
    pub connections_lagging: AtomicU64,
    pub viewports: AtomicU64,
    pub mobs: AtomicU64,

    // Broadcast routing
    pub interest_mobs: AtomicU64,
    pub interest_pairs: AtomicU64,
    pub messages_routed: AtomicU64,
    pub messages_sent: AtomicU64,
    pub bytes_sent: AtomicU64,

    // Sync replication
    pub sync_active: AtomicU64,
    pub sync_awaiting_sequence_id: AtomicU64,
    pub sync_awaiting_send: AtomicU64,
    pub sync_awaiting_ack: AtomicU64,
    pub sync_awaiting_resend: AtomicU64,
    pub sync_quarantined: AtomicU64,
    pub sync_next_sequence_id: AtomicU64,
    pub sync_resends: AtomicU64,
    pub sync_timeouts: AtomicU64,
    pub sync_alarms: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,
    pub skipped_frames: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_lagging: AtomicU64::new(0),
            viewports: AtomicU64::new(0),
            mobs: AtomicU64::new(0),
            interest_mobs: AtomicU64::new(0),
            interest_pairs: AtomicU64::new(0),
            messages_routed: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            sync_active: AtomicU64::new(0),
            sync_awaiting_sequence_id: AtomicU64::new(0),
            sync_awaiting_send: AtomicU64::new(0),
            sync_awaiting_ack: AtomicU64::new(0),
            sync_awaiting_resend: AtomicU64::new(0),
            sync_quarantined: AtomicU64::new(0),
            sync_next_sequence_id: AtomicU64::new(0),
            sync_resends: AtomicU64::new(0),
            sync_timeouts: AtomicU64::new(0),
            sync_alarms: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            skipped_frames: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// One payload handed to a connection queue
    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sync_depths(&self, depths: QueueDepths) {
        self.sync_awaiting_sequence_id
            .store(depths.awaiting_sequence_id as u64, Ordering::Relaxed);
        self.sync_awaiting_send.store(depths.awaiting_send as u64, Ordering::Relaxed);
        self.sync_awaiting_ack.store(depths.awaiting_ack as u64, Ordering::Relaxed);
        self.sync_awaiting_resend.store(depths.awaiting_resend as u64, Ordering::Relaxed);
        self.sync_quarantined.store(depths.quarantined as u64, Ordering::Relaxed);
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("arena_room_connections_active", "Open connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("arena_room_connections_lagging", "Player connections silent past the lagging deadline", "gauge",
            self.connections_lagging.load(Ordering::Relaxed));
        metric!("arena_room_viewports", "Live player viewports", "gauge",
            self.viewports.load(Ordering::Relaxed));
        metric!("arena_room_mobs", "Mobs in the world", "gauge",
            self.mobs.load(Ordering::Relaxed));

        metric!("arena_room_interest_mobs", "Mobs with at least one observer", "gauge",
            self.interest_mobs.load(Ordering::Relaxed));
        metric!("arena_room_interest_pairs", "Observed (mob, connection) pairs", "gauge",
            self.interest_pairs.load(Ordering::Relaxed));
        metric!("arena_room_messages_routed_total", "Mob updates routed", "counter",
            self.messages_routed.load(Ordering::Relaxed));
        metric!("arena_room_messages_sent_total", "Payloads queued to connections", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("arena_room_bytes_sent_total", "Bytes queued to connections", "counter",
            self.bytes_sent.load(Ordering::Relaxed));

        metric!("arena_room_sync_active", "Sync channel active (0/1)", "gauge",
            self.sync_active.load(Ordering::Relaxed));
        for (stage, gauge) in [
            ("awaiting_sequence_id", &self.sync_awaiting_sequence_id),
            ("awaiting_send", &self.sync_awaiting_send),
            ("awaiting_ack", &self.sync_awaiting_ack),
            ("awaiting_resend", &self.sync_awaiting_resend),
            ("quarantined", &self.sync_quarantined),
        ] {
            output.push_str(&format!(
                "arena_room_sync_updates{{stage=\"{}\"}} {}\n",
                stage,
                gauge.load(Ordering::Relaxed)
            ));
        }
        metric!("arena_room_sync_next_sequence_id", "Next sync sequence id", "gauge",
            self.sync_next_sequence_id.load(Ordering::Relaxed));
        metric!("arena_room_sync_resends_total", "Sync updates retransmitted", "counter",
            self.sync_resends.load(Ordering::Relaxed));
        metric!("arena_room_sync_timeouts_total", "Sync acks that timed out", "counter",
            self.sync_timeouts.load(Ordering::Relaxed));
        metric!("arena_room_sync_alarms_total", "Sync updates rejected by the peer", "counter",
            self.sync_alarms.load(Ordering::Relaxed));

        metric!("arena_room_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("arena_room_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("arena_room_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("arena_room_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("arena_room_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("arena_room_skipped_frames_total", "Frames skipped by the ticker", "counter",
            self.skipped_frames.load(Ordering::Relaxed));
        metric!("arena_room_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        serde_json::json!({
            "room": {
                "connections": load(&self.connections_active),
                "connections_lagging": load(&self.connections_lagging),
                "viewports": load(&self.viewports),
                "mobs": load(&self.mobs),
                "uptime_seconds": self.uptime_seconds(),
            },
            "broadcast": {
                "interest_mobs": load(&self.interest_mobs),
                "interest_pairs": load(&self.interest_pairs),
                "messages_routed": load(&self.messages_routed),
                "messages_sent": load(&self.messages_sent),
                "bytes_sent": load(&self.bytes_sent),
            },
            "sync": {
                "active": load(&self.sync_active) == 1,
                "awaiting_sequence_id": load(&self.sync_awaiting_sequence_id),
                "awaiting_send": load(&self.sync_awaiting_send),
                "awaiting_ack": load(&self.sync_awaiting_ack),
                "awaiting_resend": load(&self.sync_awaiting_resend),
                "quarantined": load(&self.sync_quarantined),
                "next_sequence_id": load(&self.sync_next_sequence_id),
                "resends": load(&self.sync_resends),
                "timeouts": load(&self.sync_timeouts),
                "alarms": load(&self.sync_alarms),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
                "skipped_frames": load(&self.skipped_frames),
            },
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

fn route_request(metrics: &Metrics, request: &str) -> String {
    if request.starts_with("GET /metrics/json") {
        http_response("200 OK", "application/json", &metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        http_response("200 OK", "text/plain; version=0.0.4", &metrics.to_prometheus())
    } else if request.starts_with("GET /health") {
        http_response("200 OK", "text/plain", "OK")
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route_request(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
