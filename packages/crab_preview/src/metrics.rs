//! Preview metrics for observability
//!
//! Counters are bumped from the hub, router and virtual server and exposed as a
//! JSON snapshot on `/metrics`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct PreviewMetrics {
    // Connection metrics
    /// Currently open surface sockets
    pub active_connections: AtomicU64,
    pub total_connections: AtomicU64,

    // Surface metrics
    /// Content surfaces seen for the first time
    pub surfaces_opened: AtomicU64,
    /// Content surfaces evicted by the liveness sweep
    pub surfaces_closed: AtomicU64,
    /// Loader surfaces evicted (no close event is emitted for these)
    pub loaders_evicted: AtomicU64,

    // Content metrics
    pub requests_served: AtomicU64,
    pub requests_not_found: AtomicU64,
    pub request_timeouts: AtomicU64,

    // Error metrics
    /// Out-of-root paths and non-allowlisted origins
    pub security_rejections: AtomicU64,
    /// Responses matching no outstanding request
    pub protocol_mismatches: AtomicU64,
    pub malformed_messages: AtomicU64,
    pub render_failures: AtomicU64,

    start_time: Option<Instant>,
}

impl PreviewMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn surface_opened(&self) {
        self.surfaces_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn surface_closed(&self) {
        self.surfaces_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn loader_evicted(&self) {
        self.loaders_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_served(&self, found: bool) {
        if found {
            self.requests_served.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_not_found.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn request_timed_out(&self) {
        self.request_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn security_rejection(&self) {
        self.security_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_mismatch(&self) {
        self.protocol_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_message(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_failure(&self) {
        self.render_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            surfaces: SurfaceMetrics {
                opened: self.surfaces_opened.load(Ordering::Relaxed),
                closed: self.surfaces_closed.load(Ordering::Relaxed),
                loaders_evicted: self.loaders_evicted.load(Ordering::Relaxed),
            },
            requests: RequestMetrics {
                served: self.requests_served.load(Ordering::Relaxed),
                not_found: self.requests_not_found.load(Ordering::Relaxed),
                timed_out: self.request_timeouts.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                security_rejections: self.security_rejections.load(Ordering::Relaxed),
                protocol_mismatches: self.protocol_mismatches.load(Ordering::Relaxed),
                malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
                render_failures: self.render_failures.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub surfaces: SurfaceMetrics,
    pub requests: RequestMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceMetrics {
    pub opened: u64,
    pub closed: u64,
    pub loaders_evicted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub served: u64,
    pub not_found: u64,
    pub timed_out: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub security_rejections: u64,
    pub protocol_mismatches: u64,
    pub malformed_messages: u64,
    pub render_failures: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub instance_id: String,
    pub project_root: Option<String>,
    pub content_surfaces: usize,
    pub connections: u64,
    pub uptime_secs: u64,
}
