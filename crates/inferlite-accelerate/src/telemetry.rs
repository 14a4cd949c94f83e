use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Recent dispatch labels kept for inspection.
pub const DISPATCH_TRAIL_CAPACITY: usize = 64;

#[derive(Default)]
pub struct KernelTelemetry {
    prepare_count: AtomicU64,
    prepare_wall_ns: AtomicU64,
    mul_count: AtomicU64,
    mul_wall_ns: AtomicU64,
    reshape_count: AtomicU64,
    pipeline_hits: AtomicU64,
    pipeline_misses: AtomicU64,
    upload_bytes: AtomicU64,
    download_bytes: AtomicU64,
    trail: Mutex<VecDeque<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KernelTelemetrySnapshot {
    pub prepare_count: u64,
    pub prepare_wall_ns: u64,
    pub mul_count: u64,
    pub mul_wall_ns: u64,
    pub reshape_count: u64,
    pub pipeline_hits: u64,
    pub pipeline_misses: u64,
    pub upload_bytes: u64,
    pub download_bytes: u64,
}

impl KernelTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_prepare(&self, wall_ns: u64) {
        self.prepare_count.fetch_add(1, Ordering::Relaxed);
        if wall_ns > 0 {
            self.prepare_wall_ns.fetch_add(wall_ns, Ordering::Relaxed);
        }
    }

    pub fn record_mul(&self, wall_ns: u64) {
        self.mul_count.fetch_add(1, Ordering::Relaxed);
        if wall_ns > 0 {
            self.mul_wall_ns.fetch_add(wall_ns, Ordering::Relaxed);
        }
    }

    pub fn record_reshape(&self) {
        self.reshape_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pipeline_hit(&self) {
        self.pipeline_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pipeline_miss(&self) {
        self.pipeline_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload_bytes(&self, bytes: u64) {
        if bytes > 0 {
            self.upload_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    pub fn record_download_bytes(&self, bytes: u64) {
        if bytes > 0 {
            self.download_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Append a pass label (e.g. `reshape_half`, `mul_half`) in encode order.
    pub fn record_dispatch(&self, label: &str) {
        if let Ok(mut trail) = self.trail.lock() {
            if trail.len() == DISPATCH_TRAIL_CAPACITY {
                trail.pop_front();
            }
            trail.push_back(label.to_string());
        }
    }

    /// Oldest first.
    pub fn recent_dispatches(&self) -> Vec<String> {
        self.trail
            .lock()
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> KernelTelemetrySnapshot {
        KernelTelemetrySnapshot {
            prepare_count: self.prepare_count.load(Ordering::Relaxed),
            prepare_wall_ns: self.prepare_wall_ns.load(Ordering::Relaxed),
            mul_count: self.mul_count.load(Ordering::Relaxed),
            mul_wall_ns: self.mul_wall_ns.load(Ordering::Relaxed),
            reshape_count: self.reshape_count.load(Ordering::Relaxed),
            pipeline_hits: self.pipeline_hits.load(Ordering::Relaxed),
            pipeline_misses: self.pipeline_misses.load(Ordering::Relaxed),
            upload_bytes: self.upload_bytes.load(Ordering::Relaxed),
            download_bytes: self.download_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.prepare_count.store(0, Ordering::Relaxed);
        self.prepare_wall_ns.store(0, Ordering::Relaxed);
        self.mul_count.store(0, Ordering::Relaxed);
        self.mul_wall_ns.store(0, Ordering::Relaxed);
        self.reshape_count.store(0, Ordering::Relaxed);
        self.pipeline_hits.store(0, Ordering::Relaxed);
        self.pipeline_misses.store(0, Ordering::Relaxed);
        self.upload_bytes.store(0, Ordering::Relaxed);
        self.download_bytes.store(0, Ordering::Relaxed);
        if let Ok(mut trail) = self.trail.lock() {
            trail.clear();
        }
    }
}
