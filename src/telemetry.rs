use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

pub(crate) const TELEMETRY_ENV: &str = "PROXYSHAKE_TELEMETRY";

static NEGOTIATIONS_STARTED: AtomicU64 = AtomicU64::new(0);
static NEGOTIATIONS_SUCCEEDED: AtomicU64 = AtomicU64::new(0);
static NEGOTIATIONS_FAILED: AtomicU64 = AtomicU64::new(0);
static NEGOTIATIONS_CANCELLED: AtomicU64 = AtomicU64::new(0);
static HANDSHAKE_BYTES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static HANDSHAKE_BYTES_READ: AtomicU64 = AtomicU64::new(0);
static ACTIVE_NEGOTIATIONS: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NegotiationSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub active: u64,
}

impl NegotiationSnapshot {
    /// Counter growth since `prev`. `active` is a gauge and is reported as-is.
    pub fn delta(self, prev: Self) -> Self {
        Self {
            started: self.started.saturating_sub(prev.started),
            succeeded: self.succeeded.saturating_sub(prev.succeeded),
            failed: self.failed.saturating_sub(prev.failed),
            cancelled: self.cancelled.saturating_sub(prev.cancelled),
            bytes_written: self.bytes_written.saturating_sub(prev.bytes_written),
            bytes_read: self.bytes_read.saturating_sub(prev.bytes_read),
            active: self.active,
        }
    }
}

pub(crate) fn enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        let res = std::env::var(TELEMETRY_ENV)
            .ok()
            .map(|value| !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);
        tracing::debug!(enabled = res, "Telemetry status initialized");
        res
    })
}

pub(crate) fn record_written(bytes: usize) {
    if !enabled() {
        return;
    }
    HANDSHAKE_BYTES_WRITTEN.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub(crate) fn record_read(bytes: usize) {
    if !enabled() {
        return;
    }
    HANDSHAKE_BYTES_READ.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub(crate) fn record_success() {
    if !enabled() {
        return;
    }
    NEGOTIATIONS_SUCCEEDED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_failure() {
    if !enabled() {
        return;
    }
    NEGOTIATIONS_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_cancelled() {
    if !enabled() {
        return;
    }
    NEGOTIATIONS_CANCELLED.fetch_add(1, Ordering::Relaxed);
}

/// RAII guard for one in-flight negotiation.
pub(crate) struct NegotiationGuard {
    counted: bool,
}

impl NegotiationGuard {
    pub(crate) fn new(protocol: &'static str) -> Self {
        tracing::debug!(protocol, "proxy negotiation started");
        let counted = enabled();
        if counted {
            NEGOTIATIONS_STARTED.fetch_add(1, Ordering::Relaxed);
            ACTIVE_NEGOTIATIONS.fetch_add(1, Ordering::Relaxed);
        }
        Self { counted }
    }
}

impl Drop for NegotiationGuard {
    fn drop(&mut self) {
        if self.counted {
            ACTIVE_NEGOTIATIONS.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

pub fn telemetry_snapshot() -> NegotiationSnapshot {
    NegotiationSnapshot {
        started: NEGOTIATIONS_STARTED.load(Ordering::Relaxed),
        succeeded: NEGOTIATIONS_SUCCEEDED.load(Ordering::Relaxed),
        failed: NEGOTIATIONS_FAILED.load(Ordering::Relaxed),
        cancelled: NEGOTIATIONS_CANCELLED.load(Ordering::Relaxed),
        bytes_written: HANDSHAKE_BYTES_WRITTEN.load(Ordering::Relaxed),
        bytes_read: HANDSHAKE_BYTES_READ.load(Ordering::Relaxed),
        active: ACTIVE_NEGOTIATIONS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_subtracts_counters() {
        let prev = NegotiationSnapshot {
            started: 2,
            succeeded: 1,
            bytes_written: 10,
            active: 1,
            ..Default::default()
        };
        let now = NegotiationSnapshot {
            started: 5,
            succeeded: 3,
            failed: 1,
            bytes_written: 25,
            active: 2,
            ..Default::default()
        };
        let d = now.delta(prev);
        assert_eq!(d.started, 3);
        assert_eq!(d.succeeded, 2);
        assert_eq!(d.failed, 1);
        assert_eq!(d.bytes_written, 15);
        assert_eq!(d.active, 2);
    }

    #[test]
    fn guard_tracks_activity() {
        let before = telemetry_snapshot();
        {
            let _guard = NegotiationGuard::new("test");
            let during = telemetry_snapshot();
            assert!(during.started > before.started || !enabled());
        }
    }
}
