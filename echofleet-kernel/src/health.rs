use crate::feed::AlertFeed;
use crate::registry::DeviceRegistry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: u32,
    pub devices_online: u32,
    pub alerts_buffered: u32,
    pub transport_status: String,
    pub transport_reconnects: u32,
}

/// Flag de liveness du transport. Quand le broker est injoignable,
/// l'ingestion et le dispatch dégradent en no-op ; les lectures du
/// registre et du feed continuent de servir.
#[derive(Clone)]
pub struct TransportHealth {
    start_time: Instant,
    reconnects: Arc<AtomicU32>,
    status: Arc<parking_lot::Mutex<String>>,
}

impl TransportHealth {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            reconnects: Arc::new(AtomicU32::new(0)),
            status: Arc::new(parking_lot::Mutex::new("connecting".to_string())),
        }
    }

    pub fn mark_connected(&self) {
        *self.status.lock() = "connected".to_string();
    }

    pub fn mark_disconnected(&self) {
        *self.status.lock() = "disconnected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        *self.status.lock() = "reconnecting".to_string();
    }

    pub fn is_connected(&self) -> bool {
        *self.status.lock() == "connected"
    }

    pub fn get_health(&self, registry: &DeviceRegistry, feed: &AlertFeed) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked: registry.count() as u32,
            devices_online: registry.count_online() as u32,
            alerts_buffered: feed.len() as u32,
            transport_status: self.status.lock().clone(),
            transport_reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

impl Default for TransportHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_status_transitions() {
        let health = TransportHealth::new();
        assert!(!health.is_connected());

        health.mark_connected();
        assert!(health.is_connected());

        health.increment_reconnects();
        assert!(!health.is_connected());
        health.increment_reconnects();

        let registry = DeviceRegistry::new();
        let feed = AlertFeed::new();
        let snapshot = health.get_health(&registry, &feed);
        assert_eq!(snapshot.transport_status, "reconnecting");
        assert_eq!(snapshot.transport_reconnects, 2);
        assert_eq!(snapshot.devices_tracked, 0);
    }
}
