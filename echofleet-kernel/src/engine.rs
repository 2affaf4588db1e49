/**
 * RECONCILIATION ENGINE - Application des événements sur le registre
 *
 * RÔLE :
 * Consomme les événements normalisés un par un (ordre d'arrivée, sans
 * chevauchement), applique le filtre cooldown sur les alertes, alimente le
 * feed, et démote périodiquement les devices silencieux en offline.
 *
 * FONCTIONNEMENT :
 * - Telemetry -> registry.upsert_telemetry (aucune notification)
 * - DeviceInfo -> registry.upsert_info
 * - Alert -> cooldown 5s par device ; si accepté : refresh liveness/lectures
 *   + notification poussée dans le feed
 * - sweep(now) toutes les 10s : online && silence > 30s -> offline.
 *   Une seule task de sweep, donc jamais deux passes simultanées.
 *
 * Le cooldown n'est pas persisté : il ne sert qu'à écraser les rafales au
 * sein d'une session, repartir de zéro au restart est acceptable.
 *
 * SÉMANTIQUE D'ÉCHEC : un événement malformé est loggé et jeté en amont
 * (normalizer) ; rien ici n'interrompt le flux d'ingestion.
 */

use crate::feed::AlertFeed;
use crate::models::{now_ms, AlertNotification, Event};
use crate::registry::DeviceRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Silence au-delà duquel un device online est démoté
pub const OFFLINE_TIMEOUT_MS: i64 = 30_000;
/// Période du sweep offline
pub const SWEEP_PERIOD_SECS: u64 = 10;
/// Intervalle minimal entre deux alertes acceptées d'un même device
pub const ALERT_COOLDOWN_MS: i64 = 5_000;

pub struct ReconciliationEngine {
    registry: Arc<DeviceRegistry>,
    feed: Arc<AlertFeed>,
    /// device_id -> instant (ms) de la dernière alerte acceptée
    cooldown: Mutex<HashMap<String, i64>>,
}

impl ReconciliationEngine {
    pub fn new(registry: Arc<DeviceRegistry>, feed: Arc<AlertFeed>) -> Self {
        Self { registry, feed, cooldown: Mutex::new(HashMap::new()) }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn feed(&self) -> &AlertFeed {
        &self.feed
    }

    /// Applique un événement. `now` (epoch ms) sert au cooldown ; injectable
    /// pour les tests. Retourne la notification produite, le cas échéant.
    pub fn handle_event(&self, event: Event, now: i64) -> Option<AlertNotification> {
        match event {
            Event::Telemetry { device_id, rms, zcr, observed_at } => {
                self.registry.upsert_telemetry(&device_id, rms, zcr, observed_at);
                None
            }
            Event::DeviceInfo { device_id, device_name, location } => {
                self.registry.upsert_info(&device_id, device_name.as_deref(), location);
                None
            }
            Event::Alert { device_id, kind, rms, zcr, observed_at, confidence } => {
                if !self.accept_alert(&device_id, now) {
                    // rafale du même capteur : suppression volontaire, pas une erreur
                    return None;
                }

                // une alerte rafraîchit aussi liveness et lectures
                let record = self.registry.upsert_telemetry(&device_id, rms, zcr, observed_at);

                let notification = AlertNotification {
                    id: Uuid::new_v4().to_string(),
                    device_id: device_id.clone(),
                    kind: kind.clone(),
                    message: format!("{} detected at {}", kind, record.device_name),
                    rms,
                    zcr,
                    observed_at,
                    confidence,
                };
                self.feed.push(notification.clone());
                println!("[engine] alert from {}: {}", device_id, notification.message);
                Some(notification)
            }
        }
    }

    fn accept_alert(&self, device_id: &str, now: i64) -> bool {
        let mut cooldown = self.cooldown.lock();
        if let Some(last) = cooldown.get(device_id) {
            if now - last < ALERT_COOLDOWN_MS {
                return false;
            }
        }
        cooldown.insert(device_id.to_string(), now);
        true
    }

    /// Passe offline tout device online silencieux depuis plus de 30s.
    /// Le critère est réévalué sous le verrou du registre : un device
    /// rafraîchi entre le snapshot et la démotion reste online.
    pub fn sweep(&self, now: i64) {
        let mut demoted = 0usize;
        for record in self.registry.all() {
            if record.online
                && now - record.last_seen > OFFLINE_TIMEOUT_MS
                && self.registry.mark_offline_if_stale(&record.device_id, now, OFFLINE_TIMEOUT_MS)
            {
                demoted += 1;
            }
        }
        if demoted > 0 {
            println!("[engine] sweep demoted {} device(s) to offline", demoted);
        }
    }

    /// Supprime un device du registre et oublie son cooldown.
    pub fn remove_device(&self, device_id: &str) -> bool {
        self.cooldown.lock().remove(device_id);
        self.registry.delete(device_id)
    }

    /// Démarre la task périodique de sweep. Une seule task : les passes sont
    /// sérialisées par construction.
    pub fn spawn_sweep(engine: Arc<Self>) {
        println!(
            "[engine] starting offline sweep (period: {}s, timeout: {}s)",
            SWEEP_PERIOD_SECS,
            OFFLINE_TIMEOUT_MS / 1000
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_PERIOD_SECS));
            loop {
                interval.tick().await;
                engine.sweep(now_ms());
            }
        });
    }
}
