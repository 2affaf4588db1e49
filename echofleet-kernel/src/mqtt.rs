/**
 * MQTT LISTENER - Source d'événements entrante du kernel
 *
 * RÔLE :
 * Branche le flux pub/sub sur le moteur de réconciliation : abonnements
 * wildcards <namespace>/+/{status,alert,alert_history}, normalisation de
 * chaque publish, application séquentielle (une seule task, ordre d'arrivée).
 *
 * SÉMANTIQUE D'ÉCHEC : un payload malformé est loggé et jeté, il n'affecte
 * ni le flux ni les autres devices. Une erreur de connexion marque le
 * transport indisponible et retente après 2s ; le moteur continue de servir
 * les lectures pendant ce temps.
 */

use crate::config::{KernelConfig, MqttConf};
use crate::engine::ReconciliationEngine;
use crate::health::TransportHealth;
use crate::models::now_ms;
use crate::normalize::{self, SourceKind};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

pub fn create_mqtt_client(cfg: &KernelConfig) -> (AsyncClient, EventLoop) {
    let mqtt_cfg = cfg.mqtt.clone().unwrap_or_else(MqttConf::default);
    let client_id = format!("echofleet-kernel-{}", std::process::id());
    let mut opts = MqttOptions::new(client_id, &mqtt_cfg.host, mqtt_cfg.port);
    opts.set_keep_alive(Duration::from_secs(15));
    AsyncClient::new(opts, 10)
}

/// Topics d'ingestion pour un namespace donné
fn subscriptions(namespace: &str) -> [String; 3] {
    [
        format!("{}/+/status", namespace),
        format!("{}/+/alert", namespace),
        format!("{}/+/alert_history", namespace),
    ]
}

async fn subscribe_all(client: &AsyncClient, namespace: &str) -> Result<(), rumqttc::ClientError> {
    for topic in subscriptions(namespace) {
        client.subscribe(topic, QoS::AtLeastOnce).await?;
    }
    Ok(())
}

/// Route un publish entrant vers le moteur. Erreurs de normalisation :
/// loggées, jetées, jamais fatales.
pub fn ingest_publish(engine: &ReconciliationEngine, topic: &str, payload: &[u8], now: i64) {
    if topic.ends_with("/alert_history") {
        match normalize::normalize_history(topic, payload) {
            Ok(events) => {
                for event in events {
                    engine.handle_event(event, now);
                }
            }
            Err(e) => eprintln!("[mqtt] dropped history on {}: {}", topic, e),
        }
        return;
    }

    match normalize::normalize(SourceKind::PubSub, topic, payload) {
        Ok(event) => {
            engine.handle_event(event, now);
        }
        Err(e) => eprintln!("[mqtt] dropped payload on {}: {}", topic, e),
    }
}

pub fn spawn_mqtt_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    engine: Arc<ReconciliationEngine>,
    health: TransportHealth,
    namespace: String,
) {
    task::spawn(async move {
        if let Err(e) = subscribe_all(&client, &namespace).await {
            eprintln!("[mqtt] initial subscribe failed: {:?}", e);
        }

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    println!("[mqtt] connected, subscribing to {}/+/...", namespace);
                    health.mark_connected();
                    // session clean : on se réabonne à chaque reconnexion
                    if let Err(e) = subscribe_all(&client, &namespace).await {
                        eprintln!("[mqtt] resubscribe failed: {:?}", e);
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    ingest_publish(&engine, &p.topic, &p.payload, now_ms());
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("[mqtt] connection error: {:?}", e);
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::AlertFeed;
    use crate::registry::DeviceRegistry;

    fn engine() -> ReconciliationEngine {
        ReconciliationEngine::new(Arc::new(DeviceRegistry::new()), Arc::new(AlertFeed::new()))
    }

    #[test]
    fn test_subscriptions_cover_all_kinds() {
        let topics = subscriptions("library");
        assert!(topics.contains(&"library/+/status".to_string()));
        assert!(topics.contains(&"library/+/alert".to_string()));
        assert!(topics.contains(&"library/+/alert_history".to_string()));
    }

    #[test]
    fn test_ingest_status_creates_device() {
        let engine = engine();
        ingest_publish(
            &engine,
            "library/device001/status",
            br#"{"timestamp": 1700000000, "rms": 42, "zcr": 0.12}"#,
            now_ms(),
        );
        let record = engine.registry().get("device001").unwrap();
        assert_eq!(record.last_rms, 42);
        assert!(record.online);
    }

    #[test]
    fn test_ingest_alert_feeds_the_feed() {
        let engine = engine();
        ingest_publish(
            &engine,
            "library/device001/alert",
            br#"{"type": "SPEECH", "timestamp": 1700000000, "rms": 90, "zcr": 0.3}"#,
            now_ms(),
        );
        assert_eq!(engine.feed().len(), 1);
        assert!(engine.registry().get("device001").is_some());
    }

    #[test]
    fn test_ingest_history_replays_with_cooldown() {
        let engine = engine();
        // trois entrées d'historique rapprochées : le cooldown n'en garde qu'une
        ingest_publish(
            &engine,
            "library/device001/alert_history",
            br#"{"history": [
                {"type": "SPEECH", "timestamp": 1700000000, "rms": 70, "zcr": 0.2},
                {"type": "SPEECH", "timestamp": 1700000001, "rms": 71, "zcr": 0.2},
                {"type": "SPEECH", "timestamp": 1700000002, "rms": 72, "zcr": 0.2}
            ]}"#,
            now_ms(),
        );
        assert_eq!(engine.feed().len(), 1);
    }

    #[test]
    fn test_ingest_malformed_payload_is_dropped_silently() {
        let engine = engine();
        ingest_publish(&engine, "library/device001/status", b"not json at all", now_ms());
        assert_eq!(engine.registry().count(), 0);
        assert!(engine.feed().is_empty());

        // le flux continue : le message suivant passe normalement
        ingest_publish(
            &engine,
            "library/device001/status",
            br#"{"timestamp": 1700000000, "rms": 1, "zcr": 0.1}"#,
            now_ms(),
        );
        assert_eq!(engine.registry().count(), 1);
    }
}
