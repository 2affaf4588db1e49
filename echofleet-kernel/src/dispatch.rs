/**
 * COMMAND DISPATCHER - Envoi de commandes vers les devices
 *
 * RÔLE :
 * Traduit une commande haut niveau ("calibrate", "get_alert_history") en
 * payload publié sur <namespace>/<deviceId>/command. Best-effort assumé :
 * pas d'acquittement attendu, pas de retry. Les commandes sont des actions
 * utilisateur idempotentes, ré-émettables à la main.
 *
 * Indépendant du chemin d'ingestion : ne prend aucun lock du registre ni
 * du feed.
 */

use crate::health::TransportHealth;
use crate::models::now_ms;
use rumqttc::{AsyncClient, QoS};

pub struct CommandDispatcher {
    client: Option<AsyncClient>,
    namespace: String,
    health: TransportHealth,
}

pub fn command_topic(namespace: &str, device_id: &str) -> String {
    format!("{}/{}/command", namespace, device_id)
}

pub fn command_payload(action: &str, issued_at: i64) -> String {
    serde_json::json!({ "action": action, "issued_at": issued_at }).to_string()
}

impl CommandDispatcher {
    pub fn new(client: Option<AsyncClient>, namespace: String, health: TransportHealth) -> Self {
        Self { client, namespace, health }
    }

    /// Publie `{action, issued_at}` vers le device. Retourne false (et logge)
    /// si le transport n'est pas disponible : échec silencieux volontaire.
    pub async fn send(&self, device_id: &str, action: &str) -> bool {
        let Some(client) = &self.client else {
            eprintln!("[dispatch] no transport client, dropping '{}' for {}", action, device_id);
            return false;
        };
        if !self.health.is_connected() {
            eprintln!("[dispatch] transport offline, dropping '{}' for {}", action, device_id);
            return false;
        }

        let topic = command_topic(&self.namespace, device_id);
        let payload = command_payload(action, now_ms());
        // QoS 0 : commande ré-émettable à la main, pas de redelivery broker
        match client.publish(topic, QoS::AtMostOnce, false, payload).await {
            Ok(_) => {
                println!("[dispatch] sent '{}' to device {}", action, device_id);
                true
            }
            Err(e) => {
                // le canal vers l'eventloop est mort : transport hors service
                eprintln!("[dispatch] publish failed for {}: {:?}", device_id, e);
                self.health.mark_disconnected();
                false
            }
        }
    }

    pub async fn calibrate(&self, device_id: &str) -> bool {
        self.send(device_id, "calibrate").await
    }

    /// Demande au device de republier son historique d'alertes
    /// (reviendra sur <namespace>/<deviceId>/alert_history).
    pub async fn request_alert_history(&self, device_id: &str) -> bool {
        self.send(device_id, "get_alert_history").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_topic_shape() {
        assert_eq!(command_topic("library", "device001"), "library/device001/command");
    }

    #[test]
    fn test_command_payload_shape() {
        let payload = command_payload("calibrate", 1_700_000_000_000);
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["action"], "calibrate");
        assert_eq!(value["issued_at"], 1_700_000_000_000i64);
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_send_without_client_is_noop() {
        let dispatcher =
            CommandDispatcher::new(None, "library".into(), TransportHealth::new());
        assert!(!dispatcher.send("device001", "calibrate").await);
    }
}
