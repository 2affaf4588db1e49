/*!
Mock MQTT Client pour développement sans broker

Permet de développer et tester autour du kernel sans démarrer un broker MQTT
réel. Enregistre tous les messages publiés et permet de simuler la réception
de payloads devices.
*/

use anyhow::Result;
use rumqttc::QoS;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock MQTT Client qui simule rumqttc::AsyncClient
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            message_sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Configuration d'un channel pour recevoir les messages simulés
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock().unwrap() = Some(sender);
        receiver
    }

    /// Simule la publication d'un message (compatible avec AsyncClient)
    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage { topic: topic.into(), payload: payload.into(), qos, retain };

        self.published_messages.lock().unwrap().push(message.clone());

        log::info!("[MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        Ok(())
    }

    /// Simule l'abonnement à un topic (compatible avec AsyncClient)
    pub async fn subscribe<S: Into<String>>(&self, topic: S, _qos: QoS) -> Result<()> {
        let topic = topic.into();
        self.subscriptions.lock().unwrap().push(topic.clone());
        log::info!("[MOCK] Subscribed to {}", topic);
        Ok(())
    }

    /// Simule la réception d'un message device (pour tests)
    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };

        if let Some(sender) = self.message_sender.lock().unwrap().as_ref() {
            sender.send(message.clone()).map_err(|e| anyhow::anyhow!("Send error: {}", e))?;
        }

        log::info!("[MOCK] Simulated incoming: {}", message.topic);
        Ok(())
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    /// Récupère les abonnements (pour assertions de tests)
    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper pour fabriquer les payloads devices au format Echofleet
pub struct EchofleetMessageBuilder;

impl EchofleetMessageBuilder {
    /// Payload de télémétrie (topic `<ns>/<deviceId>/status`)
    pub fn telemetry(rms: i64, zcr: f64) -> Value {
        serde_json::json!({
            "timestamp": chrono::Utc::now().timestamp(),
            "rms": rms,
            "zcr": zcr
        })
    }

    /// Payload d'alerte (topic `<ns>/<deviceId>/alert`)
    pub fn alert<S: Into<String>>(kind: S, rms: i64, zcr: f64) -> Value {
        serde_json::json!({
            "type": kind.into(),
            "timestamp": chrono::Utc::now().timestamp(),
            "rms": rms,
            "zcr": zcr,
            "confidence": "High"
        })
    }

    /// Payload device_info (topic `<ns>/<deviceId>/status`)
    pub fn device_info<S: Into<String>>(device_name: S, floor: S, zone: S, description: S) -> Value {
        serde_json::json!({
            "type": "device_info",
            "device_name": device_name.into(),
            "location": {
                "floor": floor.into(),
                "zone": zone.into(),
                "description": description.into()
            }
        })
    }

    /// Lot d'historique d'alertes (topic `<ns>/<deviceId>/alert_history`)
    pub fn alert_history(entries: Vec<Value>) -> Value {
        serde_json::json!({ "history": entries })
    }

    /// Payload de commande sortante (topic `<ns>/<deviceId>/command`)
    pub fn command<S: Into<String>>(action: S) -> Value {
        serde_json::json!({
            "action": action.into(),
            "issued_at": chrono::Utc::now().timestamp_millis()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio;

    #[tokio::test]
    async fn test_mock_client_publish_subscribe() {
        let client = MockMqttClient::new();

        // Test abonnement
        client.subscribe("library/+/status", QoS::AtLeastOnce).await.unwrap();
        assert_eq!(client.get_subscriptions(), vec!["library/+/status"]);

        // Test publication
        let payload = b"test message";
        client
            .publish("library/device001/command", QoS::AtMostOnce, false, payload.to_vec())
            .await
            .unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "library/device001/command");
        assert_eq!(messages[0].payload, payload);
    }

    #[tokio::test]
    async fn test_json_message_parsing() {
        let client = MockMqttClient::new();

        let test_data = EchofleetMessageBuilder::telemetry(42, 0.12);
        let payload = serde_json::to_vec(&test_data).unwrap();
        client
            .publish("library/device001/status", QoS::AtLeastOnce, false, payload)
            .await
            .unwrap();

        let parsed: Option<serde_json::Value> =
            client.get_last_json_message("library/device001/status").unwrap();
        assert!(parsed.is_some());
        assert_eq!(parsed.unwrap()["rms"], 42);
    }

    #[test]
    fn test_message_builders() {
        let telemetry = EchofleetMessageBuilder::telemetry(42, 0.12);
        assert_eq!(telemetry["rms"], 42);
        assert!(telemetry["timestamp"].as_i64().unwrap() > 0);

        let alert = EchofleetMessageBuilder::alert("SPEECH", 90, 0.3);
        assert_eq!(alert["type"], "SPEECH");
        assert_eq!(alert["confidence"], "High");

        let info = EchofleetMessageBuilder::device_info("Hall Est", "2", "B", "near stairs");
        assert_eq!(info["type"], "device_info");
        assert_eq!(info["location"]["zone"], "B");

        let command = EchofleetMessageBuilder::command("calibrate");
        assert_eq!(command["action"], "calibrate");
        assert!(command["issued_at"].as_i64().unwrap() > 1_000_000_000_000);
    }
}
