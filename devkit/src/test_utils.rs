/*!
Test Harness pour le kernel Echofleet

Facilite l'écriture de tests transport avec:
- Setup automatique du mock MQTT
- Simulation de payloads devices (télémétrie, alertes, device_info)
- Assertions sur les messages échangés
*/

use crate::mqtt_stub::{EchofleetMessageBuilder, MockMqttClient};
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Harness de test complet autour du mock MQTT
pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
    namespace: String,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
struct Expectation {
    topic: String,
    expected_count: usize,
}

impl TestHarness {
    /// Crée un nouveau harness de test (namespace par défaut "library")
    pub fn new() -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        Self {
            mqtt_client: MockMqttClient::new(),
            namespace: "library".to_string(),
            expectations: Vec::new(),
        }
    }

    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Ajoute une expectation: on s'attend à recevoir N messages sur un topic
    pub fn expect_messages(&mut self, topic: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation { topic: topic.to_string(), expected_count: count });
        self
    }

    /// Simule une télémétrie entrante d'un device
    pub async fn send_telemetry(&self, device_id: &str, rms: i64, zcr: f64) -> Result<()> {
        let topic = format!("{}/{}/status", self.namespace, device_id);
        let payload = serde_json::to_vec(&EchofleetMessageBuilder::telemetry(rms, zcr))?;
        self.mqtt_client.simulate_incoming(topic, payload).await?;
        log::info!("Sent telemetry for device: {}", device_id);
        Ok(())
    }

    /// Simule une alerte entrante d'un device
    pub async fn send_alert(&self, device_id: &str, kind: &str, rms: i64, zcr: f64) -> Result<()> {
        let topic = format!("{}/{}/alert", self.namespace, device_id);
        let payload = serde_json::to_vec(&EchofleetMessageBuilder::alert(kind, rms, zcr))?;
        self.mqtt_client.simulate_incoming(topic, payload).await?;
        log::info!("Sent {} alert for device: {}", kind, device_id);
        Ok(())
    }

    /// Simule un message device_info entrant
    pub async fn send_device_info(
        &self,
        device_id: &str,
        device_name: &str,
        floor: &str,
        zone: &str,
        description: &str,
    ) -> Result<()> {
        let topic = format!("{}/{}/status", self.namespace, device_id);
        let payload = serde_json::to_vec(&EchofleetMessageBuilder::device_info(
            device_name,
            floor,
            zone,
            description,
        ))?;
        self.mqtt_client.simulate_incoming(topic, payload).await?;
        log::info!("Sent device_info for device: {}", device_id);
        Ok(())
    }

    /// Attend et vérifie qu'un message a été publié sur un topic
    pub async fn wait_for_message(&self, topic: &str, timeout_ms: u64) -> Result<Option<Value>> {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? {
                log::info!("Received expected message on {}", topic);
                return Ok(Some(msg));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        log::warn!("Timeout waiting for message on {}", topic);
        Ok(None)
    }

    /// Vérifie toutes les expectations configurées
    pub fn verify_expectations(&self) -> Result<()> {
        for expectation in &self.expectations {
            let messages = self.mqtt_client.find_messages_by_topic(&expectation.topic);
            let actual_count = messages.len();

            if actual_count != expectation.expected_count {
                anyhow::bail!(
                    "Expectation failed for topic '{}': expected {} messages, got {}",
                    expectation.topic,
                    expectation.expected_count,
                    actual_count
                );
            }
        }
        Ok(())
    }

    /// Assert qu'un champ a une valeur spécifique dans le dernier message
    pub fn assert_field_equals(&self, topic: &str, field_path: &str, expected: &Value) -> Result<()> {
        if let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? {
            if let Some(actual) = get_nested_field(&msg, field_path) {
                if actual == expected {
                    return Ok(());
                }
                anyhow::bail!(
                    "Field '{}' mismatch: expected {:?}, got {:?}",
                    field_path,
                    expected,
                    actual
                );
            }
        }

        anyhow::bail!("Field '{}' not found for comparison in {}", field_path, topic);
    }

    /// Stats sur les messages collectés
    pub fn get_stats(&self) -> TestStats {
        let messages = self.mqtt_client.get_published_messages();
        let mut topic_counts = HashMap::new();

        for msg in &messages {
            *topic_counts.entry(msg.topic.clone()).or_insert(0) += 1;
        }

        TestStats {
            total_messages: messages.len(),
            topic_counts,
            subscriptions: self.mqtt_client.get_subscriptions(),
        }
    }

    /// Reset le harness pour un nouveau test
    pub fn reset(&mut self) {
        self.mqtt_client.clear();
        self.expectations.clear();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        match current {
            Value::Object(obj) => current = obj.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}

#[derive(Debug)]
pub struct TestStats {
    pub total_messages: usize,
    pub topic_counts: HashMap<String, usize>,
    pub subscriptions: Vec<String>,
}
