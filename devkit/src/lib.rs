/*!
# Echofleet DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le développement autour du kernel Echofleet avec:
- Stubs MQTT pour tests sans broker
- Builders de payloads devices (télémétrie, alertes, device_info)
- Harness de test avec expectations et assertions
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{EchofleetMessageBuilder, MockMqttClient};
pub use test_utils::TestHarness;
