use serde::{Deserialize, Serialize};

pub const DEFAULT_BROKER: &str = "test.mosquitto.org";
pub const DEFAULT_BROKER_PORT: u16 = 1883;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceLocation {
    pub floor: String,
    pub zone: String,
    pub description: String,
}

impl Default for DeviceLocation {
    fn default() -> Self {
        Self {
            floor: "Floor 1".to_string(),
            zone: "A".to_string(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub device_name: String,
    pub location: DeviceLocation,
    pub broker: String,
    pub port: u16,
    pub online: bool,
    /// epoch millis, jamais décroissant par device
    pub last_seen: i64,
    pub last_rms: i64,
    pub last_zcr: f64,
}

/// Événement normalisé, indépendant du transport d'origine.
/// Éphémère : seul son effet sur le registre/feed persiste.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Telemetry {
        device_id: String,
        rms: i64,
        zcr: f64,
        observed_at: i64,
    },
    Alert {
        device_id: String,
        kind: String,
        rms: i64,
        zcr: f64,
        observed_at: i64,
        confidence: String,
    },
    DeviceInfo {
        device_id: String,
        device_name: Option<String>,
        location: Option<DeviceLocation>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub id: String,
    pub device_id: String,
    pub kind: String,
    pub message: String,
    pub rms: i64,
    pub zcr: f64,
    pub observed_at: i64,
    pub confidence: String,
}

/// Nom par défaut d'un device auto-découvert (ex: "Device 001")
pub fn placeholder_name(device_id: &str) -> String {
    let tail: String = device_id
        .chars()
        .rev()
        .take(3)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("Device {}", tail)
}

pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_name() {
        assert_eq!(placeholder_name("device001"), "Device 001");
        assert_eq!(placeholder_name("ab"), "Device ab");
    }
}
