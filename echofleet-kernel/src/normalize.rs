/**
 * EVENT NORMALIZER - Traduction des payloads bruts en événements internes
 *
 * RÔLE :
 * Les devices publient sous deux formes indépendantes : messages JSON plats
 * via pub/sub (library/<id>/status|alert|alert_history) et snapshots imbriqués
 * via le store temps réel (devices/<id>/status|info|messages). Ce module
 * traduit les deux en un seul jeu de variantes `Event`, pour que le moteur
 * de réconciliation n'existe qu'en un exemplaire.
 *
 * FONCTIONNEMENT :
 * - Pur et sans état : (source, origine, payload) -> Event, aucune I/O
 * - Politique tolérante : un champ numérique absent vaut 0, un champ texte
 *   absent prend un placeholder. Un seul champ malformé ne jette jamais
 *   un événement exploitable. Seul le JSON structurellement invalide ou
 *   l'absence totale de device id sont des erreurs.
 * - Device id : champ `device_id` du payload, sinon 2e segment du topic/path
 * - Timestamps : le firmware publie des secondes epoch, le store des millis ;
 *   les valeurs sous 1e11 sont promues en millis
 */

use crate::models::{DeviceLocation, Event};
use serde_json::Value;

/// Transport d'origine d'un payload brut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Message pub/sub plat (topic `<namespace>/<deviceId>/<kind>`)
    PubSub,
    /// Snapshot du store temps réel (path `devices/<deviceId>/<node>`)
    Store,
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("payload is not valid JSON: {0}")]
    BadJson(#[from] serde_json::Error),
    #[error("no device id in payload or origin '{0}'")]
    MissingDeviceId(String),
    #[error("unrecognized origin '{0}'")]
    UnknownOrigin(String),
}

/// Normalise un payload simple (un message = un événement).
/// `origin` est le topic MQTT ou le path du snapshot store.
pub fn normalize(source: SourceKind, origin: &str, payload: &[u8]) -> Result<Event, NormalizeError> {
    let value: Value = serde_json::from_slice(payload)?;
    let device_id = extract_device_id(origin, &value)?;
    let kind = origin.split('/').next_back().unwrap_or_default();

    match (source, kind) {
        (SourceKind::PubSub, "status") | (SourceKind::PubSub, "telemetry") => {
            if value.get("type").and_then(Value::as_str) == Some("device_info") {
                Ok(device_info_event(device_id, &value))
            } else {
                Ok(Event::Telemetry {
                    device_id,
                    rms: int_field(&value, "rms"),
                    zcr: float_field(&value, "zcr"),
                    observed_at: observed_at(&value),
                })
            }
        }
        (SourceKind::PubSub, "alert") | (SourceKind::PubSub, "alert_history") => {
            Ok(alert_event(device_id, &value))
        }
        (SourceKind::Store, "status") => {
            // snapshot imbriqué : les lectures vivent sous info.last_rms / info.last_zcr
            let info = value.get("info").cloned().unwrap_or(Value::Null);
            Ok(Event::Telemetry {
                device_id,
                rms: int_field(&info, "last_rms"),
                zcr: float_field(&info, "last_zcr"),
                observed_at: observed_at(&value),
            })
        }
        (SourceKind::Store, "info") => Ok(Event::DeviceInfo {
            device_id,
            device_name: value
                .get("device_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            location: Some(location_from(&value)),
        }),
        (SourceKind::Store, "messages") => Ok(alert_event(device_id, &value)),
        _ => Err(NormalizeError::UnknownOrigin(origin.to_string())),
    }
}

/// Normalise un lot `alert_history` en événements `Alert` individuels.
/// Accepte `{"history": [...]}`, un tableau nu, ou une entrée isolée.
/// Le cooldown et la garde monotone du moteur s'appliquent au replay.
pub fn normalize_history(origin: &str, payload: &[u8]) -> Result<Vec<Event>, NormalizeError> {
    let value: Value = serde_json::from_slice(payload)?;
    let device_id = extract_device_id(origin, &value)?;

    let entries = match &value {
        Value::Array(items) => items.clone(),
        Value::Object(_) => match value.get("history") {
            Some(Value::Array(items)) => items.clone(),
            _ => vec![value.clone()],
        },
        _ => Vec::new(),
    };

    Ok(entries
        .iter()
        .filter(|entry| entry.is_object())
        .map(|entry| {
            let id = entry
                .get("device_id")
                .and_then(Value::as_str)
                .unwrap_or(&device_id)
                .to_string();
            alert_event(id, entry)
        })
        .collect())
}

fn alert_event(device_id: String, value: &Value) -> Event {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .or_else(|| value.get("label").and_then(Value::as_str))
        .unwrap_or("UNKNOWN")
        .to_string();
    let confidence = value
        .get("confidence")
        .and_then(Value::as_str)
        .unwrap_or("High")
        .to_string();
    Event::Alert {
        device_id,
        kind,
        rms: int_field(value, "rms"),
        zcr: float_field(value, "zcr"),
        observed_at: observed_at(value),
        confidence,
    }
}

fn device_info_event(device_id: String, value: &Value) -> Event {
    Event::DeviceInfo {
        device_id,
        device_name: value
            .get("device_name")
            .and_then(Value::as_str)
            .map(str::to_string),
        location: value.get("location").map(location_from),
    }
}

fn location_from(value: &Value) -> DeviceLocation {
    DeviceLocation {
        floor: str_field(value, "floor"),
        zone: str_field(value, "zone"),
        description: str_field(value, "description"),
    }
}

fn extract_device_id(origin: &str, value: &Value) -> Result<String, NormalizeError> {
    if let Some(id) = value.get("device_id").and_then(Value::as_str) {
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }
    match origin.split('/').nth(1) {
        Some(seg) if !seg.is_empty() => Ok(seg.to_string()),
        _ => Err(NormalizeError::MissingDeviceId(origin.to_string())),
    }
}

fn int_field(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

fn float_field(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Seuil sous lequel un timestamp epoch est considéré en secondes
const SECONDS_THRESHOLD: i64 = 100_000_000_000;

fn observed_at(value: &Value) -> i64 {
    let raw = int_field(value, "timestamp");
    if raw != 0 && raw < SECONDS_THRESHOLD {
        raw * 1000
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubsub_status_is_telemetry() {
        let payload = br#"{"timestamp": 1700000000, "rms": 42, "zcr": 0.12}"#;
        let event = normalize(SourceKind::PubSub, "library/device001/status", payload).unwrap();
        assert_eq!(
            event,
            Event::Telemetry {
                device_id: "device001".into(),
                rms: 42,
                zcr: 0.12,
                observed_at: 1_700_000_000_000,
            }
        );
    }

    #[test]
    fn test_pubsub_status_device_info() {
        let payload = br#"{"type": "device_info", "device_name": "Hall Est",
                           "location": {"floor": "2", "zone": "B", "description": "near stairs"}}"#;
        let event = normalize(SourceKind::PubSub, "library/device001/status", payload).unwrap();
        match event {
            Event::DeviceInfo { device_id, device_name, location } => {
                assert_eq!(device_id, "device001");
                assert_eq!(device_name.as_deref(), Some("Hall Est"));
                assert_eq!(location.unwrap().zone, "B");
            }
            other => panic!("expected DeviceInfo, got {:?}", other),
        }
    }

    #[test]
    fn test_pubsub_alert() {
        let payload =
            br#"{"type": "SPEECH", "timestamp": 1700000010, "rms": 90, "zcr": 0.3, "confidence": "High"}"#;
        let event = normalize(SourceKind::PubSub, "library/device001/alert", payload).unwrap();
        match event {
            Event::Alert { kind, rms, observed_at, confidence, .. } => {
                assert_eq!(kind, "SPEECH");
                assert_eq!(rms, 90);
                assert_eq!(observed_at, 1_700_000_010_000);
                assert_eq!(confidence, "High");
            }
            other => panic!("expected Alert, got {:?}", other),
        }
    }

    #[test]
    fn test_lenient_defaults() {
        // champs manquants : rms/zcr à zéro, kind UNKNOWN, confidence High
        let event = normalize(SourceKind::PubSub, "library/device001/alert", b"{}").unwrap();
        assert_eq!(
            event,
            Event::Alert {
                device_id: "device001".into(),
                kind: "UNKNOWN".into(),
                rms: 0,
                zcr: 0.0,
                observed_at: 0,
                confidence: "High".into(),
            }
        );
    }

    #[test]
    fn test_device_id_from_payload_wins() {
        let payload = br#"{"device_id": "device777", "rms": 1}"#;
        let event = normalize(SourceKind::PubSub, "library/device001/status", payload).unwrap();
        match event {
            Event::Telemetry { device_id, .. } => assert_eq!(device_id, "device777"),
            other => panic!("expected Telemetry, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_device_id_fails() {
        let err = normalize(SourceKind::PubSub, "status", b"{}").unwrap_err();
        assert!(matches!(err, NormalizeError::MissingDeviceId(_)));
    }

    #[test]
    fn test_invalid_json_fails() {
        let err = normalize(SourceKind::PubSub, "library/device001/status", b"not json").unwrap_err();
        assert!(matches!(err, NormalizeError::BadJson(_)));
    }

    #[test]
    fn test_unknown_kind_fails() {
        let err = normalize(SourceKind::PubSub, "library/device001/firmware", b"{}").unwrap_err();
        assert!(matches!(err, NormalizeError::UnknownOrigin(_)));
    }

    #[test]
    fn test_millis_timestamps_kept_as_is() {
        let payload = br#"{"timestamp": 1700000000000, "rms": 5}"#;
        let event = normalize(SourceKind::PubSub, "library/device001/status", payload).unwrap();
        match event {
            Event::Telemetry { observed_at, .. } => assert_eq!(observed_at, 1_700_000_000_000),
            other => panic!("expected Telemetry, got {:?}", other),
        }
    }

    #[test]
    fn test_store_status_nested_readings() {
        let payload = br#"{"timestamp": 1700000000000, "status": "online",
                           "info": {"last_rms": 33, "last_zcr": 0.07, "alarm_state": "IDLE"}}"#;
        let event = normalize(SourceKind::Store, "devices/device002/status", payload).unwrap();
        assert_eq!(
            event,
            Event::Telemetry {
                device_id: "device002".into(),
                rms: 33,
                zcr: 0.07,
                observed_at: 1_700_000_000_000,
            }
        );
    }

    #[test]
    fn test_store_info_node() {
        let payload = br#"{"floor": "3", "zone": "C", "description": "reading room"}"#;
        let event = normalize(SourceKind::Store, "devices/device002/info", payload).unwrap();
        match event {
            Event::DeviceInfo { device_name, location, .. } => {
                assert!(device_name.is_none());
                let loc = location.unwrap();
                assert_eq!(loc.floor, "3");
                assert_eq!(loc.description, "reading room");
            }
            other => panic!("expected DeviceInfo, got {:?}", other),
        }
    }

    #[test]
    fn test_store_message_is_alert() {
        let payload = br#"{"timestamp": 1700000020000, "label": "SPEECH", "rms": 80, "zcr": 0.2}"#;
        let event = normalize(SourceKind::Store, "devices/device002/messages", payload).unwrap();
        match event {
            Event::Alert { kind, observed_at, .. } => {
                assert_eq!(kind, "SPEECH");
                assert_eq!(observed_at, 1_700_000_020_000);
            }
            other => panic!("expected Alert, got {:?}", other),
        }
    }

    #[test]
    fn test_history_wrapped_batch() {
        let payload = br#"{"history": [
            {"type": "SPEECH", "timestamp": 1700000000, "rms": 70, "zcr": 0.2},
            {"type": "NOISE", "timestamp": 1700000010, "rms": 50, "zcr": 0.1}
        ]}"#;
        let events =
            normalize_history("library/device001/alert_history", payload).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], Event::Alert { kind, .. } if kind == "NOISE"));
    }

    #[test]
    fn test_history_bare_array() {
        let payload = br#"[{"type": "SPEECH", "timestamp": 1700000000, "rms": 70, "zcr": 0.2}]"#;
        let events =
            normalize_history("library/device001/alert_history", payload).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Alert { device_id, .. } if device_id == "device001"));
    }

    #[test]
    fn test_history_skips_non_objects() {
        let payload = br#"{"history": [42, "junk", {"type": "SPEECH", "rms": 1}]}"#;
        let events =
            normalize_history("library/device001/alert_history", payload).unwrap();
        assert_eq!(events.len(), 1);
    }
}
