/**
 * SNAPSHOT STORE - Persistance du registre devices
 *
 * RÔLE :
 * Sérialise le registre complet en un tableau JSON de records plats et le
 * recharge au démarrage. Ne mute jamais les records vivants : il ne fait que
 * lire un snapshot pour écrire, et écrire un snapshot pour initialiser.
 *
 * FONCTIONNEMENT :
 * - Fichier unique devices.json (tableau de DeviceEntity plats)
 * - Évolution de schéma : tout champ absent reprend sa valeur par défaut,
 *   un load ne refuse jamais un snapshot d'une version antérieure
 * - Fichier absent = flotte vide, jamais une erreur
 */

use crate::models::{DeviceLocation, DeviceRecord, DEFAULT_BROKER, DEFAULT_BROKER_PORT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Forme plate sur disque d'un DeviceRecord
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntity {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub floor: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_broker")]
    pub broker: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_seen: i64,
    #[serde(default)]
    pub last_rms: i64,
    #[serde(default)]
    pub last_zcr: f64,
}

fn default_broker() -> String {
    DEFAULT_BROKER.to_string()
}

fn default_port() -> u16 {
    DEFAULT_BROKER_PORT
}

impl From<&DeviceRecord> for DeviceEntity {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            device_id: record.device_id.clone(),
            device_name: record.device_name.clone(),
            floor: record.location.floor.clone(),
            zone: record.location.zone.clone(),
            description: record.location.description.clone(),
            broker: record.broker.clone(),
            port: record.port,
            online: record.online,
            last_seen: record.last_seen,
            last_rms: record.last_rms,
            last_zcr: record.last_zcr,
        }
    }
}

impl DeviceEntity {
    fn into_record(self) -> DeviceRecord {
        DeviceRecord {
            device_id: self.device_id,
            device_name: self.device_name,
            location: DeviceLocation {
                floor: self.floor,
                zone: self.zone,
                description: self.description,
            },
            broker: self.broker,
            port: self.port,
            online: self.online,
            last_seen: self.last_seen,
            last_rms: self.last_rms,
            last_zcr: self.last_zcr,
        }
    }
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub async fn save(&self, records: &[DeviceRecord]) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let entities: Vec<DeviceEntity> = records.iter().map(DeviceEntity::from).collect();
        let content = serde_json::to_string_pretty(&entities)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Recharge le snapshot. Fichier absent ou vide = flotte vide.
    pub async fn load(&self) -> Result<Vec<DeviceRecord>, SnapshotError> {
        if !self.path.exists() {
            println!("[snapshot] no existing snapshot, starting fresh");
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let entities: Vec<DeviceEntity> = serde_json::from_str(&content)?;
        Ok(entities
            .into_iter()
            .filter(|e| !e.device_id.is_empty())
            .map(DeviceEntity::into_record)
            .collect())
    }
}
