/**
 * DEVICE REGISTRY - Registre autoritaire des devices de la flotte
 *
 * RÔLE :
 * Détient l'unique copie mutable des DeviceRecord : lectures capteurs,
 * liveness, nom et localisation éditables. Seul le moteur de réconciliation
 * a le droit de le muter.
 *
 * FONCTIONNEMENT :
 * - Map device_id -> record sous un seul Mutex (ordre d'insertion conservé)
 * - Garde monotone : un événement dont l'observed_at est strictement plus
 *   ancien que last_seen est ignoré (tolérance aux livraisons désordonnées)
 * - Auto-découverte : la première télémétrie d'un id inconnu crée le record
 *   avec nom placeholder et localisation "Auto-discovered"
 * - Chaque mutation planifie une sauvegarde snapshot asynchrone, jamais
 *   bloquante pour l'appelant (échec loggé, retenté à la mutation suivante)
 */

use crate::models::{placeholder_name, DeviceLocation, DeviceRecord, DEFAULT_BROKER, DEFAULT_BROKER_PORT};
use crate::snapshot::SnapshotStore;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
    store: Option<Arc<SnapshotStore>>,
}

struct RegistryInner {
    devices: HashMap<String, DeviceRecord>,
    /// ordre d'insertion, pour all() et le snapshot
    order: Vec<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner { devices: HashMap::new(), order: Vec::new() }),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Charge l'état initial depuis un snapshot, sans re-persister.
    pub fn seed(&self, records: Vec<DeviceRecord>) {
        let mut inner = self.inner.lock();
        for record in records {
            if !inner.devices.contains_key(&record.device_id) {
                inner.order.push(record.device_id.clone());
            }
            inner.devices.insert(record.device_id.clone(), record);
        }
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.inner.lock().devices.get(device_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().devices.len()
    }

    pub fn count_online(&self) -> usize {
        self.inner.lock().devices.values().filter(|d| d.online).count()
    }

    /// Applique une lecture capteur. Crée le device si inconnu, sinon écrase
    /// rms/zcr/last_seen et repasse online. Retourne le record post-mutation
    /// (inchangé si l'événement est plus ancien que l'état courant).
    pub fn upsert_telemetry(&self, device_id: &str, rms: i64, zcr: f64, at: i64) -> DeviceRecord {
        let (record, changed) = {
            let mut guard = self.inner.lock();
            let RegistryInner { devices, order } = &mut *guard;
            match devices.entry(device_id.to_string()) {
                Entry::Occupied(mut entry) => {
                    let record = entry.get_mut();
                    if at < record.last_seen {
                        // événement en retard : on n'écrase rien
                        (record.clone(), false)
                    } else {
                        record.online = true;
                        record.last_seen = at;
                        record.last_rms = rms;
                        record.last_zcr = zcr;
                        (record.clone(), true)
                    }
                }
                Entry::Vacant(entry) => {
                    let record = DeviceRecord {
                        device_id: device_id.to_string(),
                        device_name: placeholder_name(device_id),
                        location: DeviceLocation {
                            floor: "Unknown".into(),
                            zone: "Unknown".into(),
                            description: "Auto-discovered".into(),
                        },
                        broker: DEFAULT_BROKER.into(),
                        port: DEFAULT_BROKER_PORT,
                        online: true,
                        last_seen: at,
                        last_rms: rms,
                        last_zcr: zcr,
                    };
                    println!("[registry] discovered new device {}", device_id);
                    order.push(device_id.to_string());
                    entry.insert(record.clone());
                    (record, true)
                }
            }
        };
        if changed {
            self.schedule_persist();
        }
        record
    }

    /// Met à jour les champs éditables fournis. Ne touche jamais à online.
    /// No-op silencieux si le device est inconnu (une télémétrie ultérieure
    /// le créera).
    pub fn upsert_info(
        &self,
        device_id: &str,
        device_name: Option<&str>,
        location: Option<DeviceLocation>,
    ) {
        let changed = {
            let mut inner = self.inner.lock();
            match inner.devices.get_mut(device_id) {
                Some(record) => {
                    if let Some(name) = device_name {
                        record.device_name = name.to_string();
                    }
                    if let Some(loc) = location {
                        record.location = loc;
                    }
                    true
                }
                None => false,
            }
        };
        if changed {
            self.schedule_persist();
        }
    }

    /// Démotion conditionnelle pour le sweep : le critère de silence est
    /// réévalué sous le verrou, une télémétrie intercalée entre le snapshot
    /// de la passe et cet appel annule donc la démotion.
    pub fn mark_offline_if_stale(&self, device_id: &str, now: i64, timeout_ms: i64) -> bool {
        let changed = {
            let mut inner = self.inner.lock();
            match inner.devices.get_mut(device_id) {
                Some(record) if record.online && now - record.last_seen > timeout_ms => {
                    record.online = false;
                    true
                }
                _ => false,
            }
        };
        if changed {
            println!("[registry] marked device {} offline", device_id);
            self.schedule_persist();
        }
        changed
    }

    /// Idempotent : ne persiste que si le flag a réellement basculé.
    pub fn mark_offline(&self, device_id: &str) -> bool {
        let changed = {
            let mut inner = self.inner.lock();
            match inner.devices.get_mut(device_id) {
                Some(record) if record.online => {
                    record.online = false;
                    true
                }
                _ => false,
            }
        };
        if changed {
            println!("[registry] marked device {} offline", device_id);
            self.schedule_persist();
        }
        changed
    }

    pub fn delete(&self, device_id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            if inner.devices.remove(device_id).is_some() {
                inner.order.retain(|id| id != device_id);
                true
            } else {
                false
            }
        };
        if removed {
            println!("[registry] deleted device {}", device_id);
            self.schedule_persist();
        }
        removed
    }

    /// Snapshot ordonné (ordre d'insertion) pour la persistance et l'UI.
    pub fn all(&self) -> Vec<DeviceRecord> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.devices.get(id).cloned())
            .collect()
    }

    /// Sauvegarde fire-and-forget : un snapshot intermédiaire perdu est
    /// toléré, le dernier état finit toujours sur disque.
    fn schedule_persist(&self) {
        let Some(store) = &self.store else { return };
        let store = store.clone();
        let snapshot = self.all();
        tokio::spawn(async move {
            if let Err(e) = store.save(&snapshot).await {
                eprintln!("[registry] snapshot save failed: {}", e);
            }
        });
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
