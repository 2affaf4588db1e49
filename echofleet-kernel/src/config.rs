use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    pub mqtt: Option<MqttConf>,
    /// Préfixe des topics devices (ex: "library/dev001/status")
    pub namespace: Option<String>,
    pub data_dir: Option<String>,
    pub http_port: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 1883 }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            mqtt: Some(MqttConf::default()),
            namespace: None,
            data_dir: None,
            http_port: None,
        }
    }
}

impl KernelConfig {
    pub fn namespace(&self) -> String {
        self.namespace.clone().unwrap_or_else(|| "library".into())
    }

    pub fn data_dir(&self) -> String {
        self.data_dir.clone().unwrap_or_else(|| "./data".into())
    }

    pub fn http_port(&self) -> u16 {
        self.http_port.unwrap_or(8080)
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("ECHOFLEET_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return KernelConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[kernel] config invalide: {e}");
            KernelConfig::default()
        })
    } else {
        eprintln!("[kernel] pas de kernel.yaml, usage config par défaut");
        KernelConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.namespace(), "library");
        assert_eq!(cfg.http_port(), 8080);
        assert_eq!(cfg.mqtt.unwrap().port, 1883);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let cfg: KernelConfig = serde_yaml::from_str("namespace: warehouse\n").unwrap();
        assert_eq!(cfg.namespace(), "warehouse");
        assert!(cfg.mqtt.is_none());
    }
}
