/**
 * ECHOFLEET KERNEL - Point d'entrée principal du service
 *
 * RÔLE : Orchestration de tous les modules : config, snapshot, moteur de
 * réconciliation, listener MQTT, sweep offline, API REST.
 *
 * ARCHITECTURE : Event-driven via MQTT + registre devices persisté + API
 * REST de lecture/administration. Le moteur est l'unique mutateur du
 * registre ; tout le reste observe.
 */

mod config;
mod dispatch;
mod engine;
mod feed;
mod health;
mod http;
mod models;
mod mqtt;
mod normalize;
mod registry;
mod snapshot;

use crate::config::load_config;
use crate::dispatch::CommandDispatcher;
use crate::engine::ReconciliationEngine;
use crate::feed::AlertFeed;
use crate::health::TransportHealth;
use crate::http::AppState;
use crate::registry::DeviceRegistry;
use crate::snapshot::SnapshotStore;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok(); // Ok si .env n'existe pas

    let cfg = load_config().await;
    let namespace = cfg.namespace();

    // snapshot persisté du registre
    let data_dir = cfg.data_dir();
    std::fs::create_dir_all(&data_dir).unwrap_or_else(|e| {
        eprintln!("[kernel] warning: failed to create data dir: {}", e);
    });
    let store = Arc::new(SnapshotStore::new(Path::new(&data_dir).join("devices.json")));

    let registry = Arc::new(DeviceRegistry::new().with_store(store.clone()));
    match store.load().await {
        Ok(records) => {
            println!("[kernel] loaded {} device(s) from snapshot", records.len());
            registry.seed(records);
        }
        Err(e) => {
            eprintln!("[kernel] failed to load snapshot, starting fresh: {}", e);
        }
    }

    let feed = Arc::new(AlertFeed::new());
    let engine = Arc::new(ReconciliationEngine::new(registry.clone(), feed.clone()));
    let health = TransportHealth::new();

    // transport MQTT : une seule connexion pour l'ingestion et le dispatch
    let (mqtt_client, eventloop) = mqtt::create_mqtt_client(&cfg);
    let dispatcher = Arc::new(CommandDispatcher::new(
        Some(mqtt_client.clone()),
        namespace.clone(),
        health.clone(),
    ));

    mqtt::spawn_mqtt_listener(mqtt_client, eventloop, engine.clone(), health.clone(), namespace);

    // démote périodiquement les devices silencieux
    ReconciliationEngine::spawn_sweep(engine.clone());

    let app_state = AppState { registry, feed, engine, dispatcher, health };
    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port()));
    println!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
