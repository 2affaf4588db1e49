/**
 * API REST ECHOFLEET - Surface d'administration et de lecture du kernel
 *
 * RÔLE :
 * Expose le registre, le feed d'alertes et l'envoi de commandes pour le
 * dashboard et les outils d'admin. Aucune mutation du registre ne passe en
 * direct : les éditions transitent par le moteur sous forme d'événements.
 *
 * ROUTES :
 * - GET  /health                    liveness simple, sans auth
 * - GET  /system/health             uptime, devices, état transport
 * - GET  /devices, /devices/{id}    vues registre (last_seen RFC3339)
 * - PUT  /devices/{id}              édition nom / localisation
 * - DELETE /devices/{id}            suppression d'un device
 * - GET  /alerts, DELETE /alerts    feed borné des alertes
 * - POST /devices/{id}/command      dispatch best-effort ({"action": ...})
 *
 * SÉCURITÉ : header x-api-key obligatoire partout sauf /health.
 */

use crate::dispatch::CommandDispatcher;
use crate::engine::ReconciliationEngine;
use crate::feed::AlertFeed;
use crate::health::TransportHealth;
use crate::models::{now_ms, AlertNotification, DeviceLocation, DeviceRecord, Event};
use crate::registry::DeviceRegistry;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
    pub feed: Arc<AlertFeed>,
    pub engine: Arc<ReconciliationEngine>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub health: TransportHealth,
}

#[derive(serde::Serialize)]
struct DeviceView {
    device_id: String,
    device_name: String,
    floor: String,
    zone: String,
    description: String,
    broker: String,
    port: u16,
    online: bool,
    last_seen: String, // RFC3339 pour l'API
    last_seen_ms: i64,
    silent_for_seconds: i64,
    last_rms: i64,
    last_zcr: f64,
}

fn to_view(record: &DeviceRecord) -> DeviceView {
    let last_seen = OffsetDateTime::from_unix_timestamp_nanos(record.last_seen as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default();
    let silent = ((now_ms() - record.last_seen) / 1000).max(0);
    DeviceView {
        device_id: record.device_id.clone(),
        device_name: record.device_name.clone(),
        floor: record.location.floor.clone(),
        zone: record.location.zone.clone(),
        description: record.location.description.clone(),
        broker: record.broker.clone(),
        port: record.port,
        online: record.online,
        last_seen,
        last_seen_ms: record.last_seen,
        silent_for_seconds: silent,
        last_rms: record.last_rms,
        last_zcr: record.last_zcr,
    }
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path();

    // Health check toujours accessible
    if path.starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("ECHOFLEET_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        eprintln!("SECURITY: ECHOFLEET_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/devices", get(get_devices))
        .route("/devices/{id}", get(get_device).put(edit_device).delete(delete_device))
        .route("/devices/{id}/command", post(send_command))
        .route("/alerts", get(get_alerts).delete(clear_alerts))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

async fn get_system_health(State(app): State<AppState>) -> Json<crate::health::KernelHealth> {
    Json(app.health.get_health(&app.registry, &app.feed))
}

// GET /devices (liste, ordre d'insertion)
async fn get_devices(State(app): State<AppState>) -> Json<Vec<DeviceView>> {
    let list: Vec<DeviceView> = app.registry.all().iter().map(to_view).collect();
    Json(list)
}

// GET /devices/:id (détail)
async fn get_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceView>, StatusCode> {
    let Some(record) = app.registry.get(&id) else { return Err(StatusCode::NOT_FOUND) };
    Ok(Json(to_view(&record)))
}

#[derive(Debug, Deserialize)]
struct EditDeviceRequest {
    device_name: Option<String>,
    floor: Option<String>,
    zone: Option<String>,
    description: Option<String>,
}

// PUT /devices/:id (édition nom/localisation, ne touche jamais online)
async fn edit_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EditDeviceRequest>,
) -> Result<Json<DeviceView>, StatusCode> {
    let Some(current) = app.registry.get(&id) else { return Err(StatusCode::NOT_FOUND) };

    // champs de localisation absents = valeurs courantes conservées
    let location = if body.floor.is_some() || body.zone.is_some() || body.description.is_some() {
        Some(DeviceLocation {
            floor: body.floor.unwrap_or(current.location.floor),
            zone: body.zone.unwrap_or(current.location.zone),
            description: body.description.unwrap_or(current.location.description),
        })
    } else {
        None
    };

    app.engine.handle_event(
        Event::DeviceInfo { device_id: id.clone(), device_name: body.device_name, location },
        now_ms(),
    );

    let Some(updated) = app.registry.get(&id) else { return Err(StatusCode::NOT_FOUND) };
    Ok(Json(to_view(&updated)))
}

// DELETE /devices/:id
async fn delete_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if app.engine.remove_device(&id) {
        Ok(Json(serde_json::json!({"status": "deleted"})))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    action: String,
}

// POST /devices/:id/command (best-effort, 503 si transport indisponible)
async fn send_command(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CommandRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let sent = app.dispatcher.send(&id, &body.action).await;
    if sent {
        (StatusCode::ACCEPTED, Json(serde_json::json!({"ok": true, "action": body.action})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"ok": false, "msg": "transport unavailable"})),
        )
    }
}

// GET /alerts (plus récentes d'abord)
async fn get_alerts(State(app): State<AppState>) -> Json<Vec<AlertNotification>> {
    Json(app.feed.recent())
}

// DELETE /alerts (purge du feed)
async fn clear_alerts(State(app): State<AppState>) -> Json<serde_json::Value> {
    app.feed.clear();
    Json(serde_json::json!({"status": "cleared"}))
}
