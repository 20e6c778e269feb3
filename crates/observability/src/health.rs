//! Health-Check-Endpunkt fuer Murmel
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und verbundenen Clients

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::MurmelMetriken;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub connected_clients: i64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    metriken: MurmelMetriken,
}

impl HealthState {
    pub fn neu(metriken: MurmelMetriken) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            metriken,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn verbundene_clients(&self) -> i64 {
        self.metriken.connected_clients.get()
    }

    pub fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: HealthStatus::Healthy,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            connected_clients: self.verbundene_clients(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.antwort()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_frisch() {
        let state = HealthState::neu(MurmelMetriken::neu().unwrap());
        assert!(state.uptime_seconds() < 5);
        assert_eq!(state.verbundene_clients(), 0);
    }

    #[test]
    fn antwort_spiegelt_client_gauge() {
        let metriken = MurmelMetriken::neu().unwrap();
        let state = HealthState::neu(metriken.clone());
        metriken.connected_clients.set(4);
        let antwort = state.antwort();
        assert_eq!(antwort.status, HealthStatus::Healthy);
        assert_eq!(antwort.connected_clients, 4);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            connected_clients: 2,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"connected_clients\":2"));
    }

    #[test]
    fn health_response_deserialisierung() {
        let json = r#"{"status":"degraded","version":"0.1.0","uptime_seconds":100,"connected_clients":0}"#;
        let response: HealthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.uptime_seconds, 100);
    }
}
