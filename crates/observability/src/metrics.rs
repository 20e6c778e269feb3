//! Prometheus-kompatible Metriken fuer Murmel
//!
//! Registrierte Metriken:
//! - `murmel_connected_clients` – Gauge: Aktuell verbundene Clients
//! - `murmel_kanaele` – Gauge: Anzahl Kanaele im Baum
//! - `murmel_nachrichten_total` – Counter: Empfangene Steuernachrichten (art)
//! - `murmel_verworfene_anfragen_total` – Counter: Verworfene Anfragen (grund)
//! - `murmel_voice_weitergeleitet_total` – Counter: Zugestellte Voice-Pakete
//! - `murmel_voice_verworfen_total` – Counter: Verworfene Voice-Pakete (grund)
//! - `murmel_krypto_fehler_total` – Counter: Nicht entschluesselbare Datagramme

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Murmel-Prometheus-Metriken
#[derive(Clone)]
pub struct MurmelMetriken {
    pub registry: Arc<Registry>,

    // Sitzungen
    pub connected_clients: IntGauge,
    pub kanaele: IntGauge,

    // Steuerkanal
    pub nachrichten_total: IntCounterVec,
    pub verworfene_anfragen_total: IntCounterVec,

    // Voice
    pub voice_weitergeleitet_total: IntCounter,
    pub voice_verworfen_total: IntCounterVec,
    pub krypto_fehler_total: IntCounter,
}

impl MurmelMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Sitzungen ---
        let connected_clients = IntGauge::with_opts(Opts::new(
            "murmel_connected_clients",
            "Anzahl aktuell verbundener Clients",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let kanaele = IntGauge::with_opts(Opts::new("murmel_kanaele", "Anzahl Kanaele im Baum"))?;
        registry.register(Box::new(kanaele.clone()))?;

        // --- Steuerkanal ---
        let nachrichten_total = IntCounterVec::new(
            Opts::new(
                "murmel_nachrichten_total",
                "Empfangene Steuernachrichten nach Art",
            ),
            &["art"],
        )?;
        registry.register(Box::new(nachrichten_total.clone()))?;

        let verworfene_anfragen_total = IntCounterVec::new(
            Opts::new(
                "murmel_verworfene_anfragen_total",
                "Verworfene Anfragen nach Grund",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(verworfene_anfragen_total.clone()))?;

        // --- Voice ---
        let voice_weitergeleitet_total = IntCounter::with_opts(Opts::new(
            "murmel_voice_weitergeleitet_total",
            "An Empfaenger zugestellte Voice-Pakete",
        ))?;
        registry.register(Box::new(voice_weitergeleitet_total.clone()))?;

        let voice_verworfen_total = IntCounterVec::new(
            Opts::new(
                "murmel_voice_verworfen_total",
                "Verworfene Voice-Pakete nach Grund",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(voice_verworfen_total.clone()))?;

        let krypto_fehler_total = IntCounter::with_opts(Opts::new(
            "murmel_krypto_fehler_total",
            "Nicht entschluesselbare Datagramme",
        ))?;
        registry.register(Box::new(krypto_fehler_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            kanaele,
            nachrichten_total,
            verworfene_anfragen_total,
            voice_weitergeleitet_total,
            voice_verworfen_total,
            krypto_fehler_total,
        })
    }

    /// Zaehlt eine empfangene Steuernachricht
    pub fn nachricht_empfangen(&self, art: &str) {
        self.nachrichten_total.with_label_values(&[art]).inc();
    }

    /// Zaehlt eine verworfene Anfrage
    pub fn anfrage_verworfen(&self, grund: &str) {
        self.verworfene_anfragen_total
            .with_label_values(&[grund])
            .inc();
    }

    /// Zaehlt ein verworfenes Voice-Paket
    pub fn voice_verworfen(&self, grund: &str) {
        self.voice_verworfen_total.with_label_values(&[grund]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: MurmelMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<MurmelMetriken>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
