//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use murmel_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Umgebungsvariable mit dem Pfad der Konfigurationsdatei
pub const ENV_CONFIG: &str = "MURMEL_CONFIG";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Laengen- und Queue-Grenzen
    pub limits: LimitEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
    /// Gruppenname -> registrierte Benutzer-IDs
    pub gruppen: HashMap<String, Vec<u32>>,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: u32,
    /// Willkommensnachricht im ServerSync
    pub willkommen: String,
    /// Passwort des Superusers (leer = Superuser-Login deaktiviert)
    pub superuser_passwort: Option<String>,
    /// Maximale Voice-Bandbreite pro Client in Bit/s
    pub max_bandbreite: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Murmel Server".into(),
            max_clients: 512,
            willkommen: "Willkommen auf Murmel".into(),
            superuser_passwort: None,
            max_bandbreite: 72_000,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer TCP und UDP
    pub bind_adresse: String,
    /// Port fuer den Steuerkanal
    pub tcp_port: u16,
    /// Port fuer Voice-Datagramme
    pub udp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 64738,
            udp_port: 64738,
        }
    }
}

/// Laengen- und Queue-Grenzen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitEinstellungen {
    /// Maximale Texturgroesse in Bytes (0 = unbegrenzt)
    pub max_textur_bytes: usize,
    pub max_kommentar_laenge: usize,
    pub max_nachricht_laenge: usize,
    /// Ausgehende Nachrichten pro Verbindung bevor sie getrennt wird
    pub send_queue_groesse: usize,
    /// Voice-Datagramme pro UDP-Empfaenger
    pub voice_queue_groesse: usize,
    pub keepalive_sek: u64,
    pub verbindungs_timeout_sek: u64,
}

impl Default for LimitEinstellungen {
    fn default() -> Self {
        let signaling = SignalingConfig::default();
        Self {
            max_textur_bytes: signaling.max_textur_bytes,
            max_kommentar_laenge: signaling.max_kommentar_laenge,
            max_nachricht_laenge: signaling.max_nachricht_laenge,
            send_queue_groesse: signaling.send_queue_groesse,
            voice_queue_groesse: 128,
            keepalive_sek: signaling.keepalive_sek,
            verbindungs_timeout_sek: signaling.verbindungs_timeout_sek,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte, die serde nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if self.server.max_clients == 0 {
            anyhow::bail!("server.max_clients muss groesser als 0 sein");
        }
        if self.limits.send_queue_groesse == 0 || self.limits.voice_queue_groesse == 0 {
            anyhow::bail!("Queue-Groessen muessen groesser als 0 sein");
        }
        if self.limits.keepalive_sek >= self.limits.verbindungs_timeout_sek {
            anyhow::bail!("limits.keepalive_sek muss kleiner als verbindungs_timeout_sek sein");
        }
        if !murmel_observability::logging::log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Unbekanntes Log-Format '{}'", self.logging.format);
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Gibt die vollstaendige Bind-Adresse fuer UDP zurueck
    pub fn udp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.udp_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }

    /// Einstellungen fuer den Steuerkanal
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            willkommen: self.server.willkommen.clone(),
            max_clients: self.server.max_clients,
            max_bandbreite: self.server.max_bandbreite,
            max_textur_bytes: self.limits.max_textur_bytes,
            max_kommentar_laenge: self.limits.max_kommentar_laenge,
            max_nachricht_laenge: self.limits.max_nachricht_laenge,
            send_queue_groesse: self.limits.send_queue_groesse,
            keepalive_sek: self.limits.keepalive_sek,
            verbindungs_timeout_sek: self.limits.verbindungs_timeout_sek,
        }
    }
}
