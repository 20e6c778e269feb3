//! Fehlertypen fuer den Signaling-Service

use murmel_protocol::error::ProtokollFehler;
use thiserror::Error;

/// Grund fuer das Ende einer Verbindung
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Frame oder Nutzdaten nicht dekodierbar
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    /// Verbindung vom Client geschlossen
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,

    /// Anmeldung abgelehnt, gekickt oder Send-Queue uebergelaufen
    #[error("Vom Server getrennt: {0}")]
    Getrennt(String),

    /// Kein Frame innerhalb des Verbindungs-Timeouts
    #[error("Timeout")]
    Timeout,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    pub fn getrennt(grund: impl Into<String>) -> Self {
        Self::Getrennt(grund.into())
    }

    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
