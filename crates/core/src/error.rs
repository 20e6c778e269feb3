//! Fehlertypen fuer Murmel
//!
//! Zentraler Fehler-Enum fuer Registry, Berechtigungen und Zustandsaenderungen.
//! Jeder Fehler laesst sich einer `FehlerKlasse` zuordnen, nach der die
//! Handler entscheiden ob eine Anfrage still verworfen oder die Verbindung
//! getrennt wird.

use crate::types::{ChannelId, SessionId};
use thiserror::Error;

/// Globaler Result-Alias fuer Murmel
pub type Result<T> = std::result::Result<T, MurmelError>;

/// Alle moeglichen Fehler im Murmel-Kern
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MurmelError {
    // --- Eingabe ---
    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    // --- Autorisierung ---
    #[error("Nicht berechtigt: {0}")]
    NichtBerechtigt(String),

    // --- Nachschlagen ---
    #[error("Sitzung nicht gefunden: {0}")]
    SitzungNichtGefunden(SessionId),

    #[error("Kanal nicht gefunden: {0}")]
    KanalNichtGefunden(ChannelId),

    // --- Krypto ---
    #[error("Kryptofehler: {0}")]
    Krypto(String),

    // --- Ressourcen ---
    #[error("Ressource erschoepft: {0}")]
    Erschoepft(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

/// Grobe Einordnung eines Fehlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FehlerKlasse {
    /// Anfrage strukturell ungueltig (auch unbekannte IDs)
    FehlerhafteEingabe,
    /// Berechtigungspruefung fehlgeschlagen
    NichtBerechtigt,
    /// Paket nicht entschluesselbar
    Krypto,
    /// Queue voll, Server voll
    Erschoepft,
    Intern,
}

impl MurmelError {
    /// Erstellt einen Eingabefehler aus einer beliebigen Nachricht
    pub fn eingabe(msg: impl Into<String>) -> Self {
        Self::UngueltigeEingabe(msg.into())
    }

    /// Erstellt einen Autorisierungsfehler
    pub fn verweigert(msg: impl Into<String>) -> Self {
        Self::NichtBerechtigt(msg.into())
    }

    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Ordnet den Fehler seiner Klasse zu
    ///
    /// Unbekannte Sitzungen und Kanaele zaehlen als fehlerhafte Eingabe.
    pub fn klasse(&self) -> FehlerKlasse {
        match self {
            Self::UngueltigeEingabe(_)
            | Self::SitzungNichtGefunden(_)
            | Self::KanalNichtGefunden(_) => FehlerKlasse::FehlerhafteEingabe,
            Self::NichtBerechtigt(_) => FehlerKlasse::NichtBerechtigt,
            Self::Krypto(_) => FehlerKlasse::Krypto,
            Self::Erschoepft(_) => FehlerKlasse::Erschoepft,
            Self::Intern(_) => FehlerKlasse::Intern,
        }
    }

    /// Gibt true zurueck wenn der Fehler die Verbindung beenden muss
    ///
    /// Nur interne Fehler sind fatal, alles andere wird verworfen.
    pub fn ist_fatal(&self) -> bool {
        matches!(self.klasse(), FehlerKlasse::Intern)
    }
}
