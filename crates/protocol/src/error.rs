//! Fehlertypen des Protokoll-Crates

use thiserror::Error;

pub type ProtokollResult<T> = std::result::Result<T, ProtokollFehler>;

#[derive(Debug, Error)]
pub enum ProtokollFehler {
    #[error("Unbekannte Nachrichtenart: {0}")]
    UnbekannteArt(u16),

    #[error("Nutzdaten fuer {art} nicht dekodierbar: {quelle}")]
    Dekodierung {
        art: &'static str,
        #[source]
        quelle: serde_json::Error,
    },

    #[error("Nachricht {art} nicht kodierbar: {quelle}")]
    Kodierung {
        art: &'static str,
        #[source]
        quelle: serde_json::Error,
    },
}
