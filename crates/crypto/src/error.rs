//! Fehlertypen fuer den Kryptotunnel

use thiserror::Error;

/// Fehler im Kryptotunnel
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Datagramm zu kurz: {laenge} Bytes")]
    ZuKurz { laenge: usize },

    #[error("IV-Byte {ivbyte} ausserhalb des Empfangsfensters")]
    AusserhalbFenster { ivbyte: u8 },

    #[error("Wiederholtes Paket (IV bereits gesehen)")]
    Wiederholung,

    #[error("Authentifizierung des Pakets fehlgeschlagen")]
    Authentifizierung,

    #[error("Verschluesselung fehlgeschlagen")]
    Verschluesselung,

    #[error("Ungueltige Nonce-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeNonce { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Key Derivation fehlgeschlagen: {0}")]
    KeyDerivation(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
