//! # murmel-crypto
//!
//! Symmetrischer Kryptotunnel fuer die Voice-Datagramme.
//!
//! ## Module
//! - `crypt_state` - Schluessel, IVs, Paketzaehler und Resync pro Client
//! - `error` - Fehlertypen

pub mod crypt_state;
pub mod error;

// Bequeme Re-Exports
pub use crypt_state::{CryptState, CryptStatistik, ResyncErgebnis, Rolle, BLOCK_GROESSE};
pub use error::{CryptoError, CryptoResult};
