//! Zustellung von Voice-Paketen an einzelne Empfaenger
//!
//! Der Router kennt nur das Trait [`VoiceSenke`]. Clients mit gebundener
//! UDP-Adresse bekommen eine [`UdpSenke`], alle anderen eine Tunnel-Senke
//! ueber den Steuerkanal (siehe `murmel-signaling`).

use bytes::Bytes;
use murmel_core::types::SessionId;
use murmel_crypto::CryptState;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Nicht-blockierende Zustellung eines weitergeleiteten Pakets
pub trait VoiceSenke: Send + Sync {
    /// Reiht ein Klartext-Paket ein; `false` wenn es verworfen wurde
    fn senden(&self, paket: Bytes) -> bool;
}

// ---------------------------------------------------------------------------
// UdpSenke
// ---------------------------------------------------------------------------

/// Sende-Queue mit eigenem Task pro UDP-Client
///
/// Der Task verschluesselt jedes Paket mit dem CryptState des Empfaengers
/// und sendet es an `ziel`. Wird die Senke gedroppt, endet der Task.
pub struct UdpSenke {
    session: SessionId,
    tx: mpsc::Sender<Bytes>,
}

impl UdpSenke {
    pub fn starten(
        socket: Arc<UdpSocket>,
        session: SessionId,
        ziel: SocketAddr,
        crypt: Arc<Mutex<CryptState>>,
        queue_groesse: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Bytes>(queue_groesse.max(1));

        tokio::spawn(async move {
            while let Some(klartext) = rx.recv().await {
                let verschluesselt = crypt.lock().verschluesseln(&klartext);
                let daten = match verschluesselt {
                    Ok(daten) => daten,
                    Err(e) => {
                        tracing::warn!(session = %session, fehler = %e, "Verschluesselung fehlgeschlagen");
                        continue;
                    }
                };
                if let Err(e) = socket.send_to(&daten, ziel).await {
                    tracing::warn!(fehler = %e, ziel = %ziel, "UDP-Sendefehler");
                }
            }
            tracing::debug!(session = %session, ziel = %ziel, "Sende-Task beendet");
        });

        Self { session, tx }
    }
}

impl VoiceSenke for UdpSenke {
    fn senden(&self, paket: Bytes) -> bool {
        match self.tx.try_send(paket) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(session = %self.session, "Voice-Queue voll – Paket verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(session = %self.session, "Voice-Queue geschlossen");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
