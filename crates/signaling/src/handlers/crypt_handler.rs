//! Crypt-Handler – Ping und Resync des Sprach-Tunnels

use murmel_core::error::{MurmelError, Result};
use murmel_core::types::SessionId;
use murmel_crypto::ResyncErgebnis;
use murmel_protocol::control::{CryptSetup, Nachricht, Ping};
use std::sync::Arc;

use crate::broadcast::ClientSender;
use crate::dispatcher::DispatcherContext;
use crate::server_state::SignalingState;

/// Beantwortet einen Ping mit demselben Zeitstempel
///
/// Angemeldete Clients bekommen zusaetzlich die Empfangszaehler des Servers.
pub fn handle_ping(anfrage: Ping, ctx: &DispatcherContext, state: &SignalingState) {
    let mut antwort = Ping {
        timestamp: anfrage.timestamp,
        ..Default::default()
    };

    if let Some(session) = ctx.session {
        let crypt = state
            .registry
            .read()
            .client(session)
            .map(|c| Arc::clone(&c.crypt));
        if let Ok(crypt) = crypt {
            let statistik = crypt.lock().statistik();
            antwort.good = Some(statistik.gut);
            antwort.late = Some(statistik.spaet);
            antwort.lost = Some(statistik.verloren);
            antwort.resync = Some(statistik.resync);
        }
    }

    ctx.antwort.senden(Nachricht::Ping(antwort));
}

/// Verarbeitet eine Resync-Anfrage
///
/// Ohne Client-Nonce antwortet der Server mit seinem Sende-IV, mit Nonce
/// uebernimmt er ihn als Empfangs-IV.
pub fn handle_crypt_setup(
    anfrage: CryptSetup,
    session: SessionId,
    antwort: &ClientSender,
    state: &SignalingState,
) -> Result<()> {
    let crypt = Arc::clone(&state.registry.read().client(session)?.crypt);
    let ergebnis = crypt.lock().resync_verarbeiten(anfrage.client_nonce.as_deref());

    match ergebnis {
        ResyncErgebnis::Antwort(iv) => {
            antwort.senden(Nachricht::CryptSetup(CryptSetup {
                key: None,
                client_nonce: None,
                server_nonce: Some(iv.to_vec()),
            }));
            Ok(())
        }
        ResyncErgebnis::Uebernommen => {
            tracing::debug!(session = %session, "Empfangs-IV neu gesetzt");
            Ok(())
        }
        ResyncErgebnis::Ignoriert => Err(MurmelError::eingabe("Resync-Nonce mit falscher Laenge")),
    }
}
