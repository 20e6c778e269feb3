//! Handler fuer alle Control-Nachrichten
//!
//! Jeder Handler ist fuer eine Gruppe von Nachrichtenarten zustaendig und hat
//! Zugriff auf den gemeinsamen [`SignalingState`]. Handler nach der Anmeldung
//! geben `murmel_core::Result<()>` zurueck; ein Fehler verwirft die Anfrage
//! still, die Verbindung bleibt bestehen.

pub mod acl_handler;
pub mod auth_handler;
pub mod channel_handler;
pub mod crypt_handler;
pub mod text_handler;
pub mod user_handler;
pub mod voice_handler;

use murmel_core::error::{MurmelError, Result};
use murmel_core::types::{ChannelId, SessionId};
use murmel_protocol::control::{ChannelState, UserState};
use murmel_registry::{hat_berechtigung, Berechtigung, Client, Kanal, SessionRegistry};

use crate::server_state::SignalingState;
use crate::user_state::{user_state_anwenden, Umgebung, Ursprung};

/// Verlangt eine Berechtigung, sonst `NichtBerechtigt`
pub(crate) fn berechtigung_fordern(
    registry: &SessionRegistry,
    state: &SignalingState,
    akteur: SessionId,
    kanal: ChannelId,
    berechtigung: u32,
) -> Result<()> {
    if hat_berechtigung(registry, state.gruppen.as_ref(), akteur, kanal, berechtigung) {
        Ok(())
    } else {
        Err(MurmelError::verweigert(format!(
            "{} in {}",
            Berechtigung::name(berechtigung),
            kanal
        )))
    }
}

/// Vollstaendiger Zustand eines Kanals fuer neue Clients
pub(crate) fn kanal_state(kanal: &Kanal) -> ChannelState {
    ChannelState {
        channel_id: Some(kanal.id),
        parent: kanal.eltern(),
        name: Some(kanal.name.clone()),
        description: Some(kanal.beschreibung.clone()),
        max_users: kanal.max_benutzer,
    }
}

/// Vollstaendiger, sichtbarer Zustand eines Clients
///
/// Plugin-Kontext und -Identitaet bleiben beim Server.
pub(crate) fn voller_user_state(client: &Client) -> UserState {
    let a = &client.attribute;
    UserState {
        session: Some(client.session),
        actor: None,
        name: Some(client.name.clone()),
        user_id: client.benutzer_id.map(i64::from),
        channel_id: Some(client.kanal()),
        mute: Some(a.mute),
        deaf: Some(a.deaf),
        suppress: Some(a.suppress),
        self_mute: Some(a.self_mute),
        self_deaf: Some(a.self_deaf),
        priority_speaker: Some(a.priority_speaker),
        recording: Some(a.recording),
        comment: (!a.kommentar.is_empty()).then(|| a.kommentar.clone()),
        texture: (!a.textur.is_empty()).then(|| a.textur.clone()),
        plugin_context: None,
        plugin_identity: None,
    }
}

/// Setzt `suppress` nach SPEAK im aktuellen Kanal; gibt die Aenderung zurueck
///
/// Laeuft als Server-Aenderung durch [`user_state_anwenden`], nur dort darf
/// `suppress` gesetzt werden.
pub(crate) fn suppress_aktualisieren(
    registry: &mut SessionRegistry,
    state: &SignalingState,
    session: SessionId,
) -> Result<Option<bool>> {
    let kanal = registry.client(session)?.kanal();
    let unterdrueckt = !hat_berechtigung(
        registry,
        state.gruppen.as_ref(),
        session,
        kanal,
        Berechtigung::SPEAK,
    );
    let umgebung = Umgebung {
        gruppen: state.gruppen.as_ref(),
        pruefer: state.pruefer.as_ref(),
        max_textur_bytes: state.config.max_textur_bytes,
    };
    let anfrage = UserState {
        session: Some(session),
        suppress: Some(unterdrueckt),
        ..Default::default()
    };
    let delta = user_state_anwenden(registry, &umgebung, Ursprung::Server, &anfrage)?;
    Ok(delta.and_then(|d| d.suppress))
}

#[cfg(test)]
pub(crate) mod test_hilfe {
    //! Gemeinsamer Aufbau fuer Handler-Tests

    use super::*;
    use crate::broadcast::ClientSender;
    use murmel_crypto::CryptState;
    use murmel_observability::MurmelMetriken;
    use murmel_protocol::control::Nachricht;
    use murmel_registry::Identitaet;
    use murmel_voice::{VoiceRouter, VoiceState};
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::server_state::SignalingConfig;

    pub fn state() -> SignalingState {
        let registry = SessionRegistry::neu().geteilt();
        SignalingState::neu(
            SignalingConfig::default(),
            Arc::clone(&registry),
            VoiceRouter::neu(registry),
            VoiceState::neu(),
            MurmelMetriken::neu().unwrap(),
        )
    }

    pub fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000)
    }

    /// Legt eine Sitzung an und registriert ihre Queue im Broadcaster
    pub fn sitzung(
        state: &SignalingState,
        identitaet: Identitaet,
    ) -> (SessionId, ClientSender, mpsc::Receiver<Nachricht>) {
        let crypt = Arc::new(Mutex::new(CryptState::neu_zufaellig().unwrap()));
        let session = state
            .registry
            .write()
            .sitzung_erstellen(identitaet, Some(peer()), crypt)
            .unwrap();
        let (sender, rx) = ClientSender::neu(peer(), 64);
        state.broadcaster.client_registrieren(session, sender.clone());
        (session, sender, rx)
    }

    pub fn alle(rx: &mut mpsc::Receiver<Nachricht>) -> Vec<Nachricht> {
        let mut nachrichten = Vec::new();
        while let Ok(n) = rx.try_recv() {
            nachrichten.push(n);
        }
        nachrichten
    }
}
