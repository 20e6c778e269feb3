//! Verbundene Clients und ihre Attribute

use murmel_core::types::{ChannelId, SessionId};
use murmel_crypto::CryptState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Registrierte Benutzer-ID des Server-Superusers
pub const SUPERUSER_ID: u32 = 0;

// ---------------------------------------------------------------------------
// Identitaet
// ---------------------------------------------------------------------------

/// Ergebnis der Authentifizierung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identitaet {
    pub name: String,
    /// Registrierte Benutzer-ID, `None` fuer Gaeste
    pub benutzer_id: Option<u32>,
}

impl Identitaet {
    pub fn gast(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            benutzer_id: None,
        }
    }

    pub fn registriert(name: impl Into<String>, benutzer_id: u32) -> Self {
        Self {
            name: name.into(),
            benutzer_id: Some(benutzer_id),
        }
    }

    pub fn superuser() -> Self {
        Self::registriert("SuperUser", SUPERUSER_ID)
    }
}

// ---------------------------------------------------------------------------
// VoiceZiel
// ---------------------------------------------------------------------------

/// Kanal-Anteil eines VoiceTargets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KanalZiel {
    pub kanal: ChannelId,
    pub unterkanaele: bool,
    /// Verknuepfte Kanaele; Kanal-Links werden nicht verwaltet
    pub links: bool,
}

/// Aufgeloestes, beim Setzen bereits autorisiertes Fluesterziel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceZiel {
    pub sitzungen: Vec<SessionId>,
    pub kanaele: Vec<KanalZiel>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Vom Benutzer oder Server aenderbare Attribute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientAttribute {
    pub self_mute: bool,
    pub self_deaf: bool,
    pub mute: bool,
    pub deaf: bool,
    pub suppress: bool,
    pub priority_speaker: bool,
    pub recording: bool,
    pub kommentar: String,
    pub textur: Vec<u8>,
    pub plugin_kontext: Vec<u8>,
    pub plugin_identitaet: String,
}

/// Ein verbundener Client
#[derive(Debug)]
pub struct Client {
    pub session: SessionId,
    pub name: String,
    pub benutzer_id: Option<u32>,
    pub tcp_adresse: Option<SocketAddr>,
    /// Wird beim ersten erfolgreich entschluesselten Datagramm gesetzt
    pub udp_adresse: Option<SocketAddr>,
    pub crypt: Arc<Mutex<CryptState>>,
    pub attribute: ClientAttribute,
    /// Fluesterziele 1..=14
    pub voice_ziele: HashMap<u8, VoiceZiel>,
    pub verbunden_seit: Instant,
    pub(crate) kanal: ChannelId,
}

impl Client {
    pub(crate) fn neu(
        session: SessionId,
        identitaet: Identitaet,
        tcp_adresse: Option<SocketAddr>,
        crypt: Arc<Mutex<CryptState>>,
    ) -> Self {
        Self {
            session,
            name: identitaet.name,
            benutzer_id: identitaet.benutzer_id,
            tcp_adresse,
            udp_adresse: None,
            crypt,
            attribute: ClientAttribute::default(),
            voice_ziele: HashMap::new(),
            verbunden_seit: Instant::now(),
            kanal: ChannelId::WURZEL,
        }
    }

    /// Aktueller Kanal
    pub fn kanal(&self) -> ChannelId {
        self.kanal
    }

    pub fn ist_superuser(&self) -> bool {
        self.benutzer_id == Some(SUPERUSER_ID)
    }

    pub fn ist_registriert(&self) -> bool {
        self.benutzer_id.is_some()
    }

    /// Darf dieser Client gerade nicht sprechen?
    pub fn ist_stumm(&self) -> bool {
        let a = &self.attribute;
        a.mute || a.self_mute || a.suppress || a.deaf || a.self_deaf
    }

    pub fn ist_taub(&self) -> bool {
        self.attribute.deaf || self.attribute.self_deaf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        let crypt = CryptState::neu_zufaellig().unwrap();
        Client::neu(
            SessionId(1),
            Identitaet::gast("anna"),
            None,
            Arc::new(Mutex::new(crypt)),
        )
    }

    #[test]
    fn neuer_client_startet_in_wurzel() {
        let client = test_client();
        assert_eq!(client.kanal(), ChannelId::WURZEL);
        assert!(!client.ist_registriert());
        assert!(!client.ist_stumm());
    }

    #[test]
    fn taub_impliziert_stumm() {
        let mut client = test_client();
        client.attribute.self_deaf = true;
        assert!(client.ist_taub());
        assert!(client.ist_stumm());
        client.attribute = ClientAttribute {
            suppress: true,
            ..Default::default()
        };
        assert!(client.ist_stumm());
        assert!(!client.ist_taub());
    }

    #[test]
    fn superuser_hat_id_null() {
        let identitaet = Identitaet::superuser();
        assert_eq!(identitaet.benutzer_id, Some(SUPERUSER_ID));
    }
}
