//! Control-Protokoll (TCP)
//!
//! Definiert alle Steuerungsnachrichten die ueber die Steuerverbindung
//! zwischen Client und Server ausgetauscht werden.
//!
//! ## Design
//! - Jede Nachricht traegt eine numerische Art (`NachrichtenArt`, u16) im Frame-Kopf
//! - Nutzdaten sind JSON-Records; alle Felder einer Zustandsaenderung sind optional,
//!   Anwesenheit eines Feldes loest dessen Pruefung aus
//! - `UdpTunnel` transportiert ein rohes Voice-Datagramm ohne JSON-Huelle
//! - Byte-Felder werden als Base64-Strings uebertragen (siehe [`crate::b64`])

use bytes::Bytes;
use murmel_core::types::{ChannelId, SessionId};
use serde::{Deserialize, Serialize};

use crate::error::{ProtokollFehler, ProtokollResult};
use crate::wire::RohFrame;

// ---------------------------------------------------------------------------
// NachrichtenArt
// ---------------------------------------------------------------------------

/// Numerische Art einer Steuernachricht (u16 im Frame-Kopf)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NachrichtenArt {
    Version = 0,
    UdpTunnel = 1,
    Authenticate = 2,
    Ping = 3,
    Reject = 4,
    ServerSync = 5,
    ChannelRemove = 6,
    ChannelState = 7,
    UserRemove = 8,
    UserState = 9,
    BanList = 10,
    TextMessage = 11,
    PermissionDenied = 12,
    Acl = 13,
    QueryUsers = 14,
    CryptSetup = 15,
    ContextActionAdd = 16,
    ContextAction = 17,
    UserList = 18,
    VoiceTarget = 19,
    PermissionQuery = 20,
    CodecVersion = 21,
    UserStats = 22,
    RequestBlob = 23,
    ServerConfig = 24,
}

impl NachrichtenArt {
    /// Konvertiert den Frame-Kopf in eine `NachrichtenArt`
    pub fn from_u16(wert: u16) -> Option<Self> {
        use NachrichtenArt::*;
        let art = match wert {
            0 => Version,
            1 => UdpTunnel,
            2 => Authenticate,
            3 => Ping,
            4 => Reject,
            5 => ServerSync,
            6 => ChannelRemove,
            7 => ChannelState,
            8 => UserRemove,
            9 => UserState,
            10 => BanList,
            11 => TextMessage,
            12 => PermissionDenied,
            13 => Acl,
            14 => QueryUsers,
            15 => CryptSetup,
            16 => ContextActionAdd,
            17 => ContextAction,
            18 => UserList,
            19 => VoiceTarget,
            20 => PermissionQuery,
            21 => CodecVersion,
            22 => UserStats,
            23 => RequestBlob,
            24 => ServerConfig,
            _ => return None,
        };
        Some(art)
    }

    pub fn als_u16(self) -> u16 {
        self as u16
    }

    /// Kurzname fuer Logs und Metrik-Labels
    pub fn name(self) -> &'static str {
        use NachrichtenArt::*;
        match self {
            Version => "version",
            UdpTunnel => "udp_tunnel",
            Authenticate => "authenticate",
            Ping => "ping",
            Reject => "reject",
            ServerSync => "server_sync",
            ChannelRemove => "channel_remove",
            ChannelState => "channel_state",
            UserRemove => "user_remove",
            UserState => "user_state",
            BanList => "ban_list",
            TextMessage => "text_message",
            PermissionDenied => "permission_denied",
            Acl => "acl",
            QueryUsers => "query_users",
            CryptSetup => "crypt_setup",
            ContextActionAdd => "context_action_add",
            ContextAction => "context_action",
            UserList => "user_list",
            VoiceTarget => "voice_target",
            PermissionQuery => "permission_query",
            CodecVersion => "codec_version",
            UserStats => "user_stats",
            RequestBlob => "request_blob",
            ServerConfig => "server_config",
        }
    }

    /// Darf diese Art vor abgeschlossener Authentifizierung verarbeitet werden?
    pub fn vor_authentifizierung_erlaubt(self) -> bool {
        matches!(
            self,
            NachrichtenArt::Version | NachrichtenArt::Authenticate | NachrichtenArt::Ping
        )
    }
}

impl std::fmt::Display for NachrichtenArt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Verbindungsaufbau
// ---------------------------------------------------------------------------

/// Versionsinformationen des Clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

/// Anmeldung eines Clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticate {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Grund einer Ablehnung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectTyp {
    InvalidUsername,
    UsernameInUse,
    WrongPassword,
    ServerFull,
    /// Adresse oder Benutzer ist gebannt
    Banned,
    /// Nutzdaten einer Nachricht waren nicht dekodierbar
    MalformedMessage,
}

/// Ablehnung; die Verbindung wird danach geschlossen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reject {
    #[serde(rename = "type")]
    pub typ: RejectTyp,
    pub reason: String,
}

/// Abschluss der Anmeldung, enthaelt die zugewiesene Sitzung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSync {
    pub session: SessionId,
    pub max_bandwidth: u32,
    pub welcome_text: String,
    /// Berechtigungen des Clients im Wurzelkanal
    pub permissions: u32,
}

/// Keepalive; der Server antwortet mit seinen Krypto-Zaehlern
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lost: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resync: Option<u32>,
}

/// Schluesselaustausch und Resync des UDP-Tunnels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptSetup {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::b64")]
    pub key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::b64")]
    pub client_nonce: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::b64")]
    pub server_nonce: Option<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Benutzer
// ---------------------------------------------------------------------------

/// Zustand eines Benutzers; als Anfrage und als Delta-Broadcast verwendet
///
/// Im Broadcast enthaelt der Record nur die geaenderten Felder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Registrierungsanfrage (negativ) bzw. vergebene Benutzer-ID im Broadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deaf: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppress: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_mute: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_deaf: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_speaker: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::b64")]
    pub texture: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::b64")]
    pub plugin_context: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_identity: Option<String>,
}

impl UserState {
    /// Enthaelt der Record ausser `session`/`actor` ueberhaupt ein Feld?
    pub fn ist_leer(&self) -> bool {
        let UserState {
            session: _,
            actor: _,
            name,
            user_id,
            channel_id,
            mute,
            deaf,
            suppress,
            self_mute,
            self_deaf,
            priority_speaker,
            recording,
            comment,
            texture,
            plugin_context,
            plugin_identity,
        } = self;
        name.is_none()
            && user_id.is_none()
            && channel_id.is_none()
            && mute.is_none()
            && deaf.is_none()
            && suppress.is_none()
            && self_mute.is_none()
            && self_deaf.is_none()
            && priority_speaker.is_none()
            && recording.is_none()
            && comment.is_none()
            && texture.is_none()
            && plugin_context.is_none()
            && plugin_identity.is_none()
    }
}

/// Kick oder Bann eines Benutzers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRemove {
    pub session: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub ban: bool,
}

/// Statistik-Anfrage bzw. -Antwort zu einer Sitzung
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub session: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_aktiv: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lost: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resync: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<u32>,
}

/// Textnachricht an Sitzungen, Kanaele oder Kanal-Teilbaeume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<SessionId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channel_ids: Vec<ChannelId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tree_ids: Vec<ChannelId>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Kanaele und ACL
// ---------------------------------------------------------------------------

/// Anlegen oder Aendern eines Kanals; Broadcast enthaelt nur geaenderte Felder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_users: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRemove {
    pub channel_id: ChannelId,
}

/// Ein ACL-Eintrag auf dem Draht
///
/// Genau eines von `user_id` und `group` muss gesetzt sein.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEintragDaten {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default = "standard_wahr")]
    pub apply_here: bool,
    #[serde(default = "standard_wahr")]
    pub apply_subs: bool,
    #[serde(default)]
    pub grant: u32,
    #[serde(default)]
    pub deny: u32,
}

fn standard_wahr() -> bool {
    true
}

/// Abfrage (`query = true`) oder Ersetzen der ACL eines Kanals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub channel_id: ChannelId,
    #[serde(default = "standard_wahr")]
    pub inherit_acls: bool,
    #[serde(default)]
    pub entries: Vec<AclEintragDaten>,
    #[serde(default)]
    pub query: bool,
}

/// Abfrage der eigenen Berechtigungen in einem Kanal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionQuery {
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// Ein Ziel innerhalb eines VoiceTargets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceTargetZiel {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub children: bool,
    #[serde(default)]
    pub links: bool,
}

/// Konfiguriert (oder loescht, bei leerer Liste) ein Fluesterziel 1..=14
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceTarget {
    pub id: u8,
    #[serde(default)]
    pub targets: Vec<VoiceTargetZiel>,
}

// ---------------------------------------------------------------------------
// Nachricht
// ---------------------------------------------------------------------------

/// Eine dekodierte Steuernachricht
#[derive(Debug, Clone, PartialEq)]
pub enum Nachricht {
    Version(Version),
    /// Rohes Voice-Datagramm ueber die Steuerverbindung
    UdpTunnel(Bytes),
    Authenticate(Authenticate),
    Ping(Ping),
    Reject(Reject),
    ServerSync(ServerSync),
    ChannelRemove(ChannelRemove),
    ChannelState(ChannelState),
    UserRemove(UserRemove),
    UserState(UserState),
    TextMessage(TextMessage),
    Acl(Acl),
    CryptSetup(CryptSetup),
    VoiceTarget(VoiceTarget),
    PermissionQuery(PermissionQuery),
    UserStats(UserStats),
    /// Bekannte Art ohne Verarbeitung im Server; Nutzdaten werden nicht gelesen
    Unbehandelt(NachrichtenArt),
}

impl Nachricht {
    /// Gibt die Art dieser Nachricht zurueck
    pub fn art(&self) -> NachrichtenArt {
        match self {
            Nachricht::Version(_) => NachrichtenArt::Version,
            Nachricht::UdpTunnel(_) => NachrichtenArt::UdpTunnel,
            Nachricht::Authenticate(_) => NachrichtenArt::Authenticate,
            Nachricht::Ping(_) => NachrichtenArt::Ping,
            Nachricht::Reject(_) => NachrichtenArt::Reject,
            Nachricht::ServerSync(_) => NachrichtenArt::ServerSync,
            Nachricht::ChannelRemove(_) => NachrichtenArt::ChannelRemove,
            Nachricht::ChannelState(_) => NachrichtenArt::ChannelState,
            Nachricht::UserRemove(_) => NachrichtenArt::UserRemove,
            Nachricht::UserState(_) => NachrichtenArt::UserState,
            Nachricht::TextMessage(_) => NachrichtenArt::TextMessage,
            Nachricht::Acl(_) => NachrichtenArt::Acl,
            Nachricht::CryptSetup(_) => NachrichtenArt::CryptSetup,
            Nachricht::VoiceTarget(_) => NachrichtenArt::VoiceTarget,
            Nachricht::PermissionQuery(_) => NachrichtenArt::PermissionQuery,
            Nachricht::UserStats(_) => NachrichtenArt::UserStats,
            Nachricht::Unbehandelt(art) => *art,
        }
    }

    /// Kodiert die Nachricht in einen Rohframe
    pub fn kodieren(&self) -> ProtokollResult<RohFrame> {
        let art = self.art();
        let json = |ergebnis: serde_json::Result<Vec<u8>>| {
            ergebnis.map_err(|quelle| ProtokollFehler::Kodierung {
                art: art.name(),
                quelle,
            })
        };

        let nutzdaten = match self {
            Nachricht::UdpTunnel(daten) => daten.clone(),
            Nachricht::Version(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::Authenticate(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::Ping(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::Reject(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::ServerSync(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::ChannelRemove(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::ChannelState(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::UserRemove(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::UserState(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::TextMessage(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::Acl(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::CryptSetup(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::VoiceTarget(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::PermissionQuery(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::UserStats(n) => json(serde_json::to_vec(n))?.into(),
            Nachricht::Unbehandelt(_) => Bytes::new(),
        };

        Ok(RohFrame {
            art: art.als_u16(),
            nutzdaten,
        })
    }

    /// Dekodiert einen Rohframe
    ///
    /// # Fehler
    /// - `UnbekannteArt` wenn die Art keiner bekannten Nachricht entspricht
    /// - `Dekodierung` wenn die Nutzdaten nicht zum Record der Art passen
    pub fn dekodieren(frame: &RohFrame) -> ProtokollResult<Nachricht> {
        let art = NachrichtenArt::from_u16(frame.art)
            .ok_or(ProtokollFehler::UnbekannteArt(frame.art))?;

        fn json<'a, T: Deserialize<'a>>(
            art: NachrichtenArt,
            daten: &'a [u8],
        ) -> ProtokollResult<T> {
            serde_json::from_slice(daten).map_err(|quelle| ProtokollFehler::Dekodierung {
                art: art.name(),
                quelle,
            })
        }

        let daten = frame.nutzdaten.as_ref();
        let nachricht = match art {
            NachrichtenArt::UdpTunnel => Nachricht::UdpTunnel(frame.nutzdaten.clone()),
            NachrichtenArt::Version => Nachricht::Version(json(art, daten)?),
            NachrichtenArt::Authenticate => Nachricht::Authenticate(json(art, daten)?),
            NachrichtenArt::Ping => Nachricht::Ping(json(art, daten)?),
            NachrichtenArt::Reject => Nachricht::Reject(json(art, daten)?),
            NachrichtenArt::ServerSync => Nachricht::ServerSync(json(art, daten)?),
            NachrichtenArt::ChannelRemove => Nachricht::ChannelRemove(json(art, daten)?),
            NachrichtenArt::ChannelState => Nachricht::ChannelState(json(art, daten)?),
            NachrichtenArt::UserRemove => Nachricht::UserRemove(json(art, daten)?),
            NachrichtenArt::UserState => Nachricht::UserState(json(art, daten)?),
            NachrichtenArt::TextMessage => Nachricht::TextMessage(json(art, daten)?),
            NachrichtenArt::Acl => Nachricht::Acl(json(art, daten)?),
            NachrichtenArt::CryptSetup => Nachricht::CryptSetup(json(art, daten)?),
            NachrichtenArt::VoiceTarget => Nachricht::VoiceTarget(json(art, daten)?),
            NachrichtenArt::PermissionQuery => Nachricht::PermissionQuery(json(art, daten)?),
            NachrichtenArt::UserStats => Nachricht::UserStats(json(art, daten)?),
            NachrichtenArt::BanList
            | NachrichtenArt::PermissionDenied
            | NachrichtenArt::QueryUsers
            | NachrichtenArt::ContextActionAdd
            | NachrichtenArt::ContextAction
            | NachrichtenArt::UserList
            | NachrichtenArt::CodecVersion
            | NachrichtenArt::RequestBlob
            | NachrichtenArt::ServerConfig => Nachricht::Unbehandelt(art),
        };
        Ok(nachricht)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn art_nummern_sind_stabil() {
        assert_eq!(NachrichtenArt::Version.als_u16(), 0);
        assert_eq!(NachrichtenArt::UserState.als_u16(), 9);
        assert_eq!(NachrichtenArt::TextMessage.als_u16(), 11);
        assert_eq!(NachrichtenArt::CryptSetup.als_u16(), 15);
        assert_eq!(NachrichtenArt::ServerConfig.als_u16(), 24);
        for wert in 0..=24u16 {
            let art = NachrichtenArt::from_u16(wert).expect("bekannte Art");
            assert_eq!(art.als_u16(), wert);
        }
        assert!(NachrichtenArt::from_u16(25).is_none());
        assert!(NachrichtenArt::from_u16(u16::MAX).is_none());
    }

    #[test]
    fn unbekannte_art_wird_gemeldet() {
        let frame = RohFrame {
            art: 77,
            nutzdaten: Bytes::from_static(b"{}"),
        };
        assert!(matches!(
            Nachricht::dekodieren(&frame),
            Err(ProtokollFehler::UnbekannteArt(77))
        ));
    }

    #[test]
    fn kaputtes_json_ist_dekodierfehler() {
        let frame = RohFrame {
            art: NachrichtenArt::UserState.als_u16(),
            nutzdaten: Bytes::from_static(b"{\"session\": \"keine zahl\"}"),
        };
        let fehler = Nachricht::dekodieren(&frame).unwrap_err();
        assert!(matches!(fehler, ProtokollFehler::Dekodierung { art: "user_state", .. }));
    }

    #[test]
    fn user_state_delta_enthaelt_nur_gesetzte_felder() {
        let delta = UserState {
            session: Some(SessionId(4)),
            actor: Some(SessionId(1)),
            mute: Some(true),
            ..Default::default()
        };
        let json = serde_json::to_string(&delta).unwrap();
        assert_eq!(json, r#"{"session":4,"actor":1,"mute":true}"#);
        assert!(!delta.ist_leer());
        assert!(UserState {
            session: Some(SessionId(4)),
            ..Default::default()
        }
        .ist_leer());
    }

    #[test]
    fn crypt_setup_bytes_als_base64() {
        let setup = CryptSetup {
            client_nonce: Some(vec![0xFF; 16]),
            ..Default::default()
        };
        let json = serde_json::to_string(&setup).unwrap();
        assert_eq!(json, r#"{"client_nonce":"/////////////////////w=="}"#);

        let zurueck: CryptSetup = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, setup);

        let leer: CryptSetup = serde_json::from_str("{}").unwrap();
        assert!(leer.client_nonce.is_none());
    }

    #[test]
    fn unbehandelte_arten_ignorieren_nutzdaten() {
        let frame = RohFrame {
            art: NachrichtenArt::CodecVersion.als_u16(),
            nutzdaten: Bytes::from_static(b"\x00\x01 kein json"),
        };
        assert_eq!(
            Nachricht::dekodieren(&frame).unwrap(),
            Nachricht::Unbehandelt(NachrichtenArt::CodecVersion)
        );
    }

    #[test]
    fn udp_tunnel_bleibt_roh() {
        let roh = Bytes::from_static(&[0x00, 0x01, 0x02]);
        let frame = Nachricht::UdpTunnel(roh.clone()).kodieren().unwrap();
        assert_eq!(frame.art, 1);
        assert_eq!(frame.nutzdaten, roh);
        assert_eq!(Nachricht::dekodieren(&frame).unwrap(), Nachricht::UdpTunnel(roh));
    }

    #[test]
    fn text_nachricht_kodieren_und_dekodieren() {
        let original = Nachricht::TextMessage(TextMessage {
            actor: Some(SessionId(3)),
            sessions: vec![SessionId(5), SessionId(7)],
            message: "hallo".into(),
            ..Default::default()
        });
        let frame = original.kodieren().unwrap();
        assert_eq!(frame.art, NachrichtenArt::TextMessage.als_u16());
        assert_eq!(Nachricht::dekodieren(&frame).unwrap(), original);
    }

    #[test]
    fn acl_eintrag_standardwerte() {
        let eintrag: AclEintragDaten = serde_json::from_str(r#"{"group":"all","grant":4}"#).unwrap();
        assert!(eintrag.apply_here);
        assert!(eintrag.apply_subs);
        assert_eq!(eintrag.deny, 0);
    }

    #[test]
    fn vor_authentifizierung_erlaubte_arten() {
        assert!(NachrichtenArt::Authenticate.vor_authentifizierung_erlaubt());
        assert!(NachrichtenArt::Ping.vor_authentifizierung_erlaubt());
        assert!(!NachrichtenArt::UserState.vor_authentifizierung_erlaubt());
        assert!(!NachrichtenArt::UdpTunnel.vor_authentifizierung_erlaubt());
    }
}
