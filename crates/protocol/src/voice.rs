//! Voice-Protokoll (UDP)
//!
//! Voice-Datagramme tragen keine Nachrichtenart. Das erste Byte (nach dem
//! Entschluesseln) ist ein Kopf-Byte, der Rest ist fuer den Server opak.
//!
//! ## Kopf-Byte
//!
//! ```text
//!  Bit 7..4   Typ   (0 = Voice Codec A, 1 = Ping, 2 = Voice Codec B, 3 = Voice Codec C)
//!  Bit 3..0   Ziel  (0 = normal, 1..=14 = VoiceTarget, 15 = Loopback)
//! ```
//!
//! ## Weitergeleitetes Paket (Server -> Client)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Kopf-Byte (Typ | Ausgabe-Ziel: 0 normal, 1 gefluestert, 15 Loopback)
//!  1       4   Session-ID des Sprechers (big-endian)
//!  5+      N   Nutzdaten (unveraendert)
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use murmel_core::types::SessionId;

/// Hoechste konfigurierbare VoiceTarget-ID
pub const MAX_VOICE_TARGET: u8 = 14;

/// Ziel-Nibble fuer Loopback
pub const ZIEL_LOOPBACK: u8 = 0x0F;

/// Ziel-Nibble fuer gefluesterte Pakete beim Empfaenger
pub const ZIEL_GEFLUESTERT: u8 = 0x01;

/// Laenge von Kopf-Byte + Sprecher-Session im weitergeleiteten Paket
pub const WEITERLEITUNGS_KOPF: usize = 5;

// ---------------------------------------------------------------------------
// UdpTyp
// ---------------------------------------------------------------------------

/// Typ eines Datagramms (oberes Nibble des Kopf-Bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UdpTyp {
    VoiceCodecA = 0,
    Ping = 1,
    VoiceCodecB = 2,
    VoiceCodecC = 3,
}

impl UdpTyp {
    /// Konvertiert ein Nibble in einen `UdpTyp`; unbekannte Werte ergeben `None`
    pub fn from_u8(nibble: u8) -> Option<Self> {
        match nibble {
            0 => Some(Self::VoiceCodecA),
            1 => Some(Self::Ping),
            2 => Some(Self::VoiceCodecB),
            3 => Some(Self::VoiceCodecC),
            _ => None,
        }
    }

    pub fn ist_voice(self) -> bool {
        !matches!(self, Self::Ping)
    }
}

// ---------------------------------------------------------------------------
// Sprechziel
// ---------------------------------------------------------------------------

/// Ziel eines Voice-Pakets (unteres Nibble des Kopf-Bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sprechziel {
    /// An den eigenen Kanal
    Normal,
    /// An ein konfiguriertes VoiceTarget (1..=14)
    VoiceTarget(u8),
    /// Zurueck an den Sprecher
    Loopback,
}

impl Sprechziel {
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            0 => Self::Normal,
            ZIEL_LOOPBACK => Self::Loopback,
            id => Self::VoiceTarget(id),
        }
    }

    pub fn als_nibble(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::VoiceTarget(id) => id & 0x0F,
            Self::Loopback => ZIEL_LOOPBACK,
        }
    }

    /// Ziel-Nibble wie es der Empfaenger sieht
    pub fn ausgabe_nibble(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::VoiceTarget(_) => ZIEL_GEFLUESTERT,
            Self::Loopback => ZIEL_LOOPBACK,
        }
    }
}

// ---------------------------------------------------------------------------
// DatagrammKopf
// ---------------------------------------------------------------------------

/// Dekodiertes Kopf-Byte eines Datagramms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagrammKopf {
    pub typ: UdpTyp,
    pub ziel: Sprechziel,
}

impl DatagrammKopf {
    /// Parst das Kopf-Byte; `None` bei unbekanntem Typ
    pub fn parsen(byte: u8) -> Option<Self> {
        let typ = UdpTyp::from_u8(byte >> 4)?;
        Some(Self {
            typ,
            ziel: Sprechziel::from_nibble(byte),
        })
    }

    pub fn als_byte(self) -> u8 {
        ((self.typ as u8) << 4) | self.ziel.als_nibble()
    }
}

/// Zerlegt ein entschluesseltes Datagramm in Kopf und Nutzdaten
///
/// Leere Datagramme und unbekannte Typen ergeben `None`.
pub fn datagramm_zerlegen(daten: &[u8]) -> Option<(DatagrammKopf, &[u8])> {
    let (&erstes, rest) = daten.split_first()?;
    let kopf = DatagrammKopf::parsen(erstes)?;
    Some((kopf, rest))
}

/// Baut das an Empfaenger weitergeleitete Paket
pub fn weiterleitung_bauen(
    typ: UdpTyp,
    ziel: Sprechziel,
    sprecher: SessionId,
    nutzdaten: &[u8],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(WEITERLEITUNGS_KOPF + nutzdaten.len());
    buf.put_u8(((typ as u8) << 4) | ziel.ausgabe_nibble());
    buf.put_u32(sprecher.0);
    buf.put_slice(nutzdaten);
    buf.freeze()
}

/// Zerlegt ein weitergeleitetes Paket (Gegenstueck zu [`weiterleitung_bauen`])
pub fn weiterleitung_zerlegen(daten: &[u8]) -> Option<(DatagrammKopf, SessionId, &[u8])> {
    if daten.len() < WEITERLEITUNGS_KOPF {
        return None;
    }
    let kopf = DatagrammKopf::parsen(daten[0])?;
    let sprecher = u32::from_be_bytes([daten[1], daten[2], daten[3], daten[4]]);
    Some((kopf, SessionId(sprecher), &daten[WEITERLEITUNGS_KOPF..]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
