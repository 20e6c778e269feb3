//! Gemeinsame Identifikationstypen fuer Murmel
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Sitzungs- und Kanal-IDs zur Compilezeit auszuschliessen. Auf dem Draht
//! werden sie als nackte `u32` uebertragen.

use serde::{Deserialize, Serialize};

/// Sitzungs-ID eines verbundenen Clients
///
/// Eindeutig solange der Client verbunden ist. Nach dem Entfernen darf die
/// Registry die ID neu vergeben.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u32);

impl SessionId {
    /// Gibt den inneren Wert zurueck
    pub fn inner(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Kanal-ID im Kanalbaum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Der Wurzelkanal existiert immer und hat die ID 0
    pub const WURZEL: ChannelId = ChannelId(0);

    /// Gibt den inneren Wert zurueck
    pub fn inner(&self) -> u32 {
        self.0
    }

    /// Prueft ob dies der Wurzelkanal ist
    pub fn ist_wurzel(&self) -> bool {
        *self == Self::WURZEL
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kanal:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anzeige_formate() {
        assert_eq!(SessionId(12).to_string(), "session:12");
        assert_eq!(ChannelId(4).to_string(), "kanal:4");
    }

    #[test]
    fn ids_werden_als_zahl_serialisiert() {
        let json = serde_json::to_string(&SessionId(5)).unwrap();
        assert_eq!(json, "5");
        let id: ChannelId = serde_json::from_str("9").unwrap();
        assert_eq!(id, ChannelId(9));
    }

    #[test]
    fn standardwerte() {
        assert_eq!(SessionId::default(), SessionId(0));
        assert_eq!(ChannelId::default(), ChannelId::WURZEL);
    }

    #[test]
    fn wurzel_erkennung() {
        assert!(ChannelId::WURZEL.ist_wurzel());
        assert!(!ChannelId(1).ist_wurzel());
    }
}
