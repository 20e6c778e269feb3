//! Berechtigungs-Bits fuer ACL-Eintraege

/// Bit-Masken der einzelnen Berechtigungen
pub struct Berechtigung;

impl Berechtigung {
    /// Kanal bearbeiten, ACL setzen, Benutzerlimit ignorieren
    pub const WRITE: u32 = 0x0000_0001;
    pub const TRAVERSE: u32 = 0x0000_0002;
    /// Kanal betreten
    pub const ENTER: u32 = 0x0000_0004;
    /// Im Kanal sprechen (sonst unterdrueckt)
    pub const SPEAK: u32 = 0x0000_0008;
    /// Andere Benutzer stumm/taub schalten
    pub const MUTE_DEAFEN: u32 = 0x0000_0010;
    /// Andere Benutzer verschieben
    pub const MOVE: u32 = 0x0000_0020;
    pub const MAKE_CHANNEL: u32 = 0x0000_0040;
    /// VoiceTarget auf diesen Kanal bzw. seine Mitglieder richten
    pub const WHISPER: u32 = 0x0000_0100;
    pub const TEXT_MESSAGE: u32 = 0x0000_0200;
    pub const KICK: u32 = 0x0001_0000;
    pub const BAN: u32 = 0x0002_0000;
    /// Andere Benutzer registrieren
    pub const REGISTER: u32 = 0x0004_0000;
    /// Sich selbst registrieren
    pub const SELF_REGISTER: u32 = 0x0008_0000;

    /// Alle bekannten Bits
    pub const ALLE: u32 = Self::WRITE
        | Self::TRAVERSE
        | Self::ENTER
        | Self::SPEAK
        | Self::MUTE_DEAFEN
        | Self::MOVE
        | Self::MAKE_CHANNEL
        | Self::WHISPER
        | Self::TEXT_MESSAGE
        | Self::KICK
        | Self::BAN
        | Self::REGISTER
        | Self::SELF_REGISTER;

    /// Standard-Erlaubnis fuer die Gruppe `all` im Wurzelkanal
    pub const STANDARD_ALLE: u32 = Self::TRAVERSE
        | Self::ENTER
        | Self::SPEAK
        | Self::WHISPER
        | Self::TEXT_MESSAGE
        | Self::SELF_REGISTER;

    /// Iteriert ueber die einzelnen gesetzten Bits einer Maske
    pub fn einzelbits(maske: u32) -> impl Iterator<Item = u32> {
        (0..32)
            .map(|i| 1u32 << i)
            .filter(move |bit| maske & bit != 0)
    }

    /// Name eines einzelnen Bits fuer Logs
    pub fn name(bit: u32) -> &'static str {
        match bit {
            Self::WRITE => "write",
            Self::TRAVERSE => "traverse",
            Self::ENTER => "enter",
            Self::SPEAK => "speak",
            Self::MUTE_DEAFEN => "mute_deafen",
            Self::MOVE => "move",
            Self::MAKE_CHANNEL => "make_channel",
            Self::WHISPER => "whisper",
            Self::TEXT_MESSAGE => "text_message",
            Self::KICK => "kick",
            Self::BAN => "ban",
            Self::REGISTER => "register",
            Self::SELF_REGISTER => "self_register",
            _ => "unbekannt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn einzelbits_zerlegen_maske() {
        let bits: Vec<u32> =
            Berechtigung::einzelbits(Berechtigung::ENTER | Berechtigung::KICK).collect();
        assert_eq!(bits, vec![Berechtigung::ENTER, Berechtigung::KICK]);
        assert_eq!(Berechtigung::einzelbits(Berechtigung::ALLE).count(), 13);
    }

    #[test]
    fn standard_enthaelt_kein_move() {
        assert_eq!(Berechtigung::STANDARD_ALLE & Berechtigung::MOVE, 0);
        assert_ne!(Berechtigung::STANDARD_ALLE & Berechtigung::ENTER, 0);
        assert_eq!(Berechtigung::name(Berechtigung::MUTE_DEAFEN), "mute_deafen");
    }
}
