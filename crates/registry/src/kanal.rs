//! Kanaele und ACL-Eintraege

use murmel_core::types::{ChannelId, SessionId};
use std::collections::BTreeSet;

use crate::berechtigung::Berechtigung;

// ---------------------------------------------------------------------------
// ACL
// ---------------------------------------------------------------------------

/// Wem ein ACL-Eintrag gilt
///
/// Die Gruppen `all` (jeder) und `auth` (jeder registrierte Benutzer) sind
/// eingebaut, alle anderen loest ein [`crate::GruppenAufloeser`] auf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclSubjekt {
    /// Registrierter Benutzer mit dieser ID
    Benutzer(u32),
    Gruppe(String),
}

/// Ein Eintrag in der ACL eines Kanals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEintrag {
    pub subjekt: AclSubjekt,
    pub erlaubt: u32,
    pub verweigert: u32,
    /// Gilt im Kanal selbst
    pub gilt_hier: bool,
    /// Gilt in allen Unterkanaelen
    pub gilt_unterkanaele: bool,
}

impl AclEintrag {
    /// Eintrag fuer eine Gruppe, gilt hier und in Unterkanaelen
    pub fn gruppe(name: impl Into<String>, erlaubt: u32, verweigert: u32) -> Self {
        Self {
            subjekt: AclSubjekt::Gruppe(name.into()),
            erlaubt,
            verweigert,
            gilt_hier: true,
            gilt_unterkanaele: true,
        }
    }

    /// Eintrag fuer einen registrierten Benutzer, gilt hier und in Unterkanaelen
    pub fn benutzer(benutzer_id: u32, erlaubt: u32, verweigert: u32) -> Self {
        Self {
            subjekt: AclSubjekt::Benutzer(benutzer_id),
            erlaubt,
            verweigert,
            gilt_hier: true,
            gilt_unterkanaele: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Kanal
// ---------------------------------------------------------------------------

/// Ein Knoten im Kanalbaum
///
/// Baumstruktur und Mitgliedschaft sind nur ueber die Registry aenderbar,
/// damit beide Richtungen der Zuordnung konsistent bleiben.
#[derive(Debug, Clone)]
pub struct Kanal {
    pub id: ChannelId,
    pub name: String,
    pub beschreibung: String,
    pub acl: Vec<AclEintrag>,
    /// Bei `false` endet die ACL-Auswertung an diesem Kanal
    pub erbt_acl: bool,
    /// Mitgliederlimit; `None` oder 0 bedeutet unbegrenzt
    pub max_benutzer: Option<u32>,
    pub(crate) eltern: Option<ChannelId>,
    pub(crate) kinder: BTreeSet<ChannelId>,
    pub(crate) mitglieder: BTreeSet<SessionId>,
}

impl Kanal {
    pub(crate) fn neu(id: ChannelId, eltern: Option<ChannelId>, name: String) -> Self {
        Self {
            id,
            name,
            beschreibung: String::new(),
            acl: Vec::new(),
            erbt_acl: true,
            max_benutzer: None,
            eltern,
            kinder: BTreeSet::new(),
            mitglieder: BTreeSet::new(),
        }
    }

    /// Wurzelkanal mit Standard-ACL fuer die Gruppe `all`
    pub(crate) fn wurzel() -> Self {
        let mut kanal = Self::neu(ChannelId::WURZEL, None, "Root".to_string());
        kanal
            .acl
            .push(AclEintrag::gruppe("all", Berechtigung::STANDARD_ALLE, 0));
        kanal
    }

    pub fn eltern(&self) -> Option<ChannelId> {
        self.eltern
    }

    pub fn kinder(&self) -> &BTreeSet<ChannelId> {
        &self.kinder
    }

    pub fn mitglieder(&self) -> &BTreeSet<SessionId> {
        &self.mitglieder
    }

    /// Ist das Mitgliederlimit erreicht?
    pub fn ist_voll(&self) -> bool {
        match self.max_benutzer {
            Some(max) if max > 0 => self.mitglieder.len() >= max as usize,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_null_ist_unbegrenzt() {
        let mut kanal = Kanal::neu(ChannelId(1), Some(ChannelId::WURZEL), "A".into());
        kanal.mitglieder.insert(SessionId(1));
        kanal.max_benutzer = Some(0);
        assert!(!kanal.ist_voll());
        kanal.max_benutzer = Some(1);
        assert!(kanal.ist_voll());
        kanal.max_benutzer = None;
        assert!(!kanal.ist_voll());
    }

    #[test]
    fn wurzel_hat_standard_acl() {
        let wurzel = Kanal::wurzel();
        assert!(wurzel.eltern().is_none());
        assert_eq!(wurzel.acl.len(), 1);
        assert_eq!(wurzel.acl[0].subjekt, AclSubjekt::Gruppe("all".into()));
        assert!(wurzel.acl[0].gilt_unterkanaele);
    }
}
