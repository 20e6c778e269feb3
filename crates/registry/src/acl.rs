//! Hierarchische ACL-Auswertung
//!
//! ## Auswertung
//! 1. Unbekannter Akteur oder Kanal: verweigert
//! 2. Superuser: immer erlaubt
//! 3. Vom Zielkanal Richtung Wurzel: alle passenden Eintraege des Kanals
//!    auswerten (`gilt_hier` im Zielkanal, `gilt_unterkanaele` darueber).
//!    Ein Deny schlaegt ein Grant auf derselben Ebene. Die erste Ebene mit
//!    expliziter Entscheidung gewinnt.
//! 4. Die Suche endet an der Wurzel oder an einem Kanal mit `erbt_acl = false`.
//!
//! Ohne explizite Entscheidung ist das Ergebnis `Unbestimmt`;
//! [`hat_berechtigung`] behandelt das wie verweigert.

use murmel_core::types::{ChannelId, SessionId};

use crate::berechtigung::Berechtigung;
use crate::client::Client;
use crate::gruppen::GruppenAufloeser;
use crate::kanal::{AclEintrag, AclSubjekt};
use crate::registry::SessionRegistry;

/// Ergebnis einer ACL-Auswertung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auswertung {
    Erlaubt,
    Verweigert,
    /// Kein passender Eintrag auf dem Weg zur Wurzel
    Unbestimmt,
}

/// Wertet eine einzelne Berechtigung fuer `akteur` in `kanal` aus
pub fn berechtigung_auswerten(
    registry: &SessionRegistry,
    gruppen: &dyn GruppenAufloeser,
    akteur: SessionId,
    kanal: ChannelId,
    berechtigung: u32,
) -> Auswertung {
    let Ok(client) = registry.client(akteur) else {
        return Auswertung::Verweigert;
    };
    if client.ist_superuser() {
        return Auswertung::Erlaubt;
    }
    if registry.kanal(kanal).is_err() {
        return Auswertung::Verweigert;
    }

    let mut aktuell = Some(kanal);
    let mut im_zielkanal = true;
    let mut schritte = 0usize;

    while let Some(id) = aktuell {
        schritte += 1;
        if schritte > registry.kanal_anzahl() {
            tracing::error!(kanal = %kanal, "ACL-Auswertung ueberschreitet Baumtiefe");
            return Auswertung::Verweigert;
        }
        let Ok(k) = registry.kanal(id) else {
            return Auswertung::Verweigert;
        };

        let mut erlaubt = false;
        let mut verweigert = false;
        for eintrag in &k.acl {
            let gilt = if im_zielkanal {
                eintrag.gilt_hier
            } else {
                eintrag.gilt_unterkanaele
            };
            if !gilt || !subjekt_passt(eintrag, client, kanal, gruppen) {
                continue;
            }
            verweigert |= eintrag.verweigert & berechtigung != 0;
            erlaubt |= eintrag.erlaubt & berechtigung != 0;
        }

        if verweigert {
            return Auswertung::Verweigert;
        }
        if erlaubt {
            return Auswertung::Erlaubt;
        }
        if !k.erbt_acl {
            break;
        }
        aktuell = k.eltern();
        im_zielkanal = false;
    }

    Auswertung::Unbestimmt
}

/// Hat `akteur` die Berechtigung in `kanal`? Nur explizites Grant zaehlt.
pub fn hat_berechtigung(
    registry: &SessionRegistry,
    gruppen: &dyn GruppenAufloeser,
    akteur: SessionId,
    kanal: ChannelId,
    berechtigung: u32,
) -> bool {
    berechtigung_auswerten(registry, gruppen, akteur, kanal, berechtigung) == Auswertung::Erlaubt
}

/// Alle erteilten Berechtigungen von `akteur` in `kanal` als Maske
pub fn berechtigungen_ermitteln(
    registry: &SessionRegistry,
    gruppen: &dyn GruppenAufloeser,
    akteur: SessionId,
    kanal: ChannelId,
) -> u32 {
    Berechtigung::einzelbits(Berechtigung::ALLE)
        .filter(|bit| hat_berechtigung(registry, gruppen, akteur, kanal, *bit))
        .fold(0, |maske, bit| maske | bit)
}

fn subjekt_passt(
    eintrag: &AclEintrag,
    client: &Client,
    kanal: ChannelId,
    gruppen: &dyn GruppenAufloeser,
) -> bool {
    match &eintrag.subjekt {
        AclSubjekt::Benutzer(id) => client.benutzer_id == Some(*id),
        AclSubjekt::Gruppe(name) => match name.as_str() {
            "all" => true,
            "auth" => client.ist_registriert(),
            _ => gruppen.ist_mitglied(name, client, kanal),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
