//! Aufloesung benannter Gruppen fuer die ACL-Auswertung
//!
//! Gruppenmitgliedschaften werden ausserhalb des Kerns gepflegt. Der Kern
//! fragt nur ueber [`GruppenAufloeser`] nach.

use murmel_core::types::ChannelId;
use std::collections::{HashMap, HashSet};

use crate::client::Client;

/// Beantwortet ob ein Client Mitglied einer benannten Gruppe ist
///
/// Wird unter dem Registry-Lock aufgerufen und darf daher nicht blockieren.
pub trait GruppenAufloeser: Send + Sync {
    fn ist_mitglied(&self, gruppe: &str, client: &Client, kanal: ChannelId) -> bool;
}

/// Statische Gruppen aus der Konfiguration: Gruppenname -> registrierte IDs
#[derive(Debug, Clone, Default)]
pub struct StatischeGruppen {
    gruppen: HashMap<String, HashSet<u32>>,
}

impl StatischeGruppen {
    pub fn neu(gruppen: HashMap<String, Vec<u32>>) -> Self {
        Self {
            gruppen: gruppen
                .into_iter()
                .map(|(name, ids)| (name, ids.into_iter().collect()))
                .collect(),
        }
    }

    pub fn mitglied_hinzufuegen(&mut self, gruppe: impl Into<String>, benutzer_id: u32) {
        self.gruppen.entry(gruppe.into()).or_default().insert(benutzer_id);
    }
}

impl GruppenAufloeser for StatischeGruppen {
    fn ist_mitglied(&self, gruppe: &str, client: &Client, _kanal: ChannelId) -> bool {
        match (self.gruppen.get(gruppe), client.benutzer_id) {
            (Some(ids), Some(id)) => ids.contains(&id),
            _ => false,
        }
    }
}
