//! UserState-Verarbeitung – autorisierte Aenderung von Benutzerzustand
//!
//! Eine Anfrage wird erst vollstaendig geprueft und danach angewendet. Schlaegt
//! eine einzelne Pruefung fehl, wird die ganze Anfrage verworfen; teilweise
//! angewendete Anfragen gibt es nicht.
//!
//! ## Reihenfolge der Pruefungen
//! 1. Zielsitzung aufloesen (`session`, sonst der Akteur selbst)
//! 2. Selbstbezogene Felder (`self_mute`, `self_deaf`, `texture`, `plugin_*`,
//!    `recording`) nur fuer die eigene Sitzung
//! 3. Kanalwechsel: MOVE, ENTER, Mitgliederlimit
//! 4. `suppress` nur vom Server; mute/deaf/priority brauchen MUTE_DEAFEN
//! 5. Kommentar, Textur, Registrierung
//!
//! Das Ergebnis ist ein Delta mit genau den geaenderten Feldern. Es muss
//! noch unter dem Schreib-Guard der Registry an alle Sitzungen gehen.

use murmel_core::error::{MurmelError, Result};
use murmel_core::types::{ChannelId, SessionId};
use murmel_protocol::control::UserState;
use murmel_registry::{
    berechtigung_auswerten, hat_berechtigung, Auswertung, Berechtigung, ClientAttribute,
    GruppenAufloeser, SessionRegistry,
};

use crate::pruefung::InhaltsPruefer;

/// Wer die Aenderung anfordert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ursprung {
    /// Eine verbundene Sitzung
    Client(SessionId),
    /// Der Server selbst; alle Berechtigungspruefungen entfallen
    Server,
}

impl Ursprung {
    fn sitzung(self) -> Option<SessionId> {
        match self {
            Ursprung::Client(s) => Some(s),
            Ursprung::Server => None,
        }
    }
}

/// Externe Abhaengigkeiten der Pruefung
pub struct Umgebung<'a> {
    pub gruppen: &'a dyn GruppenAufloeser,
    pub pruefer: &'a dyn InhaltsPruefer,
    /// 0 bedeutet unbegrenzt
    pub max_textur_bytes: usize,
}

/// Prueft und wendet eine UserState-Anfrage an
///
/// Gibt das zu verteilende Delta zurueck, `None` wenn sich nichts
/// Sichtbares geaendert hat.
///
/// # Fehler
/// - `SitzungNichtGefunden` / `KanalNichtGefunden` fuer unbekannte IDs
/// - `NichtBerechtigt` wenn eine Berechtigung fehlt
/// - `UngueltigeEingabe` fuer unzulaessige Werte
pub fn user_state_anwenden(
    registry: &mut SessionRegistry,
    umgebung: &Umgebung<'_>,
    ursprung: Ursprung,
    anfrage: &UserState,
) -> Result<Option<UserState>> {
    let ansicht: &SessionRegistry = registry;
    let akteur = ursprung.sitzung();
    let ziel = anfrage
        .session
        .or(akteur)
        .ok_or_else(|| MurmelError::eingabe("UserState ohne Sitzung"))?;

    let akteur_superuser = match akteur {
        Some(a) => ansicht.client(a)?.ist_superuser(),
        None => true,
    };
    let ist_selbst = akteur == Some(ziel);

    let user = ansicht.client(ziel)?;
    let alter_kanal = user.kanal();
    let alte_attribute = user.attribute.clone();
    let ist_registriert = user.ist_registriert();
    let darf = |kanal: ChannelId, bit: u32| match akteur {
        Some(a) => hat_berechtigung(ansicht, umgebung.gruppen, a, kanal, bit),
        None => true,
    };

    // --- Selbstbezogene Felder ---
    if !ist_selbst
        && (anfrage.self_mute.is_some()
            || anfrage.self_deaf.is_some()
            || anfrage.texture.is_some()
            || anfrage.plugin_context.is_some()
            || anfrage.plugin_identity.is_some()
            || anfrage.recording.is_some())
    {
        return Err(MurmelError::verweigert(
            "selbstbezogene Felder fuer fremde Sitzung",
        ));
    }

    if let Some(name) = &anfrage.name {
        if *name != user.name {
            return Err(MurmelError::verweigert("Namensaenderung"));
        }
    }

    // --- Kanalwechsel ---
    let mut neuer_kanal = None;
    if let Some(kanal) = anfrage.channel_id {
        let ziel_kanal = ansicht.kanal(kanal)?;
        if kanal != alter_kanal {
            if let (Some(a), false) = (akteur, akteur_superuser) {
                if ist_selbst {
                    // Die ACL kann einen Benutzer in seinem Kanal festhalten
                    let auswertung = berechtigung_auswerten(
                        ansicht,
                        umgebung.gruppen,
                        a,
                        alter_kanal,
                        Berechtigung::MOVE,
                    );
                    if auswertung == Auswertung::Verweigert {
                        return Err(MurmelError::verweigert("move im aktuellen Kanal"));
                    }
                } else if !darf(alter_kanal, Berechtigung::MOVE) {
                    return Err(MurmelError::verweigert("move im aktuellen Kanal"));
                }
                if !darf(kanal, Berechtigung::ENTER) {
                    return Err(MurmelError::verweigert("enter im Zielkanal"));
                }
                if ziel_kanal.ist_voll() && !darf(kanal, Berechtigung::WRITE) {
                    return Err(MurmelError::verweigert("Zielkanal voll"));
                }
            }
            neuer_kanal = Some(kanal);
        }
    }

    // --- Stumm/Taub/Unterdrueckt/Prioritaet ---
    if anfrage.suppress.is_some() && akteur.is_some() {
        return Err(MurmelError::verweigert("suppress nur durch den Server"));
    }
    if anfrage.mute.is_some() || anfrage.deaf.is_some() || anfrage.priority_speaker.is_some() {
        if ist_selbst {
            if !akteur_superuser {
                return Err(MurmelError::verweigert("Server-Stummschaltung der eigenen Sitzung"));
            }
        } else if !darf(alter_kanal, Berechtigung::MUTE_DEAFEN) {
            return Err(MurmelError::verweigert("mute_deafen"));
        }
    }

    // --- Kommentar ---
    if let Some(kommentar) = &anfrage.comment {
        if ist_selbst {
            if !umgebung.pruefer.kommentar_erlaubt(kommentar) {
                return Err(MurmelError::eingabe("Kommentar abgelehnt"));
            }
        } else {
            if !darf(ChannelId::WURZEL, Berechtigung::MOVE) {
                return Err(MurmelError::verweigert("move in der Wurzel"));
            }
            if !kommentar.is_empty() {
                return Err(MurmelError::eingabe("fremder Kommentar darf nur geleert werden"));
            }
        }
    }

    // --- Textur ---
    if let Some(textur) = &anfrage.texture {
        if umgebung.max_textur_bytes > 0 && textur.len() > umgebung.max_textur_bytes {
            return Err(MurmelError::eingabe(format!(
                "Textur zu gross: {} Bytes",
                textur.len()
            )));
        }
    }

    // --- Registrierung ---
    let registrieren = match anfrage.user_id {
        Some(id) => {
            let bit = if ist_selbst {
                Berechtigung::SELF_REGISTER
            } else {
                Berechtigung::REGISTER
            };
            if !darf(ChannelId::WURZEL, bit) {
                return Err(MurmelError::verweigert(Berechtigung::name(bit)));
            }
            if id >= 0 {
                return Err(MurmelError::eingabe("Registrierung braucht negative user_id"));
            }
            if ist_registriert {
                return Err(MurmelError::eingabe("bereits registriert"));
            }
            true
        }
        None => false,
    };

    // -----------------------------------------------------------------------
    // Anwenden
    // -----------------------------------------------------------------------

    let mut delta = UserState {
        session: Some(ziel),
        actor: akteur,
        ..Default::default()
    };

    if registrieren {
        let id = registry.registrierung_vergeben(ziel)?;
        delta.user_id = Some(i64::from(id));
        tracing::info!(session = %ziel, benutzer_id = id, "Benutzer registriert");
    }

    let mut neu = attribute_anwenden(&alte_attribute, anfrage);

    if let Some(kanal) = neuer_kanal {
        registry.client_verschieben(ziel, kanal)?;
        delta.channel_id = Some(kanal);
        if anfrage.suppress.is_none() {
            neu.suppress =
                !hat_berechtigung(registry, umgebung.gruppen, ziel, kanal, Berechtigung::SPEAK);
        }
    }

    delta_ergaenzen(&mut delta, &alte_attribute, &neu);
    registry.client_mut(ziel)?.attribute = neu;

    if delta.ist_leer() {
        return Ok(None);
    }
    Ok(Some(delta))
}

/// Uebernimmt die Felder der Anfrage und normalisiert stumm/taub
fn attribute_anwenden(alt: &ClientAttribute, anfrage: &UserState) -> ClientAttribute {
    let mut neu = alt.clone();

    if let Some(deaf) = anfrage.deaf {
        neu.deaf = deaf;
        if deaf {
            neu.mute = true;
        }
    }
    if let Some(mute) = anfrage.mute {
        neu.mute = mute;
        if !mute {
            neu.deaf = false;
        }
    }
    if let Some(self_deaf) = anfrage.self_deaf {
        neu.self_deaf = self_deaf;
        if self_deaf {
            neu.self_mute = true;
        }
    }
    if let Some(self_mute) = anfrage.self_mute {
        neu.self_mute = self_mute;
        if !self_mute {
            neu.self_deaf = false;
        }
    }
    if let Some(suppress) = anfrage.suppress {
        neu.suppress = suppress;
    }
    if let Some(prioritaet) = anfrage.priority_speaker {
        neu.priority_speaker = prioritaet;
    }
    if let Some(recording) = anfrage.recording {
        neu.recording = recording;
    }
    if let Some(kommentar) = &anfrage.comment {
        neu.kommentar = kommentar.clone();
    }
    if let Some(textur) = &anfrage.texture {
        neu.textur = textur.clone();
    }
    if let Some(kontext) = &anfrage.plugin_context {
        neu.plugin_kontext = kontext.clone();
    }
    if let Some(identitaet) = &anfrage.plugin_identity {
        neu.plugin_identitaet = identitaet.clone();
    }
    neu
}

/// Plugin-Felder werden nicht verteilt
fn delta_ergaenzen(delta: &mut UserState, alt: &ClientAttribute, neu: &ClientAttribute) {
    fn geaendert<T: PartialEq + Clone>(alt: &T, neu: &T) -> Option<T> {
        (alt != neu).then(|| neu.clone())
    }

    delta.mute = geaendert(&alt.mute, &neu.mute);
    delta.deaf = geaendert(&alt.deaf, &neu.deaf);
    delta.suppress = geaendert(&alt.suppress, &neu.suppress);
    delta.self_mute = geaendert(&alt.self_mute, &neu.self_mute);
    delta.self_deaf = geaendert(&alt.self_deaf, &neu.self_deaf);
    delta.priority_speaker = geaendert(&alt.priority_speaker, &neu.priority_speaker);
    delta.recording = geaendert(&alt.recording, &neu.recording);
    delta.comment = geaendert(&alt.kommentar, &neu.kommentar);
    delta.texture = geaendert(&alt.textur, &neu.textur);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
