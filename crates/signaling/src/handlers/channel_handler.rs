//! Channel-Handler – Anlegen, Aendern und Entfernen von Kanaelen
//!
//! Eine ChannelState-Anfrage ohne `channel_id` legt einen Kanal an, mit
//! `channel_id` aendert sie ihn. Alle Pruefungen laufen vor der ersten
//! Aenderung, die Verteilung an alle Sitzungen noch unter dem Schreib-Guard.

use murmel_core::error::{MurmelError, Result};
use murmel_core::types::{ChannelId, SessionId};
use murmel_protocol::control::{ChannelRemove, ChannelState, Nachricht, UserState};
use murmel_registry::{Berechtigung, SessionRegistry};

use crate::server_state::SignalingState;

use super::{berechtigung_fordern, kanal_state, suppress_aktualisieren};

/// Verarbeitet ChannelState (Anlegen oder Aendern)
pub fn handle_channel_state(anfrage: ChannelState, akteur: SessionId, state: &SignalingState) -> Result<()> {
    match anfrage.channel_id {
        None => kanal_anlegen(anfrage, akteur, state),
        Some(kanal) => kanal_aendern(kanal, anfrage, akteur, state),
    }
}

fn kanal_anlegen(anfrage: ChannelState, akteur: SessionId, state: &SignalingState) -> Result<()> {
    let eltern = anfrage
        .parent
        .ok_or_else(|| MurmelError::eingabe("neuer Kanal ohne Elternkanal"))?;
    let name = anfrage
        .name
        .ok_or_else(|| MurmelError::eingabe("neuer Kanal ohne Namen"))?;

    let mut registry = state.registry.write();
    registry.kanal(eltern)?;
    berechtigung_fordern(&registry, state, akteur, eltern, Berechtigung::MAKE_CHANNEL)?;

    let id = registry.kanal_erstellen(eltern, name)?;
    let kanal = registry.kanal_mut(id)?;
    if let Some(beschreibung) = anfrage.description {
        kanal.beschreibung = beschreibung;
    }
    kanal.max_benutzer = anfrage.max_users;

    state
        .broadcaster
        .an_alle_senden(Nachricht::ChannelState(kanal_state(kanal)));
    state.metriken.kanaele.set(registry.kanal_anzahl() as i64);

    tracing::info!(akteur = %akteur, kanal = %id, eltern = %eltern, "Kanal angelegt");
    Ok(())
}

fn kanal_aendern(
    id: ChannelId,
    anfrage: ChannelState,
    akteur: SessionId,
    state: &SignalingState,
) -> Result<()> {
    let mut registry = state.registry.write();
    let kanal = registry.kanal(id)?;
    berechtigung_fordern(&registry, state, akteur, id, Berechtigung::WRITE)?;

    let neuer_eltern = anfrage.parent.filter(|p| kanal.eltern() != Some(*p));
    let neuer_name = anfrage.name.filter(|n| *n != kanal.name);
    let name_danach = neuer_name.clone().unwrap_or_else(|| kanal.name.clone());

    if let Some(eltern) = neuer_eltern {
        if id.ist_wurzel() {
            return Err(MurmelError::eingabe("Wurzelkanal kann nicht verschoben werden"));
        }
        registry.kanal(eltern)?;
        if registry.im_teilbaum(id, eltern) {
            return Err(MurmelError::eingabe(format!("{} liegt unter {}", eltern, id)));
        }
        berechtigung_fordern(&registry, state, akteur, eltern, Berechtigung::MAKE_CHANNEL)?;
        if !name_frei(&registry, eltern, &name_danach, id) {
            return Err(MurmelError::eingabe(format!("Kanalname '{}' vergeben", name_danach)));
        }
    }
    if let Some(name) = &neuer_name {
        if name.trim().is_empty() {
            return Err(MurmelError::eingabe("leerer Kanalname"));
        }
        if let Some(eltern) = kanal.eltern() {
            if !name_frei(&registry, eltern, name, id) {
                return Err(MurmelError::eingabe(format!("Kanalname '{}' vergeben", name)));
            }
        }
    }

    // --- Anwenden ---
    let mut delta = ChannelState {
        channel_id: Some(id),
        ..Default::default()
    };
    if let Some(name) = neuer_name {
        registry.kanal_umbenennen(id, name.clone())?;
        delta.name = Some(name);
    }
    if let Some(eltern) = neuer_eltern {
        registry.kanal_umhaengen(id, eltern)?;
        delta.parent = Some(eltern);
    }
    let kanal = registry.kanal_mut(id)?;
    if let Some(beschreibung) = anfrage.description {
        if beschreibung != kanal.beschreibung {
            kanal.beschreibung = beschreibung.clone();
            delta.description = Some(beschreibung);
        }
    }
    if let Some(max) = anfrage.max_users {
        if kanal.max_benutzer != Some(max) {
            kanal.max_benutzer = Some(max);
            delta.max_users = Some(max);
        }
    }

    let unveraendert = delta.name.is_none()
        && delta.parent.is_none()
        && delta.description.is_none()
        && delta.max_users.is_none();
    if unveraendert {
        return Ok(());
    }

    state.broadcaster.an_alle_senden(Nachricht::ChannelState(delta));
    tracing::info!(akteur = %akteur, kanal = %id, "Kanal geaendert");
    Ok(())
}

/// Entfernt einen Kanal samt Teilbaum
///
/// Betroffene Benutzer landen im Elternkanal. Zuerst gehen ihre neuen
/// UserStates raus, dann ein ChannelRemove pro Kanal, Kinder vor Eltern.
pub fn handle_channel_remove(anfrage: ChannelRemove, akteur: SessionId, state: &SignalingState) -> Result<()> {
    let id = anfrage.channel_id;
    if id.ist_wurzel() {
        return Err(MurmelError::eingabe("Wurzelkanal kann nicht entfernt werden"));
    }

    let mut registry = state.registry.write();
    registry.kanal(id)?;
    berechtigung_fordern(&registry, state, akteur, id, Berechtigung::WRITE)?;

    let entfernung = registry.kanal_entfernen(id)?;

    for session in &entfernung.verschobene {
        let mut delta = UserState {
            session: Some(*session),
            actor: Some(akteur),
            channel_id: Some(entfernung.ziel),
            ..Default::default()
        };
        delta.suppress = suppress_aktualisieren(&mut registry, state, *session)?;
        state.broadcaster.an_alle_senden(Nachricht::UserState(delta));
    }
    for kanal in &entfernung.entfernte_kanaele {
        state
            .broadcaster
            .an_alle_senden(Nachricht::ChannelRemove(ChannelRemove { channel_id: *kanal }));
    }
    state.metriken.kanaele.set(registry.kanal_anzahl() as i64);

    tracing::info!(
        akteur = %akteur,
        kanal = %id,
        entfernt = entfernung.entfernte_kanaele.len(),
        verschoben = entfernung.verschobene.len(),
        "Kanal entfernt"
    );
    Ok(())
}

/// Ist `name` unter den Kindern von `eltern` frei (ausser `kanal` selbst)?
fn name_frei(registry: &SessionRegistry, eltern: ChannelId, name: &str, kanal: ChannelId) -> bool {
    let Ok(e) = registry.kanal(eltern) else {
        return false;
    };
    e.kinder()
        .iter()
        .filter(|k| **k != kanal)
        .filter_map(|k| registry.kanal(*k).ok())
        .all(|k| k.name != name)
}
