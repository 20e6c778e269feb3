//! Text-Handler – Textnachrichten an Sitzungen, Kanaele und Teilbaeume

use murmel_core::error::{MurmelError, Result};
use murmel_core::types::SessionId;
use murmel_protocol::control::{Nachricht, TextMessage};
use murmel_registry::Berechtigung;
use std::collections::BTreeSet;

use crate::server_state::SignalingState;

use super::berechtigung_fordern;

/// Verteilt eine Textnachricht
///
/// Jeder Empfaenger bekommt die Nachricht genau einmal, der Absender nie.
/// Eine unbekannte ID oder ein Empfaenger in einem Kanal ohne TEXT_MESSAGE
/// verwirft die ganze Nachricht.
pub fn handle_text_message(anfrage: TextMessage, akteur: SessionId, state: &SignalingState) -> Result<()> {
    if !state.pruefer.nachricht_erlaubt(&anfrage.message) {
        return Err(MurmelError::eingabe("Textnachricht abgelehnt"));
    }

    let registry = state.registry.read();
    let mut empfaenger: BTreeSet<SessionId> = BTreeSet::new();

    for session in &anfrage.sessions {
        registry.client(*session)?;
        empfaenger.insert(*session);
    }
    for kanal in &anfrage.channel_ids {
        empfaenger.extend(registry.kanal(*kanal)?.mitglieder().iter().copied());
    }
    for wurzel in &anfrage.tree_ids {
        registry.kanal(*wurzel)?;
        for kanal in registry.unterkanaele(*wurzel) {
            empfaenger.extend(registry.kanal(kanal)?.mitglieder().iter().copied());
        }
    }
    empfaenger.remove(&akteur);

    for session in &empfaenger {
        let kanal = registry.client(*session)?.kanal();
        berechtigung_fordern(&registry, state, akteur, kanal, Berechtigung::TEXT_MESSAGE)?;
    }

    for session in &empfaenger {
        state.broadcaster.an_sitzung_senden(
            *session,
            Nachricht::TextMessage(TextMessage {
                actor: Some(akteur),
                sessions: Vec::new(),
                channel_ids: Vec::new(),
                tree_ids: Vec::new(),
                message: anfrage.message.clone(),
            }),
        );
    }

    tracing::debug!(akteur = %akteur, empfaenger = empfaenger.len(), "Textnachricht verteilt");
    Ok(())
}
