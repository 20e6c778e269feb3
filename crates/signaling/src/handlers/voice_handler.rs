//! Voice-Handler – Fluesterziele und Voice ueber den TCP-Tunnel

use bytes::Bytes;
use murmel_core::error::{MurmelError, Result};
use murmel_core::types::SessionId;
use murmel_protocol::control::{Nachricht, VoiceTarget};
use murmel_protocol::voice::{datagramm_zerlegen, UdpTyp, MAX_VOICE_TARGET};
use murmel_registry::{hat_berechtigung, Berechtigung, KanalZiel, VoiceZiel};
use std::sync::Arc;

use crate::broadcast::{ClientSender, TunnelSenke};
use crate::server_state::SignalingState;

/// Setzt oder loescht ein Fluesterziel
///
/// Ziele ohne WHISPER-Berechtigung oder mit unbekannter ID werden
/// uebersprungen, der Rest wird gespeichert. Eine leere Zielliste loescht
/// das Fluesterziel.
pub fn handle_voice_target(anfrage: VoiceTarget, akteur: SessionId, state: &SignalingState) -> Result<()> {
    if !(1..=MAX_VOICE_TARGET).contains(&anfrage.id) {
        return Err(MurmelError::eingabe(format!(
            "VoiceTarget-ID {} ausserhalb 1..={}",
            anfrage.id, MAX_VOICE_TARGET
        )));
    }

    let mut registry = state.registry.write();
    let gruppen = state.gruppen.as_ref();
    let mut ziel = VoiceZiel::default();

    for eintrag in &anfrage.targets {
        for session in &eintrag.sessions {
            let Ok(client) = registry.client(*session) else {
                continue;
            };
            let kanal = client.kanal();
            if hat_berechtigung(&registry, gruppen, akteur, kanal, Berechtigung::WHISPER)
                && !ziel.sitzungen.contains(session)
            {
                ziel.sitzungen.push(*session);
            }
        }
        if let Some(kanal) = eintrag.channel_id {
            if registry.kanal(kanal).is_err() {
                continue;
            }
            if hat_berechtigung(&registry, gruppen, akteur, kanal, Berechtigung::WHISPER) {
                ziel.kanaele.push(KanalZiel {
                    kanal,
                    unterkanaele: eintrag.children,
                    links: eintrag.links,
                });
            }
        }
    }

    let client = registry.client_mut(akteur)?;
    if ziel.sitzungen.is_empty() && ziel.kanaele.is_empty() {
        client.voice_ziele.remove(&anfrage.id);
        tracing::debug!(session = %akteur, id = anfrage.id, "Fluesterziel geloescht");
    } else {
        tracing::debug!(
            session = %akteur,
            id = anfrage.id,
            sitzungen = ziel.sitzungen.len(),
            kanaele = ziel.kanaele.len(),
            "Fluesterziel gesetzt"
        );
        client.voice_ziele.insert(anfrage.id, ziel);
    }
    Ok(())
}

/// Verarbeitet ein Voice-Datagramm aus dem TCP-Tunnel
///
/// Eine Sitzung, die ueber den Tunnel spricht, bekommt ab jetzt auch ueber
/// den Tunnel zugestellt. Pings gehen unveraendert zurueck.
pub fn handle_udp_tunnel(
    paket: Bytes,
    akteur: SessionId,
    antwort: &ClientSender,
    state: &SignalingState,
) -> Result<()> {
    let (kopf, nutzdaten) = datagramm_zerlegen(&paket)
        .ok_or_else(|| MurmelError::eingabe("Tunnel-Datagramm mit unbekanntem Typ"))?;

    if state.voice_state.endpunkt_von_session(akteur).is_some() {
        let mut registry = state.registry.write();
        registry.client_mut(akteur)?.udp_adresse = None;
        state.voice_state.sitzung_entfernen(akteur);
        state
            .voice_router
            .senke_setzen(akteur, Arc::new(TunnelSenke::neu(antwort.clone())));
        tracing::info!(session = %akteur, "Voice faellt auf den TCP-Tunnel zurueck");
    }

    if kopf.typ == UdpTyp::Ping {
        antwort.senden_verlustbehaftet(Nachricht::UdpTunnel(paket.clone()));
        return Ok(());
    }

    let zugestellt = state.voice_router.route(akteur, kopf, nutzdaten);
    state
        .metriken
        .voice_weitergeleitet_total
        .inc_by(zugestellt as u64);
    Ok(())
}
