//! User-Handler – UserState, Kick/Bann und Statistik

use murmel_core::error::{MurmelError, Result};
use murmel_core::types::{ChannelId, SessionId};
use murmel_protocol::control::{Nachricht, UserRemove, UserState, UserStats};
use murmel_registry::{hat_berechtigung, Berechtigung};

use crate::broadcast::ClientSender;
use crate::server_state::{Bann, SignalingState};
use crate::user_state::{user_state_anwenden, Umgebung, Ursprung};

use super::berechtigung_fordern;

/// Prueft und wendet eine UserState-Anfrage an, das Delta geht an alle
pub fn handle_user_state(anfrage: UserState, akteur: SessionId, state: &SignalingState) -> Result<()> {
    let umgebung = Umgebung {
        gruppen: state.gruppen.as_ref(),
        pruefer: state.pruefer.as_ref(),
        max_textur_bytes: state.config.max_textur_bytes,
    };

    let mut registry = state.registry.write();
    let delta = user_state_anwenden(&mut registry, &umgebung, Ursprung::Client(akteur), &anfrage)?;

    if let Some(delta) = delta {
        tracing::debug!(akteur = %akteur, ziel = ?delta.session.map(|s| s.0), "UserState geaendert");
        state.broadcaster.an_alle_senden(Nachricht::UserState(delta));
    }
    Ok(())
}

/// Kick oder Bann einer anderen Sitzung
///
/// Kick braucht KICK, Bann braucht BAN, jeweils in der Wurzel. Der
/// Superuser kann nicht entfernt werden.
pub fn handle_user_remove(anfrage: UserRemove, akteur: SessionId, state: &SignalingState) -> Result<()> {
    let ziel = anfrage.session;
    let bit = if anfrage.ban {
        Berechtigung::BAN
    } else {
        Berechtigung::KICK
    };

    let sender = {
        let mut registry = state.registry.write();
        berechtigung_fordern(&registry, state, akteur, ChannelId::WURZEL, bit)?;

        let user = registry.client(ziel)?;
        if user.ist_superuser() {
            return Err(MurmelError::verweigert("Superuser kann nicht entfernt werden"));
        }

        if anfrage.ban {
            if let Some(adresse) = user.tcp_adresse {
                state.bann_hinzufuegen(Bann::Adresse(adresse.ip()));
            }
            if let Some(id) = user.benutzer_id {
                state.bann_hinzufuegen(Bann::Benutzer(id));
            }
        }

        let meldung = UserRemove {
            session: ziel,
            actor: Some(akteur),
            reason: anfrage.reason.clone(),
            ban: anfrage.ban,
        };
        tracing::info!(
            akteur = %akteur,
            ziel = %ziel,
            bann = anfrage.ban,
            grund = ?anfrage.reason,
            "Benutzer entfernt"
        );
        state
            .abbauen_unter_lock(&mut registry, ziel, meldung)
            .ok_or(MurmelError::SitzungNichtGefunden(ziel))?
    };

    if let Some(sender) = sender {
        sender.trennen();
    }
    Ok(())
}

/// Beantwortet eine Statistik-Anfrage
///
/// Zaehler des Tunnels gibt es nur fuer die eigene Sitzung oder mit REGISTER
/// in der Wurzel.
pub fn handle_user_stats(
    anfrage: UserStats,
    akteur: SessionId,
    antwort: &ClientSender,
    state: &SignalingState,
) -> Result<()> {
    let registry = state.registry.read();
    let user = registry.client(anfrage.session)?;

    let mut stats = UserStats {
        session: user.session,
        online_secs: Some(user.verbunden_seit.elapsed().as_secs()),
        udp_aktiv: Some(user.udp_adresse.is_some()),
        ..Default::default()
    };

    let details = user.session == akteur
        || hat_berechtigung(
            &registry,
            state.gruppen.as_ref(),
            akteur,
            ChannelId::WURZEL,
            Berechtigung::REGISTER,
        );
    if details {
        let statistik = user.crypt.lock().statistik();
        stats.good = Some(statistik.gut);
        stats.late = Some(statistik.spaet);
        stats.lost = Some(statistik.verloren);
        stats.resync = Some(statistik.resync);
        stats.failed = Some(statistik.fehlgeschlagen);
    }

    antwort.senden(Nachricht::UserStats(stats));
    Ok(())
}
