//! ACL-Handler – Abfragen und Ersetzen von Kanal-ACLs, Berechtigungsabfrage

use murmel_core::error::{MurmelError, Result};
use murmel_core::types::SessionId;
use murmel_protocol::control::{Acl, AclEintragDaten, Nachricht, PermissionQuery, UserState};
use murmel_registry::{berechtigungen_ermitteln, AclEintrag, AclSubjekt, Berechtigung};

use crate::broadcast::ClientSender;
use crate::server_state::SignalingState;

use super::{berechtigung_fordern, suppress_aktualisieren};

/// Liefert oder ersetzt die ACL eines Kanals; beides braucht WRITE
///
/// Nach dem Ersetzen wird `suppress` fuer alle Benutzer im Teilbaum neu
/// bestimmt, Aenderungen gehen als UserState an alle.
pub fn handle_acl(
    anfrage: Acl,
    akteur: SessionId,
    antwort: &ClientSender,
    state: &SignalingState,
) -> Result<()> {
    let id = anfrage.channel_id;

    if anfrage.query {
        let registry = state.registry.read();
        let kanal = registry.kanal(id)?;
        berechtigung_fordern(&registry, state, akteur, id, Berechtigung::WRITE)?;
        antwort.senden(Nachricht::Acl(Acl {
            channel_id: id,
            inherit_acls: kanal.erbt_acl,
            entries: kanal.acl.iter().map(eintrag_daten).collect(),
            query: false,
        }));
        return Ok(());
    }

    let eintraege = anfrage
        .entries
        .iter()
        .map(eintrag_aus_daten)
        .collect::<Result<Vec<_>>>()?;

    let mut registry = state.registry.write();
    registry.kanal(id)?;
    berechtigung_fordern(&registry, state, akteur, id, Berechtigung::WRITE)?;

    let kanal = registry.kanal_mut(id)?;
    kanal.acl = eintraege;
    kanal.erbt_acl = anfrage.inherit_acls;

    let betroffen: Vec<SessionId> = registry
        .unterkanaele(id)
        .into_iter()
        .filter_map(|k| registry.kanal(k).ok())
        .flat_map(|k| k.mitglieder().iter().copied())
        .collect();
    for session in betroffen {
        if let Some(unterdrueckt) = suppress_aktualisieren(&mut registry, state, session)? {
            state.broadcaster.an_alle_senden(Nachricht::UserState(UserState {
                session: Some(session),
                suppress: Some(unterdrueckt),
                ..Default::default()
            }));
        }
    }

    tracing::info!(
        akteur = %akteur,
        kanal = %id,
        eintraege = anfrage.entries.len(),
        erbt = anfrage.inherit_acls,
        "ACL ersetzt"
    );
    Ok(())
}

/// Beantwortet die Frage nach den eigenen Rechten in einem Kanal
pub fn handle_permission_query(
    anfrage: PermissionQuery,
    akteur: SessionId,
    antwort: &ClientSender,
    state: &SignalingState,
) -> Result<()> {
    let registry = state.registry.read();
    registry.kanal(anfrage.channel_id)?;
    let maske =
        berechtigungen_ermitteln(&registry, state.gruppen.as_ref(), akteur, anfrage.channel_id);

    antwort.senden(Nachricht::PermissionQuery(PermissionQuery {
        channel_id: anfrage.channel_id,
        permissions: Some(maske),
    }));
    Ok(())
}

fn eintrag_daten(eintrag: &AclEintrag) -> AclEintragDaten {
    let (user_id, group) = match &eintrag.subjekt {
        AclSubjekt::Benutzer(id) => (Some(*id), None),
        AclSubjekt::Gruppe(name) => (None, Some(name.clone())),
    };
    AclEintragDaten {
        user_id,
        group,
        apply_here: eintrag.gilt_hier,
        apply_subs: eintrag.gilt_unterkanaele,
        grant: eintrag.erlaubt,
        deny: eintrag.verweigert,
    }
}

/// Genau eines von `user_id` und `group` muss gesetzt sein
fn eintrag_aus_daten(daten: &AclEintragDaten) -> Result<AclEintrag> {
    let subjekt = match (&daten.user_id, &daten.group) {
        (Some(id), None) => AclSubjekt::Benutzer(*id),
        (None, Some(name)) if !name.is_empty() => AclSubjekt::Gruppe(name.clone()),
        _ => return Err(MurmelError::eingabe("ACL-Eintrag braucht genau ein Subjekt")),
    };
    Ok(AclEintrag {
        subjekt,
        erlaubt: daten.grant & Berechtigung::ALLE,
        verweigert: daten.deny & Berechtigung::ALLE,
        gilt_hier: daten.apply_here,
        gilt_unterkanaele: daten.apply_subs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_hilfe;
    use murmel_core::error::FehlerKlasse;
    use murmel_core::types::ChannelId;
    use murmel_registry::Identitaet;

    fn gruppe(name: &str, grant: u32, deny: u32) -> AclEintragDaten {
        AclEintragDaten {
            user_id: None,
            group: Some(name.into()),
            apply_here: true,
            apply_subs: true,
            grant,
            deny,
        }
    }

    #[tokio::test]
    async fn abfrage_braucht_write() {
        let state = test_hilfe::state();
        let (a, antwort, mut rx) = test_hilfe::sitzung(&state, Identitaet::gast("a"));
        let anfrage = Acl {
            channel_id: ChannelId::WURZEL,
            inherit_acls: true,
            entries: Vec::new(),
            query: true,
        };
        let fehler = handle_acl(anfrage, a, &antwort, &state).unwrap_err();
        assert_eq!(fehler.klasse(), FehlerKlasse::NichtBerechtigt);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ersetzen_und_abfragen() {
        let state = test_hilfe::state();
        let (su, antwort, mut rx) = test_hilfe::sitzung(&state, Identitaet::superuser());
        let lobby = state
            .registry
            .write()
            .kanal_erstellen(ChannelId::WURZEL, "Lobby".into())
            .unwrap();

        let eintraege = vec![gruppe("all", 0, Berechtigung::ENTER)];
        handle_acl(
            Acl {
                channel_id: lobby,
                inherit_acls: false,
                entries: eintraege.clone(),
                query: false,
            },
            su,
            &antwort,
            &state,
        )
        .unwrap();

        handle_acl(
            Acl {
                channel_id: lobby,
                inherit_acls: true,
                entries: Vec::new(),
                query: true,
            },
            su,
            &antwort,
            &state,
        )
        .unwrap();
        match rx.try_recv().unwrap() {
            Nachricht::Acl(acl) => {
                assert!(!acl.inherit_acls);
                assert_eq!(acl.entries, eintraege);
            }
            andere => panic!("unerwartet: {:?}", andere),
        }
    }

    #[tokio::test]
    async fn ersetzen_bestimmt_suppress_im_teilbaum_neu() {
        let state = test_hilfe::state();
        let (su, antwort, mut rx_su) = test_hilfe::sitzung(&state, Identitaet::superuser());
        let (a, _, mut rx_a) = test_hilfe::sitzung(&state, Identitaet::gast("a"));
        let (b, _, _rx_b) = test_hilfe::sitzung(&state, Identitaet::gast("b"));
        let lobby = {
            let mut registry = state.registry.write();
            let lobby = registry.kanal_erstellen(ChannelId::WURZEL, "Lobby".into()).unwrap();
            registry.client_verschieben(a, lobby).unwrap();
            lobby
        };
        let ersetzen = |deny: u32| Acl {
            channel_id: ChannelId::WURZEL,
            inherit_acls: true,
            entries: vec![gruppe("all", Berechtigung::STANDARD_ALLE, deny)],
            query: false,
        };

        handle_acl(ersetzen(Berechtigung::SPEAK), su, &antwort, &state).unwrap();
        {
            let registry = state.registry.read();
            assert!(registry.client(a).unwrap().attribute.suppress);
            assert!(registry.client(b).unwrap().attribute.suppress);
            assert!(!registry.client(su).unwrap().attribute.suppress);
            assert!(registry.kanal(lobby).unwrap().mitglieder().contains(&a));
        }
        let deltas: Vec<UserState> = test_hilfe::alle(&mut rx_su)
            .into_iter()
            .filter_map(|n| match n {
                Nachricht::UserState(u) => Some(u),
                _ => None,
            })
            .collect();
        assert_eq!(deltas.len(), 2);
        assert!(deltas.iter().all(|d| d.suppress == Some(true) && d.channel_id.is_none()));
        assert!(deltas.iter().any(|d| d.session == Some(a)));

        // Unveraenderte Rechte erzeugen keine Meldung
        test_hilfe::alle(&mut rx_a);
        handle_acl(ersetzen(Berechtigung::SPEAK), su, &antwort, &state).unwrap();
        assert!(test_hilfe::alle(&mut rx_a).is_empty());

        handle_acl(ersetzen(0), su, &antwort, &state).unwrap();
        let meldungen = test_hilfe::alle(&mut rx_a);
        assert_eq!(meldungen.len(), 2);
        assert!(meldungen.iter().all(|n| matches!(
            n,
            Nachricht::UserState(UserState { suppress: Some(false), .. })
        )));
        assert!(!state.registry.read().client(a).unwrap().attribute.suppress);
    }

    #[tokio::test]
    async fn eintrag_mit_zwei_subjekten_verworfen() {
        let state = test_hilfe::state();
        let (su, antwort, _rx) = test_hilfe::sitzung(&state, Identitaet::superuser());
        let kaputt = AclEintragDaten {
            user_id: Some(3),
            ..gruppe("all", Berechtigung::ENTER, 0)
        };
        let fehler = handle_acl(
            Acl {
                channel_id: ChannelId::WURZEL,
                inherit_acls: true,
                entries: vec![kaputt],
                query: false,
            },
            su,
            &antwort,
            &state,
        )
        .unwrap_err();
        assert_eq!(fehler.klasse(), FehlerKlasse::FehlerhafteEingabe);
        // Standard-ACL unveraendert
        assert_eq!(state.registry.read().kanal(ChannelId::WURZEL).unwrap().acl.len(), 1);
    }

    #[tokio::test]
    async fn berechtigungsabfrage_liefert_maske() {
        let state = test_hilfe::state();
        let (a, antwort, mut rx) = test_hilfe::sitzung(&state, Identitaet::gast("a"));
        handle_permission_query(
            PermissionQuery {
                channel_id: ChannelId::WURZEL,
                permissions: None,
            },
            a,
            &antwort,
            &state,
        )
        .unwrap();
        match rx.try_recv().unwrap() {
            Nachricht::PermissionQuery(p) => {
                assert_eq!(p.permissions, Some(Berechtigung::STANDARD_ALLE));
            }
            andere => panic!("unerwartet: {:?}", andere),
        }
    }
}
