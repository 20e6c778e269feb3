//! Voice Router – Weiterleitung von Voice-Paketen an Zuhoerer
//!
//! Der Router waehlt die Empfaenger anhand des Ziel-Nibbles aus dem
//! Kopf-Byte und legt das weitergeleitete Paket in die [`VoiceSenke`]
//! jedes Empfaengers.
//!
//! ## Ziele
//! - `Normal`: alle Mitglieder des Sprecherkanals ausser dem Sprecher
//! - `VoiceTarget(1..=14)`: konfigurierte Sitzungen und Kanaele, ohne Duplikate
//! - `Loopback`: zurueck an den Sprecher
//!
//! Stumme oder taube Sprecher werden nur per Loopback zugestellt, taube
//! Zuhoerer nie. Pro Paket gibt es keine Berechtigungspruefung; WHISPER
//! wird beim Konfigurieren des VoiceTargets geprueft.

use bytes::Bytes;
use dashmap::DashMap;
use murmel_core::types::SessionId;
use murmel_protocol::voice::{weiterleitung_bauen, DatagrammKopf, Sprechziel, UdpTyp};
use murmel_registry::{GeteilteRegistry, SessionRegistry};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::senke::VoiceSenke;

// ---------------------------------------------------------------------------
// VoiceRouter
// ---------------------------------------------------------------------------

/// Zentraler Voice Router
///
/// Thread-safe und `Clone`-faehig (innerer Arc).
#[derive(Clone)]
pub struct VoiceRouter {
    inner: Arc<VoiceRouterInner>,
}

struct VoiceRouterInner {
    registry: GeteilteRegistry,
    /// Zustellweg pro Sitzung
    senken: DashMap<SessionId, Arc<dyn VoiceSenke>>,
}

impl VoiceRouter {
    pub fn neu(registry: GeteilteRegistry) -> Self {
        Self {
            inner: Arc::new(VoiceRouterInner {
                registry,
                senken: DashMap::new(),
            }),
        }
    }

    /// Setzt oder ersetzt den Zustellweg einer Sitzung
    pub fn senke_setzen(&self, session: SessionId, senke: Arc<dyn VoiceSenke>) {
        self.inner.senken.insert(session, senke);
    }

    pub fn senke_entfernen(&self, session: SessionId) -> bool {
        self.inner.senken.remove(&session).is_some()
    }

    pub fn hat_senke(&self, session: SessionId) -> bool {
        self.inner.senken.contains_key(&session)
    }

    /// Leitet ein entschluesseltes Voice-Datagramm weiter
    ///
    /// Gibt die Anzahl der eingereihten Zustellungen zurueck.
    pub fn route(&self, von: SessionId, kopf: DatagrammKopf, nutzdaten: &[u8]) -> usize {
        if kopf.typ == UdpTyp::Ping {
            return 0;
        }

        let empfaenger = {
            let registry = self.inner.registry.read();
            empfaenger_ermitteln(&registry, von, kopf.ziel)
        };
        if empfaenger.is_empty() {
            tracing::trace!(session = %von, ziel = ?kopf.ziel, "Keine Empfaenger");
            return 0;
        }

        let paket = weiterleitung_bauen(kopf.typ, kopf.ziel, von, nutzdaten);
        let zugestellt = empfaenger
            .into_iter()
            .filter(|session| self.direkt_senden(*session, paket.clone()))
            .count();

        tracing::trace!(
            session = %von,
            ziel = ?kopf.ziel,
            empfaenger = zugestellt,
            "Voice-Paket weitergeleitet"
        );
        zugestellt
    }

    /// Stellt ein Paket ohne Empfaengerauswahl an eine Sitzung zu
    pub fn direkt_senden(&self, session: SessionId, paket: Bytes) -> bool {
        let senke = match self.inner.senken.get(&session) {
            Some(senke) => Arc::clone(senke.value()),
            None => {
                tracing::trace!(session = %session, "Empfaenger ohne Zustellweg");
                return false;
            }
        };
        senke.senden(paket)
    }
}

/// Ermittelt die Empfaenger eines Voice-Pakets
///
/// Ergebnis ist sortiert und enthaelt keine Duplikate.
pub fn empfaenger_ermitteln(
    registry: &SessionRegistry,
    von: SessionId,
    ziel: Sprechziel,
) -> Vec<SessionId> {
    let Ok(sprecher) = registry.client(von) else {
        return Vec::new();
    };

    if ziel == Sprechziel::Loopback {
        return vec![von];
    }
    if sprecher.ist_stumm() {
        return Vec::new();
    }

    let mut menge = BTreeSet::new();
    match ziel {
        Sprechziel::Normal => {
            if let Ok(kanal) = registry.kanal(sprecher.kanal()) {
                menge.extend(kanal.mitglieder().iter().copied());
            }
        }
        Sprechziel::VoiceTarget(id) => {
            let Some(voice_ziel) = sprecher.voice_ziele.get(&id) else {
                return Vec::new();
            };
            menge.extend(voice_ziel.sitzungen.iter().copied());
            for kanal_ziel in &voice_ziel.kanaele {
                let kanaele = if kanal_ziel.unterkanaele {
                    registry.unterkanaele(kanal_ziel.kanal)
                } else {
                    vec![kanal_ziel.kanal]
                };
                for kanal in kanaele {
                    if let Ok(k) = registry.kanal(kanal) {
                        menge.extend(k.mitglieder().iter().copied());
                    }
                }
            }
        }
        Sprechziel::Loopback => {}
    }

    menge
        .into_iter()
        .filter(|session| *session != von)
        .filter(|session| {
            registry
                .client(*session)
                .map(|c| !c.ist_taub())
                .unwrap_or(false)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use murmel_core::types::ChannelId;
    use murmel_crypto::CryptState;
    use murmel_protocol::voice::weiterleitung_zerlegen;
    use murmel_registry::{Identitaet, KanalZiel, VoiceZiel};
    use parking_lot::Mutex;

    /// Sammelt zugestellte Pakete
    #[derive(Default)]
    struct TestSenke {
        pakete: Mutex<Vec<Bytes>>,
    }

    impl VoiceSenke for TestSenke {
        fn senden(&self, paket: Bytes) -> bool {
            self.pakete.lock().push(paket);
            true
        }
    }

    struct Aufbau {
        router: VoiceRouter,
        registry: GeteilteRegistry,
        senken: Vec<(SessionId, Arc<TestSenke>)>,
    }

    impl Aufbau {
        fn neu() -> Self {
            let registry = SessionRegistry::neu().geteilt();
            Self {
                router: VoiceRouter::neu(Arc::clone(&registry)),
                registry,
                senken: Vec::new(),
            }
        }

        fn client(&mut self, name: &str, kanal: ChannelId) -> SessionId {
            let crypt = Arc::new(Mutex::new(CryptState::neu_zufaellig().unwrap()));
            let session = {
                let mut registry = self.registry.write();
                let session = registry
                    .sitzung_erstellen(Identitaet::gast(name), None, crypt)
                    .unwrap();
                registry.client_verschieben(session, kanal).unwrap();
                session
            };
            let senke = Arc::new(TestSenke::default());
            self.router.senke_setzen(session, senke.clone());
            self.senken.push((session, senke));
            session
        }

        fn empfangen(&self, session: SessionId) -> Vec<Bytes> {
            self.senken
                .iter()
                .find(|(s, _)| *s == session)
                .map(|(_, senke)| senke.pakete.lock().clone())
                .unwrap_or_default()
        }
    }

    fn kopf(ziel: Sprechziel) -> DatagrammKopf {
        DatagrammKopf {
            typ: UdpTyp::VoiceCodecA,
            ziel,
        }
    }

    #[test]
    fn normal_an_alle_anderen_im_kanal() {
        let mut aufbau = Aufbau::neu();
        let c1 = aufbau
            .registry
            .write()
            .kanal_erstellen(ChannelId::WURZEL, "C1".into())
            .unwrap();
        let a = aufbau.client("a", c1);
        let b = aufbau.client("b", c1);
        let c = aufbau.client("c", c1);
        let d = aufbau.client("d", ChannelId::WURZEL);

        let n = aufbau.router.route(a, kopf(Sprechziel::Normal), b"opus");
        assert_eq!(n, 2);
        assert!(aufbau.empfangen(a).is_empty());
        assert!(aufbau.empfangen(d).is_empty());

        for empfaenger in [b, c] {
            let pakete = aufbau.empfangen(empfaenger);
            assert_eq!(pakete.len(), 1);
            let (k, sprecher, nutzdaten) = weiterleitung_zerlegen(&pakete[0]).unwrap();
            assert_eq!(k.ziel, Sprechziel::Normal);
            assert_eq!(sprecher, a);
            assert_eq!(nutzdaten, b"opus");
        }
    }

    #[test]
    fn stummer_sprecher_und_taube_zuhoerer() {
        let mut aufbau = Aufbau::neu();
        let a = aufbau.client("a", ChannelId::WURZEL);
        let b = aufbau.client("b", ChannelId::WURZEL);
        let c = aufbau.client("c", ChannelId::WURZEL);

        aufbau.registry.write().client_mut(c).unwrap().attribute.self_deaf = true;
        assert_eq!(aufbau.router.route(a, kopf(Sprechziel::Normal), b"x"), 1);
        assert_eq!(aufbau.empfangen(b).len(), 1);
        assert!(aufbau.empfangen(c).is_empty());

        aufbau.registry.write().client_mut(a).unwrap().attribute.suppress = true;
        assert_eq!(aufbau.router.route(a, kopf(Sprechziel::Normal), b"x"), 0);
        assert_eq!(aufbau.empfangen(b).len(), 1);
    }

    #[test]
    fn loopback_nur_an_den_sprecher() {
        let mut aufbau = Aufbau::neu();
        let a = aufbau.client("a", ChannelId::WURZEL);
        let b = aufbau.client("b", ChannelId::WURZEL);
        aufbau.registry.write().client_mut(a).unwrap().attribute.mute = true;

        assert_eq!(aufbau.router.route(a, kopf(Sprechziel::Loopback), b"echo"), 1);
        assert!(aufbau.empfangen(b).is_empty());
        let pakete = aufbau.empfangen(a);
        let (k, sprecher, _) = weiterleitung_zerlegen(&pakete[0]).unwrap();
        assert_eq!(k.ziel, Sprechziel::Loopback);
        assert_eq!(sprecher, a);
    }

    #[test]
    fn voice_target_ohne_duplikate_und_mit_unterkanaelen() {
        let mut aufbau = Aufbau::neu();
        let (c1, c2) = {
            let mut registry = aufbau.registry.write();
            let c1 = registry.kanal_erstellen(ChannelId::WURZEL, "C1".into()).unwrap();
            let c2 = registry.kanal_erstellen(c1, "C2".into()).unwrap();
            (c1, c2)
        };
        let a = aufbau.client("a", ChannelId::WURZEL);
        let b = aufbau.client("b", c1);
        let c = aufbau.client("c", c2);
        let d = aufbau.client("d", ChannelId::WURZEL);

        aufbau.registry.write().client_mut(a).unwrap().voice_ziele.insert(
            3,
            VoiceZiel {
                sitzungen: vec![b, a],
                kanaele: vec![KanalZiel {
                    kanal: c1,
                    unterkanaele: true,
                    links: false,
                }],
            },
        );

        let n = aufbau.router.route(a, kopf(Sprechziel::VoiceTarget(3)), b"psst");
        assert_eq!(n, 2);
        assert_eq!(aufbau.empfangen(b).len(), 1);
        assert_eq!(aufbau.empfangen(c).len(), 1);
        assert!(aufbau.empfangen(a).is_empty());
        assert!(aufbau.empfangen(d).is_empty());

        let (k, _, _) = weiterleitung_zerlegen(&aufbau.empfangen(c)[0]).unwrap();
        assert_eq!(k.ziel, Sprechziel::VoiceTarget(1));
    }

    #[test]
    fn unbekanntes_voice_target_und_ping_werden_verworfen() {
        let mut aufbau = Aufbau::neu();
        let a = aufbau.client("a", ChannelId::WURZEL);
        let _b = aufbau.client("b", ChannelId::WURZEL);
        assert_eq!(aufbau.router.route(a, kopf(Sprechziel::VoiceTarget(9)), b"x"), 0);

        let ping = DatagrammKopf {
            typ: UdpTyp::Ping,
            ziel: Sprechziel::Normal,
        };
        assert_eq!(aufbau.router.route(a, ping, b"x"), 0);
    }

    #[test]
    fn ohne_senke_keine_zustellung() {
        let mut aufbau = Aufbau::neu();
        let a = aufbau.client("a", ChannelId::WURZEL);
        let b = aufbau.client("b", ChannelId::WURZEL);
        assert!(aufbau.router.senke_entfernen(b));
        assert!(!aufbau.router.hat_senke(b));
        assert_eq!(aufbau.router.route(a, kopf(Sprechziel::Normal), b"x"), 0);
    }
}
