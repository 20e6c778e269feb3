//! SessionRegistry – Sitzungen und Kanalbaum
//!
//! Einziger Besitzer aller `Client`- und `Kanal`-Eintraege. Sitzungs-IDs
//! werden nie doppelt vergeben solange die Sitzung lebt; nach dem Entfernen
//! wird die kleinste freie ID wiederverwendet.
//!
//! ## Invarianten
//! - Jeder Client ist Mitglied genau eines Kanals und steht in dessen
//!   Mitgliedermenge (beide Richtungen konsistent)
//! - Genau ein Wurzelkanal (ID 0); der Baum ist azyklisch und zusammenhaengend

use murmel_core::error::{MurmelError, Result};
use murmel_core::types::{ChannelId, SessionId};
use murmel_crypto::CryptState;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::client::{Client, Identitaet};
use crate::kanal::Kanal;

/// Die eine, geteilte Registry des Servers
pub type GeteilteRegistry = Arc<RwLock<SessionRegistry>>;

/// Ergebnis von [`SessionRegistry::kanal_entfernen`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KanalEntfernung {
    /// Entfernte Kanaele, Kinder vor ihren Eltern
    pub entfernte_kanaele: Vec<ChannelId>,
    /// Sitzungen, die in `ziel` verschoben wurden
    pub verschobene: Vec<SessionId>,
    /// Elternkanal des entfernten Teilbaums
    pub ziel: ChannelId,
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SessionRegistry {
    clients: HashMap<SessionId, Client>,
    kanaele: HashMap<ChannelId, Kanal>,
    freie_sessions: BTreeSet<u32>,
    naechste_session: u32,
    naechster_kanal: u32,
    /// 0 ist fuer den Superuser reserviert
    naechste_benutzer_id: u32,
}

impl SessionRegistry {
    /// Erstellt eine Registry mit nur dem Wurzelkanal
    pub fn neu() -> Self {
        let mut kanaele = HashMap::new();
        kanaele.insert(ChannelId::WURZEL, Kanal::wurzel());
        Self {
            clients: HashMap::new(),
            kanaele,
            freie_sessions: BTreeSet::new(),
            naechste_session: 1,
            naechster_kanal: 1,
            naechste_benutzer_id: 1,
        }
    }

    /// Verpackt die Registry fuer die gemeinsame Nutzung
    pub fn geteilt(self) -> GeteilteRegistry {
        Arc::new(RwLock::new(self))
    }

    // -----------------------------------------------------------------------
    // Sitzungen
    // -----------------------------------------------------------------------

    /// Legt eine Sitzung an und setzt den Client in den Wurzelkanal
    ///
    /// # Fehler
    /// - `Erschoepft` wenn keine Sitzungs-ID mehr frei ist
    pub fn sitzung_erstellen(
        &mut self,
        identitaet: Identitaet,
        tcp_adresse: Option<SocketAddr>,
        crypt: Arc<Mutex<CryptState>>,
    ) -> Result<SessionId> {
        let id = match self.freie_sessions.pop_first() {
            Some(id) => id,
            None => {
                let id = self.naechste_session;
                self.naechste_session = id
                    .checked_add(1)
                    .ok_or_else(|| MurmelError::Erschoepft("Sitzungs-IDs".into()))?;
                id
            }
        };
        let session = SessionId(id);

        let client = Client::neu(session, identitaet, tcp_adresse, crypt);
        self.clients.insert(session, client);
        self.wurzel_mut().mitglieder.insert(session);

        tracing::debug!(session = %session, "Sitzung angelegt");
        Ok(session)
    }

    /// Entfernt eine Sitzung samt Kanalmitgliedschaft und gibt die ID frei
    pub fn sitzung_entfernen(&mut self, session: SessionId) -> Result<Client> {
        let client = self
            .clients
            .remove(&session)
            .ok_or(MurmelError::SitzungNichtGefunden(session))?;

        if let Some(kanal) = self.kanaele.get_mut(&client.kanal) {
            kanal.mitglieder.remove(&session);
        }
        // Die ID wird wiederverwendet; Fluesterziele duerfen sie nicht behalten
        for anderer in self.clients.values_mut() {
            for ziel in anderer.voice_ziele.values_mut() {
                ziel.sitzungen.retain(|s| *s != session);
            }
        }
        self.freie_sessions.insert(session.0);

        tracing::debug!(session = %session, kanal = %client.kanal, "Sitzung entfernt");
        Ok(client)
    }

    pub fn client(&self, session: SessionId) -> Result<&Client> {
        self.clients
            .get(&session)
            .ok_or(MurmelError::SitzungNichtGefunden(session))
    }

    pub fn client_mut(&mut self, session: SessionId) -> Result<&mut Client> {
        self.clients
            .get_mut(&session)
            .ok_or(MurmelError::SitzungNichtGefunden(session))
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub fn client_anzahl(&self) -> usize {
        self.clients.len()
    }

    /// Ist der Name bereits von einer verbundenen Sitzung belegt?
    pub fn name_belegt(&self, name: &str) -> bool {
        self.clients
            .values()
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Verschiebt einen Client und gibt den vorherigen Kanal zurueck
    pub fn client_verschieben(&mut self, session: SessionId, ziel: ChannelId) -> Result<ChannelId> {
        if !self.kanaele.contains_key(&ziel) {
            return Err(MurmelError::KanalNichtGefunden(ziel));
        }
        let client = self
            .clients
            .get_mut(&session)
            .ok_or(MurmelError::SitzungNichtGefunden(session))?;

        let alt = client.kanal;
        client.kanal = ziel;

        if let Some(kanal) = self.kanaele.get_mut(&alt) {
            kanal.mitglieder.remove(&session);
        }
        if let Some(kanal) = self.kanaele.get_mut(&ziel) {
            kanal.mitglieder.insert(session);
        }

        tracing::debug!(session = %session, von = %alt, nach = %ziel, "Client verschoben");
        Ok(alt)
    }

    /// Vergibt die naechste registrierte Benutzer-ID an eine Sitzung
    pub fn registrierung_vergeben(&mut self, session: SessionId) -> Result<u32> {
        let id = self.naechste_benutzer_id;
        let client = self.client_mut(session)?;
        if client.benutzer_id.is_some() {
            return Err(MurmelError::eingabe("bereits registriert"));
        }
        client.benutzer_id = Some(id);
        self.naechste_benutzer_id = id
            .checked_add(1)
            .ok_or_else(|| MurmelError::Erschoepft("Benutzer-IDs".into()))?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Kanaele
    // -----------------------------------------------------------------------

    pub fn kanal(&self, kanal: ChannelId) -> Result<&Kanal> {
        self.kanaele
            .get(&kanal)
            .ok_or(MurmelError::KanalNichtGefunden(kanal))
    }

    /// Veraenderlicher Zugriff auf Name, Beschreibung, Limit und ACL
    pub fn kanal_mut(&mut self, kanal: ChannelId) -> Result<&mut Kanal> {
        self.kanaele
            .get_mut(&kanal)
            .ok_or(MurmelError::KanalNichtGefunden(kanal))
    }

    pub fn kanal_anzahl(&self) -> usize {
        self.kanaele.len()
    }

    /// Alle Kanaele in Baumordnung (Eltern vor Kindern)
    pub fn kanaele_baumordnung(&self) -> Vec<ChannelId> {
        self.unterkanaele(ChannelId::WURZEL)
    }

    /// Kanal und alle Nachfahren, breitensuchend
    pub fn unterkanaele(&self, kanal: ChannelId) -> Vec<ChannelId> {
        let mut ergebnis = Vec::new();
        let mut warteschlange = VecDeque::new();
        if self.kanaele.contains_key(&kanal) {
            warteschlange.push_back(kanal);
        }
        while let Some(id) = warteschlange.pop_front() {
            ergebnis.push(id);
            if let Some(k) = self.kanaele.get(&id) {
                warteschlange.extend(k.kinder.iter().copied());
            }
        }
        ergebnis
    }

    /// Liegt `kanal` im Teilbaum unter `wurzel` (einschliesslich `wurzel`)?
    pub fn im_teilbaum(&self, wurzel: ChannelId, kanal: ChannelId) -> bool {
        let mut aktuell = Some(kanal);
        let mut schritte = 0;
        while let Some(id) = aktuell {
            if id == wurzel {
                return true;
            }
            schritte += 1;
            if schritte > self.kanaele.len() {
                return false;
            }
            aktuell = self.kanaele.get(&id).and_then(|k| k.eltern);
        }
        false
    }

    fn name_unter_geschwistern_frei(
        &self,
        eltern: ChannelId,
        name: &str,
        ausser: Option<ChannelId>,
    ) -> bool {
        self.kanaele.get(&eltern).is_some_and(|e| {
            e.kinder.iter().all(|kind| {
                Some(*kind) == ausser
                    || self
                        .kanaele
                        .get(kind)
                        .map_or(true, |k| !k.name.eq_ignore_ascii_case(name))
            })
        })
    }

    /// Legt einen Kanal unter `eltern` an
    ///
    /// # Fehler
    /// - `KanalNichtGefunden` wenn `eltern` fehlt
    /// - `UngueltigeEingabe` bei leerem oder unter Geschwistern doppeltem Namen
    pub fn kanal_erstellen(&mut self, eltern: ChannelId, name: String) -> Result<ChannelId> {
        if !self.kanaele.contains_key(&eltern) {
            return Err(MurmelError::KanalNichtGefunden(eltern));
        }
        if name.trim().is_empty() {
            return Err(MurmelError::eingabe("leerer Kanalname"));
        }
        if !self.name_unter_geschwistern_frei(eltern, &name, None) {
            return Err(MurmelError::eingabe(format!("Kanalname '{}' vergeben", name)));
        }

        let id = ChannelId(self.naechster_kanal);
        self.naechster_kanal = self
            .naechster_kanal
            .checked_add(1)
            .ok_or_else(|| MurmelError::Erschoepft("Kanal-IDs".into()))?;

        self.kanaele.insert(id, Kanal::neu(id, Some(eltern), name));
        if let Some(e) = self.kanaele.get_mut(&eltern) {
            e.kinder.insert(id);
        }

        tracing::debug!(kanal = %id, eltern = %eltern, "Kanal angelegt");
        Ok(id)
    }

    /// Benennt einen Kanal um, der Name muss unter Geschwistern eindeutig bleiben
    pub fn kanal_umbenennen(&mut self, kanal: ChannelId, name: String) -> Result<()> {
        let eltern = self.kanal(kanal)?.eltern;
        if name.trim().is_empty() {
            return Err(MurmelError::eingabe("leerer Kanalname"));
        }
        if let Some(eltern) = eltern {
            if !self.name_unter_geschwistern_frei(eltern, &name, Some(kanal)) {
                return Err(MurmelError::eingabe(format!("Kanalname '{}' vergeben", name)));
            }
        }
        self.kanal_mut(kanal)?.name = name;
        Ok(())
    }

    /// Haengt einen Kanal unter einen neuen Elternkanal
    ///
    /// # Fehler
    /// - `UngueltigeEingabe` fuer die Wurzel, bei Zyklen oder Namenskonflikt
    pub fn kanal_umhaengen(&mut self, kanal: ChannelId, neuer_eltern: ChannelId) -> Result<()> {
        let alter_eltern = self
            .kanal(kanal)?
            .eltern
            .ok_or_else(|| MurmelError::eingabe("Wurzelkanal kann nicht verschoben werden"))?;
        self.kanal(neuer_eltern)?;

        if self.im_teilbaum(kanal, neuer_eltern) {
            return Err(MurmelError::eingabe(format!(
                "{} liegt unter {}, Zyklus",
                neuer_eltern, kanal
            )));
        }
        if alter_eltern == neuer_eltern {
            return Ok(());
        }
        let name = self.kanal(kanal)?.name.clone();
        if !self.name_unter_geschwistern_frei(neuer_eltern, &name, Some(kanal)) {
            return Err(MurmelError::eingabe(format!("Kanalname '{}' vergeben", name)));
        }

        if let Some(e) = self.kanaele.get_mut(&alter_eltern) {
            e.kinder.remove(&kanal);
        }
        if let Some(e) = self.kanaele.get_mut(&neuer_eltern) {
            e.kinder.insert(kanal);
        }
        if let Some(k) = self.kanaele.get_mut(&kanal) {
            k.eltern = Some(neuer_eltern);
        }

        tracing::debug!(kanal = %kanal, von = %alter_eltern, nach = %neuer_eltern, "Kanal umgehaengt");
        Ok(())
    }

    /// Entfernt einen Kanal samt Teilbaum; Mitglieder wandern in den Elternkanal
    pub fn kanal_entfernen(&mut self, kanal: ChannelId) -> Result<KanalEntfernung> {
        let ziel = self
            .kanal(kanal)?
            .eltern
            .ok_or_else(|| MurmelError::eingabe("Wurzelkanal kann nicht entfernt werden"))?;

        let mut teilbaum = self.unterkanaele(kanal);
        let mut verschobene = Vec::new();
        for id in &teilbaum {
            let mitglieder: Vec<SessionId> = self
                .kanaele
                .get(id)
                .map(|k| k.mitglieder.iter().copied().collect())
                .unwrap_or_default();
            for session in mitglieder {
                self.client_verschieben(session, ziel)?;
                verschobene.push(session);
            }
        }

        // Kinder vor Eltern
        teilbaum.reverse();
        for id in &teilbaum {
            self.kanaele.remove(id);
        }
        if let Some(e) = self.kanaele.get_mut(&ziel) {
            e.kinder.remove(&kanal);
        }

        tracing::debug!(kanal = %kanal, anzahl = teilbaum.len(), "Kanal entfernt");
        Ok(KanalEntfernung {
            entfernte_kanaele: teilbaum,
            verschobene,
            ziel,
        })
    }

    fn wurzel_mut(&mut self) -> &mut Kanal {
        self.kanaele
            .entry(ChannelId::WURZEL)
            .or_insert_with(Kanal::wurzel)
    }

    // -----------------------------------------------------------------------
    // Invarianten
    // -----------------------------------------------------------------------

    /// Prueft alle strukturellen Invarianten; fuer Tests und Diagnose
    pub fn konsistenz_pruefen(&self) -> std::result::Result<(), String> {
        let wurzeln: Vec<_> = self.kanaele.values().filter(|k| k.eltern.is_none()).collect();
        if wurzeln.len() != 1 || wurzeln[0].id != ChannelId::WURZEL {
            return Err(format!("{} Wurzelkanaele", wurzeln.len()));
        }

        // Zusammenhaengend und azyklisch: die Breitensuche erreicht jeden Kanal genau einmal
        let erreicht = self.kanaele_baumordnung();
        let eindeutig: BTreeSet<_> = erreicht.iter().collect();
        if erreicht.len() != self.kanaele.len() || eindeutig.len() != erreicht.len() {
            return Err("Kanalbaum nicht zusammenhaengend oder zyklisch".into());
        }

        for kanal in self.kanaele.values() {
            if let Some(eltern) = kanal.eltern {
                let e = self
                    .kanaele
                    .get(&eltern)
                    .ok_or_else(|| format!("{} hat fehlenden Elternkanal", kanal.id))?;
                if !e.kinder.contains(&kanal.id) {
                    return Err(format!("{} fehlt in Kinderliste von {}", kanal.id, eltern));
                }
            }
            for session in &kanal.mitglieder {
                match self.clients.get(session) {
                    Some(c) if c.kanal == kanal.id => {}
                    _ => return Err(format!("{} in {} ohne passenden Client", session, kanal.id)),
                }
            }
        }

        for client in self.clients.values() {
            let kanal = self
                .kanaele
                .get(&client.kanal)
                .ok_or_else(|| format!("{} in fehlendem Kanal", client.session))?;
            if !kanal.mitglieder.contains(&client.session) {
                return Err(format!("{} fehlt in Mitgliedern von {}", client.session, kanal.id));
            }
        }
        Ok(())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
