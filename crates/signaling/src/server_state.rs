//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt Registry, Broadcaster, Voice-Anbindung und die austauschbaren
//! Pruef-Komponenten. Wird als `Arc<SignalingState>` zwischen allen
//! Verbindungs-Tasks geteilt.

use murmel_core::types::SessionId;
use murmel_observability::MurmelMetriken;
use murmel_protocol::control::{Nachricht, UserRemove};
use murmel_registry::{GeteilteRegistry, GruppenAufloeser, SessionRegistry, StatischeGruppen};
use murmel_voice::{VoiceRouter, VoiceState};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;

use crate::auth::{Authentifizierer, KonfigAuthentifizierer};
use crate::broadcast::{ClientSender, EventBroadcaster};
use crate::pruefung::{InhaltsPruefer, LaengenPruefer};

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Willkommensnachricht (ServerSync)
    pub willkommen: String,
    /// Maximale gleichzeitige Sitzungen
    pub max_clients: u32,
    /// Maximale Voice-Bandbreite pro Client in Bit/s
    pub max_bandbreite: u32,
    /// Maximale Texturgroesse in Bytes (0 = unbegrenzt)
    pub max_textur_bytes: usize,
    pub max_kommentar_laenge: usize,
    pub max_nachricht_laenge: usize,
    /// Groesse der ausgehenden Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Murmel Server".to_string(),
            willkommen: "Willkommen auf Murmel".to_string(),
            max_clients: 512,
            max_bandbreite: 72_000,
            max_textur_bytes: 128 * 1024,
            max_kommentar_laenge: 5000,
            max_nachricht_laenge: 5000,
            send_queue_groesse: 256,
            keepalive_sek: 15,
            verbindungs_timeout_sek: 30,
        }
    }
}

/// Ein Bann; lebt nur bis zum Neustart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bann {
    Adresse(IpAddr),
    Benutzer(u32),
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    pub config: Arc<SignalingConfig>,
    /// Autoritativer Zustand; einziger Serialisierungspunkt
    pub registry: GeteilteRegistry,
    pub broadcaster: EventBroadcaster,
    pub voice_router: VoiceRouter,
    pub voice_state: VoiceState,
    pub gruppen: Arc<dyn GruppenAufloeser>,
    pub authentifizierer: Arc<dyn Authentifizierer>,
    pub pruefer: Arc<dyn InhaltsPruefer>,
    pub metriken: MurmelMetriken,
    bans: Mutex<Vec<Bann>>,
}

impl SignalingState {
    /// Erstellt den Zustand mit Standard-Komponenten
    ///
    /// Gruppen sind leer, nur Gaeste koennen sich anmelden und Texte werden
    /// nach den Laengen aus `config` geprueft.
    pub fn neu(
        config: SignalingConfig,
        registry: GeteilteRegistry,
        voice_router: VoiceRouter,
        voice_state: VoiceState,
        metriken: MurmelMetriken,
    ) -> Self {
        let pruefer = LaengenPruefer::neu(config.max_kommentar_laenge, config.max_nachricht_laenge);
        Self {
            config: Arc::new(config),
            registry,
            broadcaster: EventBroadcaster::neu(),
            voice_router,
            voice_state,
            gruppen: Arc::new(StatischeGruppen::default()),
            authentifizierer: Arc::new(KonfigAuthentifizierer::default()),
            pruefer: Arc::new(pruefer),
            metriken,
            bans: Mutex::new(Vec::new()),
        }
    }

    pub fn mit_gruppen(mut self, gruppen: Arc<dyn GruppenAufloeser>) -> Self {
        self.gruppen = gruppen;
        self
    }

    pub fn mit_authentifizierer(mut self, authentifizierer: Arc<dyn Authentifizierer>) -> Self {
        self.authentifizierer = authentifizierer;
        self
    }

    pub fn mit_pruefer(mut self, pruefer: Arc<dyn InhaltsPruefer>) -> Self {
        self.pruefer = pruefer;
        self
    }

    // -----------------------------------------------------------------------
    // Bans
    // -----------------------------------------------------------------------

    pub fn bann_hinzufuegen(&self, bann: Bann) {
        let mut bans = self.bans.lock();
        if !bans.contains(&bann) {
            tracing::info!(bann = ?bann, "Bann hinzugefuegt");
            bans.push(bann);
        }
    }

    pub fn ist_gebannt(&self, adresse: IpAddr, benutzer_id: Option<u32>) -> bool {
        self.bans.lock().iter().any(|bann| match bann {
            Bann::Adresse(ip) => *ip == adresse,
            Bann::Benutzer(id) => Some(*id) == benutzer_id,
        })
    }

    // -----------------------------------------------------------------------
    // Verworfene Anfragen
    // -----------------------------------------------------------------------

    /// Protokolliert und zaehlt eine still verworfene Anfrage
    pub fn verworfen(&self, session: Option<SessionId>, grund: &str, details: &dyn std::fmt::Display) {
        tracing::debug!(
            session = ?session.map(|s| s.0),
            grund,
            details = %details,
            "Anfrage verworfen"
        );
        self.metriken.anfrage_verworfen(grund);
    }

    // -----------------------------------------------------------------------
    // Abbau
    // -----------------------------------------------------------------------

    /// Baut die Sitzung einer Verbindung ab und meldet das allen Sitzungen
    ///
    /// Registry-Eintrag, UDP-Endpunkt und Voice-Senke werden unter dem
    /// Schreib-Guard gemeinsam freigegeben; die Meldung erreicht auch die
    /// entfernte Sitzung selbst. Danach wird ihr Verbindungs-Task getrennt.
    ///
    /// `antwort` ist die Send-Queue der Verbindung, der `session` gehoert.
    /// Wurde die Sitzung schon abgebaut (Kick, Bann), kann die ID inzwischen
    /// einer anderen Verbindung gehoeren; dann passiert nichts.
    ///
    /// Gibt `false` zurueck wenn die Sitzung schon abgebaut war.
    pub fn verbindung_abbauen(
        &self,
        session: SessionId,
        antwort: &ClientSender,
        meldung: UserRemove,
    ) -> bool {
        let sender = {
            let mut registry = self.registry.write();
            if antwort.ist_abgebaut() {
                return false;
            }
            match self.abbauen_unter_lock(&mut registry, session, meldung) {
                Some(sender) => sender,
                None => return false,
            }
        };

        if let Some(sender) = sender {
            sender.trennen();
        }
        true
    }

    /// Abbau bei bereits gehaltenem Schreib-Guard
    ///
    /// `None` wenn die Sitzung nicht existiert, sonst der (evtl. fehlende)
    /// Sender, der nach dem Freigeben des Guards getrennt werden muss. Der
    /// Sender ist dann schon als abgebaut markiert.
    pub(crate) fn abbauen_unter_lock(
        &self,
        registry: &mut SessionRegistry,
        session: SessionId,
        meldung: UserRemove,
    ) -> Option<Option<ClientSender>> {
        registry.sitzung_entfernen(session).ok()?;
        self.voice_state.sitzung_entfernen(session);
        self.voice_router.senke_entfernen(session);

        self.broadcaster.an_alle_senden(Nachricht::UserRemove(meldung));
        self.metriken
            .connected_clients
            .set(registry.client_anzahl() as i64);
        tracing::info!(session = %session, "Sitzung abgebaut");
        let sender = self.broadcaster.client_entfernen(session);
        if let Some(sender) = &sender {
            sender.als_abgebaut_markieren();
        }
        Some(sender)
    }
}
