//! murmel-server – Bibliotheks-Root
//!
//! Verdrahtet Registry, Voice-Server, Steuerkanal und Observability und
//! stellt den oeffentlichen Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use murmel_observability::{observability_server_starten, MurmelMetriken};
use murmel_registry::{SessionRegistry, StatischeGruppen};
use murmel_signaling::{KonfigAuthentifizierer, SignalingServer, SignalingState};
use murmel_voice::{VoiceRouter, VoiceServer, VoiceServerConfig, VoiceState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Registry, Voice-Router und Metriken anlegen
    /// 2. UDP-Socket oeffnen (Voice)
    /// 3. TCP-Listener starten (Steuerkanal)
    /// 4. Observability-Server starten
    /// 5. Auf Ctrl-C warten und alle Tasks ueber `watch` beenden
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let laufend = self.aufbauen(shutdown_rx).await?;

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        let _ = shutdown_tx.send(true);
        laufend.beenden().await;
        Ok(())
    }

    /// Bindet alle Sockets und startet die Tasks
    pub async fn aufbauen(&self, shutdown: watch::Receiver<bool>) -> Result<LaufenderServer> {
        let config = &self.config;
        config.validieren()?;

        tracing::info!(
            server_name = %config.server.name,
            tcp = %config.tcp_bind_adresse(),
            udp = %config.udp_bind_adresse(),
            max_clients = config.server.max_clients,
            "Server startet"
        );
        if config.server.superuser_passwort.is_none() {
            tracing::warn!("Kein Superuser-Passwort gesetzt, Superuser-Login deaktiviert");
        }

        let metriken = MurmelMetriken::neu()?;
        let registry = SessionRegistry::neu().geteilt();
        let voice_router = VoiceRouter::neu(Arc::clone(&registry));
        let voice_state = VoiceState::neu();

        // --- Voice (UDP) ---
        let udp_addr: SocketAddr = config
            .udp_bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige UDP-Adresse '{}'", config.udp_bind_adresse()))?;
        let voice_config = VoiceServerConfig {
            bind_addr: udp_addr,
            send_queue_groesse: config.limits.voice_queue_groesse,
        };
        let voice = VoiceServer::binden(
            voice_config,
            Arc::clone(&registry),
            voice_router.clone(),
            voice_state.clone(),
            metriken.clone(),
        )
        .await
        .with_context(|| format!("UDP-Socket {} nicht gebunden", udp_addr))?;
        let udp_adresse = voice.lokale_adresse()?;

        // --- Steuerkanal (TCP) ---
        let state = SignalingState::neu(
            config.signaling_config(),
            registry,
            voice_router,
            voice_state,
            metriken.clone(),
        )
        .mit_gruppen(Arc::new(StatischeGruppen::neu(config.gruppen.clone())))
        .mit_authentifizierer(Arc::new(KonfigAuthentifizierer::neu(
            config.server.superuser_passwort.clone(),
        )));
        let state = Arc::new(state);

        let tcp_addr: SocketAddr = config
            .tcp_bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige TCP-Adresse '{}'", config.tcp_bind_adresse()))?;
        let signaling = SignalingServer::binden(Arc::clone(&state), tcp_addr)
            .await
            .with_context(|| format!("TCP-Socket {} nicht gebunden", tcp_addr))?;
        let tcp_adresse = signaling.lokale_adresse()?;

        let mut tasks = Vec::new();

        let voice_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            voice.empfangs_loop_starten(voice_shutdown).await;
        }));

        let signaling_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = signaling.starten(signaling_shutdown).await {
                tracing::error!(fehler = %e, "Signaling-Server beendet mit Fehler");
            }
        }));

        // --- Observability ---
        if config.observability.aktiviert {
            let addr: SocketAddr = config
                .observability_bind_adresse()
                .parse()
                .context("Ungueltige Observability-Adresse")?;
            let obs_shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(addr, metriken, obs_shutdown).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet mit Fehler");
                }
            }));
        }

        tracing::info!(tcp = %tcp_adresse, udp = %udp_adresse, "Server bereit");

        Ok(LaufenderServer {
            state,
            tcp_adresse,
            udp_adresse,
            tasks,
        })
    }
}

/// Gestarteter Server; endet ueber den `watch`-Kanal aus [`Server::aufbauen`]
pub struct LaufenderServer {
    pub state: Arc<SignalingState>,
    pub tcp_adresse: SocketAddr,
    pub udp_adresse: SocketAddr,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl LaufenderServer {
    /// Wartet bis alle Tasks nach dem Shutdown-Signal beendet sind
    pub async fn beenden(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(fehler = %e, "Server-Task abgebrochen");
            }
        }
        tracing::info!("Server gestoppt");
    }
}
