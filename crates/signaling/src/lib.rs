//! murmel-signaling – TCP-Steuerkanal
//!
//! Dieser Crate implementiert den Steuerkanal von Murmel: Verbindungen,
//! Anmeldung, Kanal- und Benutzerverwaltung, ACLs und die Anbindung des
//! Voice-Routers fuer Clients ohne UDP.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task, Framed<_, FrameCodec>)
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- auth_handler     (Authenticate, Erstsynchronisation)
//!     +-- crypt_handler    (Ping, CryptSetup/Resync)
//!     +-- user_handler     (UserState, UserRemove, UserStats)
//!     +-- channel_handler  (ChannelState, ChannelRemove)
//!     +-- acl_handler      (Acl, PermissionQuery)
//!     +-- text_handler     (TextMessage)
//!     +-- voice_handler    (VoiceTarget, UdpTunnel)
//!
//! SignalingState   – Registry, Broadcaster, Voice-Anbindung, Bans
//! EventBroadcaster – Nachrichten an eine, mehrere oder alle Sitzungen
//! ```
//!
//! Alle Aenderungen am Serverzustand laufen unter dem Schreib-Guard der
//! Registry; Broadcasts werden unter demselben Guard eingereiht, damit jede
//! Sitzung Aenderungen in derselben Reihenfolge sieht.

pub mod auth;
pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod pruefung;
pub mod server_state;
pub mod tcp;
pub mod user_state;

// Bequeme Re-Exporte
pub use auth::{AuthAblehnung, Authentifizierer, KonfigAuthentifizierer};
pub use broadcast::{ClientSender, EventBroadcaster, TunnelSenke};
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, Folge, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use pruefung::{InhaltsPruefer, LaengenPruefer};
pub use server_state::{Bann, SignalingConfig, SignalingState};
pub use tcp::SignalingServer;
