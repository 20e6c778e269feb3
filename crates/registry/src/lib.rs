//! murmel-registry – Autoritativer Serverzustand
//!
//! Verwaltet verbundene Sitzungen, den Kanalbaum und die ACLs und wertet
//! Berechtigungen hierarchisch aus.
//!
//! ## Nebenlaeufigkeit
//! Die Registry selbst ist nicht synchronisiert. Der Server haelt genau eine
//! Instanz hinter einem `parking_lot::RwLock` ([`GeteilteRegistry`]); alle
//! Aenderungen und die sie absichernden Berechtigungspruefungen laufen unter
//! dem Schreib-Guard.

pub mod acl;
pub mod berechtigung;
pub mod client;
pub mod gruppen;
pub mod kanal;
pub mod registry;

pub use acl::{berechtigung_auswerten, berechtigungen_ermitteln, hat_berechtigung, Auswertung};
pub use berechtigung::Berechtigung;
pub use client::{Client, ClientAttribute, Identitaet, KanalZiel, VoiceZiel};
pub use gruppen::{GruppenAufloeser, StatischeGruppen};
pub use kanal::{AclEintrag, AclSubjekt, Kanal};
pub use registry::{GeteilteRegistry, KanalEntfernung, SessionRegistry};
