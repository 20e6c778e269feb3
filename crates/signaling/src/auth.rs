//! Authentifizierung neuer Verbindungen
//!
//! Der Steuerkanal kennt nur das Trait [`Authentifizierer`]. Der mitgelieferte
//! [`KonfigAuthentifizierer`] kennt genau einen registrierten Benutzer, den
//! Superuser mit Passwort aus der Konfiguration; alle anderen sind Gaeste.

use murmel_protocol::control::RejectTyp;
use murmel_registry::Identitaet;

/// Maximale Laenge eines Benutzernamens in Zeichen
pub const MAX_NAME_LAENGE: usize = 64;

/// Ablehnung einer Anmeldung, wird als `Reject` an den Client gesendet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAblehnung {
    pub typ: RejectTyp,
    pub grund: String,
}

impl AuthAblehnung {
    pub fn neu(typ: RejectTyp, grund: impl Into<String>) -> Self {
        Self {
            typ,
            grund: grund.into(),
        }
    }
}

/// Prueft Name und Passwort einer Anmeldung
///
/// Wird ausserhalb des Registry-Locks aufgerufen. Die Pruefung auf bereits
/// belegte Namen uebernimmt der Auth-Handler unter dem Lock.
pub trait Authentifizierer: Send + Sync {
    fn authentifizieren(
        &self,
        name: &str,
        passwort: Option<&str>,
    ) -> Result<Identitaet, AuthAblehnung>;
}

/// Prueft ob ein Benutzername zulaessig ist
pub fn name_gueltig(name: &str) -> bool {
    let name_trim = name.trim();
    !name_trim.is_empty()
        && name_trim.len() == name.len()
        && name.chars().count() <= MAX_NAME_LAENGE
        && !name.chars().any(char::is_control)
}

// ---------------------------------------------------------------------------
// KonfigAuthentifizierer
// ---------------------------------------------------------------------------

/// Superuser-Passwort aus der Konfiguration, sonst Gastzugang
#[derive(Debug, Clone, Default)]
pub struct KonfigAuthentifizierer {
    superuser_passwort: Option<String>,
}

impl KonfigAuthentifizierer {
    /// `None` oder leeres Passwort deaktiviert den Superuser-Login
    pub fn neu(superuser_passwort: Option<String>) -> Self {
        Self {
            superuser_passwort: superuser_passwort.filter(|p| !p.is_empty()),
        }
    }
}

impl Authentifizierer for KonfigAuthentifizierer {
    fn authentifizieren(
        &self,
        name: &str,
        passwort: Option<&str>,
    ) -> Result<Identitaet, AuthAblehnung> {
        if !name_gueltig(name) {
            return Err(AuthAblehnung::neu(
                RejectTyp::InvalidUsername,
                "Ungueltiger Benutzername",
            ));
        }

        if name.eq_ignore_ascii_case("superuser") {
            return match (&self.superuser_passwort, passwort) {
                (Some(erwartet), Some(p)) if erwartet == p => Ok(Identitaet::superuser()),
                _ => {
                    tracing::warn!("Superuser-Anmeldung mit falschem Passwort");
                    Err(AuthAblehnung::neu(
                        RejectTyp::WrongPassword,
                        "Falsches Passwort",
                    ))
                }
            };
        }

        Ok(Identitaet::gast(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gast_ohne_passwort() {
        let auth = KonfigAuthentifizierer::neu(Some("geheim".into()));
        let identitaet = auth.authentifizieren("anna", None).unwrap();
        assert_eq!(identitaet, Identitaet::gast("anna"));
    }

    #[test]
    fn superuser_braucht_passwort() {
        let auth = KonfigAuthentifizierer::neu(Some("geheim".into()));
        assert_eq!(
            auth.authentifizieren("SuperUser", Some("geheim")).unwrap(),
            Identitaet::superuser()
        );
        let fehler = auth.authentifizieren("superuser", Some("falsch")).unwrap_err();
        assert_eq!(fehler.typ, RejectTyp::WrongPassword);
    }

    #[test]
    fn ohne_konfiguriertes_passwort_kein_superuser() {
        let auth = KonfigAuthentifizierer::neu(Some(String::new()));
        let fehler = auth.authentifizieren("SuperUser", Some("")).unwrap_err();
        assert_eq!(fehler.typ, RejectTyp::WrongPassword);
    }

    #[test]
    fn ungueltige_namen() {
        let auth = KonfigAuthentifizierer::default();
        for name in ["", "   ", " anna", "an\nna", &"x".repeat(MAX_NAME_LAENGE + 1)] {
            let fehler = auth.authentifizieren(name, None).unwrap_err();
            assert_eq!(fehler.typ, RejectTyp::InvalidUsername, "{:?}", name);
        }
        assert!(name_gueltig("Anna Lena"));
    }
}
