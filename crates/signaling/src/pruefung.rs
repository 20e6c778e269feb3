//! Pruefung von Freitext (Kommentare, Textnachrichten)

/// Entscheidet ob ein Text angenommen wird
///
/// Wird unter dem Registry-Lock aufgerufen und darf nicht blockieren.
pub trait InhaltsPruefer: Send + Sync {
    fn kommentar_erlaubt(&self, text: &str) -> bool;
    fn nachricht_erlaubt(&self, text: &str) -> bool;
}

/// Begrenzt die Laenge in Bytes; 0 bedeutet unbegrenzt
#[derive(Debug, Clone, Copy)]
pub struct LaengenPruefer {
    pub max_kommentar: usize,
    pub max_nachricht: usize,
}

impl LaengenPruefer {
    pub fn neu(max_kommentar: usize, max_nachricht: usize) -> Self {
        Self {
            max_kommentar,
            max_nachricht,
        }
    }
}

impl Default for LaengenPruefer {
    fn default() -> Self {
        Self::neu(5000, 5000)
    }
}

fn passt(text: &str, max: usize) -> bool {
    max == 0 || text.len() <= max
}

impl InhaltsPruefer for LaengenPruefer {
    fn kommentar_erlaubt(&self, text: &str) -> bool {
        passt(text, self.max_kommentar)
    }

    fn nachricht_erlaubt(&self, text: &str) -> bool {
        !text.is_empty() && passt(text, self.max_nachricht)
    }
}
