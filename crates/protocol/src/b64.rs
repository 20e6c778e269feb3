//! Serde-Helfer fuer optionale Byte-Felder
//!
//! Byte-Felder (Schluessel, Nonces, Texturen) werden im JSON als
//! Base64-Strings uebertragen statt als Zahlen-Arrays.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(wert: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match wert {
        Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let text: Option<String> = Option::deserialize(deserializer)?;
    text.map(|t| STANDARD.decode(t.as_bytes()).map_err(serde::de::Error::custom))
        .transpose()
}
