//! Serde adapters for the JSON wire representation.
//!
//! Byte fields travel as standard base64 strings, and peers written against
//! the same wire format send `null` or `""` for fields they leave unset.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serializer};

/// `Vec<u8>` as a base64 string; `null` decodes to an empty vector.
pub(crate) mod bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

/// `Option<Vec<u8>>` as a base64 string; `null` and `""` decode to `None`.
pub(crate) mod opt_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) if !encoded.is_empty() => STANDARD
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

/// Treats `""` like an absent string.
pub(crate) fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

/// Treats `null` like an absent value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `None` and `Some("")` encode the same way, so neither is written.
pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}

pub(crate) fn is_blank_bytes(value: &Option<Vec<u8>>) -> bool {
    value.as_deref().is_none_or(<[u8]>::is_empty)
}

/// Equality of optional text as seen on the wire.
pub(crate) fn same_text(a: &Option<String>, b: &Option<String>) -> bool {
    a.as_deref().filter(|s| !s.is_empty()) == b.as_deref().filter(|s| !s.is_empty())
}

/// Equality of optional bytes as seen on the wire.
pub(crate) fn same_bytes(a: &Option<Vec<u8>>, b: &Option<Vec<u8>>) -> bool {
    a.as_deref().filter(|v| !v.is_empty()) == b.as_deref().filter(|v| !v.is_empty())
}

pub(crate) fn is_zero(value: &u32) -> bool {
    *value == 0
}
