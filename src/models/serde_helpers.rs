//! Serde helpers for partial-update DTOs

use serde::{Deserialize, Deserializer};

/// Deserialize a field into `Option<Option<T>>` so that an absent key stays
/// `None` (via `#[serde(default)]`) while a present key — including an
/// explicit `null` — becomes `Some(..)`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
