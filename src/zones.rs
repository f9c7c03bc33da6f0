// 🗺️ Zone Directory & Resolver
// Canonicalizes free-text zone names against the registered zone table.
// Exact normalized equality only - no fuzzy or partial matching.

use crate::models::Coordinates;
use std::collections::BTreeMap;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneError {
    /// A zone was required but the input was empty or whitespace.
    Missing,
    /// The input did not match any registered zone.
    Unknown(String),
}

impl std::fmt::Display for ZoneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneError::Missing => write!(f, "zone is required"),
            ZoneError::Unknown(raw) => write!(f, "unknown zone: {}", raw),
        }
    }
}

impl std::error::Error for ZoneError {}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Fold a handful of Latin diacritics so ASCII spellings match accented
/// canonical names ("sao paulo" -> registered "São Paulo").
fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Strip all whitespace, lowercase, and fold diacritics for comparison.
pub fn normalize_zone_name(zone: &str) -> String {
    zone.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .map(fold_char)
        .collect()
}

// ============================================================================
// DIRECTORY
// ============================================================================

/// Registered zone table: canonical name -> center coordinate.
#[derive(Debug, Clone)]
pub struct ZoneDirectory {
    zones: BTreeMap<String, Coordinates>,
}

impl ZoneDirectory {
    pub fn new(zones: BTreeMap<String, Coordinates>) -> Self {
        ZoneDirectory { zones }
    }

    /// Canonical spelling for a user-supplied zone name.
    ///
    /// Must be called at every boundary where a zone is user input; internal
    /// code paths carry already-canonical zones and skip re-resolution.
    pub fn resolve(&self, raw: &str) -> Result<String, ZoneError> {
        if raw.trim().is_empty() {
            return Err(ZoneError::Missing);
        }
        let normalized = normalize_zone_name(raw);
        self.zones
            .keys()
            .find(|canonical| normalize_zone_name(canonical) == normalized)
            .cloned()
            .ok_or_else(|| ZoneError::Unknown(raw.trim().to_string()))
    }

    /// Center coordinate of a canonical zone.
    pub fn center(&self, canonical: &str) -> Option<Coordinates> {
        self.zones.get(canonical).copied()
    }

    pub fn canonical_names(&self) -> impl Iterator<Item = &String> {
        self.zones.keys()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> ZoneDirectory {
        let mut zones = BTreeMap::new();
        zones.insert(
            "São Paulo".to_string(),
            Coordinates::new(-23.5505, -46.6333),
        );
        zones.insert("Franca".to_string(), Coordinates::new(-20.5386, -47.4009));
        zones.insert("Goiania".to_string(), Coordinates::new(-16.6869, -49.2648));
        ZoneDirectory::new(zones)
    }

    #[test]
    fn test_resolve_exact() {
        assert_eq!(directory().resolve("Franca").unwrap(), "Franca");
    }

    #[test]
    fn test_resolve_ignores_case_and_whitespace() {
        let dir = directory();
        assert_eq!(dir.resolve("  sao  paulo ").unwrap(), "São Paulo");
        assert_eq!(dir.resolve("SÃO PAULO").unwrap(), "São Paulo");
        assert_eq!(dir.resolve("fRaNcA").unwrap(), "Franca");
    }

    #[test]
    fn test_resolve_unknown() {
        assert_eq!(
            directory().resolve("Atlantis"),
            Err(ZoneError::Unknown("Atlantis".to_string()))
        );
    }

    #[test]
    fn test_resolve_empty_is_missing_not_unknown() {
        let dir = directory();
        assert_eq!(dir.resolve(""), Err(ZoneError::Missing));
        assert_eq!(dir.resolve("   "), Err(ZoneError::Missing));
    }

    #[test]
    fn test_no_partial_matches() {
        assert!(matches!(
            directory().resolve("Fran"),
            Err(ZoneError::Unknown(_))
        ));
    }

    #[test]
    fn test_normalize_folds_diacritics() {
        assert_eq!(normalize_zone_name("São  Paulo"), "saopaulo");
        assert_eq!(normalize_zone_name(" Goiânia"), "goiania");
    }
}
