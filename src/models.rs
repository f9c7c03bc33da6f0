// 📋 Data Model - Serde types for every persisted collection
// All records are stored as JSON documents with one named root array;
// identifiers are sequential prefixed strings (S0001, V0001, F0001, ...)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// GEOMETRY
// ============================================================================

/// (latitude, longitude) in degrees. No datum validation beyond being numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinates { latitude, longitude }
    }

    /// Deterministic small offset around a zone center, used when
    /// fabricating synthetic records. Same index, same point.
    pub fn jittered(self, index: u32) -> Coordinates {
        let shift_lat = ((index % 3) as f64 - 1.0) * 0.0015;
        let shift_lon = ((index % 4) as f64 - 1.0) * 0.0013;
        Coordinates {
            latitude: round6(self.latitude + shift_lat),
            longitude: round6(self.longitude + shift_lon),
        }
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

// ============================================================================
// PEOPLE & FAMILIES
// ============================================================================

/// Vulnerability indicators carried on a person record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VulnerabilityFlags {
    #[serde(default)]
    pub elderly: bool,
    #[serde(default)]
    pub single_parent: bool,
    #[serde(default)]
    pub low_income: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_name: Option<String>,
    pub birthdate: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub zone: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub vulnerability: VulnerabilityFlags,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Role of a person inside a household.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HouseholdRole {
    Guardian,
    Student,
    Sibling,
    Relative,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseholdMember {
    pub person_id: String,
    pub role: HouseholdRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Family {
    pub id: String,
    pub household: Vec<HouseholdMember>,
    #[serde(default)]
    pub eligibility_signals: Vec<String>,
    #[serde(default)]
    pub consent_granted: bool,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_updated_at: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Directed relationship between two persons ("guardian_of" etc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub id: String,
    pub from_person_id: String,
    pub to_person_id: String,
    pub kind: RelationshipKind,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    GuardianOf,
    SiblingOf,
    LivesWith,
    Other,
}

fn default_weight() -> f64 {
    1.0
}

// ============================================================================
// STUDENTS & VOLUNTEERS
// ============================================================================

/// Beneficiary record. Immutable during a single matching pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub person_id: String,
    pub family_id: String,
    /// Always the canonical zone name, never raw user input.
    pub zone: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub requires_mobility_assistance: bool,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volunteer {
    pub id: String,
    pub name: String,
    pub zone: String,
    pub coordinates: Coordinates,
    /// Hard capacity ceiling, never exceeded by the matching engine.
    pub max_students: u32,
    /// Personal travel radius cap in kilometers.
    pub radius_km: f64,
    #[serde(default)]
    pub mobility_assistance: bool,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ============================================================================
// ASSIGNMENTS
// ============================================================================

/// One active assignment per student, keyed by `student_id`.
/// Created only by the matching engine; removed only explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub student_id: String,
    pub volunteer_id: String,
    pub zone: String,
    pub distance_km: f64,
    pub rationale: String,
    pub created_at: String,
}

/// Inbound matching request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignRequest {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_radius_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedEntry {
    pub student_id: String,
    pub volunteer_id: String,
    pub distance_km: f64,
    pub rationale: String,
}

/// Why a student could not be matched during a pass. Soft outcome, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No volunteer registered in the student's zone
    NoMatch,
    /// Every same-zone volunteer is at capacity
    NoCapacity,
    /// No volunteer with capacity within the effective radius
    NoWithinRadius,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoMatch => "no_match",
            SkipReason::NoCapacity => "no_capacity",
            SkipReason::NoWithinRadius => "no_within_radius",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnassignedEntry {
    pub student_id: String,
    pub reason: SkipReason,
}

/// Per-volunteer load snapshot returned with every pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolunteerSummary {
    pub volunteer_id: String,
    pub zone: String,
    pub assigned: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignResponse {
    pub assigned: Vec<AssignedEntry>,
    pub unassigned: Vec<UnassignedEntry>,
    pub summary: Vec<VolunteerSummary>,
    pub explanation: String,
}

// ============================================================================
// EXTERNAL SERVICES CACHE
// ============================================================================

/// Cached lookup of an external program for a family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub id: String,
    pub family_id: String,
    pub source: String,
    pub payload: HashMap<String, serde_json::Value>,
    pub fetched_at: String,
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tunables persisted in config.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_max_students")]
    pub max_students_default: u32,
    #[serde(default = "default_max_radius_km")]
    pub max_radius_km: f64,
    #[serde(default = "default_min_students")]
    pub min_students_per_zone_after_sync: u32,
}

fn default_max_students() -> u32 {
    10
}

fn default_max_radius_km() -> f64 {
    8.0
}

fn default_min_students() -> u32 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            max_students_default: default_max_students(),
            max_radius_km: default_max_radius_km(),
            min_students_per_zone_after_sync: default_min_students(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
