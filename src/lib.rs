// Tutor Match - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod geo;
pub mod idgen;
pub mod insights;
pub mod matching;
pub mod models;
pub mod names;
pub mod seed;
pub mod store;
pub mod sync;
pub mod zones;

// Re-export commonly used types
pub use geo::haversine_km;
pub use idgen::next_id;
pub use insights::{
    family_insight, student_insight, Insight, InsightError, MockGenerator, TextGenerator,
};
pub use matching::MatchingEngine;
pub use models::{
    AppConfig, AssignRequest, AssignResponse, AssignmentRecord, Coordinates, Family, Person,
    RelationshipEdge, ServiceStatus, SkipReason, Student, Volunteer, VolunteerSummary,
};
pub use seed::bootstrap_demo;
pub use store::{AuditEvent, Collection, Record, RecordStore, StoreError};
pub use sync::{sync_zone, SyncOutcome};
pub use zones::{normalize_zone_name, ZoneDirectory, ZoneError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
