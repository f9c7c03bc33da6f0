// 🎯 Matching Engine - Assigns students to volunteers
// Zone, capacity, distance and accessibility constraints with deterministic
// tie-breaking and idempotent re-runs.

use crate::geo::haversine_km;
use crate::models::{
    AssignRequest, AssignResponse, AssignedEntry, AssignmentRecord, SkipReason, Student,
    UnassignedEntry, Volunteer, VolunteerSummary,
};
use crate::store::{timestamp, Collection, RecordStore};
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

const EXPLANATION: &str = "Matching by zone, shortest distance and a simple accessibility rule.";

/// The matching core. Stateless between passes; every pass reads the current
/// store snapshot and persists its own assignments.
pub struct MatchingEngine<'a> {
    store: &'a RecordStore,
}

impl<'a> MatchingEngine<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        MatchingEngine { store }
    }

    /// Run one matching pass.
    ///
    /// Zone-resolution failures are terminal for the whole call; per-student
    /// non-matches are soft outcomes in `unassigned`. Re-running with no
    /// state change assigns nothing (already-assigned students are skipped).
    ///
    /// The whole pass holds the store's pass lock, so concurrent calls
    /// serialize and a volunteer's capacity can never be oversubscribed by a
    /// racing pass.
    pub fn assign(&self, request: &AssignRequest) -> Result<AssignResponse> {
        let _pass = self.store.pass_lock();

        let config = self.store.fetch_config()?;
        let canonical_zone = match &request.zone {
            Some(raw) => Some(self.store.resolve_zone(raw)?),
            None => None,
        };

        // Current load per volunteer and already-assigned students
        let existing: Vec<AssignmentRecord> = self.store.list(Collection::Assignments)?;
        let mut load_map: HashMap<String, u32> = HashMap::new();
        let mut assigned_students: HashSet<String> = HashSet::new();
        for record in &existing {
            *load_map.entry(record.volunteer_id.clone()).or_insert(0) += 1;
            assigned_students.insert(record.student_id.clone());
        }

        let students: Vec<Student> = self.store.list(Collection::Students)?;
        let candidates: Vec<Student> = students
            .into_iter()
            .filter(|student| match &canonical_zone {
                Some(zone) => &student.zone == zone,
                None => true,
            })
            .filter(|student| !assigned_students.contains(&student.id))
            .collect();

        let volunteers: Vec<Volunteer> = self.store.list(Collection::Volunteers)?;
        let pool: Vec<Volunteer> = volunteers
            .into_iter()
            .filter(|volunteer| match &canonical_zone {
                Some(zone) => &volunteer.zone == zone,
                None => true,
            })
            .collect();

        let mut assigned: Vec<AssignedEntry> = Vec::new();
        let mut unassigned: Vec<UnassignedEntry> = Vec::new();
        let mut touched: BTreeMap<String, Volunteer> = BTreeMap::new();

        for student in &candidates {
            // Volunteers in the student's own zone, not the request zone -
            // matters when no zone was requested and students span zones
            let zone_volunteers: Vec<&Volunteer> =
                pool.iter().filter(|v| v.zone == student.zone).collect();
            if zone_volunteers.is_empty() {
                unassigned.push(UnassignedEntry {
                    student_id: student.id.clone(),
                    reason: SkipReason::NoMatch,
                });
                continue;
            }

            let with_capacity: Vec<&Volunteer> = zone_volunteers
                .into_iter()
                .filter(|v| load_map.get(&v.id).copied().unwrap_or(0) < v.max_students)
                .collect();
            if with_capacity.is_empty() {
                unassigned.push(UnassignedEntry {
                    student_id: student.id.clone(),
                    reason: SkipReason::NoCapacity,
                });
                continue;
            }

            let mut within_radius: Vec<(&Volunteer, f64)> = Vec::new();
            for volunteer in with_capacity {
                let limit = effective_radius(volunteer, request.max_radius_km, config.max_radius_km);
                let distance = haversine_km(
                    student.coordinates.latitude,
                    student.coordinates.longitude,
                    volunteer.coordinates.latitude,
                    volunteer.coordinates.longitude,
                );
                if distance <= limit {
                    within_radius.push((volunteer, distance));
                }
            }
            if within_radius.is_empty() {
                unassigned.push(UnassignedEntry {
                    student_id: student.id.clone(),
                    reason: SkipReason::NoWithinRadius,
                });
                continue;
            }

            // Accessibility preference: restrict to mobility-capable
            // volunteers when the student needs one and any is in range;
            // otherwise fall back to the full within-radius set
            let requires_assistance = student.requires_mobility_assistance;
            let accessible: Vec<(&Volunteer, f64)> = within_radius
                .iter()
                .filter(|(v, _)| v.mobility_assistance)
                .cloned()
                .collect();
            let fallback = requires_assistance && accessible.is_empty();
            let mut selectable = if requires_assistance && !accessible.is_empty() {
                accessible
            } else {
                within_radius
            };

            // Deliberate tie-break policy: nearest first, then least-loaded,
            // then lexical volunteer id
            selectable.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| {
                        let load_a = load_map.get(&a.0.id).copied().unwrap_or(0);
                        let load_b = load_map.get(&b.0.id).copied().unwrap_or(0);
                        load_a.cmp(&load_b)
                    })
                    .then_with(|| a.0.id.cmp(&b.0.id))
            });
            let (volunteer, distance) = (selectable[0].0.clone(), selectable[0].1);

            *load_map.entry(volunteer.id.clone()).or_insert(0) += 1;
            touched.insert(volunteer.id.clone(), volunteer.clone());

            let rationale = build_rationale(student, &volunteer, distance, fallback);
            let record = AssignmentRecord {
                student_id: student.id.clone(),
                volunteer_id: volunteer.id.clone(),
                zone: student.zone.clone(),
                distance_km: distance,
                rationale: rationale.clone(),
                created_at: timestamp(),
            };
            self.store.upsert(Collection::Assignments, record)?;
            assigned_students.insert(student.id.clone());

            assigned.push(AssignedEntry {
                student_id: student.id.clone(),
                volunteer_id: volunteer.id.clone(),
                distance_km: distance,
                rationale,
            });
        }

        let summary = if touched.is_empty() {
            volunteer_summary(pool.iter(), &load_map)
        } else {
            volunteer_summary(touched.values(), &load_map)
        };

        self.store.append_audit(
            "assign",
            serde_json::json!({
                "requested_zone": &canonical_zone,
                "assigned": assigned.iter().map(|a| a.student_id.clone()).collect::<Vec<_>>(),
                "unassigned": &unassigned,
            }),
        )?;
        log::info!(
            "matching pass: zone={:?} assigned={} unassigned={}",
            canonical_zone,
            assigned.len(),
            unassigned.len()
        );

        Ok(AssignResponse {
            assigned,
            unassigned,
            summary,
            explanation: EXPLANATION.to_string(),
        })
    }
}

/// min(volunteer's personal radius, global cap, caller cap if given).
fn effective_radius(volunteer: &Volunteer, request_radius: Option<f64>, config_radius: f64) -> f64 {
    let mut limit = volunteer.radius_km.min(config_radius);
    if let Some(cap) = request_radius {
        limit = limit.min(cap);
    }
    limit
}

fn volunteer_summary<'v, I>(volunteers: I, load_map: &HashMap<String, u32>) -> Vec<VolunteerSummary>
where
    I: Iterator<Item = &'v Volunteer>,
{
    volunteers
        .map(|volunteer| VolunteerSummary {
            volunteer_id: volunteer.id.clone(),
            zone: volunteer.zone.clone(),
            assigned: load_map.get(&volunteer.id).copied().unwrap_or(0),
            capacity: volunteer.max_students,
        })
        .collect()
}

/// Deterministic advisory sentence explaining a match. Not used for any
/// further logic.
fn build_rationale(student: &Student, volunteer: &Volunteer, distance: f64, fallback: bool) -> String {
    let prefix = if student.requires_mobility_assistance {
        "Student requires mobility assistance"
    } else {
        "Student has no mobility restriction"
    };
    let core = format!(
        "Approximate distance of {} km to volunteer {}.",
        distance, volunteer.id
    );
    if fallback && student.requires_mobility_assistance {
        return format!(
            "{}; no mobility-assistance volunteer available within radius, selected the nearest instead. {}",
            prefix, core
        );
    }
    if student.requires_mobility_assistance && volunteer.mobility_assistance {
        return format!("{}; volunteer with mobility assistance selected. {}", prefix, core);
    }
    format!("{}. {}", prefix, core)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;
    use crate::zones::ZoneError;
    use tempfile::TempDir;

    // ~1 km of latitude in degrees
    const KM_LAT: f64 = 1.0 / 111.195;

    fn student(id: &str, zone: &str, coords: Coordinates, mobility: bool) -> Student {
        Student {
            id: id.to_string(),
            person_id: format!("P{}", &id[1..]),
            family_id: format!("F{}", &id[1..]),
            zone: zone.to_string(),
            coordinates: coords,
            requires_mobility_assistance: mobility,
            grade: None,
            shift: None,
            tags: vec![],
        }
    }

    fn volunteer(id: &str, zone: &str, coords: Coordinates, capacity: u32) -> Volunteer {
        Volunteer {
            id: id.to_string(),
            name: format!("Volunteer {}", id),
            zone: zone.to_string(),
            coordinates: coords,
            max_students: capacity,
            radius_km: 8.0,
            mobility_assistance: false,
            skills: vec![],
            verified: true,
            tags: vec![],
        }
    }

    fn open_store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        (dir, store)
    }

    const SP: Coordinates = Coordinates {
        latitude: -23.5505,
        longitude: -46.6333,
    };

    fn at_km(km: f64) -> Coordinates {
        Coordinates::new(SP.latitude + km * KM_LAT, SP.longitude)
    }

    #[test]
    fn test_basic_assignment_and_idempotence() {
        let (_dir, store) = open_store();
        store
            .upsert(Collection::Students, student("S0001", "São Paulo", SP, false))
            .unwrap();
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(1.0), 10))
            .unwrap();

        let engine = MatchingEngine::new(&store);
        let first = engine.assign(&AssignRequest::default()).unwrap();
        assert_eq!(first.assigned.len(), 1);
        assert_eq!(first.assigned[0].volunteer_id, "V0001");
        assert!(first.unassigned.is_empty());

        // Second pass with no state change assigns nothing and reports the
        // same capacity figures
        let second = engine.assign(&AssignRequest::default()).unwrap();
        assert!(second.assigned.is_empty());
        assert_eq!(second.summary.len(), 1);
        assert_eq!(second.summary[0].assigned, 1);
        assert_eq!(second.summary[0].capacity, 10);

        let records: Vec<AssignmentRecord> = store.list(Collection::Assignments).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_capacity_skips_full_volunteer() {
        // V1 nearer but full, V2 farther with room -> V2 wins
        // and the student is never reported as no_capacity
        let (_dir, store) = open_store();
        store
            .upsert(Collection::Students, student("S0001", "São Paulo", SP, false))
            .unwrap();
        store
            .upsert(Collection::Students, student("S0002", "São Paulo", SP, false))
            .unwrap();
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(2.1), 1))
            .unwrap();
        store
            .upsert(Collection::Volunteers, volunteer("V0002", "São Paulo", at_km(4.0), 1))
            .unwrap();

        let engine = MatchingEngine::new(&store);
        let response = engine.assign(&AssignRequest::default()).unwrap();

        assert_eq!(response.assigned.len(), 2);
        assert!(response.unassigned.is_empty());
        // S0001 takes the nearer V0001; S0002 sees V0001 full and lands on
        // V0002 at ~4 km
        assert_eq!(response.assigned[0].volunteer_id, "V0001");
        assert_eq!(response.assigned[1].volunteer_id, "V0002");
        let distance = response.assigned[1].distance_km;
        assert!((3.9..=4.1).contains(&distance), "distance: {}", distance);
    }

    #[test]
    fn test_capacity_invariant_holds() {
        let (_dir, store) = open_store();
        for i in 1..=5 {
            store
                .upsert(
                    Collection::Students,
                    student(&format!("S000{}", i), "São Paulo", SP, false),
                )
                .unwrap();
        }
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(1.0), 2))
            .unwrap();

        let engine = MatchingEngine::new(&store);
        let response = engine.assign(&AssignRequest::default()).unwrap();

        assert_eq!(response.assigned.len(), 2);
        assert_eq!(response.unassigned.len(), 3);
        assert!(response
            .unassigned
            .iter()
            .all(|entry| entry.reason == SkipReason::NoCapacity));

        let records: Vec<AssignmentRecord> = store.list(Collection::Assignments).unwrap();
        let load = records.iter().filter(|r| r.volunteer_id == "V0001").count();
        assert!(load <= 2);
    }

    #[test]
    fn test_radius_invariant() {
        let (_dir, store) = open_store();
        store
            .upsert(Collection::Students, student("S0001", "São Paulo", SP, false))
            .unwrap();
        // Personal radius 8 km but 12 km away
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(12.0), 10))
            .unwrap();

        let engine = MatchingEngine::new(&store);
        let response = engine.assign(&AssignRequest::default()).unwrap();
        assert!(response.assigned.is_empty());
        assert_eq!(response.unassigned[0].reason, SkipReason::NoWithinRadius);
    }

    #[test]
    fn test_request_radius_caps_effective_radius() {
        let (_dir, store) = open_store();
        store
            .upsert(Collection::Students, student("S0001", "São Paulo", SP, false))
            .unwrap();
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(3.0), 10))
            .unwrap();

        let engine = MatchingEngine::new(&store);
        let request = AssignRequest {
            zone: None,
            max_radius_km: Some(2.0),
        };
        let response = engine.assign(&request).unwrap();
        assert!(response.assigned.is_empty());
        assert_eq!(response.unassigned[0].reason, SkipReason::NoWithinRadius);

        // Without the caller cap the volunteer is reachable
        let response = engine.assign(&AssignRequest::default()).unwrap();
        assert_eq!(response.assigned.len(), 1);
        assert!(response.assigned[0].distance_km <= 8.0);
    }

    #[test]
    fn test_no_match_when_zone_has_no_volunteers() {
        let (_dir, store) = open_store();
        store
            .upsert(
                Collection::Students,
                student("S0001", "Franca", Coordinates::new(-20.5386, -47.4009), false),
            )
            .unwrap();
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(1.0), 10))
            .unwrap();

        let engine = MatchingEngine::new(&store);
        // No request zone: students span zones, volunteers are restricted to
        // the student's own zone
        let response = engine.assign(&AssignRequest::default()).unwrap();
        assert!(response.assigned.is_empty());
        assert_eq!(response.unassigned[0].reason, SkipReason::NoMatch);
    }

    #[test]
    fn test_accessibility_preference() {
        let (_dir, store) = open_store();
        store
            .upsert(Collection::Students, student("S0001", "São Paulo", SP, true))
            .unwrap();
        // Nearer volunteer without assistance, farther with it
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(1.0), 10))
            .unwrap();
        let mut capable = volunteer("V0002", "São Paulo", at_km(3.0), 10);
        capable.mobility_assistance = true;
        store.upsert(Collection::Volunteers, capable).unwrap();

        let engine = MatchingEngine::new(&store);
        let response = engine.assign(&AssignRequest::default()).unwrap();
        assert_eq!(response.assigned[0].volunteer_id, "V0002");
        assert!(response.assigned[0]
            .rationale
            .contains("volunteer with mobility assistance selected"));
    }

    #[test]
    fn test_accessibility_fallback_flagged_in_rationale() {
        let (_dir, store) = open_store();
        store
            .upsert(Collection::Students, student("S0001", "São Paulo", SP, true))
            .unwrap();
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(1.0), 10))
            .unwrap();

        let engine = MatchingEngine::new(&store);
        let response = engine.assign(&AssignRequest::default()).unwrap();
        assert_eq!(response.assigned.len(), 1);
        assert_eq!(response.assigned[0].volunteer_id, "V0001");
        assert!(response.assigned[0]
            .rationale
            .contains("selected the nearest instead"));
    }

    #[test]
    fn test_tie_break_by_load_then_id() {
        let (_dir, store) = open_store();
        // Two volunteers at the same spot; V0002 already carries one student
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(1.0), 10))
            .unwrap();
        store
            .upsert(Collection::Volunteers, volunteer("V0002", "São Paulo", at_km(1.0), 10))
            .unwrap();
        store
            .upsert(
                Collection::Assignments,
                AssignmentRecord {
                    student_id: "S0099".to_string(),
                    volunteer_id: "V0002".to_string(),
                    zone: "São Paulo".to_string(),
                    distance_km: 1.0,
                    rationale: "existing".to_string(),
                    created_at: timestamp(),
                },
            )
            .unwrap();
        store
            .upsert(Collection::Students, student("S0001", "São Paulo", SP, false))
            .unwrap();

        let engine = MatchingEngine::new(&store);
        let response = engine.assign(&AssignRequest::default()).unwrap();
        // Same distance: least-loaded V0001 wins; with equal load the lexical
        // id would win, which is also V0001
        assert_eq!(response.assigned[0].volunteer_id, "V0001");
    }

    #[test]
    fn test_determinism_across_identical_stores() {
        let build = || {
            let dir = TempDir::new().unwrap();
            let store = RecordStore::open(dir.path()).unwrap();
            for i in 1..=4 {
                store
                    .upsert(
                        Collection::Students,
                        student(&format!("S000{}", i), "São Paulo", at_km(0.1 * i as f64), i % 2 == 0),
                    )
                    .unwrap();
            }
            for i in 1..=3 {
                let mut v = volunteer(&format!("V000{}", i), "São Paulo", at_km(1.0 + i as f64), 2);
                v.mobility_assistance = i == 2;
                store.upsert(Collection::Volunteers, v).unwrap();
            }
            (dir, store)
        };

        let (_d1, store1) = build();
        let (_d2, store2) = build();
        let r1 = MatchingEngine::new(&store1).assign(&AssignRequest::default()).unwrap();
        let r2 = MatchingEngine::new(&store2).assign(&AssignRequest::default()).unwrap();

        let strip = |r: &AssignResponse| {
            (
                r.assigned
                    .iter()
                    .map(|a| (a.student_id.clone(), a.volunteer_id.clone(), a.rationale.clone()))
                    .collect::<Vec<_>>(),
                r.unassigned
                    .iter()
                    .map(|u| (u.student_id.clone(), u.reason))
                    .collect::<Vec<_>>(),
            )
        };
        assert_eq!(strip(&r1), strip(&r2));
    }

    #[test]
    fn test_zone_errors_are_terminal() {
        let (_dir, store) = open_store();
        let engine = MatchingEngine::new(&store);

        let err = engine
            .assign(&AssignRequest {
                zone: Some("Atlantis".to_string()),
                max_radius_km: None,
            })
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZoneError>(),
            Some(ZoneError::Unknown(_))
        ));

        let err = engine
            .assign(&AssignRequest {
                zone: Some("".to_string()),
                max_radius_km: None,
            })
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZoneError>(),
            Some(ZoneError::Missing)
        ));
    }

    #[test]
    fn test_request_zone_filters_candidates() {
        let (_dir, store) = open_store();
        store
            .upsert(Collection::Students, student("S0001", "São Paulo", SP, false))
            .unwrap();
        store
            .upsert(
                Collection::Students,
                student("S0002", "Franca", Coordinates::new(-20.5386, -47.4009), false),
            )
            .unwrap();
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(1.0), 10))
            .unwrap();

        let engine = MatchingEngine::new(&store);
        let response = engine
            .assign(&AssignRequest {
                zone: Some("sao paulo".to_string()),
                max_radius_km: None,
            })
            .unwrap();
        assert_eq!(response.assigned.len(), 1);
        assert_eq!(response.assigned[0].student_id, "S0001");
        // The Franca student is outside the requested zone, not "unassigned"
        assert!(response.unassigned.is_empty());
    }

    #[test]
    fn test_pass_appends_single_audit_event() {
        let (_dir, store) = open_store();
        store
            .upsert(Collection::Students, student("S0001", "São Paulo", SP, false))
            .unwrap();
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(1.0), 10))
            .unwrap();

        MatchingEngine::new(&store)
            .assign(&AssignRequest::default())
            .unwrap();

        let events = store.audit_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "assign");
        assert_eq!(events[0].payload["assigned"][0], "S0001");
    }

    #[test]
    fn test_concurrent_passes_respect_capacity() {
        use std::sync::Arc;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordStore::open(dir.path()).unwrap());
        store
            .upsert(Collection::Students, student("S0001", "São Paulo", SP, false))
            .unwrap();
        store
            .upsert(Collection::Students, student("S0002", "São Paulo", SP, false))
            .unwrap();
        store
            .upsert(Collection::Volunteers, volunteer("V0001", "São Paulo", at_km(1.0), 1))
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                MatchingEngine::new(&store)
                    .assign(&AssignRequest::default())
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let records: Vec<AssignmentRecord> = store.list(Collection::Assignments).unwrap();
        let load = records.iter().filter(|r| r.volunteer_id == "V0001").count();
        assert_eq!(load, 1, "capacity 1 volunteer ended up with {}", load);
    }
}
