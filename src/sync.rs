// 🔄 Zone Sync - Synthetic population top-up
// Fabricates guardian/student/family graph data until a zone holds at least
// `min_students_per_zone_after_sync` students, and refreshes the external
// service footprint of every family already in the zone. All data is
// deterministic and synthetic; no real records are involved.

use crate::idgen::next_id;
use crate::models::{
    Coordinates, Family, HouseholdMember, HouseholdRole, Person, RelationshipEdge,
    RelationshipKind, ServiceStatus, Student, VulnerabilityFlags,
};
use crate::names::{guardian_name, student_name};
use crate::store::{timestamp, Collection, RecordStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

const GRADE_CYCLE: [&str; 5] = ["5º ano", "6º ano", "7º ano", "8º ano", "9º ano"];

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub zone: String,
    pub added_students: Vec<Student>,
    pub touched_families: Vec<String>,
    pub explanation: String,
}

/// Reserve the next id for a prefix against an in-memory known-id set, so a
/// single pass never hands out the same id twice.
fn reserve_id(prefix: &str, known: &mut HashSet<String>) -> String {
    let id = next_id(prefix, known.iter().map(String::as_str));
    known.insert(id.clone());
    id
}

/// Deterministic per-family seed for service/eligibility fabrication.
fn family_seed(family_id: &str, zone: &str) -> u64 {
    format!("{}{}", family_id, zone)
        .bytes()
        .map(u64::from)
        .sum()
}

struct ServicePackage {
    eligibility: Vec<String>,
    notes: String,
    entries: Vec<(String, HashMap<String, serde_json::Value>)>,
}

fn compose_service_package(family_id: &str, zone: &str, now: &str) -> ServicePackage {
    let seed = family_seed(family_id, zone);
    let sus_registered = seed % 3 != 0;
    let cad_registered = seed % 2 == 0;
    let bolsa_beneficiary = seed % 5 == 0;

    let mut eligibility = vec!["low_income".to_string()];
    if seed % 5 == 0 {
        eligibility.push("elderly_guardian".to_string());
    }
    if seed % 3 == 0 {
        eligibility.push("single_parent_family".to_string());
    }
    if seed % 7 == 0 {
        eligibility.push("mobility_need".to_string());
    }
    eligibility.sort();

    let mut entries = Vec::new();
    let mut sus = HashMap::new();
    sus.insert("registered".to_string(), serde_json::json!(sus_registered));
    sus.insert("unit".to_string(), serde_json::json!(format!("UBS {} Central", zone)));
    sus.insert("last_update".to_string(), serde_json::json!(now));
    entries.push(("sus".to_string(), sus));

    let mut cad = HashMap::new();
    cad.insert("registered".to_string(), serde_json::json!(cad_registered));
    if cad_registered {
        cad.insert("nis".to_string(), serde_json::json!(format!("{:011}", seed)));
    }
    cad.insert("last_update".to_string(), serde_json::json!(now));
    entries.push(("cad_unico".to_string(), cad));

    let mut bolsa = HashMap::new();
    bolsa.insert("beneficiary".to_string(), serde_json::json!(bolsa_beneficiary));
    bolsa.insert(
        "status".to_string(),
        serde_json::json!(if bolsa_beneficiary { "active" } else { "under_review" }),
    );
    bolsa.insert("last_update".to_string(), serde_json::json!(now));
    entries.push(("bolsa_familia".to_string(), bolsa));

    ServicePackage {
        eligibility,
        notes: format!("Synthetic family profile enriched for {}.", zone),
        entries,
    }
}

fn build_person(
    person_id: String,
    full_name: String,
    preferred: String,
    gender: &'static str,
    zone: &str,
    is_guardian: bool,
    index: u32,
    center: Coordinates,
) -> Person {
    Person {
        id: person_id,
        name: full_name,
        preferred_name: Some(preferred),
        birthdate: if is_guardian { "1965-05-10" } else { "2012-08-15" }.to_string(),
        gender: Some(gender.to_string()),
        zone: zone.to_string(),
        coordinates: center.jittered(index),
        vulnerability: VulnerabilityFlags {
            elderly: is_guardian && index % 4 == 0,
            single_parent: is_guardian && index % 3 == 0,
            low_income: true,
        },
        tags: vec![
            if is_guardian { "guardian" } else { "student" }.to_string(),
            "sync".to_string(),
        ],
    }
}

fn build_student(
    student_id: String,
    person_id: String,
    family_id: String,
    zone: &str,
    index: u32,
    center: Coordinates,
) -> Student {
    let grade = GRADE_CYCLE[(index as usize) % GRADE_CYCLE.len()];
    Student {
        id: student_id,
        person_id,
        family_id,
        zone: zone.to_string(),
        coordinates: center.jittered(index + 1),
        requires_mobility_assistance: index % 4 == 0,
        grade: Some(grade.to_string()),
        shift: Some(if index % 2 == 0 { "morning" } else { "afternoon" }.to_string()),
        tags: vec!["sync".to_string(), zone.to_lowercase()],
    }
}

/// Upsert the cached service-status rows for one family, reusing existing
/// row ids where a (family, source) entry already exists.
fn upsert_service_cache(
    store: &RecordStore,
    family_id: &str,
    now: &str,
    entries: Vec<(String, HashMap<String, serde_json::Value>)>,
    service_index: &mut HashMap<(String, String), String>,
    service_ids: &mut HashSet<String>,
) -> Result<()> {
    for (source, payload) in entries {
        let key = (family_id.to_string(), source.clone());
        let id = match service_index.get(&key) {
            Some(existing) => existing.clone(),
            None => reserve_id("SV", service_ids),
        };
        let record = ServiceStatus {
            id: id.clone(),
            family_id: family_id.to_string(),
            source,
            payload,
            fetched_at: now.to_string(),
        };
        store.upsert(Collection::Services, record)?;
        service_index.insert(key, id);
    }
    Ok(())
}

/// Top a zone up to the configured minimum student population.
///
/// Runs as one serialized pass: ids are reserved against an in-memory
/// snapshot, which stays valid because the pass lock keeps concurrent
/// writers out.
pub fn sync_zone(store: &RecordStore, zone: &str) -> Result<SyncOutcome> {
    let _pass = store.pass_lock();

    let canonical = store.resolve_zone(zone)?;
    let zones = store.fetch_zones()?;
    let center = *zones
        .get(&canonical)
        .with_context(|| format!("zone {} missing center coordinate", canonical))?;
    let config = store.fetch_config()?;
    let now = timestamp();

    let persons: Vec<Person> = store.list(Collection::Persons)?;
    let families: Vec<Family> = store.list(Collection::Families)?;
    let relationships: Vec<RelationshipEdge> = store.list(Collection::Relationships)?;
    let services: Vec<ServiceStatus> = store.list(Collection::Services)?;
    let all_students: Vec<Student> = store.list(Collection::Students)?;

    let mut person_ids: HashSet<String> = persons.iter().map(|p| p.id.clone()).collect();
    let mut family_ids: HashSet<String> = families.iter().map(|f| f.id.clone()).collect();
    let mut student_ids: HashSet<String> = all_students.iter().map(|s| s.id.clone()).collect();
    let mut relation_ids: HashSet<String> =
        relationships.iter().map(|e| e.id.clone()).collect();
    let mut relation_index: HashSet<(String, String)> = relationships
        .iter()
        .filter(|e| e.kind == RelationshipKind::GuardianOf)
        .map(|e| (e.from_person_id.clone(), e.to_person_id.clone()))
        .collect();
    let mut service_ids: HashSet<String> = services.iter().map(|s| s.id.clone()).collect();
    let mut service_index: HashMap<(String, String), String> = services
        .iter()
        .map(|s| ((s.family_id.clone(), s.source.clone()), s.id.clone()))
        .collect();

    let existing_count = all_students.iter().filter(|s| s.zone == canonical).count();
    let needed = (config.min_students_per_zone_after_sync as usize).saturating_sub(existing_count);

    let mut added_students: Vec<Student> = Vec::new();
    let mut touched_families: HashSet<String> = HashSet::new();

    for offset in 0..needed {
        let index = (existing_count + offset) as u32;
        let seed = u64::from(index) + 1;

        let guardian_id = reserve_id("P", &mut person_ids);
        let (g_full, g_preferred, g_gender) = guardian_name(seed);
        let guardian = build_person(
            guardian_id.clone(),
            g_full,
            g_preferred,
            g_gender.as_str(),
            &canonical,
            true,
            index,
            center,
        );
        store.upsert(Collection::Persons, guardian)?;

        let student_person_id = reserve_id("P", &mut person_ids);
        let (s_full, s_preferred, s_gender) = student_name(seed);
        let student_person = build_person(
            student_person_id.clone(),
            s_full,
            s_preferred,
            s_gender.as_str(),
            &canonical,
            false,
            index,
            center,
        );
        store.upsert(Collection::Persons, student_person)?;

        let family_id = reserve_id("F", &mut family_ids);
        let package = compose_service_package(&family_id, &canonical, &now);
        let family = Family {
            id: family_id.clone(),
            household: vec![
                HouseholdMember {
                    person_id: guardian_id.clone(),
                    role: HouseholdRole::Guardian,
                },
                HouseholdMember {
                    person_id: student_person_id.clone(),
                    role: HouseholdRole::Student,
                },
            ],
            eligibility_signals: package.eligibility,
            consent_granted: true,
            consent_updated_at: Some(now.clone()),
            notes: Some(package.notes),
        };
        store.upsert(Collection::Families, family)?;
        touched_families.insert(family_id.clone());
        upsert_service_cache(
            store,
            &family_id,
            &now,
            package.entries,
            &mut service_index,
            &mut service_ids,
        )?;

        let student_id = reserve_id("S", &mut student_ids);
        let student = build_student(
            student_id,
            student_person_id.clone(),
            family_id,
            &canonical,
            index,
            center,
        );
        store.upsert(Collection::Students, student.clone())?;
        added_students.push(student);

        if !relation_index.contains(&(guardian_id.clone(), student_person_id.clone())) {
            let edge_id = reserve_id("E", &mut relation_ids);
            let edge = RelationshipEdge {
                id: edge_id,
                from_person_id: guardian_id.clone(),
                to_person_id: student_person_id.clone(),
                kind: RelationshipKind::GuardianOf,
                weight: 1.0,
            };
            store.upsert(Collection::Relationships, edge)?;
            relation_index.insert((guardian_id, student_person_id));
        }
    }

    // Refresh the family profile of every student now in the zone
    let zone_students: Vec<Student> = store
        .list::<Student>(Collection::Students)?
        .into_iter()
        .filter(|s| s.zone == canonical)
        .collect();
    for student in &zone_students {
        let package = compose_service_package(&student.family_id, &canonical, &now);
        let family = match store.get::<Family>(Collection::Families, &student.family_id)? {
            Some(mut existing) => {
                existing.eligibility_signals = package.eligibility;
                existing.consent_granted = true;
                existing.consent_updated_at = Some(now.clone());
                existing.notes = Some(package.notes);
                existing
            }
            // A student referencing a missing family gets a minimal one
            None => Family {
                id: student.family_id.clone(),
                household: vec![HouseholdMember {
                    person_id: student.person_id.clone(),
                    role: HouseholdRole::Student,
                }],
                eligibility_signals: package.eligibility,
                consent_granted: true,
                consent_updated_at: Some(now.clone()),
                notes: Some(package.notes),
            },
        };
        store.upsert(Collection::Families, family)?;
        touched_families.insert(student.family_id.clone());
        upsert_service_cache(
            store,
            &student.family_id,
            &now,
            package.entries,
            &mut service_index,
            &mut service_ids,
        )?;
    }

    let mut touched: Vec<String> = touched_families.into_iter().collect();
    touched.sort();

    store.append_audit(
        "sync_students",
        serde_json::json!({
            "zone": &canonical,
            "added": added_students.iter().map(|s| s.id.clone()).collect::<Vec<_>>(),
            "families": &touched,
        }),
    )?;
    log::info!(
        "sync pass: zone={} added={} families={}",
        canonical,
        added_students.len(),
        touched.len()
    );

    Ok(SyncOutcome {
        zone: canonical,
        added_students,
        touched_families: touched,
        explanation: "Synthetic data generated and family profiles enriched with mock program \
                      footprints. No real data involved."
            .to_string(),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::ZoneError;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_sync_tops_zone_up_to_minimum() {
        let (_dir, store) = open_store();
        let outcome = sync_zone(&store, "franca").unwrap();

        assert_eq!(outcome.zone, "Franca");
        assert_eq!(outcome.added_students.len(), 5); // default minimum
        assert_eq!(outcome.touched_families.len(), 5);

        let students: Vec<Student> = store.list(Collection::Students).unwrap();
        assert_eq!(students.len(), 5);
        assert!(students.iter().all(|s| s.zone == "Franca"));

        // Guardian + student person per added student
        let persons: Vec<Person> = store.list(Collection::Persons).unwrap();
        assert_eq!(persons.len(), 10);

        let edges: Vec<RelationshipEdge> = store.list(Collection::Relationships).unwrap();
        assert_eq!(edges.len(), 5);
        assert!(edges.iter().all(|e| e.kind == RelationshipKind::GuardianOf));

        // Three cached service rows per family
        let services: Vec<ServiceStatus> = store.list(Collection::Services).unwrap();
        assert_eq!(services.len(), 15);
    }

    #[test]
    fn test_sync_is_idempotent_on_population() {
        let (_dir, store) = open_store();
        sync_zone(&store, "Franca").unwrap();
        let second = sync_zone(&store, "Franca").unwrap();

        assert!(second.added_students.is_empty());
        let students: Vec<Student> = store.list(Collection::Students).unwrap();
        assert_eq!(students.len(), 5);
        // Families are still refreshed, not duplicated
        let families: Vec<Family> = store.list(Collection::Families).unwrap();
        assert_eq!(families.len(), 5);
        assert_eq!(second.touched_families.len(), 5);
    }

    #[test]
    fn test_sync_rejects_unknown_zone() {
        let (_dir, store) = open_store();
        let err = sync_zone(&store, "Atlantis").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZoneError>(),
            Some(ZoneError::Unknown(_))
        ));
    }

    #[test]
    fn test_sync_appends_audit_event() {
        let (_dir, store) = open_store();
        sync_zone(&store, "Goiânia").unwrap();
        let events = store.audit_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "sync_students");
        assert_eq!(events[0].payload["zone"], "Goiânia");
    }

    #[test]
    fn test_synthetic_students_sit_near_zone_center() {
        let (_dir, store) = open_store();
        let outcome = sync_zone(&store, "Franca").unwrap();
        let center = store.fetch_zones().unwrap()["Franca"];
        for student in &outcome.added_students {
            let d = crate::geo::haversine_km(
                center.latitude,
                center.longitude,
                student.coordinates.latitude,
                student.coordinates.longitude,
            );
            assert!(d < 1.0, "student {} is {} km from center", student.id, d);
        }
    }

    #[test]
    fn test_families_have_consent_and_eligibility() {
        let (_dir, store) = open_store();
        sync_zone(&store, "Franca").unwrap();
        let families: Vec<Family> = store.list(Collection::Families).unwrap();
        for family in families {
            assert!(family.consent_granted);
            assert!(family.consent_updated_at.is_some());
            assert!(family
                .eligibility_signals
                .contains(&"low_income".to_string()));
        }
    }
}
