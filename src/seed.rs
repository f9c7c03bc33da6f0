// 🌱 Seed - Deterministic bootstrap data
// Base files (zone table, config, empty collections) are created lazily on
// first store access; the demo cohort is opt-in via the CLI.

use crate::models::{AppConfig, Coordinates, Volunteer};
use crate::names::volunteer_name;
use crate::store::{Collection, RecordStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const VOLUNTEERS_PER_ZONE: u32 = 3;

const SKILL_POOL: [&str; 6] = [
    "reforço português",
    "matemática básica",
    "ciências",
    "leitura orientada",
    "artes",
    "tecnologia",
];

/// Registered service zones with their center coordinates.
pub fn default_zones() -> BTreeMap<String, Coordinates> {
    let mut zones = BTreeMap::new();
    zones.insert(
        "São Paulo".to_string(),
        Coordinates::new(-23.5505, -46.6333),
    );
    zones.insert("Franca".to_string(), Coordinates::new(-20.5386, -47.4009));
    zones.insert("Goiânia".to_string(), Coordinates::new(-16.6869, -49.2648));
    zones
}

/// Create any missing base file: zones and config get their defaults, list
/// collections start empty. Existing files are left alone.
pub fn ensure_base_files(data_dir: &Path) -> Result<()> {
    let zones_path = data_dir.join("zones.json");
    if !zones_path.exists() {
        let document = serde_json::json!({ "zones": default_zones() });
        write_pretty(&zones_path, &document)?;
    }

    let config_path = data_dir.join("config.json");
    if !config_path.exists() {
        write_pretty(&config_path, &AppConfig::default())?;
    }

    for collection in Collection::ALL {
        let path = data_dir.join(collection.file_name());
        if path.exists() {
            continue;
        }
        let document = serde_json::json!({ collection.root(): [] });
        write_pretty(&path, &document)?;
    }
    Ok(())
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).with_context(|| format!("Failed to write seed file {:?}", path))
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoSummary {
    pub zones: Vec<String>,
    pub students: usize,
    pub volunteers: usize,
}

/// Populate a deterministic demo cohort: a few volunteers per zone, then a
/// sync pass that tops every zone up to the configured student minimum.
pub fn bootstrap_demo(store: &RecordStore) -> Result<DemoSummary> {
    let zones = store.fetch_zones()?;
    let config = store.fetch_config()?;

    let mut volunteers = 0usize;
    for (zone_index, (zone, center)) in zones.iter().enumerate() {
        for i in 0..VOLUNTEERS_PER_ZONE {
            let id = store.allocate_id(Collection::Volunteers, "V")?;
            let seed = (zone_index as u64) * 100 + u64::from(i);
            let volunteer = Volunteer {
                id,
                name: volunteer_name(seed),
                zone: zone.clone(),
                coordinates: center.jittered(i * 2 + 1),
                max_students: config.max_students_default,
                radius_km: 6.0 + f64::from(i % 3) * 2.0,
                mobility_assistance: i % 3 == 0,
                skills: vec![
                    SKILL_POOL[(seed as usize) % SKILL_POOL.len()].to_string(),
                    SKILL_POOL[(seed as usize + 2) % SKILL_POOL.len()].to_string(),
                ],
                verified: i % 2 == 0,
                tags: vec!["seed".to_string()],
            };
            store.upsert(Collection::Volunteers, volunteer)?;
            volunteers += 1;
        }
    }

    let mut students = 0usize;
    let zone_names: Vec<String> = zones.keys().cloned().collect();
    for zone in &zone_names {
        let outcome = crate::sync::sync_zone(store, zone)?;
        students += outcome.added_students.len();
    }

    Ok(DemoSummary {
        zones: zone_names,
        students,
        volunteers,
    })
}

// ============================================================================
// TESTS
// ============================================================================
