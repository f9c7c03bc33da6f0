// Tutor Match - CLI
// seed / assign / sync / status over a local JSON data directory

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use tutor_match::{
    bootstrap_demo, sync_zone, AssignRequest, AssignmentRecord, Collection, MatchingEngine,
    RecordStore, Volunteer,
};

fn data_dir() -> PathBuf {
    env::var("TUTOR_MATCH_DATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"))
}

fn main() -> Result<()> {
    flexi_logger::Logger::try_with_env_or_str("info")
        .context("Failed to configure logging")?
        .start()
        .context("Failed to start logger")?;

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("seed") => run_seed(),
        Some("assign") => run_assign(args.get(2), args.get(3)),
        Some("sync") => run_sync(args.get(2)),
        Some("status") | None => run_status(),
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: tutor-match <command>");
    eprintln!("  seed                         bootstrap the demo cohort");
    eprintln!("  assign [zone] [max_radius]   run a matching pass");
    eprintln!("  sync <zone>                  top a zone up with synthetic students");
    eprintln!("  status                       per-volunteer load table");
    eprintln!("\nData directory comes from TUTOR_MATCH_DATA (default ./data)");
}

fn run_seed() -> Result<()> {
    println!("🌱 Seeding demo cohort...");
    let store = RecordStore::open(data_dir())?;
    let summary = bootstrap_demo(&store)?;
    println!(
        "✓ Seeded {} students and {} volunteers across {} zones",
        summary.students,
        summary.volunteers,
        summary.zones.len()
    );
    Ok(())
}

fn run_assign(zone: Option<&String>, radius: Option<&String>) -> Result<()> {
    let store = RecordStore::open(data_dir())?;
    let max_radius_km = match radius {
        Some(raw) => Some(
            raw.parse::<f64>()
                .with_context(|| format!("Invalid max radius: {}", raw))?,
        ),
        None => None,
    };
    let request = AssignRequest {
        zone: zone.cloned(),
        max_radius_km,
    };

    println!("🎯 Running matching pass...");
    let response = MatchingEngine::new(&store).assign(&request)?;

    println!("✓ Assigned {} students", response.assigned.len());
    for entry in &response.assigned {
        println!(
            "   {} → {} ({} km)",
            entry.student_id, entry.volunteer_id, entry.distance_km
        );
    }
    if !response.unassigned.is_empty() {
        println!("⚠ {} students left unassigned", response.unassigned.len());
        for entry in &response.unassigned {
            println!("   {} ({})", entry.student_id, entry.reason.as_str());
        }
    }
    println!("\n{}", response.explanation);
    Ok(())
}

fn run_sync(zone: Option<&String>) -> Result<()> {
    let zone = match zone {
        Some(zone) => zone,
        None => {
            eprintln!("Usage: tutor-match sync <zone>");
            std::process::exit(1);
        }
    };
    let store = RecordStore::open(data_dir())?;
    println!("🔄 Syncing zone {}...", zone);
    let outcome = sync_zone(&store, zone)?;
    println!(
        "✓ {}: added {} students, touched {} families",
        outcome.zone,
        outcome.added_students.len(),
        outcome.touched_families.len()
    );
    Ok(())
}

fn run_status() -> Result<()> {
    let store = RecordStore::open(data_dir())?;
    let volunteers: Vec<Volunteer> = store.list(Collection::Volunteers)?;
    let assignments: Vec<AssignmentRecord> = store.list(Collection::Assignments)?;

    println!("📊 Volunteer load ({} assignments total)", assignments.len());
    for volunteer in &volunteers {
        let load = assignments
            .iter()
            .filter(|record| record.volunteer_id == volunteer.id)
            .count();
        println!(
            "   {}  {:<20} {}  {}/{}",
            volunteer.id, volunteer.name, volunteer.zone, load, volunteer.max_students
        );
    }
    if volunteers.is_empty() {
        println!("   (no volunteers - run `tutor-match seed` first)");
    }
    Ok(())
}
