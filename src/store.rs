// 🗄️ Record Store - JSON-file keyed collections with per-collection locking
// Whole-collection rewrite under a lock: collections are small (thousands of
// records), so full-file serialization is simpler and safer than incremental
// diffing and gives a total order for auditing.

use crate::idgen::next_id;
use crate::models::{AppConfig, Coordinates};
use crate::zones::{ZoneDirectory, ZoneError};
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// ERRORS
// ============================================================================

/// Fatal store failures. A corrupt backing file is never retried or
/// partially recovered.
#[derive(Debug)]
pub enum StoreError {
    Corrupt { path: PathBuf, detail: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Corrupt { path, detail } => {
                write!(f, "corrupt store file {:?}: {}", path, detail)
            }
        }
    }
}

impl std::error::Error for StoreError {}

// ============================================================================
// COLLECTIONS
// ============================================================================

/// Keyed record type stored in a list collection.
pub trait Record: Serialize + DeserializeOwned {
    fn key(&self) -> &str;
}

macro_rules! record_by_id {
    ($($ty:ty),+) => {
        $(impl Record for $ty {
            fn key(&self) -> &str {
                &self.id
            }
        })+
    };
}

record_by_id!(
    crate::models::Person,
    crate::models::Student,
    crate::models::Volunteer,
    crate::models::Family,
    crate::models::RelationshipEdge,
    crate::models::ServiceStatus
);

impl Record for crate::models::AssignmentRecord {
    fn key(&self) -> &str {
        &self.student_id
    }
}

/// Named list collections backed by one JSON file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Persons,
    Students,
    Volunteers,
    Families,
    Assignments,
    Relationships,
    Services,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Persons,
        Collection::Students,
        Collection::Volunteers,
        Collection::Families,
        Collection::Assignments,
        Collection::Relationships,
        Collection::Services,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Persons => "persons",
            Collection::Students => "students",
            Collection::Volunteers => "volunteers",
            Collection::Families => "families",
            Collection::Assignments => "assignments",
            Collection::Relationships => "relationships",
            Collection::Services => "services",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Persons => "persons.json",
            Collection::Students => "students.json",
            Collection::Volunteers => "volunteers.json",
            Collection::Families => "families.json",
            Collection::Assignments => "assignments.json",
            Collection::Relationships => "relationships.json",
            Collection::Services => "services_cache.json",
        }
    }

    /// Root key of the JSON document ({"students": [...]}).
    pub fn root(&self) -> &'static str {
        match self {
            Collection::Relationships => "edges",
            other => other.name(),
        }
    }

    /// Field that uniquely keys records in this collection.
    pub fn key_field(&self) -> &'static str {
        match self {
            Collection::Assignments => "student_id",
            _ => "id",
        }
    }
}

// ============================================================================
// AUDIT
// ============================================================================

/// Append-only journal entry, one JSON line per event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub action: String,
    pub payload: serde_json::Value,
}

const AUDIT_FILE: &str = "audit_log.jsonl";
const ZONES_FILE: &str = "zones.json";
const CONFIG_FILE: &str = "config.json";

/// UTC timestamp at second resolution, the format persisted everywhere.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// File-backed record store with one mutual-exclusion lock per collection.
///
/// Every read-modify-write sequence for a collection holds that collection's
/// lock for the whole sequence. Full matching and sync passes additionally
/// serialize through `pass_lock`, which is what keeps the volunteer capacity
/// invariant under concurrent callers.
pub struct RecordStore {
    data_dir: PathBuf,
    locks: HashMap<Collection, Mutex<()>>,
    zones_lock: Mutex<()>,
    config_lock: Mutex<()>,
    audit_lock: Mutex<()>,
    pass_lock: Mutex<()>,
}

impl RecordStore {
    /// Open a store rooted at `data_dir`, creating missing files on first
    /// access (zones and config get their defaults, collections start empty).
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data dir {:?}", data_dir))?;

        crate::seed::ensure_base_files(&data_dir)?;

        let audit_path = data_dir.join(AUDIT_FILE);
        if !audit_path.exists() {
            fs::write(&audit_path, "")
                .with_context(|| format!("Failed to create audit log {:?}", audit_path))?;
        }

        let locks = Collection::ALL
            .iter()
            .map(|collection| (*collection, Mutex::new(())))
            .collect();

        Ok(RecordStore {
            data_dir,
            locks,
            zones_lock: Mutex::new(()),
            config_lock: Mutex::new(()),
            audit_lock: Mutex::new(()),
            pass_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Serializes full matching/sync passes. Hold the guard for the whole
    /// pass so a concurrent pass cannot race the capacity bookkeeping.
    pub fn pass_lock(&self) -> MutexGuard<'_, ()> {
        self.pass_lock.lock().unwrap()
    }

    fn collection_path(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(collection.file_name())
    }

    fn lock(&self, collection: Collection) -> MutexGuard<'_, ()> {
        self.locks[&collection].lock().unwrap()
    }

    // ------------------------------------------------------------------
    // Raw document I/O (callers hold the collection lock)
    // ------------------------------------------------------------------

    fn read_rows(&self, collection: Collection) -> Result<Vec<serde_json::Value>> {
        let path = self.collection_path(collection);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read collection file {:?}", path))?;
        let document: serde_json::Value =
            serde_json::from_str(&content).map_err(|err| StoreError::Corrupt {
                path: path.clone(),
                detail: err.to_string(),
            })?;
        match document.get(collection.root()) {
            Some(serde_json::Value::Array(rows)) => Ok(rows.clone()),
            _ => Err(StoreError::Corrupt {
                path,
                detail: format!("missing root array \"{}\"", collection.root()),
            }
            .into()),
        }
    }

    fn write_rows(&self, collection: Collection, rows: Vec<serde_json::Value>) -> Result<()> {
        let document = serde_json::json!({ collection.root(): rows });
        let path = self.collection_path(collection);
        write_atomic(&path, &serde_json::to_string_pretty(&document)?)
    }

    // ------------------------------------------------------------------
    // List collections
    // ------------------------------------------------------------------

    /// Full snapshot of a collection in ascending key order.
    pub fn list<T: Record>(&self, collection: Collection) -> Result<Vec<T>> {
        let _guard = self.lock(collection);
        let rows = self.read_rows(collection)?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record: T = serde_json::from_value(row).map_err(|err| StoreError::Corrupt {
                path: self.collection_path(collection),
                detail: err.to_string(),
            })?;
            records.push(record);
        }
        records.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(records)
    }

    /// Single record by key, if present.
    pub fn get<T: Record>(&self, collection: Collection, key: &str) -> Result<Option<T>> {
        Ok(self
            .list::<T>(collection)?
            .into_iter()
            .find(|record| record.key() == key))
    }

    /// Replace the record with a matching key or append it, then rewrite the
    /// collection sorted by key. The whole read-modify-write cycle holds the
    /// collection lock.
    pub fn upsert<T: Record>(&self, collection: Collection, record: T) -> Result<()> {
        let _guard = self.lock(collection);
        let rows = self.read_rows(collection)?;
        let mut records: Vec<T> = Vec::with_capacity(rows.len() + 1);
        for row in rows {
            let existing: T = serde_json::from_value(row).map_err(|err| StoreError::Corrupt {
                path: self.collection_path(collection),
                detail: err.to_string(),
            })?;
            records.push(existing);
        }
        match records.iter_mut().find(|r| r.key() == record.key()) {
            Some(slot) => *slot = record,
            None => records.push(record),
        }
        records.sort_by(|a, b| a.key().cmp(b.key()));
        log::debug!(
            "upsert into {}: {} records",
            collection.name(),
            records.len()
        );
        let rows = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.write_rows(collection, rows)
    }

    /// Filter out records whose key field matches and rewrite the collection.
    pub fn remove(&self, collection: Collection, key: &str) -> Result<()> {
        let _guard = self.lock(collection);
        let rows = self.read_rows(collection)?;
        let key_field = collection.key_field();
        let kept: Vec<serde_json::Value> = rows
            .into_iter()
            .filter(|row| row.get(key_field).and_then(|v| v.as_str()) != Some(key))
            .collect();
        log::debug!("remove {} from {}", key, collection.name());
        self.write_rows(collection, kept)
    }

    /// Next unused identifier for a prefix, computed against the current
    /// collection snapshot under its lock. Callers that allocate and insert
    /// in bulk serialize through `pass_lock` so the snapshot stays valid.
    pub fn allocate_id(&self, collection: Collection, prefix: &str) -> Result<String> {
        let _guard = self.lock(collection);
        let rows = self.read_rows(collection)?;
        let key_field = collection.key_field();
        let existing: Vec<&str> = rows
            .iter()
            .filter_map(|row| row.get(key_field).and_then(|v| v.as_str()))
            .collect();
        Ok(next_id(prefix, existing))
    }

    // ------------------------------------------------------------------
    // Dictionary collections
    // ------------------------------------------------------------------

    /// Registered zone table: canonical name -> center coordinate.
    pub fn fetch_zones(&self) -> Result<BTreeMap<String, Coordinates>> {
        let path = self.data_dir.join(ZONES_FILE);
        let content = {
            let _guard = self.zones_lock.lock().unwrap();
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read zones file {:?}", path))?
        };
        #[derive(Deserialize)]
        struct ZonesDocument {
            zones: BTreeMap<String, Coordinates>,
        }
        let document: ZonesDocument =
            serde_json::from_str(&content).map_err(|err| StoreError::Corrupt {
                path,
                detail: err.to_string(),
            })?;
        Ok(document.zones)
    }

    pub fn zone_directory(&self) -> Result<ZoneDirectory> {
        Ok(ZoneDirectory::new(self.fetch_zones()?))
    }

    /// Canonical zone name for user-supplied input. The underlying error is
    /// a `ZoneError` and stays downcastable for boundary handling.
    pub fn resolve_zone(&self, raw: &str) -> Result<String> {
        let directory = self.zone_directory()?;
        directory.resolve(raw).map_err(anyhow::Error::from)
    }

    pub fn fetch_config(&self) -> Result<AppConfig> {
        let path = self.data_dir.join(CONFIG_FILE);
        let content = {
            let _guard = self.config_lock.lock().unwrap();
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {:?}", path))?
        };
        serde_json::from_str(&content)
            .map_err(|err| {
                StoreError::Corrupt {
                    path,
                    detail: err.to_string(),
                }
                .into()
            })
    }

    // ------------------------------------------------------------------
    // Audit log
    // ------------------------------------------------------------------

    /// Append one `{timestamp, action, payload}` line. Prior lines are never
    /// rewritten.
    pub fn append_audit(&self, action: &str, payload: serde_json::Value) -> Result<()> {
        let event = AuditEvent {
            timestamp: timestamp(),
            action: action.to_string(),
            payload,
        };
        let line = serde_json::to_string(&event)?;
        let path = self.data_dir.join(AUDIT_FILE);
        let _guard = self.audit_lock.lock().unwrap();
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit log {:?}", path))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to append to audit log {:?}", path))?;
        Ok(())
    }

    /// All audit events in append order.
    pub fn audit_events(&self) -> Result<Vec<AuditEvent>> {
        let path = self.data_dir.join(AUDIT_FILE);
        let content = {
            let _guard = self.audit_lock.lock().unwrap();
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read audit log {:?}", path))?
        };
        let mut events = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            let event: AuditEvent =
                serde_json::from_str(line).map_err(|err| StoreError::Corrupt {
                    path: path.clone(),
                    detail: err.to_string(),
                })?;
            events.push(event);
        }
        Ok(events)
    }
}

/// Write via temp file + rename so a crashed writer never leaves a
/// half-written collection behind.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).with_context(|| format!("Failed to write {:?}", tmp))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {:?} atomically", path))?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
