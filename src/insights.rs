// 💡 Insights - Advisory text for coordinators
// Text generation is a narrow pluggable capability with a deterministic
// local implementation; core matching never depends on it.

use crate::models::{Family, ServiceStatus, Student};
use crate::store::{timestamp, Collection, RecordStore};
use anyhow::Result;
use serde::Serialize;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightError {
    StudentNotFound(String),
    FamilyNotFound(String),
}

impl std::fmt::Display for InsightError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsightError::StudentNotFound(id) => write!(f, "student not found: {}", id),
            InsightError::FamilyNotFound(id) => write!(f, "family not found: {}", id),
        }
    }
}

impl std::error::Error for InsightError {}

// ============================================================================
// TEXT GENERATION
// ============================================================================

/// Pluggable text-generation capability. Implementations may call out to an
/// external model; the crate ships only the deterministic local one.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Deterministic generator: echoes the prompt's lead sentence and closes
/// with one open question to the family, the house style for insights.
pub struct MockGenerator;

impl TextGenerator for MockGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let lead = match prompt.find('.') {
            Some(pos) => &prompt[..=pos],
            None => prompt,
        };
        Ok(format!(
            "{} What support does the family consider most feasible in the coming weeks?",
            lead.trim()
        ))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ============================================================================
// INSIGHT SERVICES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub subject_id: String,
    pub insight: String,
    pub source: String,
    pub generated_at: String,
}

/// Human-readable summary of a family's cached service footprint, plus a
/// suggested focus area.
fn service_summary(services: &[ServiceStatus]) -> (String, &'static str) {
    let mut items: Vec<String> = Vec::new();
    for entry in services {
        let active = entry
            .payload
            .get("registered")
            .or_else(|| entry.payload.get("beneficiary"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if active {
            items.push(match entry.source.as_str() {
                "sus" => "SUS active".to_string(),
                "cad_unico" => "CadÚnico up to date".to_string(),
                "bolsa_familia" => "Bolsa Família in use".to_string(),
                other => format!("{} active", other),
            });
        }
    }
    items.sort();
    let highlight = if items.iter().any(|item| item.contains("transport")) {
        "organize transportation"
    } else {
        "strengthen the school routine"
    };
    let summary = if items.is_empty() {
        "no active services on record".to_string()
    } else {
        items.join(", ")
    };
    (summary, highlight)
}

fn family_services(store: &RecordStore, family_id: &str) -> Result<Vec<ServiceStatus>> {
    Ok(store
        .list::<ServiceStatus>(Collection::Services)?
        .into_iter()
        .filter(|s| s.family_id == family_id)
        .collect())
}

fn run_generator(generator: &dyn TextGenerator, prompt: &str, fallback: &str) -> (String, String) {
    match generator.generate(prompt) {
        Ok(text) => (text, generator.name().to_string()),
        Err(err) => {
            log::warn!("text generator failed, using fallback: {:#}", err);
            (fallback.to_string(), "fallback".to_string())
        }
    }
}

/// Advisory insight for one student. Never diagnoses; always ends with an
/// open question to the family.
pub fn student_insight(
    store: &RecordStore,
    generator: &dyn TextGenerator,
    student_id: &str,
) -> Result<Insight> {
    let student: Student = store
        .get(Collection::Students, student_id)?
        .ok_or_else(|| InsightError::StudentNotFound(student_id.to_string()))?;
    let services = family_services(store, &student.family_id)?;
    let (summary, highlight) = service_summary(&services);

    let lead = format!(
        "In {}, student {} may benefit from extra support to {}.",
        student.zone, student.id, highlight
    );
    let prompt = format!(
        "{} Family services: {}. Suggest support around transportation, meals, school \
         materials and tutoring, without assigning blame, and invite the family to talk.",
        lead, summary
    );
    let fallback = format!(
        "{} Which initiatives does the family consider viable in the coming weeks?",
        lead
    );
    let (text, source) = run_generator(generator, &prompt, &fallback);

    store.append_audit(
        "insight_student",
        serde_json::json!({"student_id": student.id, "source": &source}),
    )?;

    Ok(Insight {
        subject_id: student.id,
        insight: text,
        source,
        generated_at: timestamp(),
    })
}

/// Advisory insight for one family.
pub fn family_insight(
    store: &RecordStore,
    generator: &dyn TextGenerator,
    family_id: &str,
) -> Result<Insight> {
    let family: Family = store
        .get(Collection::Families, family_id)?
        .ok_or_else(|| InsightError::FamilyNotFound(family_id.to_string()))?;
    let services = family_services(store, &family.id)?;
    let (summary, _) = service_summary(&services);
    let focus = if summary.contains("transport") {
        "strengthen transportation and school materials"
    } else {
        "broaden local support networks"
    };

    let lead = format!("Family {} shows potential to {}.", family.id, focus);
    let prompt = format!(
        "{} Eligibility signals: {}. Active services: {}. Suggest support paths across \
         transportation, school materials, meals and community networks.",
        lead,
        family.eligibility_signals.join(", "),
        summary
    );
    let fallback = format!(
        "{} What support does the family see as most urgent right now?",
        lead
    );
    let (text, source) = run_generator(generator, &prompt, &fallback);

    store.append_audit(
        "insight_family",
        serde_json::json!({"family_id": family.id, "source": &source}),
    )?;

    Ok(Insight {
        subject_id: family.id,
        insight: text,
        source,
        generated_at: timestamp(),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FailingGenerator;

    impl TextGenerator for FailingGenerator {
        fn generate(&self, _prompt: &str) -> Result<String> {
            anyhow::bail!("backend unavailable")
        }
    }

    fn seeded_store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        crate::sync::sync_zone(&store, "Franca").unwrap();
        (dir, store)
    }

    #[test]
    fn test_student_insight_is_deterministic() {
        let (_dir, store) = seeded_store();
        let a = student_insight(&store, &MockGenerator, "S0001").unwrap();
        let b = student_insight(&store, &MockGenerator, "S0001").unwrap();
        assert_eq!(a.insight, b.insight);
        assert_eq!(a.source, "mock");
        assert!(a.insight.contains("S0001"));
        assert!(a.insight.ends_with('?'));
    }

    #[test]
    fn test_generator_failure_falls_back() {
        let (_dir, store) = seeded_store();
        let insight = student_insight(&store, &FailingGenerator, "S0001").unwrap();
        assert_eq!(insight.source, "fallback");
        assert!(insight.insight.contains("S0001"));
    }

    #[test]
    fn test_unknown_student_is_an_error() {
        let (_dir, store) = seeded_store();
        let err = student_insight(&store, &MockGenerator, "S9999").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InsightError>(),
            Some(InsightError::StudentNotFound(_))
        ));
    }

    #[test]
    fn test_family_insight_and_audit_trail() {
        let (_dir, store) = seeded_store();
        let insight = family_insight(&store, &MockGenerator, "F0001").unwrap();
        assert_eq!(insight.subject_id, "F0001");

        let events = store.audit_events().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.action, "insight_family");
        assert_eq!(last.payload["source"], "mock");
    }

    #[test]
    fn test_mock_generator_takes_lead_sentence() {
        let text = MockGenerator
            .generate("First sentence. Ignore the rest of the prompt.")
            .unwrap();
        assert!(text.starts_with("First sentence."));
        assert!(!text.contains("Ignore"));
    }
}
