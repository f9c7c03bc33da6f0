// Tutor Match - Web Server
// REST API over the record store with Axum

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tutor_match::{
    bootstrap_demo, family_insight, student_insight, sync_zone, AssignRequest, AssignmentRecord,
    Collection, InsightError, MatchingEngine, MockGenerator, RecordStore, Student, TextGenerator,
    Volunteer, ZoneError,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<RecordStore>,
    generator: Arc<dyn TextGenerator>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

/// Standard error body: {error, status_code, detail}
fn error_response(status: StatusCode, error: &str, detail: String) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "status_code": status.as_u16(),
            "detail": detail,
        })),
    )
        .into_response()
}

/// Map domain errors onto HTTP statuses; everything else is a 500.
fn map_error(err: anyhow::Error) -> axum::response::Response {
    if let Some(zone_err) = err.downcast_ref::<ZoneError>() {
        let code = match zone_err {
            ZoneError::Missing => "zone_required",
            ZoneError::Unknown(_) => "unknown_zone",
        };
        return error_response(StatusCode::BAD_REQUEST, code, zone_err.to_string());
    }
    if let Some(insight_err) = err.downcast_ref::<InsightError>() {
        return error_response(StatusCode::NOT_FOUND, "not_found", insight_err.to_string());
    }
    eprintln!("Internal error: {:#}", err);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "unexpected failure".to_string(),
    )
}

#[derive(Deserialize)]
struct InsightStudentRequest {
    student_id: String,
}

#[derive(Deserialize)]
struct InsightFamilyRequest {
    family_id: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// Resolve an optional ?zone= filter to its canonical form.
fn zone_filter(
    store: &RecordStore,
    params: &HashMap<String, String>,
) -> Result<Option<String>, anyhow::Error> {
    match params.get("zone") {
        Some(raw) => Ok(Some(store.resolve_zone(raw)?)),
        None => Ok(None),
    }
}

/// GET /api/students - List students, optionally filtered by zone
async fn get_students(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let result = zone_filter(&state.store, &params).and_then(|zone| {
        let students: Vec<Student> = state.store.list(Collection::Students)?;
        Ok(match zone {
            Some(zone) => students.into_iter().filter(|s| s.zone == zone).collect(),
            None => students,
        })
    });
    match result {
        Ok(students) => (StatusCode::OK, Json(ApiResponse::ok(students))).into_response(),
        Err(err) => map_error(err),
    }
}

/// GET /api/volunteers - List volunteers, optionally filtered by zone
async fn get_volunteers(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let result = zone_filter(&state.store, &params).and_then(|zone| {
        let volunteers: Vec<Volunteer> = state.store.list(Collection::Volunteers)?;
        Ok(match zone {
            Some(zone) => volunteers.into_iter().filter(|v| v.zone == zone).collect(),
            None => volunteers,
        })
    });
    match result {
        Ok(volunteers) => (StatusCode::OK, Json(ApiResponse::ok(volunteers))).into_response(),
        Err(err) => map_error(err),
    }
}

/// GET /api/assignments - List assignments, optionally filtered by zone
async fn get_assignments(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let result = zone_filter(&state.store, &params).and_then(|zone| {
        let records: Vec<AssignmentRecord> = state.store.list(Collection::Assignments)?;
        Ok(match zone {
            Some(zone) => records.into_iter().filter(|r| r.zone == zone).collect(),
            None => records,
        })
    });
    match result {
        Ok(records) => (StatusCode::OK, Json(ApiResponse::ok(records))).into_response(),
        Err(err) => map_error(err),
    }
}

/// POST /api/assignments/run - Run a matching pass
async fn run_assignments(
    State(state): State<AppState>,
    Json(request): Json<AssignRequest>,
) -> impl IntoResponse {
    match MatchingEngine::new(&state.store).assign(&request) {
        Ok(response) => (StatusCode::OK, Json(ApiResponse::ok(response))).into_response(),
        Err(err) => map_error(err),
    }
}

/// DELETE /api/assignments/:student_id - Remove a student's assignment
async fn remove_assignment(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> impl IntoResponse {
    match state.store.remove(Collection::Assignments, &student_id) {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok(student_id))).into_response(),
        Err(err) => map_error(err),
    }
}

/// POST /api/sync/:zone - Top a zone up with synthetic students
async fn sync_zone_handler(
    State(state): State<AppState>,
    Path(zone): Path<String>,
) -> impl IntoResponse {
    match sync_zone(&state.store, &zone) {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::ok(outcome))).into_response(),
        Err(err) => map_error(err),
    }
}

/// POST /api/insights/student - Advisory text for a student
async fn insight_student(
    State(state): State<AppState>,
    Json(request): Json<InsightStudentRequest>,
) -> impl IntoResponse {
    match student_insight(&state.store, state.generator.as_ref(), &request.student_id) {
        Ok(insight) => (StatusCode::OK, Json(ApiResponse::ok(insight))).into_response(),
        Err(err) => map_error(err),
    }
}

/// POST /api/insights/family - Advisory text for a family
async fn insight_family(
    State(state): State<AppState>,
    Json(request): Json<InsightFamilyRequest>,
) -> impl IntoResponse {
    match family_insight(&state.store, state.generator.as_ref(), &request.family_id) {
        Ok(insight) => (StatusCode::OK, Json(ApiResponse::ok(insight))).into_response(),
        Err(err) => map_error(err),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    flexi_logger::Logger::try_with_env_or_str("info")
        .expect("Failed to configure logging")
        .start()
        .expect("Failed to start logger");

    println!("🌐 Tutor Match - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let data_dir = std::env::var("TUTOR_MATCH_DATA").unwrap_or_else(|_| "./data".to_string());
    let store = RecordStore::open(&data_dir).expect("Failed to open record store");
    println!("✓ Record store opened: {}", data_dir);

    if std::env::args().any(|arg| arg == "--seed") {
        let summary = bootstrap_demo(&store).expect("Failed to seed demo cohort");
        println!(
            "✓ Seeded {} students / {} volunteers",
            summary.students, summary.volunteers
        );
    }

    // Create shared state
    let state = AppState {
        store: Arc::new(store),
        generator: Arc::new(MockGenerator),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/students", get(get_students))
        .route("/volunteers", get(get_volunteers))
        .route("/assignments", get(get_assignments))
        .route("/assignments/run", post(run_assignments))
        .route("/assignments/:student_id", delete(remove_assignment))
        .route("/sync/:zone", post(sync_zone_handler))
        .route("/insights/student", post(insight_student))
        .route("/insights/family", post(insight_family))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   Try: curl -X POST http://localhost:3000/api/assignments/run -d '{{}}' \\");
    println!("        -H 'Content-Type: application/json'");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
