use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, Database};
use crate::core::{ExportPayload, assumptions_of, build_provenance, validate_assumption_ranges};
use crate::error::{ApiError, ApiResult};
use crate::report::{RenderedReport, render_document, render_workbook};
use crate::store::Store;

pub const REPORT_WARNINGS_HEADER: &str = "x-report-warnings";
pub const REPORT_FAILED_SECTIONS_HEADER: &str = "x-report-failed-sections";

#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<Store>>,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    fn store(&self) -> ApiResult<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| ApiError::Internal("store lock poisoned".to_string()))
    }
}

pub async fn run_http_server(config: Config) -> std::io::Result<()> {
    let store = match &config.database {
        Database::File(path) => Store::open(path),
        Database::InMemory => Store::in_memory(),
    }
    .map_err(|e| std::io::Error::other(e.to_string()))?;

    let app = router(AppState::new(store), &config.cors_origins);
    let listener = TcpListener::bind(config.addr).await?;
    info!(
        addr = %config.addr,
        profile = ?config.profile,
        database = ?config.database,
        "damages API listening"
    );

    axum::serve(listener, app).await
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/evaluees", get(list_evaluees).post(create_evaluee))
        .route(
            "/api/evaluees/:id",
            get(get_evaluee).put(update_evaluee).delete(delete_evaluee),
        )
        .route("/api/evaluees/:id/cases", get(list_cases).post(create_case))
        .route(
            "/api/cases/:id",
            get(get_case).put(update_case).delete(delete_case),
        )
        .route(
            "/api/cases/:id/calculations",
            get(list_calculations).post(save_calculation),
        )
        .route(
            "/api/calculations/:id",
            get(get_calculation).delete(delete_calculation),
        )
        .route("/api/assumptions/validate", post(validate_assumptions))
        .route("/api/search", get(search))
        .route("/api/stats", get(stats))
        .route("/api/export/word", post(export_word))
        .route("/api/export/excel", post(export_excel))
        .fallback(not_found_handler)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| origin.parse().ok()))
    };
    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            HeaderName::from_static(REPORT_WARNINGS_HEADER),
            HeaderName::from_static(REPORT_FAILED_SECTIONS_HEADER),
        ])
}

async fn not_found_handler() -> Response {
    ApiError::NotFound.into_response()
}

pub(crate) fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn ok(body: Value) -> ApiResult<Response> {
    Ok(json_response(StatusCode::OK, body))
}

fn created(body: Value) -> ApiResult<Response> {
    Ok(json_response(StatusCode::CREATED, body))
}

/// Parses a request body. An empty body reads as JSON null.
fn parse_json(body: &Bytes) -> ApiResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

fn json_object(body: &Bytes) -> ApiResult<Map<String, Value>> {
    match parse_json(body)? {
        Value::Object(map) => Ok(map),
        Value::Null => Err(ApiError::BadRequest("No data provided".to_string())),
        _ => Err(ApiError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

fn profile_name(body: &Map<String, Value>) -> &str {
    body.get("profile_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

// ── Evaluees ───────────────────────────────────────────────────

async fn list_evaluees(State(state): State<AppState>) -> ApiResult<Response> {
    let evaluees = state.store()?.list_evaluees()?;
    ok(json!({"success": true, "evaluees": evaluees}))
}

async fn get_evaluee(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Response> {
    let store = state.store()?;
    let evaluee = store.get_evaluee(id)?;
    let cases = store.evaluee_cases(id)?;
    let mut data = json!(evaluee);
    data["cases"] = json!(cases);
    ok(json!({"success": true, "evaluee": data}))
}

async fn create_evaluee(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let body = json_object(&body)?;
    let evaluee = state.store()?.create_evaluee(profile_name(&body))?;
    created(json!({"success": true, "evaluee": evaluee}))
}

async fn update_evaluee(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Response> {
    let body = json_object(&body)?;
    let evaluee = state.store()?.update_evaluee(id, profile_name(&body))?;
    ok(json!({"success": true, "evaluee": evaluee}))
}

async fn delete_evaluee(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Response> {
    let evaluee = state.store()?.delete_evaluee(id)?;
    ok(json!({
        "success": true,
        "message": format!("Evaluee \"{}\" deleted", evaluee.profile_name),
    }))
}

// ── Cases ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct CaseQuery {
    include_history: Option<String>,
}

async fn list_cases(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Response> {
    let store = state.store()?;
    let evaluee = store.get_evaluee(id)?;
    let cases = store.list_cases(id)?;
    ok(json!({"success": true, "evaluee": evaluee, "cases": cases}))
}

async fn create_case(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Response> {
    let body = json_object(&body)?;
    let case = state.store()?.create_case(id, &body)?;
    created(json!({"success": true, "case": case}))
}

async fn get_case(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<CaseQuery>,
) -> ApiResult<Response> {
    let include_history = query
        .include_history
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let case = state.store()?.get_case(id, include_history)?;
    ok(json!({"success": true, "case": case}))
}

async fn update_case(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Response> {
    let body = json_object(&body)?;
    let case = state.store()?.update_case(id, &body)?;
    ok(json!({"success": true, "case": case}))
}

async fn delete_case(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Response> {
    let case = state.store()?.delete_case(id)?;
    ok(json!({
        "success": true,
        "message": format!("Case \"{}\" deleted", case.case_name),
    }))
}

// ── Calculations ───────────────────────────────────────────────

async fn list_calculations(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let calculations = state.store()?.list_calculations(id)?;
    ok(json!({"success": true, "case_id": id, "calculations": calculations}))
}

async fn save_calculation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Response> {
    let body = json_object(&body)?;
    let calculation = state.store()?.save_calculation(id, &body)?;
    created(json!({"success": true, "calculation": calculation}))
}

async fn get_calculation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let calculation = state.store()?.get_calculation(id)?;
    ok(json!({"success": true, "calculation": calculation}))
}

async fn delete_calculation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    state.store()?.delete_calculation(id)?;
    ok(json!({"success": true, "message": "Calculation deleted"}))
}

// ── Utility ────────────────────────────────────────────────────

/// Violations never reject here; the caller decides what to do with them.
async fn validate_assumptions(body: Bytes) -> ApiResult<Response> {
    let body = parse_json(&body)?;
    let assumptions = assumptions_of(&body);
    let violations = validate_assumption_ranges(assumptions);
    let provenance = build_provenance(assumptions, Utc::now());
    ok(json!({
        "success": true,
        "violations": violations,
        "provenance": provenance,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Response> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return Err(ApiError::BadRequest("Query parameter required".to_string()));
    }
    let results = state.store()?.search(q)?;
    ok(json!({"success": true, "query": q, "results": results}))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Response> {
    let stats = state.store()?.stats()?;
    ok(json!({"success": true, "stats": stats}))
}

// ── Exports ────────────────────────────────────────────────────

async fn export_word(body: Bytes) -> ApiResult<Response> {
    let payload = ExportPayload::from_json(&parse_json(&body)?)?;
    let report = render_document(&payload, Utc::now())?;
    attachment(report)
}

async fn export_excel(body: Bytes) -> ApiResult<Response> {
    let payload = ExportPayload::from_json(&parse_json(&body)?)?;
    let report = render_workbook(&payload, Utc::now())?;
    attachment(report)
}

/// Streams a rendered artifact, surfacing omitted sections as headers.
fn attachment(report: RenderedReport) -> ApiResult<Response> {
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        report.filename
    ))
    .map_err(|e| ApiError::Internal(e.to_string()))?;
    let failed = report.failed_sections().join(",");
    info!(
        filename = %report.filename,
        bytes = report.bytes.len(),
        warnings = report.warnings.len(),
        "export rendered"
    );

    let mut response = with_cache_control((
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static(report.content_type))],
        report.bytes,
    ));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(
        HeaderName::from_static(REPORT_WARNINGS_HEADER),
        HeaderValue::from(report.warnings.len()),
    );
    if !failed.is_empty() {
        let value = HeaderValue::from_str(&failed).map_err(|e| ApiError::Internal(e.to_string()))?;
        headers.insert(HeaderName::from_static(REPORT_FAILED_SECTIONS_HEADER), value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{DOCX_CONTENT_TYPE, XLSX_CONTENT_TYPE};

    fn state() -> AppState {
        AppState::new(Store::in_memory().unwrap())
    }

    fn bytes(value: Value) -> Bytes {
        Bytes::from(value.to_string())
    }

    async fn body_json(response: Response) -> Value {
        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    async fn error_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        (status, body_json(response).await)
    }

    fn export_payload() -> Value {
        json!({
            "assumptions": {
                "meta": {"caseName": "Roe v. Acme"},
                "discount": {"method": "rate", "rate": 0.04},
                "butFor": {"growthMethod": "fixed", "growth": 0.03}
            },
            "schedule": {
                "rowsPre": [{"year": 2023, "age": 45, "portion": 1, "bfGross": 50000,
                             "bfAdj": 40000, "loss": 30000, "pastPart": 30000}],
                "rowsPost": [{"year": 2025, "age": 47, "portion": 1, "bfGross": 52000,
                              "bfAdj": 41000, "loss": 31000, "futurePart": 31000,
                              "pvFuture": 29000}],
                "totals": {"pastDam": 30000, "futurePV": 29000, "totalPV": 59000}
            }
        })
    }

    #[tokio::test]
    async fn evaluee_lifecycle_over_handlers() {
        let state = state();
        let response = create_evaluee(State(state.clone()), bytes(json!({"profile_name": " Jane "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            HeaderValue::from_static("no-store")
        );
        let body = body_json(response).await;
        let id = body["evaluee"]["id"].as_i64().unwrap();
        assert_eq!(body["evaluee"]["profile_name"], "Jane");

        let err = create_evaluee(State(state.clone()), bytes(json!({"profile_name": "Jane"})))
            .await
            .unwrap_err();
        let (status, body) = error_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"success": false, "error": "Profile name already exists"}));

        let body = body_json(get_evaluee(State(state.clone()), Path(id)).await.unwrap()).await;
        assert_eq!(body["evaluee"]["cases"], json!([]));

        let body = body_json(delete_evaluee(State(state.clone()), Path(id)).await.unwrap()).await;
        assert_eq!(body["message"], "Evaluee \"Jane\" deleted");

        let (status, body) = error_json(get_evaluee(State(state), Path(id)).await.unwrap_err()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Resource not found");
    }

    #[tokio::test]
    async fn create_evaluee_requires_a_body_and_name() {
        let state = state();
        let (status, body) =
            error_json(create_evaluee(State(state.clone()), Bytes::new()).await.unwrap_err()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No data provided");

        let (_, body) = error_json(
            create_evaluee(State(state), bytes(json!({"profile_name": "  "})))
                .await
                .unwrap_err(),
        )
        .await;
        assert_eq!(body["error"], "Profile name is required");
    }

    #[tokio::test]
    async fn case_dates_are_validated() {
        let state = state();
        let evaluee = state.store().unwrap().create_evaluee("Jane").unwrap();
        let err = create_case(
            State(state.clone()),
            Path(evaluee.id),
            bytes(json!({"case_name": "Roe", "valuation_date": "June 1"})),
        )
        .await
        .unwrap_err();
        let (status, body) = error_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Invalid date format for 'valuation_date'. Use ISO format YYYY-MM-DD."
        );

        let response = create_case(
            State(state.clone()),
            Path(evaluee.id),
            bytes(json!({"case_name": "Roe", "valuation_date": "2024-06-01"})),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["case"]["valuation_date"], "2024-06-01");
        assert_eq!(body["case"]["case_type"], "pi");
    }

    #[tokio::test]
    async fn save_calculation_rejects_out_of_range_assumptions() {
        let state = state();
        let case_id = {
            let store = state.store().unwrap();
            let evaluee = store.create_evaluee("Jane").unwrap();
            let mut body = Map::new();
            body.insert("case_name".into(), json!("Roe"));
            store.create_case(evaluee.id, &body).unwrap().id
        };

        let err = save_calculation(
            State(state.clone()),
            Path(case_id),
            bytes(json!({"assumptions": {"discount": {"rate": 0.5}}, "results": {}})),
        )
        .await
        .unwrap_err();
        let (status, body) = error_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Assumptions validation failed");
        assert_eq!(body["violations"].as_array().unwrap().len(), 1);

        let response = save_calculation(
            State(state.clone()),
            Path(case_id),
            bytes(json!({"assumptions": {"discount": {"rate": 0.04}}, "results": {"totalPV": 5}})),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["calculation"]["results"], json!({"totalPV": 5}));

        let body = body_json(list_calculations(State(state), Path(case_id)).await.unwrap()).await;
        let history = body["calculations"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].get("results").is_none());
    }

    #[tokio::test]
    async fn validate_endpoint_reports_without_rejecting() {
        let body = json!({"assumptions": {"butFor": {"growth": 0.3}}});
        let response = validate_assumptions(bytes(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["violations"].as_array().unwrap().len(), 1);
        assert_eq!(body["provenance"]["fingerprint"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn search_requires_a_query() {
        let state = state();
        let err = search(State(state.clone()), Query(SearchQuery { q: Some("  ".into()) }))
            .await
            .unwrap_err();
        let (status, body) = error_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Query parameter required");

        state.store().unwrap().create_evaluee("Jane Roe").unwrap();
        let body = body_json(
            search(State(state.clone()), Query(SearchQuery { q: Some("ROE".into()) }))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["query"], "ROE");
        assert_eq!(body["results"]["evaluees"].as_array().unwrap().len(), 1);

        let body = body_json(stats(State(state)).await.unwrap()).await;
        assert_eq!(body["stats"], json!({"evaluees": 1, "cases": 0, "calculations": 0}));
    }

    #[tokio::test]
    async fn word_export_streams_a_named_document() {
        let response = export_word(bytes(export_payload())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], DOCX_CONTENT_TYPE);
        let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"damages_report_Roe_v._Acme_"));
        assert!(headers.contains_key(REPORT_WARNINGS_HEADER));
        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&raw[..2], b"PK");
    }

    #[tokio::test]
    async fn excel_export_uses_fixed_filename() {
        let response = export_excel(bytes(export_payload())).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], XLSX_CONTENT_TYPE);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"damages_report.xlsx\""
        );
    }

    #[tokio::test]
    async fn exports_reject_structurally_invalid_payloads() {
        let (status, body) = error_json(export_word(Bytes::new()).await.unwrap_err()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No data provided");

        let err = export_excel(bytes(json!({"assumptions": {}}))).await.unwrap_err();
        let (_, body) = error_json(err).await;
        assert_eq!(body["error"], "Missing required field 'schedule'");
    }

    #[tokio::test]
    async fn unknown_routes_are_json_404s() {
        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            json!({"success": false, "error": "Resource not found"})
        );
    }
}
