// Bank Card Statistics - Web Server
// Read-only REST API over the canonical store

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use bank_card_stats::{
    list_banks, list_categories, list_months, month_over_month_growth, open_database,
    query_statistics, CanonicalField, Config, StatisticsFilter, VERSION,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, Response> {
        self.db
            .lock()
            .map_err(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "database lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }),
    )
        .into_response()
}

/// Query failures are logged and reported as 500
fn respond<T: Serialize>(result: anyhow::Result<T>, what: &str) -> Response {
    match result {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "failed to load {}", what);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("failed to load {}", what))
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

#[derive(Deserialize)]
struct CategoryQuery {
    category: Option<String>,
}

#[derive(Deserialize)]
struct GrowthQuery {
    bank: String,
    metric: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct Health {
    status: &'static str,
    version: &'static str,
}

fn health() -> Health {
    Health {
        status: "OK",
        version: VERSION,
    }
}

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok(health())
}

/// GET /api/banks?category= - Banks, optionally one category
async fn get_banks(State(state): State<AppState>, Query(q): Query<CategoryQuery>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };
    respond(list_banks(&conn, q.category.as_deref()), "banks")
}

/// GET /api/categories - Distinct bank categories
async fn get_categories(State(state): State<AppState>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };
    respond(list_categories(&conn), "categories")
}

/// GET /api/months - Months with stored statistics
async fn get_months(State(state): State<AppState>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };
    respond(list_months(&conn), "months")
}

/// GET /api/statistics?from=&to=&bank=&category=
async fn get_statistics(
    State(state): State<AppState>,
    Query(filter): Query<StatisticsFilter>,
) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };
    respond(query_statistics(&conn, &filter), "statistics")
}

/// GET /api/growth?bank=&metric= - Month-over-month series of one metric
async fn get_growth(State(state): State<AppState>, Query(q): Query<GrowthQuery>) -> Response {
    let Some(metric) = CanonicalField::from_name(&q.metric) else {
        return error_response(StatusCode::BAD_REQUEST, &format!("unknown metric: {}", q.metric));
    };
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };
    respond(month_over_month_growth(&conn, &q.bank, metric), "growth")
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/banks", get(get_banks))
        .route("/categories", get(get_categories))
        .route("/months", get(get_months))
        .route("/statistics", get(get_statistics))
        .route("/growth", get(get_growth))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bank-card-stats.toml"));
    let config = Config::load(&config_path)?;

    let conn = open_database(&config.db_path)?;
    tracing::info!(db = %config.db_path.display(), version = VERSION, "database opened");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let addr = std::env::var("STATS_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/statistics", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
