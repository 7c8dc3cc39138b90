// Zone KPI server with embedded dashboard page
// MapTrack delivery plan: six KPI cards plus city and route summaries for the selected zone

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kpi_zona::config::KpiConfig;
use kpi_zona::kpi_models::{DebugSnapshot, FeedSource, HttpFeed, KpiError, KpiReport};
use kpi_zona::loader::{self, ZoneSelector};
use kpi_zona::render::HtmlPage;

// Embed the page template at compile time
const INDEX_HTML: &str = include_str!("../static/kpi.html");

struct AppState<F> {
    config: Arc<KpiConfig>,
    feed: Arc<F>,
    snapshot: DebugSnapshot,
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        AppState {
            config: self.config.clone(),
            feed: self.feed.clone(),
            snapshot: self.snapshot.clone(),
        }
    }
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ZoneQuery {
    zona: Option<String>,
}

/// Zone named in the request, or the configured default when absent or blank.
struct RequestZone {
    requested: Option<String>,
    fallback: String,
}

impl RequestZone {
    fn new(query: ZoneQuery, fallback: &str) -> Self {
        RequestZone {
            requested: query.zona,
            fallback: fallback.to_string(),
        }
    }
}

impl ZoneSelector for RequestZone {
    fn current_zone(&self) -> String {
        match self.requested.as_deref().map(str::trim) {
            Some(zone) if !zone.is_empty() => zone.to_string(),
            _ => self.fallback.clone(),
        }
    }
}

// ============================================================================
// Frontend Routes
// ============================================================================

async fn serve_dashboard<F: FeedSource + 'static>(
    state: web::Data<AppState<F>>,
    query: web::Query<ZoneQuery>,
) -> HttpResponse {
    let zones = RequestZone::new(query.into_inner(), &state.config.default_zone);
    let mut page = HtmlPage::new(INDEX_HTML, &zones.current_zone());

    loader::load_kpi(state.feed.as_ref(), &zones, &mut page, &state.config, &state.snapshot).await;

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(page.render())
}

// ============================================================================
// API Endpoints
// ============================================================================

async fn get_kpi<F: FeedSource + 'static>(
    state: web::Data<AppState<F>>,
    query: web::Query<ZoneQuery>,
) -> HttpResponse {
    let zone = RequestZone::new(query.into_inner(), &state.config.default_zone).current_zone();

    let result = match state.feed.fetch_text().await {
        Ok(text) => KpiReport::from_feed_text(&text, &zone, &state.config),
        Err(e) => Err(e),
    };

    match result {
        Ok((report, zone_rows)) => {
            state.snapshot.store(&zone, zone_rows);
            info!("📊 KPI requested for zone '{}': {} records", zone, report.records);
            HttpResponse::Ok().json(ApiResponse::success(report))
        }
        Err(KpiError::NoRecords) => {
            warn!("⚠️  KPI requested for zone '{}' but the feed has no data rows", zone);
            HttpResponse::NotFound()
                .json(ApiResponse::<KpiReport>::error(loader::STATUS_NO_RECORDS.to_string()))
        }
        Err(e) => {
            error!("❌ Failed to compute KPIs for zone '{}': {}", zone, e);
            HttpResponse::BadGateway()
                .json(ApiResponse::<KpiReport>::error(loader::STATUS_ERROR.to_string()))
        }
    }
}

async fn get_debug_snapshot<F: FeedSource + 'static>(state: web::Data<AppState<F>>) -> HttpResponse {
    match state.snapshot.latest() {
        Some(snapshot) => {
            info!("🔍 Debug snapshot requested: zone '{}', {} rows", snapshot.zone, snapshot.rows.len());
            HttpResponse::Ok().json(ApiResponse::success(snapshot))
        }
        None => HttpResponse::NotFound()
            .json(ApiResponse::<String>::error("No zone has been loaded yet".to_string())),
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Zone KPI Dashboard",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp(),
        "embedded_frontend": true
    }))
}

fn routes<F: FeedSource + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(serve_dashboard::<F>))
        .route("/health", web::get().to(health_check))
        .service(
            web::scope("/api/kpi")
                .route("", web::get().to(get_kpi::<F>))
                .route("/debug", web::get().to(get_debug_snapshot::<F>)),
        );
}

// ============================================================================
// Server Setup
// ============================================================================

async fn run_server(config: KpiConfig) -> std::io::Result<()> {
    let feed = HttpFeed::new(&config).map_err(std::io::Error::other)?;
    let bind = (config.host.clone(), config.port);

    info!("🌐 Server running on: http://{}:{}", bind.0, bind.1);
    info!("📡 Feed: {}", feed.url());
    if config.default_zone.is_empty() {
        info!("📍 No default zone configured, pass ?zona= to select one");
    } else {
        info!("📍 Default zone: {}", config.default_zone);
    }
    info!("📍 Routes: GET / | GET /api/kpi?zona= | GET /api/kpi/debug | GET /health");

    let state = AppState {
        config: Arc::new(config),
        feed: Arc::new(feed),
        snapshot: DebugSnapshot::default(),
    };

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::<HttpFeed>)
    })
    .bind(bind)?
    .run()
    .await
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 Zone KPI Dashboard v{}", env!("CARGO_PKG_VERSION"));

    let config = match KpiConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            error!("💡 Check KPI_CONFIG and the KPI_* environment variables");
            std::process::exit(1);
        }
    };

    actix_web::rt::System::new().block_on(run_server(config))
}
