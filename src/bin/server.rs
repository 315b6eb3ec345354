use std::sync::Arc;

use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use warden::aggregator::{Aggregator, Period};
use warden::bootstrap::BootstrapInitializer;
use warden::collector::SnapshotCollector;
use warden::config::TelemetryConfig;
use warden::devices::SyntheticDeviceDiscovery;
use warden::producer::SyntheticEventProducer;
use warden::retention::RetentionManager;
use warden::scheduler::TelemetryScheduler;
use warden::stats::StatsService;
use warden::store::{EventStore, MongoStores, RuleStore, SnapshotStore};

struct AppState {
    stats: StatsService,
    aggregator: Aggregator,
    retention: Arc<RetentionManager>,
}

const MAX_ACTIVITY_LIMIT: usize = 100;
const DEFAULT_ACTIVITY_LIMIT: usize = 10;

fn failure_body() -> HttpResponse {
    HttpResponse::InternalServerError()
        .json(serde_json::json!({ "error": "could not retrieve data" }))
}

#[get("/api/stats/summary")]
async fn stats_summary(state: web::Data<AppState>) -> impl Responder {
    match state.stats.summary().await {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            error!(error = %e, "stats summary failed");
            failure_body()
        }
    }
}

#[derive(Deserialize)]
struct ChartQuery {
    period: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartEntry {
    time: String,
    total_connections: u64,
    blocked_connections: u64,
    allowed_connections: u64,
    threats: u64,
}

#[get("/api/stats/chart-data")]
async fn chart_data(state: web::Data<AppState>, query: web::Query<ChartQuery>) -> impl Responder {
    let raw = query.period.as_deref().unwrap_or("24h");
    let period: Period = match raw.parse() {
        Ok(period) => period,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "period must be one of 24h, 7d, 30d"
            }))
        }
    };

    match state.aggregator.aggregate(period, Utc::now()).await {
        Ok(buckets) => {
            let entries: Vec<ChartEntry> = buckets
                .into_iter()
                .map(|b| ChartEntry {
                    time: b.label,
                    total_connections: b.total,
                    blocked_connections: b.blocked,
                    allowed_connections: b.allowed,
                    threats: b.threats,
                })
                .collect();
            HttpResponse::Ok().json(entries)
        }
        Err(e) => {
            error!(error = %e, period = raw, "chart aggregation failed");
            failure_body()
        }
    }
}

#[derive(Deserialize)]
struct ActivityQuery {
    limit: Option<usize>,
}

#[get("/api/stats/recent-activity")]
async fn recent_activity(
    state: web::Data<AppState>,
    query: web::Query<ActivityQuery>,
) -> impl Responder {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(MAX_ACTIVITY_LIMIT);
    match state.stats.recent_activity(limit).await {
        Ok(activity) => HttpResponse::Ok().json(activity),
        Err(e) => {
            error!(error = %e, "recent activity failed");
            failure_body()
        }
    }
}

#[derive(Deserialize)]
struct CleanupRequest {
    days: i64,
}

// Privileged operation: authorization happens upstream of this service.
#[post("/api/stats/cleanup")]
async fn manual_cleanup(
    state: web::Data<AppState>,
    body: web::Json<CleanupRequest>,
) -> impl Responder {
    if body.days < 1 {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "error": "days must be at least 1" }));
    }
    let report = state.retention.manual_cleanup(body.days).await;
    HttpResponse::Ok().json(report)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = TelemetryConfig::from_env();
    let stores = Arc::new(
        MongoStores::connect(&config)
            .await
            .expect("failed to connect to MongoDB"),
    );
    if let Err(e) = stores.ensure_indexes().await {
        error!(error = %e, "index creation failed");
    }

    let events: Arc<dyn EventStore> = stores.clone();
    let snapshots: Arc<dyn SnapshotStore> = stores.clone();
    let rules: Arc<dyn RuleStore> = stores.clone();

    let collector = Arc::new(SnapshotCollector::new(
        events.clone(),
        snapshots.clone(),
        rules.clone(),
        Arc::new(SyntheticDeviceDiscovery),
    ));
    let bootstrap = Arc::new(BootstrapInitializer::new(
        events.clone(),
        snapshots.clone(),
        rules,
        config.seed_demo_data,
    ));
    let producer = Arc::new(SyntheticEventProducer::new(events.clone()));
    let scheduler = Arc::new(TelemetryScheduler::new(
        collector,
        producer,
        bootstrap,
        config.snapshot_interval,
        config.sampling_interval,
    ));
    scheduler.start().await;

    let retention = Arc::new(RetentionManager::new(
        events.clone(),
        snapshots.clone(),
        config.event_ttl_days,
        config.snapshot_ttl_days,
    ));
    let retention_task = retention.clone().spawn_daily();

    info!(addr = %config.bind_addr, "warden server listening");
    let server_retention = retention.clone();
    let result = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(AppState {
                stats: StatsService::new(events.clone(), snapshots.clone()),
                aggregator: Aggregator::new(events.clone()),
                retention: server_retention.clone(),
            }))
            .service(stats_summary)
            .service(chart_data)
            .service(recent_activity)
            .service(manual_cleanup)
    })
    .bind(&config.bind_addr)?
    .run()
    .await;

    scheduler.stop().await;
    retention_task.abort();
    result
}
