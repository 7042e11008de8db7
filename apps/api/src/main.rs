use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

const AUDIT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

use alerting_cell::{
    AlertDebouncer, AlertingState, EscalationCoordinator, InboundMessageHandler, VitalsService, WebhookProcessor,
};
use audit_cell::{AuditService, AuditSink};
use care_team_cell::CareTeamRouter;
use messaging_cell::{gateways_from_config, NotificationDispatcher};
use schedule_cell::ScheduleManager;
use shared_config::AppConfig;
use shared_database::{ClinicalStore, InMemoryStore, SupabaseStore};
use shared_utils::signature::WebhookCredentials;
use shared_utils::{Clock, JobScheduler, SystemClock};
use threshold_cell::ThresholdResolver;

use crate::router::{create_router, AppServices};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinical alerting API server");

    // Load configuration
    let config = AppConfig::from_env();

    let store: Arc<dyn ClinicalStore> = if config.is_store_configured() {
        Arc::new(SupabaseStore::new(&config))
    } else {
        warn!("SUPABASE_URL not set, using the in-memory store; nothing survives a restart");
        Arc::new(InMemoryStore::new())
    };
    let audit_service = Arc::new(AuditService::new(&config));
    let audit_flusher = audit_service.spawn_periodic_flush(AUDIT_FLUSH_INTERVAL);
    let audit: Arc<dyn AuditSink> = audit_service.clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = JobScheduler::new(clock.clone());

    let gateways = gateways_from_config(&config);
    if gateways.is_empty() {
        warn!("No SMS/voice provider configured; every send will fail");
    }
    let dispatcher = NotificationDispatcher::new(gateways, audit.clone(), scheduler.clone())
        .with_provider_timeout(Duration::from_secs(config.provider_timeout_seconds))
        .with_message_bodies_in_audit(config.audit_include_message_body);
    info!(providers = ?dispatcher.provider_names(), "Notification dispatcher ready");

    let care_team = Arc::new(CareTeamRouter::from_config(store.clone(), &config)?);
    let resolver = Arc::new(ThresholdResolver::new(store.clone(), audit.clone()));
    let escalation = EscalationCoordinator::new(
        store.clone(),
        dispatcher.clone(),
        care_team.clone(),
        audit.clone(),
        &config,
    );
    let debouncer = Arc::new(AlertDebouncer::new(config.alert_debounce_seconds, clock.clone()));
    let vitals = Arc::new(VitalsService::new(
        store.clone(),
        resolver.clone(),
        dispatcher.clone(),
        care_team,
        escalation.clone(),
        debouncer,
        audit.clone(),
    ));
    let inbound = Arc::new(InboundMessageHandler::new(
        store.clone(),
        dispatcher.clone(),
        vitals.clone(),
        escalation.clone(),
        audit.clone(),
        config.audit_include_message_body,
    ));
    let webhooks = Arc::new(WebhookProcessor::new(store.clone(), dispatcher.clone(), inbound, audit.clone()));
    let schedules = ScheduleManager::new(store.clone(), dispatcher.clone(), audit.clone(), &config);

    // Reinstall timers from the store before taking traffic
    let restored_schedules = schedules.restore_active_schedules().await?;
    let restored_incidents = escalation.restore_pending().await?;
    info!(
        schedules = restored_schedules,
        incidents = restored_incidents,
        "Startup restore complete"
    );


    let alerting = AlertingState {
        vitals,
        escalation,
        webhooks,
        audit,
        webhook_credentials: Arc::new(WebhookCredentials::from_config(&config)),
        clock,
    };

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = create_router(AppServices {
        resolver,
        dispatcher,
        alerting,
        schedules,
    })
    .layer(
        TraceLayer::new_for_http()
            .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
            .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
    )
    .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Persist whatever the periodic flush has not picked up yet
    audit_flusher.abort();
    info!(pending = audit_service.pending_entries().await, "Flushing audit buffer before exit");
    if let Err(e) = audit_service.flush_audit_buffer().await {
        error!("Final audit flush failed: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
