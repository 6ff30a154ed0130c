use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::{middleware, Router};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hubd::config::{EnvOverrides, WorkspaceConfig};
use hubd::daemon::lifecycle::{self, ServerInfo, WriterLock};
use hubd::daemon::workspace::discover_or_init;
use hubd::daemon::{
    enforce_body_limit, normalize_rate_limit_response, reject_during_shutdown,
    wait_for_shutdown_signal,
};
use hubd::plugins::PluginPipeline;
use hubd::security;
use hubd::state::AppState;
use hubd::{db, handlers, ids, websocket};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const PROTOCOL_VERSION: u32 = 1;

#[tokio::main]
async fn main() {
    let env_overrides = EnvOverrides::from_env();
    init_tracing(&env_overrides);

    // Exactly one positional argument: the workspace start path. Everything
    // else (flags, subcommands) belongs to a wrapping CLI, not this daemon.
    let start_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    match run(start_path, env_overrides).await {
        Ok(()) => std::process::exit(0),
        Err(StartupError::LockHeld) => {
            error!("writer lock is held by a live daemon instance");
            std::process::exit(10);
        }
        Err(e) => {
            error!(error = %e, "daemon exited with an error");
            std::process::exit(1);
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("writer lock held")]
    LockHeld,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("daemon error: {0}")]
    App(#[from] hubd::error::AppError),
}

async fn run(start_path: PathBuf, env_overrides: EnvOverrides) -> Result<(), StartupError> {
    let workspace = discover_or_init(&start_path)?;
    info!(root = %workspace.root.display(), "workspace resolved");

    let lock = match WriterLock::acquire(&workspace).await {
        Ok(lock) => lock,
        Err(lifecycle::LockError::LockHeld) => return Err(StartupError::LockHeld),
        Err(lifecycle::LockError::Io(e)) => return Err(StartupError::Io(e)),
    };

    let result = run_daemon(&workspace, env_overrides).await;

    lifecycle::remove_server_json(&workspace)?;
    lock.release();

    result
}

async fn run_daemon(
    workspace: &hubd::daemon::workspace::Workspace,
    env_overrides: EnvOverrides,
) -> Result<(), StartupError> {
    let pool = db::create_pool(&workspace.db_path()).await?;
    if env_overrides.fts_enabled {
        db::enable_fts(&pool).await?;
        info!("full-text-search index enabled");
    }
    let db_id = db::get_or_create_db_id(&pool).await?;

    let workspace_config =
        WorkspaceConfig::load(&workspace.root).map_err(hubd::error::AppError::Validation)?;
    for plugin in &workspace_config.plugins {
        security::validate_workspace_path(&workspace.root, std::path::Path::new(&plugin.module))
            .map_err(hubd::error::AppError::Validation)?;
    }

    let auth_token = security::generate_auth_token();
    let instance_id = ids::new_instance_id();
    let plugins = PluginPipeline::new(workspace_config.plugins.clone(), workspace.root.clone());

    let state = AppState::new(
        pool,
        Some(auth_token.clone()),
        plugins,
        workspace.root.clone(),
        workspace_config.limits.clone(),
        instance_id.clone(),
        db_id.clone(),
        db::SCHEMA_VERSION,
        PROTOCOL_VERSION,
        env_overrides.fts_enabled,
    );

    let unsafe_network = std::env::var("HUB_UNSAFE_NETWORK").as_deref() == Ok("1");
    let host = if unsafe_network {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    };
    let requested_port: u16 = std::env::var("HUB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let listener = tokio::net::TcpListener::bind(SocketAddr::new(host, requested_port)).await?;
    let bound_addr = listener.local_addr()?;
    info!(%bound_addr, "listening");

    let server_info = ServerInfo {
        instance_id: instance_id.clone(),
        db_id,
        host: bound_addr.ip().to_string(),
        port: bound_addr.port(),
        pid: std::process::id(),
        auth_token,
        started_at: state.started_at,
        protocol_version: PROTOCOL_VERSION,
        schema_version: db::SCHEMA_VERSION,
    };
    lifecycle::publish_server_json(workspace, &server_info)?;

    let app = build_router(state.clone());

    let shutdown_state = state.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal(shutdown_state, DRAIN_TIMEOUT).await;
        })
        .await?;

    info!("daemon stopped");
    Ok(())
}

fn build_router(state: AppState) -> Router {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(state.limits.global_requests_per_second as u64)
            .burst_size(state.limits.global_burst)
            .finish()
            .expect("invalid governor configuration"),
    );

    let body_limit_layer =
        middleware::from_fn_with_state(state.clone(), enforce_body_limit);

    let api = Router::new()
        .route("/channels", get(handlers::channels::list_channels))
        .route("/channels", post(handlers::channels::create_channel))
        .route("/channels/:id/topics", get(handlers::topics::list_topics))
        .route("/topics", post(handlers::topics::create_topic))
        .route("/topics/:id", patch(handlers::topics::rename_topic))
        .route("/messages", get(handlers::messages::list_messages))
        .route("/messages/search", get(handlers::messages::search_messages))
        .route(
            "/messages",
            post(handlers::messages::create_message)
                .layer(body_limit_layer.clone())
                .layer(DefaultBodyLimit::max(state.limits.message_body_bytes)),
        )
        .route(
            "/messages/:id",
            patch(handlers::messages::patch_message)
                .layer(body_limit_layer.clone())
                .layer(DefaultBodyLimit::max(state.limits.message_body_bytes)),
        )
        .route(
            "/topics/:id/attachments",
            get(handlers::attachments::list_attachments),
        )
        .route(
            "/topics/:id/attachments",
            post(handlers::attachments::add_attachment),
        )
        .route("/events", get(handlers::events::list_events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            reject_during_shutdown,
        ))
        // Rate limiting applies only to the command API, never to `/health` —
        // peers contending for the writer lock must always be able to probe
        // liveness. `normalize_rate_limit_response` wraps `GovernorLayer` so
        // its 429 is re-expressed in this crate's `{code, message, details}`
        // shape instead of governor's own plain-text body.
        .layer(GovernorLayer { config: governor_conf })
        .layer(middleware::from_fn(normalize_rate_limit_response));

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api)
        .route("/ws", get(websocket::websocket_handler))
        .layer(TraceLayer::new_for_http());

    for header_layer in security::security_header_layers() {
        router = router.layer(header_layer);
    }

    router.with_state(state)
}

fn init_tracing(env_overrides: &EnvOverrides) {
    if env_overrides.quiet {
        return;
    }
    let filter = env_overrides
        .log_filter
        .clone()
        .and_then(|f| f.parse::<EnvFilter>().ok())
        .unwrap_or_else(|| EnvFilter::new("hubd=info,tower_http=info,sqlx=warn"));

    if std::env::var("HUB_DEV").as_deref() == Ok("1") {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }
}
