use crate::{
    device::{DeviceConfig, EventType, LoginEvent, Notifier, TemplateSelector},
    email::{EmailSender, EmailSenderKind, LogEmailSender, OutboxEmailSender},
    store::PgStore,
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE},
    routing::{get, post},
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod state;

pub use state::{AppState, FlowSessions};

use handlers::{events, flow, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        flow::create_flow,
        flow::device_step,
        flow::device_step_resume,
        flow::complete_flow,
        events::ingest_event,
    ),
    components(schemas(
        health::Health,
        flow::FlowCreated,
        flow::FlowStatus,
        flow::DeviceForm,
        flow::CompleteFlow,
        LoginEvent,
        EventType,
    )),
    tags(
        (name = "flows", description = "Device capture during authentication"),
        (name = "events", description = "Login events"),
        (name = "health", description = "Service health"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Settings the server needs beyond the listen port and DSN.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub device: DeviceConfig,
    pub email_sender: EmailSenderKind,
    pub templates: TemplateSelector,
}

/// Build the router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/v1/flows", post(flow::create_flow))
        .route(
            "/v1/flows/:flow_id/device",
            post(flow::device_step).get(flow::device_step_resume),
        )
        .route("/v1/flows/:flow_id/complete", post(flow::complete_flow))
        .route("/v1/events", post(events::ingest_event))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to connect to the database or to start the server
pub async fn new(port: u16, dsn: SecretString, config: ServerConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgStore::new(pool.clone()));

    let sender: Arc<dyn EmailSender> = match config.email_sender {
        EmailSenderKind::Log => Arc::new(LogEmailSender),
        EmailSenderKind::Outbox => Arc::new(OutboxEmailSender::new(pool)),
    };
    let notifier = Notifier::new(sender).with_templates(config.templates);

    let state = Arc::new(AppState::new(
        &config.device,
        store.clone(),
        store,
        notifier,
    ));
    info!(
        steps = ?state.pipeline.step_ids(),
        email_sender = %config.email_sender,
        "device capture pipeline ready"
    );

    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_documents_every_route() {
        let spec = openapi();
        let paths: Vec<&str> = spec.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/health",
            "/v1/events",
            "/v1/flows",
            "/v1/flows/{flow_id}/complete",
            "/v1/flows/{flow_id}/device",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
    }
}
