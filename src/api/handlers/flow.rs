//! Authentication flow endpoints.
//!
//! The identity server creates a flow when a login starts, forwards the browser
//! to the device step (form post, then the redirect back after a cookie
//! challenge) and finally completes the flow once the user is authenticated.

use axum::{
    Json,
    extract::{Extension, Form, Path, rejection::FormRejection},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use utoipa::ToSchema;

use super::{extract_client_ip, extract_cookies, extract_user_agent};
use crate::api::AppState;
use crate::device::{
    AuthFlowContext, AuthSession, CaptureError, Challenge, FlowOutcome, LoginEvent,
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FlowCreated {
    pub flow_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct FlowStatus {
    pub status: String,
}

/// Form posted by the login page.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeviceForm {
    pub device_fingerprint: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CompleteFlow {
    pub realm_id: String,
    pub user_id: String,
}

enum FormInput {
    Absent,
    Fields(HashMap<String, String>),
    Malformed(String),
}

/// Flow context over one HTTP exchange.
struct HttpFlowContext<'a> {
    form: FormInput,
    cookies: HashMap<String, String>,
    session: &'a mut AuthSession,
}

impl AuthFlowContext for HttpFlowContext<'_> {
    fn form(&self) -> Result<Option<&HashMap<String, String>>, CaptureError> {
        match &self.form {
            FormInput::Absent => Ok(None),
            FormInput::Fields(fields) => Ok(Some(fields)),
            FormInput::Malformed(reason) => Err(CaptureError::MalformedForm(reason.clone())),
        }
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    fn auth_session(&mut self) -> Option<&mut AuthSession> {
        Some(&mut *self.session)
    }

    fn refresh_execution_url(&self) -> String {
        device_step_url(self.session.id())
    }
}

fn device_step_url(flow_id: &str) -> String {
    format!("/v1/flows/{flow_id}/device")
}

#[utoipa::path(
    post,
    path= "/v1/flows",
    responses (
        (status = 201, description = "Authentication session created", body = FlowCreated),
        (status = 503, description = "Too many open authentication sessions"),
    ),
    tag= "flows"
)]
pub async fn create_flow(state: Extension<Arc<AppState>>) -> Response {
    let Some(flow_id) = state.flows.create() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Too many open authentication sessions",
        )
            .into_response();
    };
    debug!(flow_id, "authentication session created");
    (StatusCode::CREATED, Json(FlowCreated { flow_id })).into_response()
}

#[utoipa::path(
    post,
    path= "/v1/flows/{flow_id}/device",
    params(("flow_id" = String, Path, description = "Flow id returned by POST /v1/flows")),
    request_body(content = DeviceForm, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 200, description = "Device signals captured, continue the flow", body = FlowStatus),
        (status = 302, description = "Device cookie issued, follow Location to resume"),
        (status = 404, description = "Unknown or expired flow"),
    ),
    tag= "flows"
)]
#[instrument(skip(state, headers, form))]
pub async fn device_step(
    state: Extension<Arc<AppState>>,
    Path(flow_id): Path<String>,
    headers: HeaderMap,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(fields)) => FormInput::Fields(fields),
        Err(FormRejection::InvalidFormContentType(_)) => FormInput::Absent,
        Err(rejection) => FormInput::Malformed(rejection.body_text()),
    };
    run_capture(&state, &flow_id, &headers, form)
}

#[utoipa::path(
    get,
    path= "/v1/flows/{flow_id}/device",
    params(("flow_id" = String, Path, description = "Flow id returned by POST /v1/flows")),
    responses (
        (status = 200, description = "Device signals captured, continue the flow", body = FlowStatus),
        (status = 302, description = "Device cookie issued, follow Location to resume"),
        (status = 404, description = "Unknown or expired flow"),
    ),
    tag= "flows"
)]
#[instrument(skip(state, headers))]
pub async fn device_step_resume(
    state: Extension<Arc<AppState>>,
    Path(flow_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    run_capture(&state, &flow_id, &headers, FormInput::Absent)
}

fn run_capture(state: &AppState, flow_id: &str, headers: &HeaderMap, form: FormInput) -> Response {
    let cookies = extract_cookies(headers);
    let outcome = state.flows.with_session(flow_id, |session| {
        let mut context = HttpFlowContext {
            form,
            cookies,
            session,
        };
        state.pipeline.run(&mut context)
    });

    match outcome {
        None => (StatusCode::NOT_FOUND, "Unknown or expired flow").into_response(),
        Some(FlowOutcome::Success) => (
            StatusCode::OK,
            Json(FlowStatus {
                status: "continue".to_string(),
            }),
        )
            .into_response(),
        Some(FlowOutcome::Challenge(challenge)) => challenge_response(&challenge),
    }
}

fn challenge_response(challenge: &Challenge) -> Response {
    let mut headers = HeaderMap::new();

    match HeaderValue::from_str(&challenge.location) {
        Ok(location) => {
            headers.insert(LOCATION, location);
        }
        Err(err) => {
            error!("Failed to build Location header: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    for cookie in &challenge.set_cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(err) => {
                error!("Failed to build Set-Cookie header: {}", err);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    (StatusCode::FOUND, headers).into_response()
}

#[utoipa::path(
    post,
    path= "/v1/flows/{flow_id}/complete",
    params(("flow_id" = String, Path, description = "Flow id returned by POST /v1/flows")),
    request_body = CompleteFlow,
    responses (
        (status = 204, description = "Flow completed and login event processed"),
        (status = 400, description = "Missing realm or user id"),
        (status = 404, description = "Unknown or expired flow"),
    ),
    tag= "flows"
)]
#[instrument(skip(state, headers, payload))]
pub async fn complete_flow(
    state: Extension<Arc<AppState>>,
    Path(flow_id): Path<String>,
    headers: HeaderMap,
    payload: Option<Json<CompleteFlow>>,
) -> Response {
    let complete = match payload {
        Some(Json(complete))
            if !complete.realm_id.trim().is_empty() && !complete.user_id.trim().is_empty() =>
        {
            complete
        }
        _ => {
            warn!("complete flow request without realm or user id");
            return (StatusCode::BAD_REQUEST, "Missing realm_id or user_id").into_response();
        }
    };

    let Some(session) = state.flows.remove(&flow_id) else {
        return (StatusCode::NOT_FOUND, "Unknown or expired flow").into_response();
    };

    let event = LoginEvent::from_session(
        &session,
        complete.realm_id,
        complete.user_id,
        extract_client_ip(&headers),
        Utc::now().timestamp(),
    );
    let user_agent = extract_user_agent(&headers);

    let outcome = state.listener.on_event(&event, user_agent.as_deref()).await;
    debug!(?outcome, "login event processed");

    StatusCode::NO_CONTENT.into_response()
}
