//! OAuth2 login HTTP handlers
//!
//! Provides the browser-facing login flow for Gitee, GitHub and Google

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use tracing::{info, warn};

use blogsite_core::models::LinkedIdentityId;
use blogsite_core::service::{
    oauth_flow::require_email_path, BindStage, CallbackOutcome, Notice, ProviderLink,
};
use blogsite_core::Error;

use super::{AppError, AppResult, AppState};

/// GET /oauth/login/ query params
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub oauth_app: Option<String>,
    pub next: Option<String>,
}

/// GET /oauth/authorize/ query params (provider callback)
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub oauth_app: Option<String>,
    pub code: Option<String>,
    pub state: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequireEmailForm {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct BindSuccessQuery {
    pub required: Option<String>,
}

/// 302 to `location`
pub(crate) fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => AppError::internal_server_error("Invalid redirect target").into_response(),
    }
}

/// 302 to `location`, establishing a session
fn redirect_signed_in(state: &AppState, location: &str, session_token: &str) -> Response {
    let mut response = redirect(location);
    match HeaderValue::from_str(&state.cookie.header_value(session_token)) {
        Ok(cookie) => {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
            response
        }
        Err(_) => AppError::internal_server_error("Invalid session cookie").into_response(),
    }
}

/// Redirect to the provider's authorization page
///
/// GET /oauth/login/?oauth_app=<code>&next=<path>
pub async fn login(State(state): State<AppState>, Query(params): Query<LoginQuery>) -> AppResult<Response> {
    let url = state
        .flow
        .start_login(params.oauth_app.as_deref(), params.next.as_deref())
        .await?;
    Ok(redirect(&url))
}

/// Provider callback
///
/// GET /oauth/authorize/?oauth_app=<code>&code=<code>&state=<path>
pub async fn authorize(State(state): State<AppState>, Query(params): Query<CallbackQuery>) -> AppResult<Response> {
    let result = state
        .flow
        .handle_callback(
            params.oauth_app.as_deref(),
            params.code.as_deref(),
            params.state.as_deref(),
            params.next.as_deref(),
        )
        .await;

    match result {
        Ok(CallbackOutcome::SignedIn {
            session_token,
            redirect_to,
            ..
        }) => Ok(redirect_signed_in(&state, &redirect_to, &session_token)),
        Ok(CallbackOutcome::EmailRequired { redirect_to, .. }) => Ok(redirect(&redirect_to)),
        Err(e @ Error::MissingIdentityFields { .. }) => {
            warn!("OAuth2 provider withheld identity fields: {}", e);
            Ok(state.pages.notice(&Notice::missing_identity_fields())?.into_response())
        }
        Err(e) if e.is_authorization_failure() => {
            warn!("OAuth2 authorization failed: {}", e);
            Ok(state.pages.notice(&Notice::authorization_failed())?.into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Email form
///
/// GET /oauth/require_email/{id}/
pub async fn require_email_form(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> AppResult<Response> {
    let record_id = LinkedIdentityId::from(record_id);
    let record = state
        .flow
        .reconciler()
        .find_record(&record_id)
        .await?
        .ok_or_else(|| AppError::not_found("Not found"))?;

    let page = state.pages.require_email(&require_email_path(&record.id), "", None)?;
    Ok(page.into_response())
}

/// Email form submission
///
/// POST /oauth/require_email/{id}/
pub async fn submit_email(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    Form(form): Form<RequireEmailForm>,
) -> AppResult<Response> {
    let record_id = LinkedIdentityId::from(record_id);
    match state.flow.submit_missing_email(&record_id, &form.email).await {
        Ok(location) => Ok(redirect(&location)),
        Err(Error::InvalidInput(message)) => {
            let page = state
                .pages
                .require_email(&require_email_path(&record_id), &form.email, Some(&message))?;
            Ok((StatusCode::BAD_REQUEST, page).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Informational page after submitting or confirming an email
///
/// GET /oauth/bind_success/{id}/?required=email|success
pub async fn bind_success(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    Query(params): Query<BindSuccessQuery>,
) -> AppResult<Response> {
    let stage = BindStage::from_query(params.required.as_deref());
    let notice = state
        .flow
        .bind_notice(&LinkedIdentityId::from(record_id), stage)
        .await?;
    Ok(state.pages.notice(&notice)?.into_response())
}

/// Emailed confirmation link
///
/// GET /oauth/email_verification/{id}/{token}/
pub async fn email_verification(
    State(state): State<AppState>,
    Path((record_id, token)): Path<(String, String)>,
) -> AppResult<Response> {
    let confirmed = state
        .flow
        .confirm_email(&LinkedIdentityId::from(record_id), &token)
        .await?;
    info!(account_id = %confirmed.account.id, "OAuth2 email confirmed, signing in");
    Ok(redirect_signed_in(&state, &confirmed.redirect_to, &confirmed.session_token))
}

/// Enabled login options
///
/// GET /oauth/providers/
pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderLink>> {
    Json(state.flow.providers().await)
}
