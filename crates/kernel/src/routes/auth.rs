//! Authentication routes (login, logout).
//!
//! The `admin` account authenticates against the configured admin
//! password. Modules providing their own accounts add routes of their own.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tower_sessions::Session;
use tracing::{info, warn};

use crate::session::{SESSION_AFTER_LOGIN, SESSION_USER};
use crate::state::AppState;

/// Account name that logs in with the admin password.
pub const ADMIN_USER: &str = "admin";

/// Module whose presence enables the password reset link.
const PEOPLE_MODULE: &str = "keystone-people";

/// Form-based login request.
#[derive(Debug, Deserialize)]
pub struct LoginFormRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
enum LoginError {
    InvalidCredentials,
    Internal,
}

impl LoginError {
    fn status_code(&self) -> StatusCode {
        match self {
            LoginError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            LoginError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            LoginError::InvalidCredentials => "Invalid username or password",
            LoginError::Internal => "Internal server error",
        }
    }
}

fn login_page(state: &AppState, error: Option<&str>) -> String {
    let prefix = &state.config().prefix;
    let error = error
        .map(|e| format!("<p class=\"error\">{e}</p>\n"))
        .unwrap_or_default();
    let reset = if state.has_module(PEOPLE_MODULE) {
        format!("<p><a href=\"{prefix}/password-reset\">Forgot your password?</a></p>\n")
    } else {
        String::new()
    };

    format!(
        r#"<!DOCTYPE html>
<html><head><title>Log in</title></head>
<body style="font-family: sans-serif; max-width: 400px; margin: 100px auto; padding: 2rem;">
<h1>Log in</h1>
{error}<form method="post" action="{prefix}/login">
<p><label>Username<br><input type="text" name="username" required></label></p>
<p><label>Password<br><input type="password" name="password" required></label></p>
<p><button type="submit">Log in</button></p>
</form>
{reset}</body></html>"#
    )
}

/// GET /login
async fn login_form(State(state): State<AppState>) -> Html<String> {
    Html(login_page(&state, None))
}

/// POST /login (form data)
async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginFormRequest>,
) -> Response {
    match do_login(&state, &session, &form).await {
        Ok(target) => Redirect::to(&target).into_response(),
        Err(e) => (e.status_code(), Html(login_page(&state, Some(e.message())))).into_response(),
    }
}

/// Check credentials, start the session, and return where to go next.
async fn do_login(
    state: &AppState,
    session: &Session,
    form: &LoginFormRequest,
) -> Result<String, LoginError> {
    let expected = state.config().admin_password.as_bytes();
    let valid_user = form.username == ADMIN_USER;
    let valid_password: bool = form.password.as_bytes().ct_eq(expected).into();

    if !(valid_user && valid_password) {
        warn!(username = %form.username, "failed login attempt");
        return Err(LoginError::InvalidCredentials);
    }

    session.cycle_id().await.map_err(|e| {
        tracing::error!(error = %e, "failed to cycle session id");
        LoginError::Internal
    })?;
    session
        .insert(SESSION_USER, ADMIN_USER)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to insert user into session");
            LoginError::Internal
        })?;

    let after_login = session
        .remove::<String>(SESSION_AFTER_LOGIN)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| "/".to_string());

    info!(username = %form.username, "user logged in");
    Ok(format!("{}{}", state.config().prefix, after_login))
}

/// GET /logout
async fn logout(State(state): State<AppState>, session: Session) -> Response {
    if let Err(e) = session.flush().await {
        tracing::error!(error = %e, "failed to flush session");
    }
    let home = if state.config().prefix.is_empty() {
        "/".to_string()
    } else {
        state.config().prefix.clone()
    };
    Redirect::to(&home).into_response()
}

/// Create the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_form).post(login_submit))
        .route("/logout", get(logout))
}
