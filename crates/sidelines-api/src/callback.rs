use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{AppState, code_digest, create_token};
use crate::middleware::session_cookie_name;

const DEFAULT_NEXT: &str = "/feed";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    #[serde(alias = "redirect")]
    pub next: Option<String>,
}

/// Stage at which a callback gave up; surfaces as `?error=<tag>` on the
/// login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFailure {
    MissingCode,
    ExchangeFailed,
    ProfileFailed,
    Unexpected,
}

impl CallbackFailure {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MissingCode => "missing_code",
            Self::ExchangeFailed => "exchange_failed",
            Self::ProfileFailed => "profile_failed",
            Self::Unexpected => "unexpected",
        }
    }
}

struct Session {
    user_id: Uuid,
    token: String,
}

/// Exchange a one-time code for a session cookie, provisioning the profile
/// row on first sign-in.
pub async fn auth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return failure_redirect(CallbackFailure::MissingCode);
    };

    let db_state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || exchange(&db_state, &code)).await;

    let session = match outcome {
        Ok(Ok(session)) => session,
        Ok(Err(stage)) => return failure_redirect(stage),
        Err(e) => {
            error!("Auth callback task failed: {}", e);
            return failure_redirect(CallbackFailure::Unexpected);
        }
    };

    info!("Session established for {}", session.user_id);

    let cookie = Cookie::build((session_cookie_name(&state.project_ref), session.token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    let target = safe_next(query.next.as_deref());
    (jar.add(cookie), Redirect::to(target)).into_response()
}

fn exchange(state: &AppState, code: &str) -> Result<Session, CallbackFailure> {
    let account_id = match state.db.consume_auth_code(&code_digest(code), chrono::Utc::now()) {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!("Auth code rejected (unknown, used or expired)");
            return Err(CallbackFailure::ExchangeFailed);
        }
        Err(e) => {
            error!("Auth code lookup failed: {}", e);
            return Err(CallbackFailure::ExchangeFailed);
        }
    };

    let account = match state.db.get_account_by_id(&account_id) {
        Ok(Some(a)) => a,
        Ok(None) => {
            error!("Auth code points at missing account {}", account_id);
            return Err(CallbackFailure::ExchangeFailed);
        }
        Err(e) => {
            error!("Account lookup failed: {}", e);
            return Err(CallbackFailure::ExchangeFailed);
        }
    };

    let user_id: Uuid = account.id.parse().map_err(|e| {
        error!("Corrupt account id '{}': {}", account.id, e);
        CallbackFailure::Unexpected
    })?;

    match state.db.create_profile_if_missing(user_id, &account.username) {
        Ok(true) => info!("Provisioned profile for {}", user_id),
        Ok(false) => {}
        Err(e) => {
            error!("Profile provisioning failed for {}: {}", user_id, e);
            return Err(CallbackFailure::ProfileFailed);
        }
    }

    let token = create_token(&state.jwt_secret, user_id, &account.email).map_err(|e| {
        error!("Session token creation failed: {}", e);
        CallbackFailure::Unexpected
    })?;

    Ok(Session { user_id, token })
}

fn failure_redirect(stage: CallbackFailure) -> Response {
    Redirect::to(&format!("/login?error={}", stage.tag())).into_response()
}

/// Only same-origin relative paths are honoured.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n,
        _ => DEFAULT_NEXT,
    }
}
