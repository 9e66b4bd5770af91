use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

pub use sidelines_types::api::Claims;

use crate::auth::AppState;

/// Header carrying the service key used by feed producers.
pub const SERVICE_KEY_HEADER: &str = "x-service-key";

const PUBLIC_ROUTES: &[&str] = &["/", "/login", "/signup", "/register", "/reset-password"];
const PROTECTED_ROUTES: &[&str] = &["/feed", "/dashboard", "/profile", "/chat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Protected,
    Unclassified,
}

/// Public routes win over protected ones; anything else is unclassified.
pub fn classify_path(path: &str) -> RouteClass {
    let matches = |route: &&str| {
        path == *route
            || path
                .strip_prefix(*route)
                .is_some_and(|rest| rest.starts_with('/'))
    };

    if PUBLIC_ROUTES.iter().any(matches) {
        RouteClass::Public
    } else if PROTECTED_ROUTES.iter().any(matches) {
        RouteClass::Protected
    } else {
        RouteClass::Unclassified
    }
}

/// Session cookies are named `sb-<project>-auth-token` (optionally chunked
/// with a `.0`, `.1` suffix).
pub fn is_auth_cookie_name(name: &str) -> bool {
    name.starts_with("sb-") && name.contains("-auth-token")
}

pub fn session_cookie_name(project_ref: &str) -> String {
    format!("sb-{}-auth-token", project_ref)
}

/// Gate protected page paths on the presence of a session cookie.
/// Presence only; handlers that need an identity still go through
/// [`require_auth`].
pub async fn route_guard(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();

    if classify_path(&path) == RouteClass::Protected {
        let jar = CookieJar::from_headers(req.headers());
        if !jar.iter().any(|c| is_auth_cookie_name(c.name())) {
            debug!("No session cookie for {}, redirecting to login", path);
            let target: String = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("redirect", &path)
                .finish();
            return Redirect::to(&format!("/login?{}", target)).into_response();
        }
    }

    next.run(req).await
}

/// Validate the session token from the Authorization header or the session
/// cookie and attach its claims to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = session_token(req.headers(), &state.project_ref).ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// Only callers holding the service key may publish schedule and feed data.
pub async fn require_service_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = req
        .headers()
        .get(SERVICE_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if presented != state.service_key {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(req).await)
}

fn session_token(headers: &HeaderMap, project_ref: &str) -> Option<String> {
    if let Some(bearer) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.to_string());
    }

    let jar = CookieJar::from_headers(headers);
    jar.get(&session_cookie_name(project_ref))
        .map(|c| c.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_routes() {
        assert_eq!(classify_path("/"), RouteClass::Public);
        assert_eq!(classify_path("/login"), RouteClass::Public);
        assert_eq!(classify_path("/login/magic"), RouteClass::Public);
        assert_eq!(classify_path("/reset-password"), RouteClass::Public);
        assert_eq!(classify_path("/feed"), RouteClass::Protected);
        assert_eq!(classify_path("/chat/lal-vs-bos"), RouteClass::Protected);
        assert_eq!(classify_path("/profile"), RouteClass::Protected);
        assert_eq!(classify_path("/feedback"), RouteClass::Unclassified);
        assert_eq!(classify_path("/api/games"), RouteClass::Unclassified);
        assert_eq!(classify_path("/channels/lal-vs-bos"), RouteClass::Unclassified);
    }

    #[test]
    fn auth_cookie_pattern() {
        assert!(is_auth_cookie_name("sb-abcd-auth-token"));
        assert!(is_auth_cookie_name("sb-abcd-auth-token.0"));
        assert!(!is_auth_cookie_name("auth-token"));
        assert!(!is_auth_cookie_name("sb-abcd-refresh"));
        assert_eq!(session_cookie_name("local"), "sb-local-auth-token");
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "sb-local-auth-token=from-cookie".parse().unwrap());
        assert_eq!(session_token(&headers, "local").as_deref(), Some("from-cookie"));

        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(session_token(&headers, "local").as_deref(), Some("from-header"));
        assert_eq!(session_token(&HeaderMap::new(), "local"), None);
    }
}
