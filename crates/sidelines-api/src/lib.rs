pub mod auth;
pub mod callback;
pub mod channels;
pub mod error;
pub mod games;
pub mod highlights;
pub mod messages;
pub mod middleware;
pub mod profiles;
pub mod realtime;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AppState;

/// Full HTTP surface. The route guard wraps everything, so page paths
/// like `/feed` and `/profile` are gated on a session cookie before any
/// handler runs. JSON lives under `/rest` and `/api`, which the guard leaves
/// alone; bearer-token clients authenticate there through `require_auth`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/games", get(games::get_games))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/callback", get(callback::auth_callback))
        .route("/rest/feed", get(channels::list_feed))
        .route("/rest/channels/by-slug/{slug}", get(channels::get_channel_by_slug))
        .route("/rest/channels/{channel_id}/messages", get(messages::get_messages))
        .route("/rest/channels/{channel_id}/highlights", get(highlights::get_highlights))
        .route("/rest/users/{user_id}/profile", get(profiles::get_author))
        .route("/rest/teams/{team_id}", get(channels::get_team))
        .route("/realtime", get(realtime::ws_upgrade));

    let protected_routes = Router::new()
        .route("/rest/channels/{channel_id}/messages", post(messages::send_message))
        .route("/rest/me", get(profiles::me))
        .route("/rest/profile", get(profiles::get_own_profile).put(profiles::update_own_profile))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    let service_routes = Router::new()
        .route("/rest/teams", post(channels::create_team))
        .route("/rest/channels", post(channels::create_channel))
        .route("/rest/channels/{channel_id}/state", put(channels::update_channel_state))
        .route("/rest/channels/{channel_id}/highlights", post(highlights::post_highlight))
        .route("/rest/games", post(games::upsert_game))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_service_key));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(service_routes)
        .with_state(state)
        .layer(from_fn(middleware::route_guard))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
