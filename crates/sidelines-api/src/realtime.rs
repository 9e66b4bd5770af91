use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};

use sidelines_gateway::connection;

use crate::auth::AppState;

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let feed = state.feed.clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, feed, jwt_secret))
}
