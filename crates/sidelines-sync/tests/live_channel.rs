use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect::Policy;
use serde_json::{Value, json};

use sidelines_api::auth::{AppState, AppStateInner};
use sidelines_db::Database;
use sidelines_gateway::feed::ChangeFeed;
use sidelines_sync::{ChannelPage, Phase, RemoteBackend, SendOutcome, ViewState};

const SERVICE_KEY: &str = "producer-key";

async fn spawn_server() -> (String, AppState) {
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        feed: ChangeFeed::default(),
        jwt_secret: "live-channel-secret".into(),
        project_ref: "local".into(),
        service_key: SERVICE_KEY.into(),
    });
    let app = sidelines_api::router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

async fn produce(http: &reqwest::Client, url: String, body: Value) -> Value {
    let resp = http
        .post(url)
        .header("x-service-key", SERVICE_KEY)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success(), "producer call failed: {}", resp.status());
    resp.json().await.unwrap()
}

async fn settle(page: &ChannelPage, done: impl Fn(&ViewState) -> bool) {
    let mut changes = page.changes();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if done(&page.snapshot()) {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    })
    .await
    .expect("channel page never reached the expected state");
}

#[tokio::test]
async fn chat_and_play_by_play_flow_end_to_end() {
    let (base, state) = spawn_server().await;
    let http = reqwest::Client::builder().redirect(Policy::none()).build().unwrap();

    let lakers = produce(
        &http,
        format!("{}/rest/teams", base),
        json!({"name": "Lakers", "slug": "lakers", "primary_color": "#552583", "secondary_color": "#FDB927"}),
    )
    .await["id"]
        .as_i64()
        .unwrap();
    let celtics = produce(
        &http,
        format!("{}/rest/teams", base),
        json!({"name": "Celtics", "slug": "celtics", "primary_color": "#007A33", "secondary_color": "#BA9653"}),
    )
    .await["id"]
        .as_i64()
        .unwrap();
    let channel_id = produce(
        &http,
        format!("{}/rest/channels", base),
        json!({
            "slug": "lal-vs-bos",
            "home_team_id": lakers,
            "away_team_id": celtics,
            "game_date": "2025-05-20T00:30:00Z",
        }),
    )
    .await["id"]
        .as_i64()
        .unwrap();

    // Sign up, then complete the callback so the profile row exists.
    let registered: Value = http
        .post(format!("{}/auth/register", base))
        .json(&json!({"email": "carl@example.com", "password": "courtside", "username": "courtside_carl"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let code = registered["code"].as_str().unwrap();
    let callback = http
        .get(format!("{}/auth/callback?code={}", base, code))
        .send()
        .await
        .unwrap();
    assert_eq!(callback.status(), reqwest::StatusCode::SEE_OTHER);
    assert_eq!(callback.headers()["location"], "/feed");

    let backend = RemoteBackend::new(&base).unwrap();
    backend.sign_in("carl@example.com", "courtside").await.unwrap();

    let mut page = ChannelPage::new(Arc::new(backend));
    page.open("lal-vs-bos").await;
    assert_eq!(page.phase(), Phase::Active);
    assert_eq!(page.snapshot().channel.unwrap().matchup(), "Lakers vs Celtics");

    page.set_draft("Let's go Lakers");
    assert_eq!(page.send().await, SendOutcome::Sent);
    settle(&page, |v| v.messages.len() == 1).await;
    let view = page.snapshot();
    assert_eq!(view.messages[0].row.message, "Let's go Lakers");
    assert_eq!(view.messages[0].user.username, "courtside_carl");
    assert!(view.draft.is_empty());

    produce(
        &http,
        format!("{}/rest/channels/{}/highlights", base, channel_id),
        json!({"title": "Corner three", "description": "Pull-up from the corner", "highlight_type": "score", "team_id": lakers}),
    )
    .await;
    settle(&page, |v| v.highlights.len() == 1).await;
    produce(
        &http,
        format!("{}/rest/channels/{}/highlights", base, channel_id),
        json!({"title": "Timeout", "description": "Boston calls timeout", "highlight_type": "stoppage"}),
    )
    .await;
    settle(&page, |v| v.highlights.len() == 2).await;
    let view = page.snapshot();
    assert_eq!(view.highlights[0].row.title, "Timeout");
    assert!(view.highlights[0].team.is_none());
    assert_eq!(view.highlights[1].team.as_ref().unwrap().name, "Lakers");

    assert_eq!(state.feed.active_subscriptions(), 2);
    page.close();
    for _ in 0..100 {
        if state.feed.active_subscriptions() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.feed.active_subscriptions(), 0);
}

#[tokio::test]
async fn unknown_channel_renders_not_found() {
    let (base, _state) = spawn_server().await;
    let mut page = ChannelPage::new(Arc::new(RemoteBackend::new(&base).unwrap()));

    page.open("does-not-exist").await;

    let view = page.snapshot();
    assert_eq!(view.phase, Phase::NotFound);
    assert!(view.messages.is_empty());
    assert!(view.highlights.is_empty());
}

#[tokio::test]
async fn signed_out_send_prompts_for_sign_in() {
    let (base, state) = spawn_server().await;
    let http = reqwest::Client::new();
    let home = produce(
        &http,
        format!("{}/rest/teams", base),
        json!({"name": "Knicks", "slug": "knicks", "primary_color": "#006BB6", "secondary_color": "#F58426"}),
    )
    .await["id"]
        .as_i64()
        .unwrap();
    let away = produce(
        &http,
        format!("{}/rest/teams", base),
        json!({"name": "Heat", "slug": "heat", "primary_color": "#98002E", "secondary_color": "#F9A01B"}),
    )
    .await["id"]
        .as_i64()
        .unwrap();
    produce(
        &http,
        format!("{}/rest/channels", base),
        json!({"slug": "nyk-vs-mia", "home_team_id": home, "away_team_id": away, "game_date": "2025-05-21T23:00:00Z"}),
    )
    .await;

    let mut page = ChannelPage::new(Arc::new(RemoteBackend::new(&base).unwrap()));
    page.open("nyk-vs-mia").await;
    page.set_draft("anyone here?");

    assert_eq!(page.send().await, SendOutcome::SignInRequired);
    let view = page.snapshot();
    assert!(view.auth_prompt);
    assert_eq!(view.draft, "anyone here?");
    assert!(state.db.get_messages(view.channel.unwrap().id()).unwrap().is_empty());
}
