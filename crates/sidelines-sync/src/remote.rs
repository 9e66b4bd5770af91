use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use sidelines_types::api::{LoginRequest, LoginResponse, MeResponse, SendMessageRequest};
use sidelines_types::events::{ChangeEvent, ChangeFilter, RealtimeCommand, RealtimeFrame};
use sidelines_types::models::{AuthorProfile, ChannelDetail, ChatMessage, HighlightEntry, TeamBadge};

use crate::backend::Backend;
use crate::error::{SyncError, SyncResult};
use crate::stream::{RowSender, RowStream, row_stream};

/// Buffered change events per subscription before the socket reader waits.
const STREAM_CAPACITY: usize = 256;

/// [`Backend`] over the server's REST routes and its `/realtime` socket.
/// One socket is shared by every subscription opened through this value.
pub struct RemoteBackend {
    http: Client,
    base: Url,
    token: RwLock<Option<String>>,
    realtime: tokio::sync::Mutex<Option<Arc<RealtimeLink>>>,
}

impl RemoteBackend {
    pub fn new(base_url: &str) -> SyncResult<Self> {
        Ok(Self {
            http: Client::new(),
            base: Url::parse(base_url)?,
            token: RwLock::new(None),
            realtime: tokio::sync::Mutex::new(None),
        })
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Password sign-in; keeps the returned session token for later calls.
    pub async fn sign_in(&self, email: &str, password: &str) -> SyncResult<Uuid> {
        let resp = self
            .http
            .post(self.endpoint(&["auth", "login"])?)
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let login: LoginResponse = expect_success(resp).await?.json().await?;
        self.set_token(Some(login.token));
        info!("Signed in as {}", login.user_id);
        Ok(login.user_id)
    }

    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Protocol(format!("'{}' cannot be a base url", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET a JSON resource; 404 maps to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, segments: &[&str]) -> SyncResult<Option<T>> {
        let resp = self.authed(self.http.get(self.endpoint(segments)?)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(expect_success(resp).await?.json().await?))
    }

    async fn get_list<T: DeserializeOwned>(&self, segments: &[&str]) -> SyncResult<Vec<T>> {
        let resp = self.authed(self.http.get(self.endpoint(segments)?)).send().await?;
        Ok(expect_success(resp).await?.json().await?)
    }

    async fn link(&self) -> SyncResult<Arc<RealtimeLink>> {
        let mut slot = self.realtime.lock().await;
        if let Some(link) = slot.as_ref().filter(|l| !l.is_closed()) {
            return Ok(link.clone());
        }

        let mut url = self.endpoint(&["realtime"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| SyncError::Protocol(format!("no websocket scheme for {}", url)))?;

        let link = Arc::new(RealtimeLink::connect(&url, self.token()).await?);
        *slot = Some(link.clone());
        Ok(link)
    }
}

async fn expect_success(resp: Response) -> SyncResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(SyncError::Unauthenticated);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SyncError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn channel_by_slug(&self, slug: &str) -> SyncResult<Option<ChannelDetail>> {
        self.get_optional(&["rest", "channels", "by-slug", slug]).await
    }

    async fn messages_for_channel(&self, channel_id: i64) -> SyncResult<Vec<ChatMessage>> {
        self.get_list(&["rest", "channels", &channel_id.to_string(), "messages"]).await
    }

    async fn highlights_for_channel(&self, channel_id: i64) -> SyncResult<Vec<HighlightEntry>> {
        self.get_list(&["rest", "channels", &channel_id.to_string(), "highlights"]).await
    }

    async fn lookup_author(&self, user_id: Uuid) -> SyncResult<Option<AuthorProfile>> {
        self.get_optional(&["rest", "users", &user_id.to_string(), "profile"]).await
    }

    async fn lookup_team(&self, team_id: i64) -> SyncResult<Option<TeamBadge>> {
        self.get_optional(&["rest", "teams", &team_id.to_string()]).await
    }

    async fn current_user(&self) -> SyncResult<Option<Uuid>> {
        if self.token().is_none() {
            return Ok(None);
        }
        match self.get_optional::<MeResponse>(&["rest", "me"]).await {
            Ok(me) => Ok(me.map(|m| m.user_id)),
            Err(SyncError::Unauthenticated) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn insert_message(&self, channel_id: i64, text: &str) -> SyncResult<()> {
        if self.token().is_none() {
            return Err(SyncError::Unauthenticated);
        }
        let resp = self
            .authed(
                self.http
                    .post(self.endpoint(&["rest", "channels", &channel_id.to_string(), "messages"])?),
            )
            .json(&SendMessageRequest {
                message: text.to_string(),
            })
            .send()
            .await?;
        expect_success(resp).await?;
        Ok(())
    }

    async fn subscribe(&self, filter: ChangeFilter) -> SyncResult<RowStream<ChangeEvent>> {
        self.link().await?.subscribe(filter).await
    }
}

#[derive(Default)]
struct Routes {
    topics: HashMap<Uuid, RowSender<ChangeEvent>>,
    pending: HashMap<Uuid, oneshot::Sender<Result<(), String>>>,
}

fn lock(routes: &Mutex<Routes>) -> MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One realtime socket multiplexing topics.
struct RealtimeLink {
    commands: mpsc::UnboundedSender<RealtimeCommand>,
    routes: Arc<Mutex<Routes>>,
    closed: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RealtimeLink {
    async fn connect(url: &Url, token: Option<String>) -> SyncResult<Self> {
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, mut source) = socket.split();
        info!("Realtime socket connected to {}", url);

        let (commands, mut outbox) = mpsc::unbounded_channel::<RealtimeCommand>();
        let routes = Arc::new(Mutex::new(Routes::default()));
        let closed = CancellationToken::new();

        if let Some(token) = token {
            let _ = commands.send(RealtimeCommand::Identify { token });
        }

        let writer_closed = closed.clone();
        let writer = tokio::spawn(async move {
            loop {
                let cmd = tokio::select! {
                    _ = writer_closed.cancelled() => break,
                    cmd = outbox.recv() => match cmd {
                        Some(cmd) => cmd,
                        None => break,
                    },
                };
                let text = match serde_json::to_string(&cmd) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Dropping unserializable command: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
            writer_closed.cancel();
        });

        let reader_routes = routes.clone();
        let reader_commands = commands.clone();
        let reader_closed = closed.clone();
        let reader = tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = reader_closed.cancelled() => break,
                    msg = source.next() => msg,
                };
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(&reader_routes, &reader_commands, text.as_str()).await
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("Realtime socket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            reader_closed.cancel();
            // Dropping the senders ends every open stream and fails pending acks.
            let mut routes = lock(&reader_routes);
            routes.topics.clear();
            routes.pending.clear();
            debug!("Realtime socket reader stopped");
        });

        Ok(Self {
            commands,
            routes,
            closed,
            tasks: vec![writer, reader],
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn subscribe(&self, filter: ChangeFilter) -> SyncResult<RowStream<ChangeEvent>> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }

        let topic = Uuid::new_v4();
        let (tx, rx) = row_stream(STREAM_CAPACITY);
        let (ack_tx, ack_rx) = oneshot::channel();
        {
            let mut routes = lock(&self.routes);
            routes.topics.insert(topic, tx.clone());
            routes.pending.insert(topic, ack_tx);
        }

        self.commands
            .send(RealtimeCommand::Subscribe { topic, filter })
            .map_err(|_| SyncError::Closed)?;

        match ack_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                lock(&self.routes).topics.remove(&topic);
                return Err(SyncError::Protocol(message));
            }
            Err(_) => return Err(SyncError::Closed),
        }
        debug!("Subscribed topic {} to {:?}", topic, filter);

        // Tell the server once the consumer closes its end.
        let routes = self.routes.clone();
        let commands = self.commands.clone();
        let link_closed = self.closed.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tx.closed() => {
                    lock(&routes).topics.remove(&topic);
                    let _ = commands.send(RealtimeCommand::Unsubscribe { topic });
                }
                _ = link_closed.cancelled() => {}
            }
        });

        Ok(rx)
    }
}

impl Drop for RealtimeLink {
    fn drop(&mut self) {
        self.closed.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn dispatch(routes: &Mutex<Routes>, commands: &mpsc::UnboundedSender<RealtimeCommand>, text: &str) {
    let frame = match serde_json::from_str::<RealtimeFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Unreadable realtime frame: {}", e);
            return;
        }
    };

    match frame {
        RealtimeFrame::Change { topic, event } => {
            let Some(tx) = lock(routes).topics.get(&topic).cloned() else {
                return;
            };
            if !tx.send(event).await {
                lock(routes).topics.remove(&topic);
                let _ = commands.send(RealtimeCommand::Unsubscribe { topic });
            }
        }
        RealtimeFrame::Subscribed { topic } => {
            if let Some(ack) = lock(routes).pending.remove(&topic) {
                let _ = ack.send(Ok(()));
            }
        }
        RealtimeFrame::Error { topic: Some(topic), message } => {
            if let Some(ack) = lock(routes).pending.remove(&topic) {
                let _ = ack.send(Err(message));
            }
        }
        RealtimeFrame::Error { topic: None, message } => {
            warn!("Realtime server error: {}", message);
        }
        RealtimeFrame::Ready { user_id } => {
            debug!("Realtime session ready (user {:?})", user_id);
        }
        RealtimeFrame::Unsubscribed { topic } => {
            debug!("Topic {} unsubscribed", topic);
        }
    }
}
