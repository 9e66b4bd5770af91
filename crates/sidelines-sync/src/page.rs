//! Live view of one game channel.
//!
//! A [`ChannelPage`] loads a channel by slug, then keeps its message and
//! highlight lists current from two filtered change subscriptions. Every
//! write to the view goes through a [`StateHandle`] stamped with the
//! generation of the visit that created it; leaving the channel bumps the
//! generation, so work still in flight for the old visit cannot touch the
//! new one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sidelines_types::events::{ChangeEvent, ChangeFilter, ChangeRow, Table};
use sidelines_types::models::{
    AuthorProfile, ChannelDetail, ChatMessage, HighlightEntry, HighlightRow, MessageRow,
};

use crate::backend::Backend;
use crate::error::{SyncError, SyncResult};
use crate::stream::RowStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing opened yet.
    #[default]
    Idle,
    Loading,
    /// Unknown slug, or the initial fetch failed.
    NotFound,
    Subscribing,
    Active,
    /// Loaded, but the live subscriptions could not be opened.
    Offline,
    TornDown,
}

/// Everything a renderer needs for one channel visit.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub phase: Phase,
    pub slug: Option<String>,
    pub channel: Option<ChannelDetail>,
    /// Ascending by insertion; realtime rows go to the tail.
    pub messages: Vec<ChatMessage>,
    /// Descending by insertion; realtime rows go to the front.
    pub highlights: Vec<HighlightEntry>,
    pub draft: String,
    /// Set when a send was attempted without a signed-in user.
    pub auth_prompt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank draft or no channel loaded. Nothing was sent.
    Ignored,
    SignInRequired,
    Sent,
    /// The insert failed; the draft is kept.
    Failed,
}

struct PageState {
    generation: u64,
    view: ViewState,
}

struct Shared {
    state: Mutex<PageState>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }
}

/// Write access to the view, valid for a single channel visit.
#[derive(Clone)]
pub struct StateHandle {
    shared: Arc<Shared>,
    generation: u64,
}

impl StateHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.shared.lock().generation == self.generation
    }

    /// Apply `f` to the view if this handle's visit is still the current
    /// one. Returns `None` without touching anything otherwise.
    pub fn update<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> Option<R> {
        let out = {
            let mut state = self.shared.lock();
            if state.generation != self.generation {
                return None;
            }
            f(&mut state.view)
        };
        self.shared.notify();
        Some(out)
    }
}

struct Subscriptions {
    streams: Vec<CancellationToken>,
    listeners: Vec<JoinHandle<()>>,
}

impl Subscriptions {
    fn close(self) {
        for stream in &self.streams {
            stream.cancel();
        }
        for listener in self.listeners {
            listener.abort();
        }
    }
}

pub struct ChannelPage {
    backend: Arc<dyn Backend>,
    shared: Arc<Shared>,
    subscriptions: Option<Subscriptions>,
}

impl ChannelPage {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            backend,
            shared: Arc::new(Shared {
                state: Mutex::new(PageState {
                    generation: 0,
                    view: ViewState::default(),
                }),
                revision,
            }),
            subscriptions: None,
        }
    }

    pub fn snapshot(&self) -> ViewState {
        self.shared.lock().view.clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().view.phase
    }

    /// Revision counter bumped after every view change.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    fn handle(&self) -> StateHandle {
        StateHandle {
            shared: self.shared.clone(),
            generation: self.shared.lock().generation,
        }
    }

    /// Load `slug` and go live. Re-opening the slug already shown is a
    /// no-op; any other slug tears the current visit down first.
    ///
    /// A visit left in `Loading` or `Subscribing` belongs to an `open` call
    /// that was dropped before finishing, so it is reloaded from scratch.
    pub async fn open(&mut self, slug: &str) {
        {
            let state = self.shared.lock();
            let settled = matches!(state.view.phase, Phase::Active | Phase::Offline | Phase::NotFound);
            if settled && state.view.slug.as_deref() == Some(slug) {
                debug!("Channel '{}' already open", slug);
                return;
            }
        }

        self.teardown();
        let handle = self.handle();
        handle.update(|v| {
            *v = ViewState {
                phase: Phase::Loading,
                slug: Some(slug.to_string()),
                ..ViewState::default()
            }
        });

        let Some((channel, messages, highlights)) = self.fetch(slug).await else {
            handle.update(|v| {
                v.phase = Phase::NotFound;
                v.channel = None;
                v.messages.clear();
                v.highlights.clear();
            });
            return;
        };

        let channel_id = channel.id();
        handle.update(|v| {
            v.phase = Phase::Subscribing;
            v.channel = Some(channel);
            v.messages = messages;
            v.highlights = highlights;
        });

        match self.subscribe(channel_id, &handle).await {
            Ok(subscriptions) => {
                self.subscriptions = Some(subscriptions);
                handle.update(|v| v.phase = Phase::Active);
                info!("Channel '{}' ({}) is live", slug, channel_id);
            }
            Err(e) => {
                error!("Failed to subscribe to channel {}: {}", channel_id, e);
                handle.update(|v| v.phase = Phase::Offline);
            }
        }
    }

    /// Leave the channel. Both subscriptions are closed before this returns.
    pub fn close(&mut self) {
        self.teardown();
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        let text = text.into();
        self.handle().update(|v| v.draft = text);
    }

    pub fn dismiss_auth_prompt(&self) {
        self.handle().update(|v| v.auth_prompt = false);
    }

    /// Submit the draft. The message is not appended locally; it shows up
    /// through the message subscription like everyone else's.
    pub async fn send(&self) -> SendOutcome {
        let handle = self.handle();
        let (draft, channel_id) = {
            let state = self.shared.lock();
            (state.view.draft.clone(), state.view.channel.as_ref().map(ChannelDetail::id))
        };

        let text = draft.trim();
        let Some(channel_id) = channel_id.filter(|_| !text.is_empty()) else {
            return SendOutcome::Ignored;
        };

        match self.backend.current_user().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                handle.update(|v| v.auth_prompt = true);
                return SendOutcome::SignInRequired;
            }
            Err(e) => {
                error!("Could not resolve the signed-in user: {}", e);
                return SendOutcome::Failed;
            }
        }

        match self.backend.insert_message(channel_id, text).await {
            Ok(()) => {
                handle.update(|v| {
                    if v.draft == draft {
                        v.draft.clear();
                    }
                });
                SendOutcome::Sent
            }
            Err(SyncError::Unauthenticated) => {
                handle.update(|v| v.auth_prompt = true);
                SendOutcome::SignInRequired
            }
            Err(e) => {
                error!("Failed to send message to channel {}: {}", channel_id, e);
                SendOutcome::Failed
            }
        }
    }

    async fn fetch(&self, slug: &str) -> Option<(ChannelDetail, Vec<ChatMessage>, Vec<HighlightEntry>)> {
        let channel = match self.backend.channel_by_slug(slug).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                info!("Channel '{}' not found", slug);
                return None;
            }
            Err(e) => {
                error!("Failed to load channel '{}': {}", slug, e);
                return None;
            }
        };

        let id = channel.id();
        let (messages, highlights) = tokio::join!(
            self.backend.messages_for_channel(id),
            self.backend.highlights_for_channel(id),
        );
        let messages = messages
            .map_err(|e| error!("Failed to load messages for channel {}: {}", id, e))
            .ok()?;
        let highlights = highlights
            .map_err(|e| error!("Failed to load highlights for channel {}: {}", id, e))
            .ok()?;

        Some((channel, messages, highlights))
    }

    async fn subscribe(&self, channel_id: i64, handle: &StateHandle) -> SyncResult<Subscriptions> {
        let messages = self
            .backend
            .subscribe(ChangeFilter::inserts(Table::Messages, channel_id))
            .await?;
        // An early return drops `messages`, which closes it.
        let highlights = self
            .backend
            .subscribe(ChangeFilter::inserts(Table::Highlights, channel_id))
            .await?;

        Ok(Subscriptions {
            streams: vec![messages.cancel_token(), highlights.cancel_token()],
            listeners: vec![
                spawn_message_listener(self.backend.clone(), handle.clone(), messages),
                spawn_highlight_listener(self.backend.clone(), handle.clone(), highlights),
            ],
        })
    }

    fn teardown(&mut self) {
        let was_visiting = {
            let mut state = self.shared.lock();
            state.generation += 1;
            let visiting = !matches!(state.view.phase, Phase::Idle | Phase::TornDown);
            if visiting {
                state.view = ViewState {
                    phase: Phase::TornDown,
                    ..ViewState::default()
                };
            }
            visiting
        };

        if let Some(subscriptions) = self.subscriptions.take() {
            subscriptions.close();
        }

        if was_visiting {
            self.shared.notify();
            debug!("Channel page torn down");
        }
    }
}

impl Drop for ChannelPage {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn spawn_message_listener(
    backend: Arc<dyn Backend>,
    handle: StateHandle,
    mut stream: RowStream<ChangeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let ChangeRow::Messages(row) = event.row else {
                warn!("Message subscription delivered a {:?} row", event.row.table());
                continue;
            };
            // Lookups run independently; appends land in completion order.
            tokio::spawn(enrich_message(backend.clone(), handle.clone(), row));
        }
    })
}

fn spawn_highlight_listener(
    backend: Arc<dyn Backend>,
    handle: StateHandle,
    mut stream: RowStream<ChangeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let ChangeRow::Highlights(row) = event.row else {
                warn!("Highlight subscription delivered a {:?} row", event.row.table());
                continue;
            };
            tokio::spawn(enrich_highlight(backend.clone(), handle.clone(), row));
        }
    })
}

async fn enrich_message(backend: Arc<dyn Backend>, handle: StateHandle, row: MessageRow) {
    let user = match backend.lookup_author(row.user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => AuthorProfile::anonymous(),
        Err(e) => {
            warn!("Author lookup for message {} failed: {}", row.id, e);
            AuthorProfile::anonymous()
        }
    };

    let id = row.id;
    let applied = handle.update(move |v| {
        if !v.messages.iter().any(|m| m.id() == id) {
            v.messages.push(ChatMessage { row, user });
        }
    });
    if applied.is_none() {
        debug!("Discarded message {} for a closed channel page", id);
    }
}

async fn enrich_highlight(backend: Arc<dyn Backend>, handle: StateHandle, row: HighlightRow) {
    let team = match row.team_id {
        None => None,
        Some(team_id) => match backend.lookup_team(team_id).await {
            Ok(team) => team,
            Err(e) => {
                warn!("Team lookup for highlight {} failed: {}", row.id, e);
                None
            }
        },
    };

    let id = row.id;
    let applied = handle.update(move |v| {
        if !v.highlights.iter().any(|h| h.id() == id) {
            v.highlights.insert(0, HighlightEntry { row, team });
        }
    });
    if applied.is_none() {
        debug!("Discarded highlight {} for a closed channel page", id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Notify;
    use uuid::Uuid;

    use sidelines_types::models::{Channel, ChannelStatus, League, Team, TeamBadge};

    use super::*;
    use crate::stream::{RowSender, row_stream};

    const CHANNEL_ID: i64 = 7;

    #[derive(Default)]
    struct FakeBackend {
        channel: Option<ChannelDetail>,
        fail_history: bool,
        history: Vec<ChatMessage>,
        authors: HashMap<Uuid, AuthorProfile>,
        author_delay: HashMap<Uuid, Duration>,
        fail_authors: bool,
        teams: HashMap<i64, TeamBadge>,
        fail_teams: bool,
        /// When set, author lookups park here until notified.
        gate: Option<Arc<Notify>>,
        /// Taken by the first `channel_by_slug` call, which parks on it.
        slug_gate: Mutex<Option<Arc<Notify>>>,
        /// Fail the highlight subscription, after the message one is open.
        fail_subscribe: bool,
        user: Option<Uuid>,
        fail_insert: bool,
        /// Insert rejected as if the session had expired.
        reject_insert: bool,
        calls: Mutex<Vec<&'static str>>,
        inserted: Mutex<Vec<(i64, String)>>,
        feeds: Mutex<Vec<(ChangeFilter, RowSender<ChangeEvent>)>>,
        lookups_done: AtomicUsize,
    }

    impl FakeBackend {
        fn with_channel() -> Self {
            Self {
                channel: Some(detail()),
                ..Self::default()
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        async fn emit(&self, event: ChangeEvent) {
            let senders: Vec<_> = self
                .feeds
                .lock()
                .unwrap()
                .iter()
                .filter(|(filter, _)| filter.matches(&event))
                .map(|(_, tx)| tx.clone())
                .collect();
            for tx in senders {
                tx.send(event.clone()).await;
            }
        }

        fn open_feeds(&self) -> usize {
            self.feeds.lock().unwrap().iter().filter(|(_, tx)| !tx.is_closed()).count()
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn channel_by_slug(&self, slug: &str) -> SyncResult<Option<ChannelDetail>> {
            self.record("channel_by_slug");
            let gate = self.slug_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(self.channel.clone().filter(|c| c.channel.slug == slug))
        }

        async fn messages_for_channel(&self, _channel_id: i64) -> SyncResult<Vec<ChatMessage>> {
            self.record("messages_for_channel");
            if self.fail_history {
                return Err(SyncError::Backend("history unavailable".into()));
            }
            Ok(self.history.clone())
        }

        async fn highlights_for_channel(&self, _channel_id: i64) -> SyncResult<Vec<HighlightEntry>> {
            self.record("highlights_for_channel");
            Ok(Vec::new())
        }

        async fn lookup_author(&self, user_id: Uuid) -> SyncResult<Option<AuthorProfile>> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(delay) = self.author_delay.get(&user_id) {
                tokio::time::sleep(*delay).await;
            }
            self.lookups_done.fetch_add(1, Ordering::SeqCst);
            if self.fail_authors {
                return Err(SyncError::Backend("profile lookup failed".into()));
            }
            Ok(self.authors.get(&user_id).cloned())
        }

        async fn lookup_team(&self, team_id: i64) -> SyncResult<Option<TeamBadge>> {
            if self.fail_teams {
                return Err(SyncError::Backend("team lookup failed".into()));
            }
            Ok(self.teams.get(&team_id).cloned())
        }

        async fn current_user(&self) -> SyncResult<Option<Uuid>> {
            Ok(self.user)
        }

        async fn insert_message(&self, channel_id: i64, text: &str) -> SyncResult<()> {
            self.record("insert_message");
            if self.reject_insert {
                return Err(SyncError::Unauthenticated);
            }
            if self.fail_insert {
                return Err(SyncError::Status { status: 500, body: "boom".into() });
            }
            self.inserted.lock().unwrap().push((channel_id, text.to_string()));
            Ok(())
        }

        async fn subscribe(&self, filter: ChangeFilter) -> SyncResult<RowStream<ChangeEvent>> {
            self.record("subscribe");
            if self.fail_subscribe && filter.table == Table::Highlights {
                return Err(SyncError::Closed);
            }
            let (tx, rx) = row_stream(64);
            self.feeds.lock().unwrap().push((filter, tx));
            Ok(rx)
        }
    }

    fn team(id: i64, name: &str) -> Team {
        Team {
            id,
            name: name.into(),
            slug: name.to_lowercase(),
            logo_url: None,
            primary_color: "#000000".into(),
            secondary_color: "#FFFFFF".into(),
        }
    }

    fn detail() -> ChannelDetail {
        ChannelDetail {
            channel: Channel {
                id: CHANNEL_ID,
                slug: "lal-vs-bos".into(),
                home_team_id: 1,
                away_team_id: 2,
                league_id: 1,
                game_date: Utc::now(),
                game_status: ChannelStatus::Live,
                score_home: 54,
                score_away: 51,
                game_period: Some("3rd Qtr".into()),
                time_remaining: Some("7:12".into()),
                venue: None,
                inserted_at: Utc::now(),
            },
            home_team: team(1, "Lakers"),
            away_team: team(2, "Celtics"),
            league: League {
                id: 1,
                name: "NBA".into(),
                slug: "nba".into(),
                logo_url: None,
            },
        }
    }

    fn message(id: i64, user_id: Uuid) -> ChangeEvent {
        ChangeEvent::insert(ChangeRow::Messages(MessageRow {
            id,
            message: format!("message {}", id),
            inserted_at: Utc::now(),
            user_id,
            channel_id: CHANNEL_ID,
            is_pinned: false,
        }))
    }

    fn highlight(id: i64, team_id: Option<i64>) -> ChangeEvent {
        ChangeEvent::insert(ChangeRow::Highlights(HighlightRow {
            id,
            channel_id: CHANNEL_ID,
            title: format!("play {}", id),
            description: "and one".into(),
            game_time: Some("Q3 7:10".into()),
            highlight_type: "score".into(),
            inserted_at: Utc::now(),
            team_id,
            media_url: None,
        }))
    }

    fn author(name: &str) -> AuthorProfile {
        AuthorProfile {
            username: name.into(),
            display_name: None,
            avatar_url: None,
        }
    }

    async fn settle(page: &ChannelPage, done: impl Fn(&ViewState) -> bool) {
        let mut changes = page.changes();
        tokio::time::timeout(Duration::from_secs(2), async {
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
        .expect("view never reached the expected state");
    }

    #[tokio::test]
    async fn unknown_slug_stops_after_the_channel_query() {
        let backend = Arc::new(FakeBackend::with_channel());
        let mut page = ChannelPage::new(backend.clone());

        page.open("nyk-vs-mia").await;

        let view = page.snapshot();
        assert_eq!(view.phase, Phase::NotFound);
        assert!(view.channel.is_none());
        assert_eq!(backend.calls(), vec!["channel_by_slug"]);
    }

    #[tokio::test]
    async fn failed_history_falls_back_to_not_found() {
        let backend = Arc::new(FakeBackend {
            fail_history: true,
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());

        page.open("lal-vs-bos").await;

        let view = page.snapshot();
        assert_eq!(view.phase, Phase::NotFound);
        assert!(view.messages.is_empty());
        assert!(!backend.calls().contains(&"subscribe"));
    }

    #[tokio::test]
    async fn reopening_the_same_slug_does_nothing() {
        let backend = Arc::new(FakeBackend::with_channel());
        let mut page = ChannelPage::new(backend.clone());

        page.open("lal-vs-bos").await;
        let calls = backend.calls().len();
        page.open("lal-vs-bos").await;

        assert_eq!(backend.calls().len(), calls);
        assert_eq!(page.phase(), Phase::Active);
    }

    #[tokio::test]
    async fn abandoned_open_is_retried_on_the_next_open() {
        let backend = Arc::new(FakeBackend {
            slug_gate: Mutex::new(Some(Arc::new(Notify::new()))),
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());

        let first = tokio::time::timeout(Duration::from_millis(50), page.open("lal-vs-bos")).await;
        assert!(first.is_err());
        assert_eq!(page.phase(), Phase::Loading);

        page.open("lal-vs-bos").await;

        assert_eq!(page.phase(), Phase::Active);
        assert_eq!(backend.calls().iter().filter(|c| **c == "channel_by_slug").count(), 2);
        assert_eq!(backend.open_feeds(), 2);
    }

    #[tokio::test]
    async fn subscription_failure_keeps_history_offline() {
        let existing = ChatMessage {
            row: match message(1, Uuid::new_v4()).row {
                ChangeRow::Messages(row) => row,
                _ => unreachable!(),
            },
            user: author("early_bird"),
        };
        let backend = Arc::new(FakeBackend {
            history: vec![existing],
            fail_subscribe: true,
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());

        page.open("lal-vs-bos").await;

        let view = page.snapshot();
        assert_eq!(view.phase, Phase::Offline);
        assert!(view.channel.is_some());
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].user.username, "early_bird");
        // The message stream that did open is released again.
        assert_eq!(backend.open_feeds(), 0);

        // Offline is settled: reopening the same slug does not refetch.
        let calls = backend.calls().len();
        page.open("lal-vs-bos").await;
        assert_eq!(backend.calls().len(), calls);
    }

    #[tokio::test]
    async fn expired_session_on_insert_prompts_sign_in() {
        let backend = Arc::new(FakeBackend {
            user: Some(Uuid::new_v4()),
            reject_insert: true,
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;

        page.set_draft("still here?");
        assert_eq!(page.send().await, SendOutcome::SignInRequired);

        let view = page.snapshot();
        assert!(view.auth_prompt);
        assert_eq!(view.draft, "still here?");
        assert!(backend.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_message_event_is_appended_despite_lookup_races() {
        let (slow, fast, anon) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let existing = ChatMessage {
            row: match message(1, fast).row {
                ChangeRow::Messages(row) => row,
                _ => unreachable!(),
            },
            user: author("fast"),
        };
        let backend = Arc::new(FakeBackend {
            history: vec![existing],
            authors: HashMap::from([(slow, author("slow")), (fast, author("fast"))]),
            author_delay: HashMap::from([(slow, Duration::from_millis(150))]),
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;
        assert_eq!(page.phase(), Phase::Active);

        backend.emit(message(2, slow)).await;
        backend.emit(message(3, fast)).await;
        backend.emit(message(4, anon)).await;

        settle(&page, |v| v.messages.len() == 4).await;
        let view = page.snapshot();
        let ids: Vec<i64> = view.messages.iter().map(ChatMessage::id).collect();
        assert_eq!(ids[0], 1);
        let pos = |id| ids.iter().position(|&x| x == id).unwrap();
        assert!(pos(3) < pos(2), "fast lookup should land before the slow one: {:?}", ids);
        let unknown = view.messages.iter().find(|m| m.id() == 4).unwrap();
        assert_eq!(unknown.user.username, "Anonymous");
    }

    #[tokio::test]
    async fn failed_author_lookup_still_appends_once() {
        let backend = Arc::new(FakeBackend {
            fail_authors: true,
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;

        backend.emit(message(10, Uuid::new_v4())).await;
        settle(&page, |v| !v.messages.is_empty()).await;

        let view = page.snapshot();
        assert_eq!(view.messages.len(), 1);
        assert_eq!(view.messages[0].user.label(), "Anonymous");
    }

    #[tokio::test]
    async fn highlights_are_prepended_with_optional_team() {
        let backend = Arc::new(FakeBackend {
            teams: HashMap::from([(
                1,
                TeamBadge {
                    name: "Lakers".into(),
                    logo_url: None,
                    primary_color: "#552583".into(),
                },
            )]),
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;

        backend.emit(highlight(1, None)).await;
        settle(&page, |v| v.highlights.len() == 1).await;
        backend.emit(highlight(2, Some(1))).await;
        settle(&page, |v| v.highlights.len() == 2).await;
        backend.emit(highlight(3, Some(99))).await;
        settle(&page, |v| v.highlights.len() == 3).await;

        let view = page.snapshot();
        let ids: Vec<i64> = view.highlights.iter().map(HighlightEntry::id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert!(view.highlights[0].team.is_none());
        assert_eq!(view.highlights[1].team.as_ref().unwrap().name, "Lakers");
        assert!(view.highlights[2].team.is_none());
    }

    #[tokio::test]
    async fn team_lookup_failure_degrades_to_no_team() {
        let backend = Arc::new(FakeBackend {
            fail_teams: true,
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;

        backend.emit(highlight(5, Some(1))).await;
        settle(&page, |v| v.highlights.len() == 1).await;
        assert!(page.snapshot().highlights[0].team.is_none());
    }

    #[tokio::test]
    async fn whitespace_draft_is_not_sent() {
        let backend = Arc::new(FakeBackend {
            user: Some(Uuid::new_v4()),
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;

        page.set_draft("   \n\t");
        let before = page.snapshot();
        assert_eq!(page.send().await, SendOutcome::Ignored);

        let after = page.snapshot();
        assert_eq!(after.draft, before.draft);
        assert_eq!(after.messages.len(), before.messages.len());
        assert!(!backend.calls().contains(&"insert_message"));
    }

    #[tokio::test]
    async fn send_clears_draft_without_local_append() {
        let backend = Arc::new(FakeBackend {
            user: Some(Uuid::new_v4()),
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;

        page.set_draft("  defense!  ");
        assert_eq!(page.send().await, SendOutcome::Sent);

        let view = page.snapshot();
        assert!(view.draft.is_empty());
        assert!(view.messages.is_empty());
        assert_eq!(*backend.inserted.lock().unwrap(), vec![(CHANNEL_ID, "defense!".to_string())]);
    }

    #[tokio::test]
    async fn send_without_user_prompts_sign_in() {
        let backend = Arc::new(FakeBackend::with_channel());
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;

        page.set_draft("hello");
        assert_eq!(page.send().await, SendOutcome::SignInRequired);
        let view = page.snapshot();
        assert!(view.auth_prompt);
        assert_eq!(view.draft, "hello");
        assert!(!backend.calls().contains(&"insert_message"));

        page.dismiss_auth_prompt();
        assert!(!page.snapshot().auth_prompt);
    }

    #[tokio::test]
    async fn failed_send_keeps_the_draft() {
        let backend = Arc::new(FakeBackend {
            user: Some(Uuid::new_v4()),
            fail_insert: true,
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;

        page.set_draft("hello");
        assert_eq!(page.send().await, SendOutcome::Failed);
        assert_eq!(page.snapshot().draft, "hello");
    }

    #[tokio::test]
    async fn late_lookup_after_close_is_a_no_op() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(FakeBackend {
            gate: Some(gate.clone()),
            ..FakeBackend::with_channel()
        });
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;
        assert_eq!(backend.open_feeds(), 2);

        backend.emit(message(1, Uuid::new_v4())).await;
        // Let the listener hand the event to its lookup task.
        tokio::time::sleep(Duration::from_millis(20)).await;

        page.close();
        assert_eq!(backend.open_feeds(), 0);
        let closed = page.snapshot();
        assert_eq!(closed.phase, Phase::TornDown);
        let changes = page.changes();

        gate.notify_one();
        for _ in 0..50 {
            if backend.lookups_done.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(backend.lookups_done.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!changes.has_changed().unwrap());
        let after = page.snapshot();
        assert_eq!(after.phase, Phase::TornDown);
        assert!(after.messages.is_empty());
    }

    #[tokio::test]
    async fn switching_channels_closes_the_old_subscriptions() {
        let backend = Arc::new(FakeBackend::with_channel());
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;
        assert_eq!(backend.open_feeds(), 2);

        page.open("nyk-vs-mia").await;
        assert_eq!(page.phase(), Phase::NotFound);
        assert_eq!(backend.open_feeds(), 0);

        // Old-channel events no longer reach the page.
        backend.emit(message(1, Uuid::new_v4())).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(page.snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn dropping_the_page_closes_subscriptions() {
        let backend = Arc::new(FakeBackend::with_channel());
        let mut page = ChannelPage::new(backend.clone());
        page.open("lal-vs-bos").await;
        assert_eq!(backend.open_feeds(), 2);

        drop(page);
        assert_eq!(backend.open_feeds(), 0);
    }

    #[test]
    fn stale_handles_cannot_write() {
        let page = ChannelPage::new(Arc::new(FakeBackend::default()));
        let old = page.handle();
        {
            let mut state = page.shared.lock();
            state.generation += 1;
        }
        assert!(!old.is_current());
        assert!(old.update(|v| v.draft.push('x')).is_none());
        assert!(page.handle().update(|v| v.draft.push('y')).is_some());
        assert_eq!(page.snapshot().draft, "y");
    }
}
